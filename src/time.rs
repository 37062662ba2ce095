//! Virtual-time delay helpers.
//!
//! Delays run on the scheduler's virtual clock: a `delay` promise settles
//! when the drive loop advances past its deadline, which makes every timing
//! scenario deterministic and instant. Ticks are the only time unit; there is
//! no wall-clock precision to guarantee.

use crate::promise::{Promise, Resolution};
use crate::schedule;

/// Fulfills with `value` after `after` virtual ticks.
pub fn delay<T: Clone + 'static>(after: u64, value: T) -> Promise<T> {
    delay_with(after, move || Resolution::Value(value))
}

/// Runs `f` after `after` virtual ticks and resolves with its resolution.
///
/// Lets a delayed task reject or chain further work at the deadline.
pub fn delay_with<T, R, F>(after: u64, f: F) -> Promise<T>
where
    T: Clone + 'static,
    R: Into<Resolution<T>>,
    F: FnOnce() -> R + 'static,
{
    Promise::new(move |settle| {
        schedule::timer(after, move || settle.resolve(f()));
        Ok(())
    })
}
