//! Orchestration combinators.
//!
//! Thin callers over the [`crate::exec`] session: each one normalizes its
//! input, picks the per-entry invocation function, delegates concurrency
//! control and ordering to the executor, and shapes the return value.
//!
//! - [`parallel_limit`]: run every entry with at most N in flight, keep
//!   results in the input's shape
//! - [`parallel`]: the unbounded form
//! - [`each`]: visit every entry with an iterator, discard results
//!
//! All three are also available instance-style on a promise whose fulfilled
//! value is itself a task collection: the receiver is awaited first, then the
//! static form runs on the fulfilled value. A receiver rejection passes
//! through unchanged.

mod each;
mod parallel;

pub use each::each;
pub use parallel::{parallel, parallel_limit};

use crate::exec::Limit;
use crate::promise::{Promise, Resolution};
use crate::task::{IntoTaskList, Outcome, TaskKey};

impl<L> Promise<L>
where
    L: IntoTaskList + Clone + 'static,
{
    /// Awaits the receiver, then runs [`parallel_limit`] on its value.
    pub fn parallel_limit(&self, limit: impl Into<Limit>) -> Promise<Outcome<L::Value, L::Key>> {
        let limit = limit.into();
        self.then(move |input| parallel_limit(input, limit))
    }

    /// Awaits the receiver, then runs [`parallel`] on its value.
    pub fn parallel(&self) -> Promise<Outcome<L::Value, L::Key>> {
        self.parallel_limit(Limit::Unbounded)
    }

    /// Awaits the receiver, then runs [`each`] on its value.
    pub fn each<U, R, F>(&self, iterator: F) -> Promise<()>
    where
        U: Clone + 'static,
        R: Into<Resolution<U>>,
        F: Fn(L::Value, &TaskKey<L::Key>) -> R + 'static,
    {
        self.then(move |input| each(input, iterator))
    }
}
