//! Resolution inputs and the thenable adoption boundary.
//!
//! Everything a promise can be resolved with is expressed as a
//! [`Resolution`]. This is the single capability boundary the rest of the
//! crate depends on: no component ever inspects raw values for chainability —
//! a value either arrives as `Resolution::Value` or was explicitly wrapped as
//! a chain or thenable by whoever produced it.

use crate::error::Reason;

use super::{Promise, Settle};

/// Anything that exposes a chaining contract compatible with [`Promise`].
///
/// An adopting promise hands the implementation its [`Settle`] capability on
/// a later scheduling turn; the thenable reports its eventual outcome through
/// it. Resolving with a further promise or thenable chains again, so nested
/// thenables unwrap recursively without growing the stack.
pub trait Thenable<T> {
    /// Subscribes the settlement capability to this value's outcome.
    fn then_into(self: Box<Self>, settle: Settle<T>);
}

impl<T: Clone + 'static> Thenable<T> for Promise<T> {
    fn then_into(self: Box<Self>, settle: Settle<T>) {
        self.subscribe(move |outcome| match outcome {
            Ok(value) => settle.fulfill(value),
            Err(reason) => settle.reject(reason),
        });
    }
}

/// A resolution input: what a promise is resolved *with*.
///
/// Plain values fulfill; errors reject; promises and thenables are adopted —
/// the resolving promise takes on their eventual outcome and never fulfills
/// with the chainable object itself.
pub enum Resolution<T> {
    /// Fulfill with this value.
    Value(T),
    /// Reject with this reason.
    Error(Reason),
    /// Adopt another promise's eventual outcome.
    Chain(Promise<T>),
    /// Adopt a foreign thenable's eventual outcome.
    Thenable(Box<dyn Thenable<T>>),
}

impl<T> Resolution<T> {
    /// Wraps a plain value.
    pub fn value(value: T) -> Self {
        Self::Value(value)
    }

    /// Wraps a rejection reason.
    pub fn error(reason: impl Into<Reason>) -> Self {
        Self::Error(reason.into())
    }

    /// Wraps a foreign thenable for adoption.
    pub fn thenable(thenable: impl Thenable<T> + 'static) -> Self {
        Self::Thenable(Box::new(thenable))
    }
}

impl<T> From<Promise<T>> for Resolution<T> {
    fn from(promise: Promise<T>) -> Self {
        Self::Chain(promise)
    }
}

impl<T> From<Result<T, Reason>> for Resolution<T> {
    fn from(result: Result<T, Reason>) -> Self {
        match result {
            Ok(value) => Self::Value(value),
            Err(reason) => Self::Error(reason),
        }
    }
}
