//! Rejection reasons and crate error types.
//!
//! Error handling follows these principles:
//!
//! - Rejection reasons are **opaque**: whatever a task or handler rejected
//!   with is forwarded unchanged through the chain, never re-wrapped.
//! - Crate-defined failures are explicit and typed ([`CycleError`],
//!   [`StallError`]), not stringly-typed.
//! - Recovery happens only through explicit handler registration; absent a
//!   handler, a rejection passes through unchanged to the next link and is
//!   eventually surfaced by the [`crate::report`] sink.

use std::error::Error as StdError;
use std::fmt;
use std::rc::Rc;

/// An opaque, cheaply clonable rejection reason.
///
/// A `Reason` is a refcounted handle to whatever error a task, handler, or
/// executor rejected with. The core never inspects it; combinators forward it
/// unchanged. Consumers that know the concrete type can recover it with
/// [`Reason::downcast_ref`].
#[derive(Clone)]
pub struct Reason(Rc<dyn StdError + 'static>);

impl Reason {
    /// Wraps a concrete error value.
    pub fn new<E: StdError + 'static>(err: E) -> Self {
        Self(Rc::new(err))
    }

    /// Builds a reason from a plain message.
    ///
    /// Convenient for tests and tasks that have nothing more structured to
    /// say. The message is recoverable through `Display`.
    #[must_use]
    pub fn msg(message: impl Into<String>) -> Self {
        Self(Rc::new(MessageError(message.into())))
    }

    /// Attempts to view the underlying error as a concrete type.
    #[must_use]
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.0.downcast_ref()
    }

    /// Returns the underlying error as a trait object.
    #[must_use]
    pub fn as_dyn(&self) -> &(dyn StdError + 'static) {
        &*self.0
    }

    /// Returns `true` if both reasons point at the same underlying error.
    #[must_use]
    pub fn same(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl<E: StdError + 'static> From<E> for Reason {
    fn from(err: E) -> Self {
        Self::new(err)
    }
}

/// A message-only error used by [`Reason::msg`].
#[derive(Debug, Clone, PartialEq, Eq)]
struct MessageError(String);

impl fmt::Display for MessageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl StdError for MessageError {}

/// A promise would adopt itself, directly or through a chain of thenables.
///
/// Adoption of a resolution value must terminate; a promise that waits on its
/// own settlement would deadlock, so the resolution machinery rejects with
/// this error instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("promise resolution cycle: a promise cannot adopt itself")]
pub struct CycleError;

/// The drive loop ran out of work while the awaited promise was still pending.
///
/// Returned by [`crate::promise::Promise::wait`] when the scheduler reaches
/// quiescence (no queued jobs, no pending timers) without the promise
/// settling. This usually means a `Settle` handle was dropped unfired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("scheduler is idle but the promise is still pending")]
pub struct StallError;
