//! Unhandled-rejection reporting.
//!
//! A rejected promise that still has no subscriber when its deferred check
//! job runs is surfaced here, once. The sink is process-wide observable
//! state with explicit registration and explicit teardown, so tests can
//! install a recording sink and reset it between runs instead of relying on
//! an implicit host hook.
//!
//! The default sink logs through `tracing::error!`; the core never logs user
//! data on any other path.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::Reason;

/// A reporting sink for unhandled rejections.
pub type RejectionSink = Rc<dyn Fn(&Reason)>;

thread_local! {
    static SINK: RefCell<Option<RejectionSink>> = const { RefCell::new(None) };
}

/// Installs the rejection sink, replacing any previous one.
///
/// Returns the previously installed sink, if any.
pub fn set_rejection_sink(sink: impl Fn(&Reason) + 'static) -> Option<RejectionSink> {
    SINK.with(|s| s.borrow_mut().replace(Rc::new(sink)))
}

/// Removes the installed sink, restoring the default `tracing` reporter.
///
/// Call between test runs to tear down a recording sink.
pub fn take_rejection_sink() -> Option<RejectionSink> {
    SINK.with(|s| s.borrow_mut().take())
}

/// Delivers an unhandled rejection to the sink.
pub(crate) fn unhandled(reason: &Reason) {
    let sink = SINK.with(|s| s.borrow().clone());
    match sink {
        Some(sink) => sink(reason),
        None => tracing::error!(%reason, "unhandled promise rejection"),
    }
}
