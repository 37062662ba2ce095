//! The deferred-value state machine.
//!
//! A [`Promise`] holds a value that will exist later. Its lifecycle is
//! `Pending -> Fulfilled | Rejected`, one-way and terminal: the first
//! settlement wins and every later attempt is a no-op. Continuations
//! registered with [`Promise::then`] and friends are delivered through the
//! [`crate::schedule`] queue — never synchronously inside the registering
//! call — in registration order, exactly once each.
//!
//! # Resolution and adoption
//!
//! Resolving a promise does not always fulfill it. A [`Resolution`] may carry
//! a plain value, a rejection, another promise, or a foreign [`Thenable`];
//! the latter two are *adopted*: the promise takes on their eventual outcome
//! instead of fulfilling with the object itself. Adoption is queue-mediated,
//! so arbitrarily deep chains resolve with constant stack per link, and a
//! promise that would adopt itself rejects with [`CycleError`].
//!
//! # Semantics
//!
//! `promise.then(f)`:
//! 1. Returns a new pending promise immediately
//! 2. After the receiver fulfills, runs `f` on a later scheduling turn
//! 3. Resolves the returned promise with `f`'s resolution (adopting promises
//!    and thenables), or passes a rejection through unchanged when the
//!    receiver rejects
//!
//! A rejected promise that never gains a subscriber is surfaced through the
//! [`crate::report`] sink on a later turn.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use smallvec::SmallVec;

use crate::error::{CycleError, Reason, StallError};
use crate::{report, schedule};

mod resolution;

pub use resolution::{Resolution, Thenable};

/// Observable lifecycle state of a [`Promise`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Not yet settled.
    Pending,
    /// Settled with a value.
    Fulfilled,
    /// Settled with a rejection reason.
    Rejected,
}

type Reaction<T> = Box<dyn FnOnce(Result<T, Reason>) + 'static>;

enum StateCell<T> {
    Pending,
    Fulfilled(T),
    Rejected(Reason),
}

struct Core<T> {
    state: StateCell<T>,
    /// Continuations registered while pending, in registration order.
    reactions: SmallVec<[Reaction<T>; 1]>,
    /// Whether any subscriber ever observed this promise.
    handled: bool,
}

type CoreRef<T> = Rc<RefCell<Core<T>>>;

/// A deferred value: fulfilled with a `T` or rejected with a [`Reason`].
pub struct Promise<T> {
    core: CoreRef<T>,
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            core: Rc::clone(&self.core),
        }
    }
}

impl<T> fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.core.borrow().state {
            StateCell::Pending => "pending",
            StateCell::Fulfilled(_) => "fulfilled",
            StateCell::Rejected(_) => "rejected",
        };
        write!(f, "Promise({state})")
    }
}

impl<T: Clone + 'static> Promise<T> {
    fn pending() -> Self {
        Self {
            core: Rc::new(RefCell::new(Core {
                state: StateCell::Pending,
                reactions: SmallVec::new(),
                handled: false,
            })),
        }
    }

    /// Creates a promise and the [`Settle`] capability that resolves it.
    ///
    /// The deferred form of [`Promise::new`], for when settlement happens far
    /// from construction.
    #[must_use]
    pub fn deferred() -> (Self, Settle<T>) {
        let promise = Self::pending();
        let settle = Settle {
            core: Rc::clone(&promise.core),
            used: Rc::new(Cell::new(false)),
        };
        (promise, settle)
    }

    /// Creates a promise from an executor invoked synchronously with the
    /// settlement capability.
    ///
    /// A synchronous `Err` return rejects the promise, unless the executor
    /// already resolved it (first settlement wins).
    pub fn new(executor: impl FnOnce(Settle<T>) -> Result<(), Reason>) -> Self {
        let (promise, settle) = Self::deferred();
        if let Err(reason) = executor(settle.clone()) {
            settle.reject(reason);
        }
        promise
    }

    /// Creates a settled or adopting promise from any resolution input.
    ///
    /// A plain value fulfills immediately; a promise or thenable is adopted.
    pub fn of(resolution: impl Into<Resolution<T>>) -> Self {
        let promise = Self::pending();
        resolve_into(promise.core.clone(), resolution.into());
        promise
    }

    /// Creates an already-fulfilled promise.
    pub fn fulfilled(value: T) -> Self {
        Self::of(Resolution::Value(value))
    }

    /// Creates an already-rejected promise.
    pub fn rejected(reason: impl Into<Reason>) -> Self {
        Self::of(Resolution::Error(reason.into()))
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> State {
        match self.core.borrow().state {
            StateCell::Pending => State::Pending,
            StateCell::Fulfilled(_) => State::Fulfilled,
            StateCell::Rejected(_) => State::Rejected,
        }
    }

    /// The settled outcome, if any. Does not drive the scheduler.
    #[must_use]
    pub fn outcome(&self) -> Option<Result<T, Reason>> {
        match &self.core.borrow().state {
            StateCell::Pending => None,
            StateCell::Fulfilled(value) => Some(Ok(value.clone())),
            StateCell::Rejected(reason) => Some(Err(reason.clone())),
        }
    }

    /// Drives the scheduler to quiescence and returns the outcome.
    ///
    /// If the scheduler runs out of work while this promise is still pending
    /// — a `Settle` handle dropped unfired, usually — the result is
    /// [`StallError`].
    pub fn wait(&self) -> Result<T, Reason> {
        schedule::run_until_idle();
        match self.outcome() {
            Some(outcome) => outcome,
            None => Err(Reason::new(StallError)),
        }
    }

    /// Registers a continuation for the fulfilled branch.
    ///
    /// Returns a new promise resolved with the handler's resolution: a value
    /// fulfills it, a returned promise or thenable is adopted, an error
    /// rejects it. If the receiver rejects, the handler never runs and the
    /// rejection passes through unchanged.
    pub fn then<U, R, F>(&self, on_fulfilled: F) -> Promise<U>
    where
        U: Clone + 'static,
        R: Into<Resolution<U>>,
        F: FnOnce(T) -> R + 'static,
    {
        let next = Promise::pending();
        let target = next.core.clone();
        self.subscribe(move |outcome| match outcome {
            Ok(value) => resolve_into(target, on_fulfilled(value).into()),
            Err(reason) => settle_outcome(&target, Err(reason)),
        });
        next
    }

    /// Registers a continuation for the rejected branch.
    ///
    /// The handler's resolution becomes the returned promise's outcome,
    /// which is how a chain recovers from rejection. If the receiver
    /// fulfills, the value passes through unchanged.
    pub fn catch<R, F>(&self, on_rejected: F) -> Promise<T>
    where
        R: Into<Resolution<T>>,
        F: FnOnce(Reason) -> R + 'static,
    {
        let next = Promise::pending();
        let target = next.core.clone();
        self.subscribe(move |outcome| match outcome {
            Ok(value) => settle_outcome(&target, Ok(value)),
            Err(reason) => resolve_into(target, on_rejected(reason).into()),
        });
        next
    }

    /// Registers continuations for both branches at once.
    pub fn then_catch<U, RO, RE, FO, FE>(&self, on_fulfilled: FO, on_rejected: FE) -> Promise<U>
    where
        U: Clone + 'static,
        RO: Into<Resolution<U>>,
        RE: Into<Resolution<U>>,
        FO: FnOnce(T) -> RO + 'static,
        FE: FnOnce(Reason) -> RE + 'static,
    {
        let next = Promise::pending();
        let target = next.core.clone();
        self.subscribe(move |outcome| match outcome {
            Ok(value) => resolve_into(target, on_fulfilled(value).into()),
            Err(reason) => resolve_into(target, on_rejected(reason).into()),
        });
        next
    }

    /// Maps the fulfilled value. Sugar over [`Promise::then`].
    pub fn map<U, F>(&self, f: F) -> Promise<U>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> U + 'static,
    {
        self.then(move |value| Resolution::Value(f(value)))
    }

    /// Registers a raw settlement observer.
    ///
    /// Delivery is deferred to a later scheduling turn even when the promise
    /// is already settled. Marks the promise as handled for
    /// unhandled-rejection accounting.
    pub(crate) fn subscribe(&self, reaction: impl FnOnce(Result<T, Reason>) + 'static) {
        let mut core = self.core.borrow_mut();
        core.handled = true;
        match &core.state {
            StateCell::Pending => core.reactions.push(Box::new(reaction)),
            StateCell::Fulfilled(value) => {
                let value = value.clone();
                drop(core);
                schedule::enqueue(move || reaction(Ok(value)));
            }
            StateCell::Rejected(reason) => {
                let reason = reason.clone();
                drop(core);
                schedule::enqueue(move || reaction(Err(reason)));
            }
        }
    }
}

/// The settlement capability for one promise.
///
/// Handed to [`Promise::new`] executors and to [`Thenable`] implementations.
/// Each handle family resolves at most once: after the first
/// [`Settle::resolve`] (or sugar) call, later calls through any clone are
/// no-ops, even while an adopted promise or thenable is still pending.
///
/// A `Settle` keeps its promise alive: dropping every [`Promise`] handle
/// while a settle handle is still pending (inside a timer closure, say) must
/// not free the core out from under the eventual settlement.
pub struct Settle<T> {
    core: CoreRef<T>,
    used: Rc<Cell<bool>>,
}

impl<T> Clone for Settle<T> {
    fn clone(&self) -> Self {
        Self {
            core: Rc::clone(&self.core),
            used: Rc::clone(&self.used),
        }
    }
}

impl<T> fmt::Debug for Settle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Settle(used: {})", self.used.get())
    }
}

impl<T: Clone + 'static> Settle<T> {
    /// Resolves the promise with any resolution input.
    ///
    /// A promise or thenable input is adopted; this handle is spent either
    /// way.
    pub fn resolve(&self, resolution: impl Into<Resolution<T>>) {
        if self.used.replace(true) {
            return;
        }
        resolve_into(Rc::clone(&self.core), resolution.into());
    }

    /// Fulfills with a plain value.
    pub fn fulfill(&self, value: T) {
        self.resolve(Resolution::Value(value));
    }

    /// Rejects with a reason.
    pub fn reject(&self, reason: impl Into<Reason>) {
        self.resolve(Resolution::Error(reason.into()));
    }
}

/// Applies a resolution to a promise core: the recursive-unwrapping step.
///
/// Values and errors settle immediately. A chained promise is subscribed and
/// its outcome forwarded; a foreign thenable is given a fresh [`Settle`] on a
/// later turn, so foreign code never runs inline. Both paths feed back into
/// this function only through the scheduler queue, which is what bounds stack
/// growth to O(1) per adoption link.
fn resolve_into<T: Clone + 'static>(core: CoreRef<T>, resolution: Resolution<T>) {
    match resolution {
        Resolution::Value(value) => settle_outcome(&core, Ok(value)),
        Resolution::Error(reason) => settle_outcome(&core, Err(reason)),
        Resolution::Chain(promise) => {
            if Rc::ptr_eq(&core, &promise.core) {
                settle_outcome(&core, Err(Reason::new(CycleError)));
                return;
            }
            let target = core;
            promise.subscribe(move |outcome| settle_outcome(&target, outcome));
        }
        Resolution::Thenable(thenable) => {
            // The settle handle keeps the core alive until the thenable runs.
            let settle = Settle {
                core,
                used: Rc::new(Cell::new(false)),
            };
            schedule::enqueue(move || thenable.then_into(settle));
        }
    }
}

/// Settles a promise core with a final outcome. Idempotent.
///
/// Reactions drain in registration order onto the scheduler queue. A
/// rejection that has never been observed schedules an unhandled-rejection
/// check for a later turn.
fn settle_outcome<T: Clone + 'static>(core: &CoreRef<T>, outcome: Result<T, Reason>) {
    let reactions = {
        let mut inner = core.borrow_mut();
        if !matches!(inner.state, StateCell::Pending) {
            return;
        }
        inner.state = match &outcome {
            Ok(value) => StateCell::Fulfilled(value.clone()),
            Err(reason) => StateCell::Rejected(reason.clone()),
        };
        std::mem::take(&mut inner.reactions)
    };

    for reaction in reactions {
        let delivered = outcome.clone();
        schedule::enqueue(move || reaction(delivered));
    }

    if let Err(reason) = outcome {
        let weak = Rc::downgrade(core);
        if !core.borrow().handled {
            schedule::enqueue(move || {
                // Handled in the meantime, or still unobserved? A dropped
                // core counts as unobserved: nobody can subscribe anymore.
                let handled = weak.upgrade().is_some_and(|c| c.borrow().handled);
                if !handled {
                    report::unhandled(&reason);
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::run_until_idle;
    use std::cell::RefCell;

    fn log() -> Rc<RefCell<Vec<&'static str>>> {
        Rc::new(RefCell::new(Vec::new()))
    }

    #[test]
    fn fulfilled_promise_delivers_value() {
        let p = Promise::fulfilled(7);
        assert_eq!(p.state(), State::Fulfilled);
        assert_eq!(p.wait().unwrap(), 7);
    }

    #[test]
    fn settlement_is_idempotent() {
        let (p, settle) = Promise::deferred();
        settle.fulfill(1);
        settle.fulfill(2);
        settle.reject(Reason::msg("late"));
        assert_eq!(p.wait().unwrap(), 1);
    }

    #[test]
    fn reject_after_resolve_latch_is_ignored_even_while_adoption_pends() {
        let (inner, inner_settle) = Promise::deferred();
        let (p, settle) = Promise::deferred();
        settle.resolve(Resolution::Chain(inner.clone()));
        settle.reject(Reason::msg("should lose")); // latch already spent
        inner_settle.fulfill("won");
        assert_eq!(p.wait().unwrap(), "won");
    }

    #[test]
    fn continuations_are_deferred_not_synchronous() {
        let order = log();
        let p = Promise::fulfilled(());
        let o = order.clone();
        let _next = p.map(move |()| o.borrow_mut().push("handler"));
        order.borrow_mut().push("after-then");
        run_until_idle();
        assert_eq!(*order.borrow(), vec!["after-then", "handler"]);
    }

    #[test]
    fn continuations_run_in_registration_order() {
        let order = log();
        let (p, settle) = Promise::deferred();
        for name in ["a", "b", "c"] {
            let o = order.clone();
            let _ = p.map(move |()| o.borrow_mut().push(name));
        }
        settle.fulfill(());
        run_until_idle();
        assert_eq!(*order.borrow(), vec!["a", "b", "c"]);
    }

    #[test]
    fn executor_error_rejects() {
        let p: Promise<i32> = Promise::new(|_settle| Err(Reason::msg("sync failure")));
        assert_eq!(p.wait().unwrap_err().to_string(), "sync failure");
    }

    #[test]
    fn executor_settlement_beats_its_own_error_return() {
        let p = Promise::new(|settle| {
            settle.fulfill(5);
            Err(Reason::msg("ignored"))
        });
        assert_eq!(p.wait().unwrap(), 5);
    }

    #[test]
    fn then_chains_and_adopts_returned_promise() {
        let p = Promise::fulfilled(2)
            .then(|n| Promise::fulfilled(n * 10))
            .map(|n| n + 1);
        assert_eq!(p.wait().unwrap(), 21);
    }

    #[test]
    fn rejection_passes_through_missing_handlers() {
        let p = Promise::<i32>::rejected(Reason::msg("root"))
            .map(|n| n + 1)
            .map(|n| n + 1);
        assert_eq!(p.wait().unwrap_err().to_string(), "root");
    }

    #[test]
    fn catch_recovers_and_value_passes_through_catch() {
        let recovered = Promise::<i32>::rejected(Reason::msg("x")).catch(|_| Resolution::Value(9));
        assert_eq!(recovered.wait().unwrap(), 9);

        let untouched = Promise::fulfilled(3).catch(|_| Resolution::Value(0));
        assert_eq!(untouched.wait().unwrap(), 3);
    }

    #[test]
    fn then_catch_routes_both_branches() {
        let ok = Promise::fulfilled(1).then_catch(
            |n| Resolution::Value(n + 1),
            |_| Resolution::Value(-1),
        );
        let err = Promise::<i32>::rejected(Reason::msg("e")).then_catch(
            |n| Resolution::Value(n + 1),
            |_| Resolution::Value(-1),
        );
        assert_eq!(ok.wait().unwrap(), 2);
        assert_eq!(err.wait().unwrap(), -1);
    }

    #[test]
    fn handler_error_rejects_downstream() {
        let p = Promise::fulfilled(1).then(|_| Resolution::<i32>::error(Reason::msg("boom")));
        assert_eq!(p.wait().unwrap_err().to_string(), "boom");
    }

    #[test]
    fn of_adopts_a_promise_instead_of_nesting() {
        let inner = Promise::fulfilled("deep");
        let outer = Promise::of(inner);
        assert_eq!(outer.wait().unwrap(), "deep");
    }

    #[test]
    fn self_adoption_rejects_with_cycle_error() {
        let (p, settle) = Promise::<i32>::deferred();
        settle.resolve(Resolution::Chain(p.clone()));
        let err = p.wait().unwrap_err();
        assert!(err.downcast_ref::<CycleError>().is_some());
    }

    #[test]
    fn foreign_thenable_is_adopted() {
        struct Immediate(i32);
        impl Thenable<i32> for Immediate {
            fn then_into(self: Box<Self>, settle: Settle<i32>) {
                settle.fulfill(self.0);
            }
        }
        let p = Promise::of(Resolution::thenable(Immediate(42)));
        assert_eq!(p.wait().unwrap(), 42);
    }

    #[test]
    fn thenable_chain_ending_in_self_rejects_with_cycle_error() {
        struct Indirect(Promise<i32>);
        impl Thenable<i32> for Indirect {
            fn then_into(self: Box<Self>, settle: Settle<i32>) {
                settle.resolve(Resolution::Chain(self.0));
            }
        }
        let (p, settle) = Promise::<i32>::deferred();
        settle.resolve(Resolution::thenable(Indirect(p.clone())));
        let err = p.wait().unwrap_err();
        assert!(err.downcast_ref::<CycleError>().is_some());
    }

    #[test]
    fn settle_keeps_the_promise_alive_until_it_fires() {
        let (p, settle) = Promise::deferred();
        let next = p.map(|n: i32| n + 1);
        // Subscribers hold no strong handle to the receiver; the pending
        // settle alone must keep it alive.
        drop(p);
        settle.fulfill(1);
        assert_eq!(next.wait().unwrap(), 2);
    }

    #[test]
    fn timer_held_settle_outlives_every_promise_handle() {
        crate::schedule::reset();
        let delayed = crate::time::delay(3, 7);
        let next = delayed.map(|n| n * 2);
        drop(delayed);
        assert_eq!(next.wait().unwrap(), 14);
    }

    #[test]
    fn dropped_settle_stalls_instead_of_hanging() {
        let (p, settle) = Promise::<i32>::deferred();
        drop(settle);
        let err = p.wait().unwrap_err();
        assert!(err.downcast_ref::<StallError>().is_some());
    }

    #[test]
    fn unhandled_rejection_reaches_the_sink() {
        crate::schedule::reset();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        crate::report::set_rejection_sink(move |r| sink.borrow_mut().push(r.to_string()));

        let _orphan = Promise::<i32>::rejected(Reason::msg("nobody listens"));
        run_until_idle();
        assert_eq!(*seen.borrow(), vec!["nobody listens".to_string()]);

        crate::report::take_rejection_sink();
    }

    #[test]
    fn handled_rejection_is_not_reported() {
        crate::schedule::reset();
        let seen = Rc::new(RefCell::new(0));
        let sink = seen.clone();
        crate::report::set_rejection_sink(move |_| *sink.borrow_mut() += 1);

        let p = Promise::<i32>::rejected(Reason::msg("caught"));
        let _ = p.catch(|_| Resolution::Value(0));
        run_until_idle();
        assert_eq!(*seen.borrow(), 0);

        crate::report::take_rejection_sink();
    }

    #[test]
    fn long_chains_resolve_with_bounded_stack() {
        let mut p = Promise::fulfilled(0u32);
        for _ in 0..10_000 {
            p = p.map(|n| n + 1);
        }
        assert_eq!(p.wait().unwrap(), 10_000);
    }
}
