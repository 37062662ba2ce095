//! The bounded-concurrency execution session.
//!
//! [`run`] drives a normalized [`TaskList`] with at most `limit` entries in
//! flight. Dispatch is strictly input-ordered: entries start lowest-position
//! first until the limit is saturated, and every successful completion starts
//! exactly one more not-yet-started entry. Results are written into the slot
//! of their originating entry, so the final [`Outcome`] mirrors the input's
//! order no matter when each entry completed.
//!
//! # Fail-fast
//!
//! The first rejection — first in wall-clock completion order, not input
//! order — settles the session. The session latch is one-way: no further
//! entries start, and entries already in flight run to completion but their
//! outcomes are discarded. In-flight work is **not cancelled, only ignored**;
//! task authors remain responsible for their own cleanup.
//!
//! # Plain values
//!
//! An entry whose source is a plain value is already complete. It fills its
//! slot in place without ever counting against the concurrency limit.

use std::cell::RefCell;
use std::rc::Rc;

use crate::promise::{Promise, Resolution, Settle};
use crate::task::{Outcome, Shape, TaskKey, TaskList, TaskSource};

/// Concurrency cap for one execution session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    /// No cap: every entry may be in flight at once.
    Unbounded,
    /// At most this many entries in flight (minimum 1).
    At(usize),
}

impl From<usize> for Limit {
    /// Zero means unbounded, matching "non-positive defaults to unbounded".
    fn from(n: usize) -> Self {
        if n == 0 {
            Self::Unbounded
        } else {
            Self::At(n)
        }
    }
}

impl From<Option<usize>> for Limit {
    fn from(n: Option<usize>) -> Self {
        n.map_or(Self::Unbounded, Self::from)
    }
}

impl Limit {
    fn cap(self, entry_count: usize) -> usize {
        match self {
            Self::Unbounded => entry_count,
            Self::At(n) => n.max(1),
        }
    }
}

/// What invoking one entry produced.
pub enum Invoked<U> {
    /// Completed in place; occupies its slot without concurrency pressure.
    Ready(U),
    /// In flight; counts against the limit until it settles.
    Pending(Promise<U>),
}

impl<U: Clone + 'static> From<Resolution<U>> for Invoked<U> {
    fn from(resolution: Resolution<U>) -> Self {
        match resolution {
            Resolution::Value(value) => Self::Ready(value),
            other => Self::Pending(Promise::of(other)),
        }
    }
}

type Invoke<T, U, K> = Box<dyn FnMut(TaskSource<T>, &TaskKey<K>) -> Invoked<U> + 'static>;

struct SessionState<T, U, K> {
    /// Not-yet-dispatched sources; `None` once consumed.
    sources: Vec<Option<TaskSource<T>>>,
    /// Every entry's key, in input order.
    keys: Vec<TaskKey<K>>,
    /// Results, written at the originating entry's position.
    slots: Vec<Option<U>>,
    shape: Shape,
    cursor: usize,
    in_flight: usize,
    remaining: usize,
    /// One-way latch: set on full completion or first failure.
    settled: bool,
    invoke: Invoke<T, U, K>,
}

struct Session<T, U, K> {
    state: RefCell<SessionState<T, U, K>>,
    settle: Settle<Outcome<U, K>>,
    limit: usize,
}

/// Runs a normalized task list with bounded concurrency.
///
/// `invoke` is called once per entry, in input order, at dispatch time.
/// The returned promise fulfills with the shape-matched [`Outcome`] once
/// every entry completes, or rejects with the first rejection reason.
/// Zero entries fulfill immediately and `invoke` is never called.
pub fn run<T, U, K, F>(list: TaskList<T, K>, limit: Limit, invoke: F) -> Promise<Outcome<U, K>>
where
    T: Clone + 'static,
    U: Clone + 'static,
    K: Clone + 'static,
    F: FnMut(TaskSource<T>, &TaskKey<K>) -> Invoked<U> + 'static,
{
    let (shape, entries) = list.into_parts();
    let count = entries.len();
    let (promise, settle) = Promise::deferred();

    if count == 0 {
        settle.fulfill(Outcome::empty(shape));
        return promise;
    }

    let mut sources = Vec::with_capacity(count);
    let mut keys = Vec::with_capacity(count);
    for entry in entries {
        let (key, source) = entry.into_parts();
        keys.push(key);
        sources.push(Some(source));
    }

    let cap = limit.cap(count);
    tracing::debug!(entries = count, limit = cap, shape = ?shape, "execution session started");

    let session = Rc::new(Session {
        state: RefCell::new(SessionState {
            sources,
            keys,
            slots: (0..count).map(|_| None).collect(),
            shape,
            cursor: 0,
            in_flight: 0,
            remaining: count,
            settled: false,
            invoke: Box::new(invoke),
        }),
        settle,
        limit: cap,
    });
    pump(&session);
    promise
}

/// Starts entries in input order until the limit saturates, the entries run
/// out, or the session settles.
fn pump<T, U, K>(session: &Rc<Session<T, U, K>>)
where
    T: Clone + 'static,
    U: Clone + 'static,
    K: Clone + 'static,
{
    loop {
        let dispatch = {
            let mut st = session.state.borrow_mut();
            if st.settled || st.in_flight >= session.limit || st.cursor >= st.sources.len() {
                None
            } else {
                let index = st.cursor;
                st.cursor += 1;
                let source = st.sources[index].take();
                debug_assert!(source.is_some(), "entry dispatched twice");
                source.map(|s| (index, s, st.keys[index].clone()))
            }
        };
        let Some((index, source, key)) = dispatch else {
            return;
        };

        let invoked = {
            let mut st = session.state.borrow_mut();
            (st.invoke)(source, &key)
        };
        match invoked {
            Invoked::Ready(value) => complete_ready(session, index, value),
            Invoked::Pending(pending) => {
                session.state.borrow_mut().in_flight += 1;
                let sess = Rc::clone(session);
                pending.subscribe(move |outcome| on_settled(&sess, index, outcome));
            }
        }
    }
}

/// A plain value completed at dispatch time: fill the slot, no concurrency
/// accounting.
fn complete_ready<T, U, K>(session: &Rc<Session<T, U, K>>, index: usize, value: U)
where
    U: Clone + 'static,
    K: Clone + 'static,
{
    let done = {
        let mut st = session.state.borrow_mut();
        if st.settled {
            return;
        }
        st.slots[index] = Some(value);
        st.remaining -= 1;
        if st.remaining == 0 {
            st.settled = true;
            true
        } else {
            false
        }
    };
    if done {
        finish(session);
    }
}

enum Next {
    Finish,
    Dispatch,
    Fail(crate::error::Reason),
    Discard,
}

/// Completion handler for an in-flight entry.
fn on_settled<T, U, K>(
    session: &Rc<Session<T, U, K>>,
    index: usize,
    outcome: Result<U, crate::error::Reason>,
) where
    T: Clone + 'static,
    U: Clone + 'static,
    K: Clone + 'static,
{
    let next = {
        let mut st = session.state.borrow_mut();
        if st.settled {
            // Session already over: this entry's outcome is discarded.
            Next::Discard
        } else {
            st.in_flight -= 1;
            match outcome {
                Ok(value) => {
                    st.slots[index] = Some(value);
                    st.remaining -= 1;
                    if st.remaining == 0 {
                        st.settled = true;
                        Next::Finish
                    } else {
                        Next::Dispatch
                    }
                }
                Err(reason) => {
                    st.settled = true;
                    Next::Fail(reason)
                }
            }
        }
    };
    match next {
        Next::Finish => finish(session),
        Next::Dispatch => pump(session),
        Next::Fail(reason) => {
            tracing::debug!(entry = index, "execution session failed fast");
            session.settle.reject(reason);
        }
        Next::Discard => {
            tracing::trace!(entry = index, "late completion discarded");
        }
    }
}

/// Assembles the shape-matched outcome and fulfills the session promise.
fn finish<T, U, K>(session: &Rc<Session<T, U, K>>)
where
    U: Clone + 'static,
    K: Clone + 'static,
{
    let (shape, keys, slots) = {
        let mut st = session.state.borrow_mut();
        (
            st.shape,
            std::mem::take(&mut st.keys),
            std::mem::take(&mut st.slots),
        )
    };
    debug_assert!(slots.iter().all(Option::is_some), "unfilled result slot");
    let outcome = match shape {
        Shape::Sequence | Shape::SetLike => Outcome::Sequence(slots.into_iter().flatten().collect()),
        Shape::Mapping | Shape::MapLike => {
            let pairs = keys
                .into_iter()
                .zip(slots)
                .filter_map(|(key, slot)| match (key, slot) {
                    (TaskKey::Key(key), Some(value)) => Some((key, value)),
                    _ => None,
                })
                .collect();
            if matches!(shape, Shape::Mapping) {
                Outcome::Mapping(pairs)
            } else {
                Outcome::MapLike(pairs)
            }
        }
    };
    tracing::debug!("execution session completed");
    session.settle.fulfill(outcome);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Reason;
    use crate::schedule::run_until_idle;
    use crate::task::IntoTaskList;
    use std::cell::RefCell;

    fn pass_through<T: Clone + 'static>(
        source: TaskSource<T>,
        _key: &TaskKey<String>,
    ) -> Invoked<T> {
        match source {
            TaskSource::Value(v) => Invoked::Ready(v),
            TaskSource::Thunk(f) => Invoked::from((*f)()),
            TaskSource::Deferred(p) => Invoked::Pending(p),
        }
    }

    #[test]
    fn zero_entries_fulfill_immediately_without_invoking() {
        let list: TaskList<i32> = TaskList::sequence(Vec::new());
        let p = run(list, Limit::Unbounded, |_, _| -> Invoked<i32> {
            panic!("invoke must not be called for an empty session")
        });
        assert_eq!(p.wait().unwrap(), Outcome::Sequence(Vec::new()));
    }

    #[test]
    fn results_land_in_input_order_regardless_of_completion_order() {
        let (pa, sa) = Promise::deferred();
        let (pb, sb) = Promise::deferred();
        let (pc, sc) = Promise::deferred();
        let list = vec![pa, pb, pc].into_task_list();
        let out = run(list, Limit::Unbounded, pass_through);
        // Complete in reverse order.
        sc.fulfill("c");
        sb.fulfill("b");
        sa.fulfill("a");
        assert_eq!(
            out.wait().unwrap(),
            Outcome::Sequence(vec!["a", "b", "c"])
        );
    }

    #[test]
    fn limit_one_dispatches_strictly_in_input_order() {
        let started = Rc::new(RefCell::new(Vec::new()));
        let log = started.clone();
        let list: TaskList<i32> = TaskList::sequence(
            (0..3)
                .map(|i| {
                    let log = log.clone();
                    TaskSource::thunk(move || {
                        log.borrow_mut().push(i);
                        Resolution::Value(i)
                    })
                })
                .collect::<Vec<_>>(),
        );
        let out = run(list, Limit::At(1), pass_through);
        assert_eq!(
            out.wait().unwrap(),
            Outcome::Sequence(vec![0, 1, 2])
        );
        assert_eq!(*started.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn limit_saturates_and_refills_one_per_completion() {
        let (pa, sa) = Promise::deferred();
        let (pb, sb) = Promise::deferred();
        let (pc, sc) = Promise::deferred();
        let list = vec![pa, pb, pc].into_task_list();

        let session_probe = Rc::new(RefCell::new(Vec::new()));
        let probe = session_probe.clone();
        let out = run(list, Limit::At(2), move |source, key| {
            probe.borrow_mut().push(key.clone());
            pass_through(source, key)
        });

        run_until_idle();
        // Only the first two entries started; the third waits for a slot.
        assert_eq!(
            *session_probe.borrow(),
            vec![TaskKey::Index(0), TaskKey::Index(1)]
        );

        sb.fulfill(2);
        run_until_idle();
        assert_eq!(session_probe.borrow().len(), 3); // entry 2 started

        sa.fulfill(1);
        sc.fulfill(3);
        assert_eq!(
            out.wait().unwrap(),
            Outcome::Sequence(vec![1, 2, 3])
        );
    }

    #[test]
    fn plain_values_contribute_no_concurrency_pressure() {
        let (pending, settle) = Promise::deferred();
        let list: TaskList<i32> = TaskList::sequence(vec![
            TaskSource::from(pending),
            TaskSource::value(20),
            TaskSource::value(30),
        ]);
        // Limit 1: the deferred entry holds the only slot; once it settles,
        // the plain values complete in place without re-occupying it.
        let out = run(list, Limit::At(1), pass_through);
        run_until_idle();
        assert_eq!(out.state(), crate::promise::State::Pending);
        settle.fulfill(10);
        assert_eq!(
            out.wait().unwrap(),
            Outcome::Sequence(vec![10, 20, 30])
        );
    }

    #[test]
    fn first_failure_wins_and_later_outcomes_are_discarded() {
        let (pa, sa) = Promise::deferred();
        let (pb, sb) = Promise::deferred();
        let (pc, sc) = Promise::deferred();
        let list = vec![pa, pb, pc].into_task_list();
        let out = run(list, Limit::Unbounded, pass_through);

        sb.reject(Reason::msg("entry 2 failed"));
        run_until_idle();
        assert_eq!(out.state(), crate::promise::State::Rejected);

        // Entries 1 and 3 settle afterwards; both outcomes are ignored.
        sa.fulfill(1);
        sc.reject(Reason::msg("entry 3 failed, too late"));
        let err = out.wait().unwrap_err();
        assert_eq!(err.to_string(), "entry 2 failed");
    }

    #[test]
    fn no_new_entries_start_after_failure() {
        let (pa, sa) = Promise::deferred();
        let started = Rc::new(RefCell::new(0));
        let counter = started.clone();
        let list: TaskList<i32> = TaskList::sequence(vec![
            TaskSource::from(pa),
            TaskSource::thunk(move || {
                *counter.borrow_mut() += 1;
                Resolution::Value(2)
            }),
        ]);
        let out = run(list, Limit::At(1), pass_through);
        sa.reject(Reason::msg("first entry failed"));
        let err = out.wait().unwrap_err();
        assert_eq!(err.to_string(), "first entry failed");
        assert_eq!(*started.borrow(), 0); // second thunk never invoked
    }

    #[test]
    fn unbounded_equals_limit_of_entry_count() {
        for limit in [Limit::Unbounded, Limit::At(3), Limit::At(100)] {
            let (pa, sa) = Promise::deferred();
            let (pb, sb) = Promise::deferred();
            let (pc, sc) = Promise::deferred();
            let list = vec![pa, pb, pc].into_task_list();
            let out = run(list, limit, pass_through);
            sc.fulfill(3);
            sa.fulfill(1);
            sb.fulfill(2);
            assert_eq!(
                out.wait().unwrap(),
                Outcome::Sequence(vec![1, 2, 3])
            );
        }
    }
}
