//! `parallel` / `parallel_limit`: bounded-concurrency collection of results.

use crate::exec::{self, Invoked, Limit};
use crate::promise::Promise;
use crate::task::{IntoTaskList, Outcome, TaskSource};

/// Runs every task with at most `limit` entries in flight.
///
/// Thunk sources are invoked at dispatch time; promise sources are awaited;
/// plain values pass straight into their result slot. The returned promise
/// fulfills with an [`Outcome`] in the input's shape and key order, or
/// rejects with the first failure (remaining in-flight entries are ignored,
/// not cancelled).
pub fn parallel_limit<L>(input: L, limit: impl Into<Limit>) -> Promise<Outcome<L::Value, L::Key>>
where
    L: IntoTaskList,
{
    exec::run(
        input.into_task_list(),
        limit.into(),
        |source, _key| match source {
            TaskSource::Value(value) => Invoked::Ready(value),
            TaskSource::Thunk(thunk) => Invoked::from((*thunk)()),
            TaskSource::Deferred(promise) => Invoked::Pending(promise),
        },
    )
}

/// [`parallel_limit`] with no concurrency cap.
pub fn parallel<L>(input: L) -> Promise<Outcome<L::Value, L::Key>>
where
    L: IntoTaskList,
{
    parallel_limit(input, Limit::Unbounded)
}
