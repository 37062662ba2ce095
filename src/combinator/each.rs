//! `each`: visit every entry, discard results.

use std::rc::Rc;

use crate::exec::{self, Invoked, Limit};
use crate::promise::{Promise, Resolution};
use crate::task::{IntoTaskList, TaskKey, TaskSource};

/// Invokes `iterator(value, key)` for every entry with unlimited concurrency.
///
/// Promise sources are awaited and thunk sources invoked before the iterator
/// sees their value. Per-entry results are discarded; the returned promise
/// resolves to `()` once every visit completes, or rejects with the first
/// iterator failure.
pub fn each<L, U, R, F>(input: L, iterator: F) -> Promise<()>
where
    L: IntoTaskList,
    U: Clone + 'static,
    R: Into<Resolution<U>>,
    F: Fn(L::Value, &TaskKey<L::Key>) -> R + 'static,
{
    let iterator: Rc<F> = Rc::new(iterator);
    let visited = exec::run(input.into_task_list(), Limit::Unbounded, move |source, key| {
        let it = Rc::clone(&iterator);
        match source {
            TaskSource::Value(value) => Invoked::from((*it)(value, key).into()),
            TaskSource::Thunk(thunk) => match (*thunk)() {
                Resolution::Value(value) => Invoked::from((*it)(value, key).into()),
                other => visit_later(Promise::of(other), it, key.clone()),
            },
            TaskSource::Deferred(promise) => visit_later(promise, it, key.clone()),
        }
    });
    visited.map(|_| ())
}

/// Applies the iterator once the entry's value exists.
fn visit_later<T, U, K, R, F>(promise: Promise<T>, iterator: Rc<F>, key: TaskKey<K>) -> Invoked<U>
where
    T: Clone + 'static,
    U: Clone + 'static,
    K: Clone + 'static,
    R: Into<Resolution<U>>,
    F: Fn(T, &TaskKey<K>) -> R + 'static,
{
    Invoked::Pending(promise.then(move |value| (*iterator)(value, &key)))
}
