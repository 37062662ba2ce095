//! Task collection normalization.
//!
//! The orchestration engine accepts many input shapes: an ordered sequence,
//! a set, a key-ordered mapping, a map-like pair collection, a nullish
//! `Option`, or an already-built [`TaskList`]. Normalization converts any of
//! them into one uniform, ordered list of `(key, source)` entries plus a
//! [`Shape`] tag that remembers how to rebuild the input's family for the
//! result. All downstream logic operates only on the uniform list.
//!
//! Task sources are **never invoked during normalization** — a thunk runs
//! only when the executor dispatches it, so laziness and side-effect ordering
//! stay caller-controlled.

use std::collections::BTreeSet;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::promise::{Promise, Resolution};

/// Position or key of a task entry within its input collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskKey<K = String> {
    /// Zero-based position in a sequence or set input.
    Index(usize),
    /// Key from a mapping or map-like input.
    Key(K),
}

impl<K: fmt::Display> fmt::Display for TaskKey<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(i) => write!(f, "[{i}]"),
            Self::Key(k) => write!(f, "{k}"),
        }
    }
}

/// The input's shape family, used to rebuild the result collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Shape {
    /// Ordered sequence; results come back as a sequence.
    Sequence,
    /// Set input; iteration order becomes position order, results come back
    /// as a sequence.
    SetLike,
    /// Key-ordered mapping; results come back as key/value pairs in the
    /// input's insertion order.
    Mapping,
    /// Map-like pair collection; results keep the pair-collection form.
    MapLike,
}

/// One unit of not-yet-started work.
///
/// Either a plain value (already complete), a zero-argument thunk producing a
/// [`Resolution`], or an in-flight promise. The executor consumes each entry
/// exactly once; thunks are shared closures so a task collection stays
/// clonable and can itself travel inside a promise.
pub enum TaskSource<T> {
    /// A plain value, treated as already complete.
    Value(T),
    /// A zero-argument invocable, run at dispatch time.
    Thunk(Rc<dyn Fn() -> Resolution<T> + 'static>),
    /// A promise to await.
    Deferred(Promise<T>),
}

impl<T> TaskSource<T> {
    /// Wraps a plain value.
    pub fn value(value: T) -> Self {
        Self::Value(value)
    }

    /// Wraps a zero-argument invocable. It is not called here.
    pub fn thunk<R, F>(f: F) -> Self
    where
        R: Into<Resolution<T>>,
        F: Fn() -> R + 'static,
    {
        Self::Thunk(Rc::new(move || f().into()))
    }
}

impl<T: Clone> Clone for TaskSource<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Value(v) => Self::Value(v.clone()),
            Self::Thunk(f) => Self::Thunk(Rc::clone(f)),
            Self::Deferred(p) => Self::Deferred(p.clone()),
        }
    }
}

impl<T> From<Promise<T>> for TaskSource<T> {
    fn from(promise: Promise<T>) -> Self {
        Self::Deferred(promise)
    }
}

impl<T> fmt::Debug for TaskSource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Self::Value(_) => "value",
            Self::Thunk(_) => "thunk",
            Self::Deferred(_) => "deferred",
        };
        write!(f, "TaskSource({kind})")
    }
}

/// A normalized `(key, source)` pair.
#[derive(Debug)]
pub struct TaskEntry<T, K = String> {
    pub(crate) key: TaskKey<K>,
    pub(crate) source: TaskSource<T>,
}

impl<T: Clone, K: Clone> Clone for TaskEntry<T, K> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            source: self.source.clone(),
        }
    }
}

impl<T, K> TaskEntry<T, K> {
    /// The entry's position or key in the original input.
    #[must_use]
    pub fn key(&self) -> &TaskKey<K> {
        &self.key
    }

    pub(crate) fn into_parts(self) -> (TaskKey<K>, TaskSource<T>) {
        (self.key, self.source)
    }
}

/// The uniform, ordered entry list every input shape normalizes to.
#[derive(Debug)]
pub struct TaskList<T, K = String> {
    shape: Shape,
    entries: Vec<TaskEntry<T, K>>,
}

impl<T: Clone, K: Clone> Clone for TaskList<T, K> {
    fn clone(&self) -> Self {
        Self {
            shape: self.shape,
            entries: self.entries.clone(),
        }
    }
}

impl<T, K> TaskList<T, K> {
    /// Builds a sequence-shaped list from task sources in order.
    pub fn sequence(sources: impl IntoIterator<Item = TaskSource<T>>) -> Self {
        let entries = sources
            .into_iter()
            .enumerate()
            .map(|(i, source)| TaskEntry {
                key: TaskKey::Index(i),
                source,
            })
            .collect();
        Self {
            shape: Shape::Sequence,
            entries,
        }
    }

    /// Builds a sequence-shaped list of plain values.
    pub fn from_values(values: impl IntoIterator<Item = T>) -> Self {
        Self::sequence(values.into_iter().map(TaskSource::Value))
    }

    /// Builds a mapping-shaped list from keyed sources in insertion order.
    pub fn mapping(pairs: impl IntoIterator<Item = (K, TaskSource<T>)>) -> Self {
        Self::keyed(Shape::Mapping, pairs)
    }

    /// Builds a map-like list from keyed sources in insertion order.
    pub fn map_like(pairs: impl IntoIterator<Item = (K, TaskSource<T>)>) -> Self {
        Self::keyed(Shape::MapLike, pairs)
    }

    /// Builds a set-like list; iteration order becomes position order.
    pub fn set_like(values: impl IntoIterator<Item = T>) -> Self {
        let mut list = Self::from_values(values);
        list.shape = Shape::SetLike;
        list
    }

    /// The empty mapping-shaped list, the normalization of nullish input.
    #[must_use]
    pub fn empty_mapping() -> Self {
        Self {
            shape: Shape::Mapping,
            entries: Vec::new(),
        }
    }

    fn keyed(shape: Shape, pairs: impl IntoIterator<Item = (K, TaskSource<T>)>) -> Self {
        let entries = pairs
            .into_iter()
            .map(|(key, source)| TaskEntry {
                key: TaskKey::Key(key),
                source,
            })
            .collect();
        Self { shape, entries }
    }

    /// The shape tag the result collection will be rebuilt with.
    #[must_use]
    pub fn shape(&self) -> Shape {
        self.shape
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The normalized entries, in input order.
    #[must_use]
    pub fn entries(&self) -> &[TaskEntry<T, K>] {
        &self.entries
    }

    pub(crate) fn into_parts(self) -> (Shape, Vec<TaskEntry<T, K>>) {
        (self.shape, self.entries)
    }
}

/// Conversion into a normalized [`TaskList`].
///
/// Implemented for the supported input shapes; combinators accept any of
/// them. `Option` maps `None` to the empty mapping-shaped list, so nullish
/// input resolves immediately without scheduling any work.
pub trait IntoTaskList {
    /// Key type of the normalized entries.
    type Key: Clone + 'static;
    /// Value type the tasks produce.
    type Value: Clone + 'static;

    /// Normalizes `self`. Must not invoke any task source.
    fn into_task_list(self) -> TaskList<Self::Value, Self::Key>;
}

impl<T: Clone + 'static, K: Clone + 'static> IntoTaskList for TaskList<T, K> {
    type Key = K;
    type Value = T;

    fn into_task_list(self) -> TaskList<T, K> {
        self
    }
}

impl<T: Clone + 'static> IntoTaskList for Vec<TaskSource<T>> {
    type Key = String;
    type Value = T;

    fn into_task_list(self) -> TaskList<T, String> {
        TaskList::sequence(self)
    }
}

impl<T: Clone + 'static> IntoTaskList for Vec<Promise<T>> {
    type Key = String;
    type Value = T;

    fn into_task_list(self) -> TaskList<T, String> {
        TaskList::sequence(self.into_iter().map(TaskSource::from))
    }
}

impl<T: Clone + 'static, K: Clone + 'static> IntoTaskList for Vec<(K, TaskSource<T>)> {
    type Key = K;
    type Value = T;

    fn into_task_list(self) -> TaskList<T, K> {
        TaskList::mapping(self)
    }
}

impl<T: Clone + 'static, K: Clone + 'static> IntoTaskList for Vec<(K, Promise<T>)> {
    type Key = K;
    type Value = T;

    fn into_task_list(self) -> TaskList<T, K> {
        TaskList::mapping(
            self.into_iter()
                .map(|(key, promise)| (key, TaskSource::from(promise))),
        )
    }
}

impl<T: Clone + Ord + 'static> IntoTaskList for BTreeSet<T> {
    type Key = String;
    type Value = T;

    fn into_task_list(self) -> TaskList<T, String> {
        TaskList::set_like(self)
    }
}

impl<L: IntoTaskList> IntoTaskList for Option<L> {
    type Key = L::Key;
    type Value = L::Value;

    fn into_task_list(self) -> TaskList<L::Value, L::Key> {
        match self {
            Some(inner) => inner.into_task_list(),
            None => TaskList::empty_mapping(),
        }
    }
}

/// The result collection, shape-matched to the input.
///
/// Values sit at the position or key of their originating entry; insertion
/// order follows the *input's* order, never completion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome<T, K = String> {
    /// Result of a sequence or set input.
    Sequence(Vec<T>),
    /// Result of a mapping input: pairs in the input's insertion order.
    Mapping(Vec<(K, T)>),
    /// Result of a map-like input: pairs in the input's insertion order.
    MapLike(Vec<(K, T)>),
}

impl<T, K> Outcome<T, K> {
    pub(crate) fn empty(shape: Shape) -> Self {
        match shape {
            Shape::Sequence | Shape::SetLike => Self::Sequence(Vec::new()),
            Shape::Mapping => Self::Mapping(Vec::new()),
            Shape::MapLike => Self::MapLike(Vec::new()),
        }
    }

    /// Number of results.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Sequence(v) => v.len(),
            Self::Mapping(p) | Self::MapLike(p) => p.len(),
        }
    }

    /// `true` if there are no results.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The sequence form, if this was a sequence or set input.
    #[must_use]
    pub fn into_sequence(self) -> Option<Vec<T>> {
        match self {
            Self::Sequence(v) => Some(v),
            Self::Mapping(_) | Self::MapLike(_) => None,
        }
    }

    /// The key/value pairs, if this was a mapping or map-like input.
    #[must_use]
    pub fn into_pairs(self) -> Option<Vec<(K, T)>> {
        match self {
            Self::Sequence(_) => None,
            Self::Mapping(p) | Self::MapLike(p) => Some(p),
        }
    }

    /// Looks up a result by key in a mapping or map-like outcome.
    #[must_use]
    pub fn get<Q>(&self, key: &Q) -> Option<&T>
    where
        K: std::borrow::Borrow<Q>,
        Q: PartialEq + ?Sized,
    {
        match self {
            Self::Sequence(_) => None,
            Self::Mapping(pairs) | Self::MapLike(pairs) => pairs
                .iter()
                .find(|(k, _)| k.borrow() == key)
                .map(|(_, v)| v),
        }
    }
}
