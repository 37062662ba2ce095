//! Lagoon: deferred-value primitive with deterministic scheduling and
//! bounded-concurrency task orchestration.
//!
//! # Overview
//!
//! Lagoon is built around a single idea: a correct, deterministic resolution
//! state machine. A [`Promise`] moves `Pending -> Fulfilled | Rejected` exactly
//! once; continuations always run on a later scheduling turn, in registration
//! order, with O(1) stack usage regardless of chain depth. On top of the
//! primitive sits an orchestration engine that runs a heterogeneous task
//! collection with at most N entries in flight, produces results in the
//! *input's* order regardless of completion order, and fails fast on the first
//! rejection.
//!
//! # Core Guarantees
//!
//! - **Single settlement**: a promise settles at most once; later attempts are no-ops
//! - **Deferred delivery**: continuations never run synchronously inside the registering call
//! - **Registration order**: continuations on one promise run in the order they were added
//! - **Bounded stack**: resolving a chain of any length uses constant stack per link
//! - **Input-order results**: orchestration results mirror the input shape and key order
//! - **Fail fast**: the first wall-clock rejection settles the session; in-flight
//!   work is ignored, not cancelled
//! - **Deterministic time**: timers run on a virtual clock, so every ordering
//!   scenario is reproducible without wall-clock sleeps
//!
//! # Module Structure
//!
//! - [`promise`]: The deferred-value state machine and thenable adoption
//! - [`schedule`]: Thread-local microtask queue, virtual clock, and timer wheel
//! - [`task`]: Task collection normalization (sequence / set / mapping / map-like)
//! - [`exec`]: The bounded-concurrency execution session
//! - [`combinator`]: `each`, `parallel`, and `parallel_limit`
//! - [`time`]: Virtual-time delay helpers
//! - [`report`]: Unhandled-rejection reporting sink
//! - [`error`]: Rejection reasons and crate error types
//!
//! # Example
//!
//! ```
//! use lagoon::{combinator, schedule, task::TaskSource, time};
//!
//! let tasks = vec![
//!     TaskSource::from(time::delay(3, "a")),
//!     TaskSource::from(time::delay(2, "b")),
//!     TaskSource::from(time::delay(1, "c")),
//! ];
//! let result = combinator::parallel(tasks);
//! schedule::run_until_idle();
//! let seq = result.outcome().unwrap().unwrap().into_sequence().unwrap();
//! assert_eq!(seq, vec!["a", "b", "c"]); // input order, not completion order
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]

pub mod combinator;
pub mod error;
pub mod exec;
pub mod promise;
pub mod report;
pub mod schedule;
pub mod task;
pub mod time;

pub use combinator::{each, parallel, parallel_limit};
pub use error::{CycleError, Reason, StallError};
pub use exec::Limit;
pub use promise::{Promise, Resolution, Settle, State, Thenable};
pub use task::{IntoTaskList, Outcome, Shape, TaskKey, TaskList, TaskSource};
