//! Deterministic scheduling: microtask queue, virtual clock, timer wheel.
//!
//! All continuation delivery in the crate flows through one logical
//! single-threaded scheduler per thread. The scheduler owns:
//!
//! - a strict-FIFO **microtask queue** of boxed jobs; `then` callbacks,
//!   thenable adoption steps, and unhandled-rejection checks are all jobs;
//! - a **virtual timer wheel** keyed by `(deadline, registration sequence)`,
//!   so expiry order is deterministic even for equal deadlines;
//! - a **virtual clock** in ticks. Time only moves when the drive loop has
//!   drained every queued job and advances to the next timer deadline.
//!
//! # Drive loop
//!
//! [`run_until_idle`] drains the queue completely, then advances the clock to
//! the earliest pending deadline, fires the expired timers (their jobs join
//! the queue), and drains again. It returns once no jobs and no timers remain.
//! Because suspension happens only at continuation boundaries and time is
//! virtual, every interleaving scenario is reproducible.
//!
//! # Determinism Guarantees
//!
//! - Jobs run in enqueue order (strict FIFO, drained before time advances)
//! - Same tick, same timers: expiry order is `(deadline, sequence)`
//! - No wall-clock dependencies anywhere

use std::cell::RefCell;
use std::collections::VecDeque;

mod wheel;

pub use wheel::TimerHandle;

use wheel::TimerWheel;

/// A unit of deferred work.
pub(crate) type Job = Box<dyn FnOnce() + 'static>;

/// Scheduler tuning knobs.
#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    /// Upper bound on jobs executed by a single [`run_until_idle`] call.
    ///
    /// A runaway continuation loop (a job that always enqueues another job)
    /// would otherwise spin the drive loop forever. When the budget is hit
    /// the drive loop stops and reports it; remaining work stays queued.
    pub max_jobs_per_drain: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_jobs_per_drain: 1 << 22,
        }
    }
}

/// What a [`run_until_idle`] call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Number of microtask jobs executed.
    pub jobs_run: u64,
    /// Number of timers fired.
    pub timers_fired: u64,
    /// Virtual time when the loop stopped.
    pub end_tick: u64,
    /// `true` if the loop stopped because `max_jobs_per_drain` was reached.
    pub budget_exhausted: bool,
}

struct Scheduler {
    queue: VecDeque<Job>,
    wheel: TimerWheel,
    tick: u64,
    config: SchedulerConfig,
    draining: bool,
}

impl Scheduler {
    fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            wheel: TimerWheel::new(),
            tick: 0,
            config: SchedulerConfig::default(),
            draining: false,
        }
    }
}

thread_local! {
    static SCHEDULER: RefCell<Scheduler> = RefCell::new(Scheduler::new());
}

/// Enqueues a job on the microtask queue.
///
/// The job runs on a later turn of the drive loop, after every job enqueued
/// before it. This is the "schedule continuation" operation every deferred
/// delivery in the crate goes through.
pub fn enqueue(job: impl FnOnce() + 'static) {
    SCHEDULER.with(|s| s.borrow_mut().queue.push_back(Box::new(job)));
}

/// Registers a job to run `after` virtual ticks from now.
///
/// Returns a handle that can cancel the timer before it fires.
pub fn timer(after: u64, job: impl FnOnce() + 'static) -> TimerHandle {
    SCHEDULER.with(|s| {
        let mut s = s.borrow_mut();
        let deadline = s.tick.saturating_add(after);
        s.wheel.insert(deadline, Box::new(job))
    })
}

/// Cancels a pending timer. Returns `false` if it already fired or was
/// already cancelled.
pub fn cancel_timer(handle: TimerHandle) -> bool {
    SCHEDULER.with(|s| s.borrow_mut().wheel.cancel(handle))
}

/// Current virtual time in ticks.
#[must_use]
pub fn now() -> u64 {
    SCHEDULER.with(|s| s.borrow().tick)
}

/// Number of jobs waiting on the microtask queue.
#[must_use]
pub fn pending_jobs() -> usize {
    SCHEDULER.with(|s| s.borrow().queue.len())
}

/// Number of live (not cancelled, not fired) timers.
#[must_use]
pub fn pending_timers() -> usize {
    SCHEDULER.with(|s| s.borrow().wheel.len())
}

/// Replaces the scheduler configuration.
pub fn configure(config: SchedulerConfig) {
    SCHEDULER.with(|s| s.borrow_mut().config = config);
}

/// Clears all queued jobs and timers and rewinds the clock to tick 0.
///
/// Intended for test teardown between runs. Must not be called from inside
/// a job.
pub fn reset() {
    SCHEDULER.with(|s| {
        let mut s = s.borrow_mut();
        assert!(!s.draining, "schedule::reset called from inside a job");
        let config = s.config;
        *s = Scheduler::new();
        s.config = config;
    });
}

/// Clears the draining flag when the drive loop exits, panicking job or not.
struct DrainGuard;

impl Drop for DrainGuard {
    fn drop(&mut self) {
        SCHEDULER.with(|s| s.borrow_mut().draining = false);
    }
}

/// Drains the scheduler to quiescence.
///
/// Runs every queued job in FIFO order; when the queue is empty and timers
/// remain, advances the virtual clock to the next deadline, fires the expired
/// timers, and keeps draining. Returns when no jobs and no timers remain, or
/// when the per-drain job budget is exhausted.
///
/// # Panics
///
/// Panics if called from inside a job: the drive loop is the outermost turn
/// of control and does not nest.
pub fn run_until_idle() -> DrainReport {
    SCHEDULER.with(|s| {
        let mut s = s.borrow_mut();
        assert!(
            !s.draining,
            "schedule::run_until_idle called from inside a job"
        );
        s.draining = true;
    });
    let _guard = DrainGuard;

    let mut report = DrainReport::default();
    loop {
        // Drain the microtask queue completely before touching the clock.
        loop {
            if report.jobs_run >= job_budget() {
                report.budget_exhausted = true;
                report.end_tick = now();
                return report;
            }
            let Some(job) = SCHEDULER.with(|s| s.borrow_mut().queue.pop_front()) else {
                break;
            };
            job();
            report.jobs_run += 1;
        }

        // Queue is empty: advance to the next timer deadline, if any.
        let fired = SCHEDULER.with(|s| {
            let mut s = s.borrow_mut();
            let Some(deadline) = s.wheel.next_deadline() else {
                return 0;
            };
            debug_assert!(deadline >= s.tick, "timer deadline in the past");
            s.tick = deadline;
            let mut fired = 0;
            while let Some(job) = s.wheel.pop_due(deadline) {
                s.queue.push_back(job);
                fired += 1;
            }
            fired
        });
        if fired == 0 {
            break;
        }
        report.timers_fired += fired;
    }

    report.end_tick = now();
    report
}

fn job_budget() -> u64 {
    SCHEDULER.with(|s| s.borrow().config.max_jobs_per_drain)
}
