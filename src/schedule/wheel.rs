//! Virtual timer wheel: a min-heap of jobs keyed by `(deadline, sequence)`.
//!
//! The wheel operates on virtual ticks rather than wall-clock time. Equal
//! deadlines fire in registration order because every timer carries a
//! monotonic sequence number that breaks ties. Cancellation is lazy: a
//! cancelled sequence is remembered and its entry discarded when popped.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

use super::Job;

struct TimerSlot {
    deadline: u64,
    seq: u64,
    job: Job,
}

impl Eq for TimerSlot {}

impl PartialEq for TimerSlot {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Ord for TimerSlot {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap: earliest deadline first, then lowest sequence.
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for TimerSlot {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Handle to a registered timer, used for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle {
    seq: u64,
}

pub(super) struct TimerWheel {
    heap: BinaryHeap<TimerSlot>,
    next_seq: u64,
    cancelled: HashSet<u64>,
    /// Sequence numbers that have neither fired nor been cancelled.
    live: HashSet<u64>,
}

impl TimerWheel {
    pub(super) fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
            cancelled: HashSet::new(),
            live: HashSet::new(),
        }
    }

    /// Number of live timers.
    pub(super) fn len(&self) -> usize {
        self.live.len()
    }

    pub(super) fn insert(&mut self, deadline: u64, job: Job) -> TimerHandle {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(TimerSlot { deadline, seq, job });
        self.live.insert(seq);
        TimerHandle { seq }
    }

    /// Marks a timer cancelled. Returns `false` if it already fired or was
    /// already cancelled.
    pub(super) fn cancel(&mut self, handle: TimerHandle) -> bool {
        if self.live.remove(&handle.seq) {
            self.cancelled.insert(handle.seq);
            true
        } else {
            false
        }
    }

    /// Earliest live deadline, skimming off cancelled entries.
    pub(super) fn next_deadline(&mut self) -> Option<u64> {
        while let Some(slot) = self.heap.peek() {
            if self.cancelled.remove(&slot.seq) {
                self.heap.pop();
            } else {
                return Some(slot.deadline);
            }
        }
        None
    }

    /// Pops the next live timer due at or before `now`, if any.
    pub(super) fn pop_due(&mut self, now: u64) -> Option<Job> {
        loop {
            let due = match self.heap.peek() {
                Some(slot) => slot.deadline <= now,
                None => return None,
            };
            if !due {
                return None;
            }
            // Invariant: peek returned Some, so pop must too.
            let slot = self.heap.pop()?;
            if self.cancelled.remove(&slot.seq) {
                continue;
            }
            self.live.remove(&slot.seq);
            return Some(slot.job);
        }
    }
}
