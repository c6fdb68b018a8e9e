//! Timed wake-ups for suspended processes.

use super::time::SimTime;
use super::ProcessId;
use core::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// A process waiting for simulated time to reach `at`.
///
/// `generation` is the process's wait generation when the wake was scheduled;
/// a process that resumes for another reason bumps its generation, which turns
/// the pending entry stale.
#[derive(Debug, Clone, Copy)]
pub struct TimedWake {
    pub at: SimTime,
    pub seq: u64,
    pub process: ProcessId,
    pub generation: u64,
}

impl PartialEq for TimedWake {
    fn eq(&self, other: &Self) -> bool {
        self.at == other.at && self.seq == other.seq
    }
}
impl Eq for TimedWake {}
impl PartialOrd for TimedWake {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for TimedWake {
    fn cmp(&self, other: &Self) -> Ordering {
        self.at.cmp(&other.at).then(self.seq.cmp(&other.seq))
    }
}

/// Min-ordered queue of timed wakes. Entries for the same instant pop in the
/// order they were scheduled.
#[derive(Debug, Default)]
pub struct TimerQueue {
    queue: BinaryHeap<Reverse<TimedWake>>,
    next_seq: u64,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, at: SimTime, process: ProcessId, generation: u64) {
        let seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        self.queue.push(Reverse(TimedWake {
            at,
            seq,
            process,
            generation,
        }));
    }

    pub fn next_time(&self) -> Option<SimTime> {
        self.queue.peek().map(|Reverse(wake)| wake.at)
    }

    /// Pops the earliest entry if it is due at or before `now`.
    pub fn pop_due(&mut self, now: SimTime) -> Option<TimedWake> {
        match self.queue.peek() {
            Some(Reverse(wake)) if wake.at <= now => self.queue.pop().map(|Reverse(wake)| wake),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
