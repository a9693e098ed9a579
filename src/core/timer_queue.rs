//! Time-ordered queue of pending timer entries.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use std::time::Instant;

/// Identifier of a repeating timer series.
pub type RepeatId = u64;

/// Boxed one-shot callable stored in a timer entry.
pub(crate) type TimerTask = Box<dyn FnOnce() + Send + 'static>;

/// A callable waiting for its fire time.
pub(crate) struct TimerEntry {
    /// Earliest instant at which the task may be handed to the pool.
    pub fire_time: Instant,
    /// Insertion sequence, breaks ties between equal fire times.
    pub seq: u64,
    /// Series this entry belongs to, if it is a repeating timer.
    pub repeat_id: Option<RepeatId>,
    /// The callable.
    pub task: TimerTask,
}

impl fmt::Debug for TimerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerEntry")
            .field("fire_time", &self.fire_time)
            .field("seq", &self.seq)
            .field("repeat_id", &self.repeat_id)
            .finish_non_exhaustive()
    }
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Earliest fire time first, then FIFO by sequence (reversed for max-heap).
        other
            .fire_time
            .cmp(&self.fire_time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Min-heap of timer entries keyed by `(fire_time, seq)`.
///
/// O(log n) push and pop. Entries with the same fire time come out in
/// insertion order, so no entry can be starved by later ties.
#[derive(Debug, Default)]
pub(crate) struct TimerQueue {
    entries: BinaryHeap<TimerEntry>,
    next_seq: u64,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a task; returns its sequence number.
    pub fn push(&mut self, fire_time: Instant, repeat_id: Option<RepeatId>, task: TimerTask) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.push(TimerEntry {
            fire_time,
            seq,
            repeat_id,
            task,
        });
        seq
    }

    /// Fire time of the earliest entry.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.peek().map(|entry| entry.fire_time)
    }

    /// Remove the earliest entry if it is due at `now`.
    pub fn pop_due(&mut self, now: Instant) -> Option<TimerEntry> {
        if self.next_deadline()? > now {
            return None;
        }
        self.entries.pop()
    }

    /// Remove every entry, returning them so they can be dropped outside a lock.
    pub fn drain(&mut self) -> Vec<TimerEntry> {
        self.entries.drain().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
