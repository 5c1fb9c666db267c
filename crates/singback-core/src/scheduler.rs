//! Cancellable one-shot timers.
//!
//! Timers are ordered by due time and then by registration order, so two
//! timers registered from the same call with delays `a <= b` always fire
//! `a` first. Cancelled timers never fire.

use std::collections::{BTreeMap, HashMap};

/// Handle returned by [`TimerQueue::schedule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

/// Pending timers carrying a payload of type `T`.
#[derive(Debug)]
pub struct TimerQueue<T> {
    /// (due ms, sequence) -> payload
    entries: BTreeMap<(u64, u64), T>,
    /// sequence -> due ms, for cancellation
    index: HashMap<u64, u64>,
    next_seq: u64,
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TimerQueue<T> {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            index: HashMap::new(),
            next_seq: 0,
        }
    }

    /// Register `payload` to fire at `due_ms`.
    pub fn schedule(&mut self, due_ms: u64, payload: T) -> TimerId {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert((due_ms, seq), payload);
        self.index.insert(seq, due_ms);
        TimerId(seq)
    }

    /// Remove a pending timer. Returns its payload if it had not fired yet.
    pub fn cancel(&mut self, id: TimerId) -> Option<T> {
        let due = self.index.remove(&id.0)?;
        self.entries.remove(&(due, id.0))
    }

    /// Whether the timer is still pending.
    pub fn is_pending(&self, id: TimerId) -> bool {
        self.index.contains_key(&id.0)
    }

    /// Pop the earliest timer due at or before `now_ms`.
    pub fn pop_due(&mut self, now_ms: u64) -> Option<(TimerId, u64, T)> {
        let (&(due, seq), _) = self.entries.iter().next()?;
        if due > now_ms {
            return None;
        }
        let payload = self.entries.remove(&(due, seq))?;
        self.index.remove(&seq);
        Some((TimerId(seq), due, payload))
    }

    /// Due time of the earliest pending timer.
    pub fn next_due(&self) -> Option<u64> {
        self.entries.keys().next().map(|&(due, _)| due)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
