#![forbid(unsafe_code)]

//! Host-driven timer queue.
//!
//! The engine never sets real timers. It schedules deadlines here, and the
//! host's tick hands back whatever has come due. Dropping or clearing the
//! queue is cancellation: nothing can fire against a disposed engine.
//!
//! # Invariants
//!
//! - Due timers are returned in deadline order; ties in scheduling order.
//! - A cancelled timer is never returned.

use core::cmp::Ordering;
use core::time::Duration;
use std::collections::{BinaryHeap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct TimerId(u64);

#[derive(Debug)]
struct Entry<K> {
    deadline: Duration,
    id: TimerId,
    kind: K,
}

impl<K> PartialEq for Entry<K> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<K> Eq for Entry<K> {}

impl<K> PartialOrd for Entry<K> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<K> Ord for Entry<K> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Earliest deadline first (max-heap, so reversed).
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.id.cmp(&self.id))
    }
}

/// Deadlines keyed by a caller-defined kind.
#[derive(Debug)]
pub struct TimerQueue<K> {
    heap: BinaryHeap<Entry<K>>,
    live: HashSet<TimerId>,
    next_id: u64,
}

impl<K> Default for TimerQueue<K> {
    fn default() -> Self {
        Self {
            heap: BinaryHeap::new(),
            live: HashSet::new(),
            next_id: 0,
        }
    }
}

impl<K: Clone + PartialEq> TimerQueue<K> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire `kind` once `delay` has passed since `now`.
    pub fn schedule(&mut self, now: Duration, delay: Duration, kind: K) {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.heap.push(Entry {
            deadline: now.saturating_add(delay),
            id,
            kind,
        });
        self.live.insert(id);
    }

    /// Cancel every pending timer of `kind`. Returns how many were pending.
    pub fn cancel_kind(&mut self, kind: &K) -> usize {
        let ids: Vec<TimerId> = self
            .heap
            .iter()
            .filter(|e| e.kind == *kind && self.live.contains(&e.id))
            .map(|e| e.id)
            .collect();
        for id in &ids {
            self.live.remove(id);
        }
        ids.len()
    }

    /// Whether a timer of `kind` is pending.
    #[must_use]
    pub fn is_scheduled(&self, kind: &K) -> bool {
        self.heap
            .iter()
            .any(|e| e.kind == *kind && self.live.contains(&e.id))
    }

    /// Pop the earliest timer whose deadline is `<= now`.
    pub fn pop_due(&mut self, now: Duration) -> Option<K> {
        while let Some(top) = self.heap.peek() {
            if !self.live.contains(&top.id) {
                self.heap.pop();
                continue;
            }
            if top.deadline > now {
                return None;
            }
            let entry = self.heap.pop()?;
            self.live.remove(&entry.id);
            return Some(entry.kind);
        }
        None
    }

    /// Earliest pending deadline.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Duration> {
        self.heap
            .iter()
            .filter(|e| self.live.contains(&e.id))
            .map(|e| e.deadline)
            .min()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.live.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.live.clear();
    }
}
