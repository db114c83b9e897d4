//! Min-heap of values keyed by release deadline.
//!
//! Entries with equal deadlines come out in insertion order.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::time::SystemTime;

#[derive(Debug)]
pub struct Entry<T> {
    pub value: T,
    pub deadline: SystemTime,
    seq: u64,
}

impl<T> PartialEq for Entry<T> {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl<T> Eq for Entry<T> {}

impl<T> PartialOrd for Entry<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Entry<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for a min-heap.
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Debug)]
pub struct DeadlineQueue<T> {
    heap: BinaryHeap<Entry<T>>,
    next_seq: u64,
}

impl<T> Default for DeadlineQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> DeadlineQueue<T> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    pub fn push(&mut self, value: T, deadline: SystemTime) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Entry {
            value,
            deadline,
            seq,
        });
    }

    /// Earliest entry, if any.
    pub fn peek(&self) -> Option<&Entry<T>> {
        self.heap.peek()
    }

    pub fn pop(&mut self) -> Option<(T, SystemTime)> {
        self.heap.pop().map(|entry| (entry.value, entry.deadline))
    }

    /// Pop the earliest entry if its deadline is at or before `now`.
    pub fn pop_due(&mut self, now: SystemTime) -> Option<(T, SystemTime)> {
        match self.heap.peek() {
            Some(entry) if entry.deadline <= now => self.pop(),
            _ => None,
        }
    }

    pub fn next_deadline(&self) -> Option<SystemTime> {
        self.heap.peek().map(|entry| entry.deadline)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
