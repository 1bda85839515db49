//! Pending-request queue ordered by priority, then submission time.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use chrono::{DateTime, Utc};

use crate::content::Priority;

#[derive(Debug)]
struct Queued<T> {
    rank: u8,
    timestamp: DateTime<Utc>,
    seq: u64,
    item: T,
}

impl<T> PartialEq for Queued<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<T> Eq for Queued<T> {}

impl<T> PartialOrd for Queued<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Queued<T> {
    // Max-heap: higher rank first, then older timestamp, then insertion order.
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank
            .cmp(&other.rank)
            .then_with(|| other.timestamp.cmp(&self.timestamp))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Debug)]
pub struct PendingQueue<T> {
    heap: BinaryHeap<Queued<T>>,
    next_seq: u64,
}

impl<T> Default for PendingQueue<T> {
    fn default() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }
}

impl<T> PendingQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, priority: Priority, timestamp: DateTime<Utc>, item: T) {
        self.heap.push(Queued {
            rank: priority.rank(),
            timestamp,
            seq: self.next_seq,
            item,
        });
        self.next_seq += 1;
    }

    pub fn pop(&mut self) -> Option<T> {
        self.heap.pop().map(|queued| queued.item)
    }

    /// Removes everything, in dispatch order.
    pub fn drain(&mut self) -> Vec<T> {
        let mut items = Vec::with_capacity(self.heap.len());
        while let Some(item) = self.pop() {
            items.push(item);
        }
        items
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
