//! Pending voting power changes, ordered for deterministic extraction.
//!
//! Entries are min-ordered on `(priority, address)`. Two replicas that
//! append the same entries in any order pop them in the same sequence; the
//! heap's memory layout is irrelevant to that guarantee.

use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use crate::keys::Address;

/// One queued power change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub address: Address,
    /// Height the change was requested at; lower pops first
    pub priority: u64,
    /// Target power at request time
    pub power: i64,
}

impl QueueEntry {
    pub fn new(address: Address, priority: u64, power: i64) -> Self {
        Self { address, priority, power }
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| self.address.cmp(&other.address))
            .then_with(|| self.power.cmp(&other.power))
    }
}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Min-heap of [`QueueEntry`] with a bulk-append path.
///
/// `append` stages entries without restoring heap order; `init` folds the
/// staged entries in. Extraction always folds first, so staged entries are
/// never skipped.
#[derive(Debug, Clone, Default)]
pub struct ValidatorQueue {
    heap: BinaryHeap<Reverse<QueueEntry>>,
    staged: Vec<QueueEntry>,
}

impl ValidatorQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, entry: QueueEntry) {
        self.staged.push(entry);
    }

    /// Re-establishes heap order after one or more `append` calls.
    pub fn init(&mut self) {
        if self.staged.is_empty() {
            return;
        }
        self.heap.extend(self.staged.drain(..).map(Reverse));
    }

    /// Append and re-heap in one step.
    pub fn push(&mut self, entry: QueueEntry) {
        self.heap.push(Reverse(entry));
    }

    pub fn len(&self) -> usize {
        self.heap.len() + self.staged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn pop(&mut self) -> Option<QueueEntry> {
        self.init();
        self.heap.pop().map(|Reverse(entry)| entry)
    }

    /// Removes and returns every entry with `priority <= height`, in
    /// extraction order.
    pub fn pop_due(&mut self, height: u64) -> Vec<QueueEntry> {
        self.init();
        let mut due = Vec::new();
        while let Some(Reverse(next)) = self.heap.peek() {
            if next.priority > height {
                break;
            }
            if let Some(Reverse(entry)) = self.heap.pop() {
                due.push(entry);
            }
        }
        due
    }

    /// Same selection as [`pop_due`](Self::pop_due) without removing anything.
    pub fn peek_due(&self, height: u64) -> Vec<QueueEntry> {
        let mut due: Vec<QueueEntry> = self
            .heap
            .iter()
            .map(|Reverse(entry)| entry)
            .chain(self.staged.iter())
            .filter(|entry| entry.priority <= height)
            .cloned()
            .collect();
        due.sort();
        due
    }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.staged.clear();
    }
}
