//! Deferred sub-queue of a lane.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::model::{Timestamp, WorkItem};

/// Heap entry ordering a deferred work item by `(ready_time, seq)`.
///
/// The comparison is **reversed** so that `BinaryHeap<DeferredEntry>`
/// behaves as a min-heap: the earliest ready time, then the earliest push,
/// is popped first.
struct DeferredEntry(WorkItem);

impl DeferredEntry {
    fn key(&self) -> (Timestamp, u64) {
        (self.0.ready_time(), self.0.seq)
    }
}

impl PartialEq for DeferredEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for DeferredEntry {}

impl Ord for DeferredEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other.key().cmp(&self.key())
    }
}

impl PartialOrd for DeferredEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Ready-time ordered queue of delayed work items.
#[derive(Default)]
pub(crate) struct DeferredQueue {
    heap: BinaryHeap<DeferredEntry>,
}

impl DeferredQueue {
    pub(crate) fn push(&mut self, item: WorkItem) {
        self.heap.push(DeferredEntry(item));
    }

    pub(crate) fn pop(&mut self) -> Option<WorkItem> {
        self.heap.pop().map(|entry| entry.0)
    }

    pub(crate) fn peek(&self) -> Option<&WorkItem> {
        self.heap.peek().map(|entry| &entry.0)
    }

    pub(crate) fn len(&self) -> usize {
        self.heap.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}
