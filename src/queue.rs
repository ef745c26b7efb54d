//! Bounded MPMC FIFO of event handles.
//!
//! Uses a `parking_lot::Mutex`-protected `VecDeque`, the same lock-for-
//! simplicity path the teacher's `SyncManager::Mutex` mode documents: hold
//! times here are O(chunksize), not O(blocking I/O), so a plain mutex beats
//! a lock-free ring on simplicity without costing throughput. The data
//! plane additionally needs `running_upstreams` to reach zero in the same
//! critical section that observes emptiness, which a lock-free queue
//! doesn't give you without extra machinery, so the mutex stays on the hot
//! path rather than being an inherited shortcut.

use crate::event::{EventBatch, EventHandle};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

pub struct Queue {
    capacity: usize,
    inner: Mutex<VecDeque<EventHandle>>,
    /// Count of upstream arrows that may still produce into this queue.
    /// Mutated only under the scheduler mutex per the shared-resource
    /// policy; stored as an atomic here purely so `running_upstreams()` can
    /// be read without taking the queue's own lock.
    running_upstreams: AtomicUsize,
}

impl Queue {
    pub fn new(capacity: usize) -> Self {
        Queue {
            capacity,
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            running_upstreams: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Snapshot of current size. Lower bound for consumers, upper bound for
    /// producers -- acceptable per the queue contract.
    pub fn size(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn running_upstreams(&self) -> usize {
        self.running_upstreams.load(Ordering::Acquire)
    }

    pub fn set_running_upstreams(&self, n: usize) {
        self.running_upstreams.store(n, Ordering::Release);
    }

    pub fn dec_running_upstreams(&self) {
        self.running_upstreams.fetch_sub(1, Ordering::AcqRel);
    }

    /// Push as many of `items` as fit; returns the number accepted. The
    /// rest are left in `items` (drained from the front) for the caller to
    /// retry or drop depending on arrow semantics.
    pub fn try_push(&self, items: &mut EventBatch) -> usize {
        let mut inner = self.inner.lock();
        let free = self.capacity.saturating_sub(inner.len());
        let accept = free.min(items.len());
        for _ in 0..accept {
            if let Some(item) = items.pop_front() {
                inner.push_back(item);
            }
        }
        accept
    }

    /// Pop up to `max` items into `out`. Returns the number popped.
    pub fn try_pop(&self, out: &mut EventBatch, max: usize) -> usize {
        let mut inner = self.inner.lock();
        let take = max.min(inner.len());
        for _ in 0..take {
            if let Some(item) = inner.pop_front() {
                out.push_back(item);
            }
        }
        take
    }

    /// True once no upstream will ever write again and the queue is empty:
    /// no event will ever appear here again.
    pub fn is_exhausted(&self) -> bool {
        self.running_upstreams() == 0 && self.size() == 0
    }
}
