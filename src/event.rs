//! Event handles and the per-level pool that owns their lifetime.
//!
//! An [`EventHandle`] is a reference-counted pointer to an event record. The
//! pool hands them out on [`EventPool::acquire`] and reclaims them when the
//! last handle is dropped, mirroring the plain data-record-passed-between-
//! stages shape of the teacher's sensor readings, generalized to carry a
//! hierarchical level tag and parent back-reference.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Hierarchical level tag, coarsest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    Timeslice,
    Event,
    Subevent,
}

struct EventInner {
    number: u64,
    level: Level,
    parent: Option<EventHandle>,
    pool: Arc<LevelPoolInner>,
}

impl Drop for EventInner {
    fn drop(&mut self) {
        self.pool.release();
    }
}

/// Reference-counted handle to an event record.
///
/// Cloning is cheap (bumps the refcount); the underlying slot is returned
/// to its level's pool when the last clone is dropped.
#[derive(Clone)]
pub struct EventHandle(Arc<EventInner>);

impl EventHandle {
    pub fn number(&self) -> u64 {
        self.0.number
    }

    pub fn level(&self) -> Level {
        self.0.level
    }

    pub fn parent(&self) -> Option<&EventHandle> {
        self.0.parent.as_ref()
    }
}

impl std::fmt::Debug for EventHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHandle")
            .field("number", &self.0.number)
            .field("level", &self.0.level)
            .finish()
    }
}

struct LevelPoolInner {
    capacity: usize,
    in_use: Mutex<usize>,
}

impl LevelPoolInner {
    fn release(&self) {
        let mut in_use = self.in_use.lock();
        *in_use = in_use.saturating_sub(1);
    }
}

/// A simple thread-safe free-list pool for one [`Level`], sized at topology
/// construction. Satisfies the acquire contract in the data model: never
/// blocks, returns `None` at capacity.
pub struct LevelPool {
    inner: Arc<LevelPoolInner>,
    next_number: AtomicU64,
}

impl LevelPool {
    pub fn new(capacity: usize) -> Self {
        LevelPool {
            inner: Arc::new(LevelPoolInner {
                capacity,
                in_use: Mutex::new(0),
            }),
            next_number: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    pub fn in_use(&self) -> usize {
        *self.inner.in_use.lock()
    }

    /// Acquire a fresh handle at this level, or `None` if the level is at
    /// capacity. Never blocks.
    pub fn acquire(&self, level: Level, parent: Option<EventHandle>) -> Option<EventHandle> {
        let number = self.next_number.fetch_add(1, Ordering::Relaxed);
        self.acquire_numbered(level, number, parent)
    }

    /// Acquire a handle with an explicit event number instead of the pool's
    /// own monotonic counter. Used by sources and unfolders that encode
    /// meaning into the number (e.g. a child deriving its number from its
    /// parent's).
    pub fn acquire_numbered(
        &self,
        level: Level,
        number: u64,
        parent: Option<EventHandle>,
    ) -> Option<EventHandle> {
        {
            let mut in_use = self.inner.in_use.lock();
            if *in_use >= self.inner.capacity {
                return None;
            }
            *in_use += 1;
        }
        Some(EventHandle(Arc::new(EventInner {
            number,
            level,
            parent,
            pool: self.inner.clone(),
        })))
    }
}

/// Owns one [`LevelPool`] per [`Level`], constructed once at topology build
/// time from capacities supplied by the embedder.
pub struct EventPools {
    timeslice: LevelPool,
    event: LevelPool,
    subevent: LevelPool,
}

impl EventPools {
    pub fn new(timeslice_capacity: usize, event_capacity: usize, subevent_capacity: usize) -> Self {
        EventPools {
            timeslice: LevelPool::new(timeslice_capacity),
            event: LevelPool::new(event_capacity),
            subevent: LevelPool::new(subevent_capacity),
        }
    }

    pub fn pool(&self, level: Level) -> &LevelPool {
        match level {
            Level::Timeslice => &self.timeslice,
            Level::Event => &self.event,
            Level::Subevent => &self.subevent,
        }
    }

    pub fn acquire(&self, level: Level, parent: Option<EventHandle>) -> Option<EventHandle> {
        self.pool(level).acquire(level, parent)
    }

    pub fn acquire_numbered(
        &self,
        level: Level,
        number: u64,
        parent: Option<EventHandle>,
    ) -> Option<EventHandle> {
        self.pool(level).acquire_numbered(level, number, parent)
    }
}

/// A small ring used for chunked pop/push buffers; a thin alias over
/// `VecDeque` kept here since both the queue and arrow shots pass events
/// around in batches of `chunksize`.
pub type EventBatch = VecDeque<EventHandle>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_respects_capacity() {
        let pool = LevelPool::new(2);
        let a = pool.acquire(Level::Event, None).unwrap();
        let b = pool.acquire(Level::Event, None).unwrap();
        assert!(pool.acquire(Level::Event, None).is_none());
        drop(a);
        assert!(pool.acquire(Level::Event, None).is_some());
        drop(b);
    }

    #[test]
    fn handles_get_monotonic_numbers() {
        let pool = LevelPool::new(4);
        let a = pool.acquire(Level::Event, None).unwrap();
        let b = pool.acquire(Level::Event, None).unwrap();
        assert!(b.number() > a.number());
    }

    #[test]
    fn release_on_drop_frees_slot() {
        let pool = LevelPool::new(1);
        {
            let _a = pool.acquire(Level::Event, None).unwrap();
            assert_eq!(pool.in_use(), 1);
        }
        assert_eq!(pool.in_use(), 0);
    }
}
