//! Folder arrow: inverse of Unfolder. Collects children of one parent
//! until a termination predicate fires, then releases (or forwards) the
//! parent. Serial per parent, for the same reason Unfolder is: the
//! in-progress accumulator is per-parent state, not safely shared across
//! concurrent shots.

use crate::error::EngineError;
use crate::event::EventHandle;
use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoldStep {
    KeepGoing,
    Finished,
}

pub trait FolderLogic: Send + Sync {
    fn fold(&self, parent: &EventHandle, child: &EventHandle) -> Result<FoldStep, EngineError>;
}

struct Accumulator {
    parent: EventHandle,
}

pub struct FolderPayload {
    logic: Box<dyn FolderLogic>,
    current: Mutex<Option<Accumulator>>,
}

pub enum FolderShot {
    /// Child consumed, parent not yet complete.
    Folded,
    /// Child consumed and the parent is now complete; forward/release it.
    ParentDone(EventHandle),
}

impl FolderPayload {
    pub fn new(logic: Box<dyn FolderLogic>) -> Self {
        FolderPayload {
            logic,
            current: Mutex::new(None),
        }
    }

    /// Fold one child into the accumulator for `parent` (starting a new
    /// accumulator the first time a given parent is seen).
    pub fn fold_child(&self, parent: &EventHandle, child: &EventHandle) -> Result<FolderShot, EngineError> {
        let mut guard = self.current.lock();
        if guard.is_none() {
            *guard = Some(Accumulator {
                parent: parent.clone(),
            });
        }
        let step = self.logic.fold(parent, child)?;
        match step {
            FoldStep::KeepGoing => Ok(FolderShot::Folded),
            FoldStep::Finished => {
                let acc = guard.take().unwrap();
                Ok(FolderShot::ParentDone(acc.parent))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventPools, Level};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountTo3 {
        seen: AtomicUsize,
    }
    impl FolderLogic for CountTo3 {
        fn fold(&self, _parent: &EventHandle, _child: &EventHandle) -> Result<FoldStep, EngineError> {
            let n = self.seen.fetch_add(1, Ordering::Relaxed) + 1;
            if n >= 3 {
                Ok(FoldStep::Finished)
            } else {
                Ok(FoldStep::KeepGoing)
            }
        }
    }

    #[test]
    fn completes_parent_after_predicate() {
        let pools = EventPools::new(10, 10, 10);
        let parent = pools.acquire(Level::Timeslice, None).unwrap();
        let payload = FolderPayload::new(Box::new(CountTo3 {
            seen: AtomicUsize::new(0),
        }));
        for _ in 0..2 {
            let child = pools.acquire(Level::Event, Some(parent.clone())).unwrap();
            assert!(matches!(
                payload.fold_child(&parent, &child).unwrap(),
                FolderShot::Folded
            ));
        }
        let child = pools.acquire(Level::Event, Some(parent.clone())).unwrap();
        assert!(matches!(
            payload.fold_child(&parent, &child).unwrap(),
            FolderShot::ParentDone(_)
        ));
    }
}
