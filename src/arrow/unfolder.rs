//! Unfolder arrow: consumes one parent event at level `L` and produces N
//! child events at level `L+1` across repeated shots, holding per-parent
//! iteration state. Not parallel while that state exists. No direct teacher
//! analogue (the pipeline has no hierarchical fan-out); this is original
//! engineering built in the arrow-variant idiom `source.rs`/`stage.rs`
//! establish, per spec.md's own admission that the class hierarchy for
//! arrow types is the only structural guidance available.

use crate::error::EngineError;
use crate::event::{EventHandle, EventPools, Level};
use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnfoldStep {
    KeepGoing,
    Finished,
}

pub trait UnfolderLogic: Send + Sync {
    fn preprocess(&self, parent: &EventHandle) -> Result<(), EngineError> {
        let _ = parent;
        Ok(())
    }

    /// Called once per child. `child` has already been acquired from the
    /// pool at `iter`'s position; this call decides whether more children
    /// follow.
    fn unfold(
        &self,
        parent: &EventHandle,
        child: &EventHandle,
        iter: usize,
    ) -> Result<UnfoldStep, EngineError>;
}

/// Optional explicit child numbering. Defaults to the pool's own monotonic
/// counter; callers that need a specific encoding (tests pinning exact
/// event numbers, replay scenarios) can override it.
pub type ChildNumberFn = Box<dyn Fn(&EventHandle, usize) -> u64 + Send + Sync>;

struct IterationState {
    parent: EventHandle,
    iter: usize,
}

pub struct UnfolderPayload {
    logic: Box<dyn UnfolderLogic>,
    child_level: Level,
    child_number: Option<ChildNumberFn>,
    current: Mutex<Option<IterationState>>,
}

pub enum UnfolderShot {
    /// A child was produced; the parent has more iterations coming.
    Child(EventHandle),
    /// A child was produced and it was the last for this parent; the
    /// parent is now done and should be forwarded/released.
    ChildAndParentDone(EventHandle, EventHandle),
    /// No parent queued and nothing to do.
    ComeBackLater,
}

impl UnfolderPayload {
    pub fn new(logic: Box<dyn UnfolderLogic>, child_level: Level, child_number: Option<ChildNumberFn>) -> Self {
        UnfolderPayload {
            logic,
            child_level,
            child_number,
            current: Mutex::new(None),
        }
    }

    /// Begin iterating a newly-dequeued parent.
    pub fn begin_parent(&self, parent: EventHandle) -> Result<(), EngineError> {
        self.logic.preprocess(&parent)?;
        *self.current.lock() = Some(IterationState { parent, iter: 0 });
        Ok(())
    }

    pub fn has_parent(&self) -> bool {
        self.current.lock().is_some()
    }

    /// Produce one child for the in-progress parent. Returns
    /// `ComeBackLater` if the child pool is exhausted (backpressure).
    pub fn step(&self, pools: &EventPools) -> Result<UnfolderShot, EngineError> {
        let mut guard = self.current.lock();
        let Some(state) = guard.as_mut() else {
            return Ok(UnfolderShot::ComeBackLater);
        };

        let number = self
            .child_number
            .as_ref()
            .map(|f| f(&state.parent, state.iter));
        let child = match number {
            Some(n) => pools.acquire_numbered(self.child_level, n, Some(state.parent.clone())),
            None => pools.acquire(self.child_level, Some(state.parent.clone())),
        };
        let Some(child) = child else {
            return Ok(UnfolderShot::ComeBackLater);
        };

        let step = self.logic.unfold(&state.parent, &child, state.iter)?;
        state.iter += 1;

        match step {
            UnfoldStep::KeepGoing => Ok(UnfolderShot::Child(child)),
            UnfoldStep::Finished => {
                let IterationState { parent, .. } = guard.take().unwrap();
                Ok(UnfolderShot::ChildAndParentDone(child, parent))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventPools;

    struct ThreeChildren;
    impl UnfolderLogic for ThreeChildren {
        fn unfold(
            &self,
            _parent: &EventHandle,
            _child: &EventHandle,
            iter: usize,
        ) -> Result<UnfoldStep, EngineError> {
            if iter >= 2 {
                Ok(UnfoldStep::Finished)
            } else {
                Ok(UnfoldStep::KeepGoing)
            }
        }
    }

    #[test]
    fn produces_exactly_n_children_per_parent() {
        let pools = EventPools::new(10, 10, 10);
        let child_number: ChildNumberFn = Box::new(|parent: &EventHandle, iter: usize| {
            100 + parent.number() + iter as u64
        });
        let payload = UnfolderPayload::new(Box::new(ThreeChildren), Level::Event, Some(child_number));
        let parent = pools.acquire_numbered(Level::Timeslice, 17, None).unwrap();
        payload.begin_parent(parent).unwrap();

        let mut numbers = Vec::new();
        loop {
            match payload.step(&pools).unwrap() {
                UnfolderShot::Child(c) => numbers.push(c.number()),
                UnfolderShot::ChildAndParentDone(c, _parent) => {
                    numbers.push(c.number());
                    break;
                }
                UnfolderShot::ComeBackLater => panic!("unexpected backpressure"),
            }
        }
        assert_eq!(numbers, vec![117, 118, 119]);
        assert!(!payload.has_parent());
    }
}
