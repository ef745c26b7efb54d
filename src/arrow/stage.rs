//! Stage (map) arrow: pop up to `chunksize`, apply processors/factories,
//! push downstream. Grounded on `component_a/processor.rs`'s pop-transform-
//! push loop, generalized from its `TryRecvError::{Empty,Disconnected}`
//! handling to the engine's `KeepGoing`/`ComeBackLater`/`Finished` shot
//! vocabulary. Parallel by default.

use crate::error::EngineError;
use crate::event::{EventBatch, EventHandle};
use std::sync::Arc;

/// A reentrant per-event transform. `Fn` rather than `FnMut` deliberately:
/// the framework offers no automatic locking around a parallel stage's
/// processors, so reentrancy has to be in the type, not a convention.
pub trait EventProcessor: Send + Sync {
    fn process(&self, event: &EventHandle) -> Result<(), EngineError>;
}

impl<F> EventProcessor for F
where
    F: Fn(&EventHandle) -> Result<(), EngineError> + Send + Sync,
{
    fn process(&self, event: &EventHandle) -> Result<(), EngineError> {
        self(event)
    }
}

pub struct StagePayload {
    processors: Vec<Arc<dyn EventProcessor>>,
}

impl StagePayload {
    pub fn new(processors: Vec<Arc<dyn EventProcessor>>) -> Self {
        StagePayload { processors }
    }

    /// Run every processor over every event in `batch`, in place.
    pub fn apply(&self, batch: &EventBatch) -> Result<(), EngineError> {
        for event in batch {
            for processor in &self.processors {
                processor.process(event)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventPools, Level};
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn applies_processors_in_order() {
        let pools = EventPools::new(4, 4, 4);
        let sum = Arc::new(AtomicU64::new(0));
        let sum2 = sum.clone();
        let payload = StagePayload::new(vec![Arc::new(move |e: &EventHandle| {
            sum2.fetch_add(e.number() + 1, Ordering::Relaxed);
            Ok(())
        })]);
        let mut batch = EventBatch::new();
        batch.push_back(pools.acquire(Level::Event, None).unwrap());
        batch.push_back(pools.acquire(Level::Event, None).unwrap());
        payload.apply(&batch).unwrap();
        assert_eq!(sum.load(Ordering::Relaxed), 0 + 1 + 1 + 1);
    }
}
