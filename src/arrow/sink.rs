//! Sink arrow: pop up to `chunksize`, apply terminal processors, release to
//! pool. Grounded on `component_b/receiver.rs` and `multi_actuator.rs`'s
//! pop-and-apply-terminal-effect loop. Parallel only if the user-supplied
//! processor is reentrant; the builder defaults sinks to serial and lets
//! the embedder opt into parallel explicitly.

use crate::arrow::stage::EventProcessor;
use crate::error::EngineError;
use crate::event::EventBatch;
use std::sync::Arc;

pub struct SinkPayload {
    processors: Vec<Arc<dyn EventProcessor>>,
}

impl SinkPayload {
    pub fn new(processors: Vec<Arc<dyn EventProcessor>>) -> Self {
        SinkPayload { processors }
    }

    /// Apply every processor to every event, then let `batch` drop --
    /// releasing each handle back to its pool.
    pub fn apply(&self, batch: &EventBatch) -> Result<(), EngineError> {
        for event in batch {
            for processor in &self.processors {
                processor.process(event)?;
            }
        }
        Ok(())
    }
}
