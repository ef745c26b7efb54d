//! Arrow: the polymorphic dataflow node. One `ArrowBase` (shared wiring and
//! bookkeeping) plus one payload variant (`Source`/`Stage`/`Sink`/
//! `Unfolder`/`Folder`), dispatching `initialize`/`execute`/`finish` on the
//! payload. Per the design notes, activation state (`status`,
//! `thread_count`, `running_upstreams`) lives in the scheduler's table, not
//! here -- `Arrow` itself is immutable shape plus interior-mutable payload
//! state private to each variant.

pub mod base;
pub mod folder;
pub mod sink;
pub mod source;
pub mod stage;
pub mod unfolder;

pub use base::{ArrowBase, ArrowKind, ArrowStatus, ShotResult};
pub use folder::{FolderLogic, FolderPayload, FolderShot};
pub use sink::SinkPayload;
pub use source::{
    GeneratorSignal, SourceControl, SourceControlEvent, SourceGenerator, SourcePayload, ShotOutcome,
};
pub use stage::{EventProcessor, StagePayload};
pub use unfolder::{ChildNumberFn, UnfolderLogic, UnfolderPayload, UnfolderShot};

use crate::event::{EventBatch, EventPools};
use crate::metrics::ArrowMetrics;
use crate::queue::Queue;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

pub enum ArrowPayload {
    Source(SourcePayload),
    Stage(StagePayload),
    Sink(SinkPayload),
    Unfolder(UnfolderPayload),
    Folder(FolderPayload),
}

pub struct Arrow {
    pub base: ArrowBase,
    pub payload: ArrowPayload,
    /// Present for `Source` and `Unfolder` payloads, which mint new event
    /// handles; `None` for `Stage`/`Sink`/`Folder`, which only move handles
    /// already in circulation.
    pools: Option<Arc<EventPools>>,
    finished: AtomicBool,
    last_batch_len: AtomicUsize,
}

impl Arrow {
    pub fn new(base: ArrowBase, payload: ArrowPayload, pools: Option<Arc<EventPools>>) -> Self {
        Arrow {
            base,
            payload,
            pools,
            finished: AtomicBool::new(false),
            last_batch_len: AtomicUsize::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.base.name
    }

    pub fn kind(&self) -> ArrowKind {
        self.base.kind
    }

    pub fn is_parallel(&self) -> bool {
        self.base.is_parallel
    }

    /// One bounded shot. `queues` is the full topology queue table; the
    /// arrow reaches its own input/output queues via the indices recorded
    /// in `base`.
    pub fn execute(&self, queues: &[Queue], metrics: &ArrowMetrics) -> ShotResult {
        let started = std::time::Instant::now();
        let result = self.execute_inner(queues);
        metrics.record_shot(started.elapsed(), self.shot_processed_count(&result));
        metrics.record_status(&result);
        result
    }

    fn shot_processed_count(&self, result: &ShotResult) -> u64 {
        match result {
            ShotResult::Error(_) => 0,
            _ => self.last_batch_len.load(Ordering::Relaxed) as u64,
        }
    }

    fn execute_inner(&self, queues: &[Queue]) -> ShotResult {
        match &self.payload {
            ArrowPayload::Source(p) => self.execute_source(p, queues),
            ArrowPayload::Stage(p) => self.execute_stage(p, queues),
            ArrowPayload::Sink(p) => self.execute_sink(p, queues),
            ArrowPayload::Unfolder(p) => self.execute_unfolder(p, queues),
            ArrowPayload::Folder(p) => self.execute_folder(p, queues),
        }
    }

    fn execute_source(&self, p: &SourcePayload, queues: &[Queue]) -> ShotResult {
        let pools = match &self.pools {
            Some(pools) => pools,
            None => {
                return ShotResult::Error(crate::error::EngineError::InitializationError {
                    arrow: self.name().to_string(),
                    reason: "source arrow has no event pool attached".into(),
                })
            }
        };
        let shot = p.shot(pools, self.base.chunksize);
        match shot {
            Err(e) => ShotResult::Error(e),
            Ok((mut batch, outcome)) => {
                self.last_batch_len.store(batch.len(), Ordering::Relaxed);
                let out_queue = match self.base.output_queues.first() {
                    Some(idx) => &queues[*idx],
                    None => {
                        return ShotResult::Error(crate::error::EngineError::InvariantViolation(
                            format!("source `{}` has no output queue", self.name()),
                        ))
                    }
                };
                out_queue.try_push(&mut batch);
                // Events that didn't fit are dropped back to the pool via
                // Drop -- backpressure is visible to the caller as
                // ComeBackLater on the next shot since the queue stays full.
                match outcome {
                    ShotOutcome::Finished => ShotResult::Finished,
                    ShotOutcome::ComeBackLater if batch.is_empty() => ShotResult::KeepGoing,
                    ShotOutcome::ComeBackLater => ShotResult::ComeBackLater,
                    ShotOutcome::KeepGoing => ShotResult::KeepGoing,
                }
            }
        }
    }

    fn execute_stage(&self, p: &StagePayload, queues: &[Queue]) -> ShotResult {
        let in_idx = self.base.input_queues[0];
        let out_idx = self.base.output_queues[0];
        let mut batch = EventBatch::new();
        queues[in_idx].try_pop(&mut batch, self.base.chunksize);
        self.last_batch_len.store(batch.len(), Ordering::Relaxed);
        if batch.is_empty() {
            return if queues[in_idx].is_exhausted() {
                ShotResult::Finished
            } else {
                ShotResult::ComeBackLater
            };
        }
        if let Err(e) = p.apply(&batch) {
            return ShotResult::Error(e);
        }
        queues[out_idx].try_push(&mut batch);
        ShotResult::KeepGoing
    }

    fn execute_sink(&self, p: &SinkPayload, queues: &[Queue]) -> ShotResult {
        let in_idx = self.base.input_queues[0];
        let mut batch = EventBatch::new();
        queues[in_idx].try_pop(&mut batch, self.base.chunksize);
        self.last_batch_len.store(batch.len(), Ordering::Relaxed);
        if batch.is_empty() {
            return if queues[in_idx].is_exhausted() {
                ShotResult::Finished
            } else {
                ShotResult::ComeBackLater
            };
        }
        match p.apply(&batch) {
            Ok(()) => ShotResult::KeepGoing,
            Err(e) => ShotResult::Error(e),
        }
    }

    fn execute_unfolder(&self, p: &UnfolderPayload, queues: &[Queue]) -> ShotResult {
        let pools = match &self.pools {
            Some(pools) => pools,
            None => {
                return ShotResult::Error(crate::error::EngineError::InvariantViolation(
                    "unfolder has no event pool attached".into(),
                ))
            }
        };
        let in_idx = self.base.input_queues[0];
        let out_idx = self.base.output_queues[0];

        if !p.has_parent() {
            let mut batch = EventBatch::new();
            queues[in_idx].try_pop(&mut batch, 1);
            match batch.pop_front() {
                Some(parent) => {
                    if let Err(e) = p.begin_parent(parent) {
                        return ShotResult::Error(e);
                    }
                }
                None => {
                    self.last_batch_len.store(0, Ordering::Relaxed);
                    return if queues[in_idx].is_exhausted() {
                        ShotResult::Finished
                    } else {
                        ShotResult::ComeBackLater
                    };
                }
            }
        }

        match p.step(pools) {
            Ok(UnfolderShot::Child(child)) => {
                self.last_batch_len.store(1, Ordering::Relaxed);
                let mut batch = EventBatch::new();
                batch.push_back(child);
                queues[out_idx].try_push(&mut batch);
                ShotResult::KeepGoing
            }
            Ok(UnfolderShot::ChildAndParentDone(child, parent)) => {
                self.last_batch_len.store(1, Ordering::Relaxed);
                let mut batch = EventBatch::new();
                batch.push_back(child);
                queues[out_idx].try_push(&mut batch);
                drop(parent); // forwarded to a Folder by topology wiring, or released here if none
                ShotResult::KeepGoing
            }
            Ok(UnfolderShot::ComeBackLater) => {
                self.last_batch_len.store(0, Ordering::Relaxed);
                ShotResult::ComeBackLater
            }
            Err(e) => ShotResult::Error(e),
        }
    }

    fn execute_folder(&self, p: &FolderPayload, queues: &[Queue]) -> ShotResult {
        let in_idx = self.base.input_queues[0];
        let mut batch = EventBatch::new();
        queues[in_idx].try_pop(&mut batch, self.base.chunksize);
        if batch.is_empty() {
            self.last_batch_len.store(0, Ordering::Relaxed);
            return if queues[in_idx].is_exhausted() {
                ShotResult::Finished
            } else {
                ShotResult::ComeBackLater
            };
        }
        self.last_batch_len.store(batch.len(), Ordering::Relaxed);
        for child in batch {
            let parent = match child.parent() {
                Some(p) => p.clone(),
                None => {
                    return ShotResult::Error(crate::error::EngineError::InvariantViolation(
                        "folder received a child with no parent reference".into(),
                    ))
                }
            };
            match p.fold_child(&parent, &child) {
                Ok(FolderShot::Folded) => {}
                Ok(FolderShot::ParentDone(parent)) => drop(parent),
                Err(e) => return ShotResult::Error(e),
            }
        }
        ShotResult::KeepGoing
    }

    /// One-shot user finalization. Idempotent: a second call is a no-op.
    pub fn finish(&self) -> Result<(), crate::error::EngineError> {
        if self.finished.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if let ArrowPayload::Source(p) = &self.payload {
            p.close()?;
        }
        Ok(())
    }

    pub fn finish_called(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Drains a pending quit/pause request a source generator made via its
    /// `SourceControl` handle during the shot just executed. `None` for
    /// non-source payloads and whenever no request is pending.
    pub fn poll_source_control(&self) -> Option<SourceControlEvent> {
        match &self.payload {
            ArrowPayload::Source(p) => p.control.take_event(),
            _ => None,
        }
    }
}
