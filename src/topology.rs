//! The dataflow graph itself: arrows, queues, and the lifecycle state
//! machine (delegated to the [`Scheduler`], which is the sole mutator of
//! activation state). Grounded on `main.rs`'s `run_simulation_internal`,
//! the one place in the teacher that owns every channel and spawns/joins
//! every stage -- generalized here from one fixed three-stage pipeline to
//! an arbitrary arrow graph built incrementally by the embedder.

use crate::arrow::{Arrow, ArrowKind};
use crate::error::EngineError;
use crate::metrics::{ArrowMetrics, ArrowSnapshot, LastStatus, TopologyMetrics, TopologySnapshot};
use crate::queue::Queue;
use crate::scheduler::{Scheduler, TopoStatus};
use std::sync::Arc;

pub struct Topology {
    pub(crate) arrows: Vec<Arrow>,
    pub(crate) queues: Vec<Queue>,
    arrow_metrics: Vec<ArrowMetrics>,
    topology_metrics: Arc<TopologyMetrics>,
    scheduler: Scheduler,
}

impl Topology {
    pub fn new(arrows: Vec<Arrow>, queues: Vec<Queue>) -> Self {
        let topology_metrics = Arc::new(TopologyMetrics::new(TopologyMetrics::default_window()));
        let arrow_metrics = arrows.iter().map(|_| ArrowMetrics::default()).collect();
        let scheduler = Scheduler::new(arrows.len(), topology_metrics.clone());
        Topology {
            arrows,
            queues,
            arrow_metrics,
            topology_metrics,
            scheduler,
        }
    }

    pub fn arrow_count(&self) -> usize {
        self.arrows.len()
    }

    pub fn status(&self) -> TopoStatus {
        self.scheduler.topo_status()
    }

    pub fn initialize(&self) -> Result<(), EngineError> {
        self.scheduler.initialize()
    }

    /// Marks all arrows `Running`. Named to match the state machine; worker
    /// scaling is the controller's job, not the topology's.
    pub fn run(&self) -> Result<(), EngineError> {
        self.scheduler.run(&self.arrows, &self.queues)
    }

    pub fn request_pause(&self) {
        self.scheduler.request_pause(&self.arrows, &self.queues);
    }

    pub fn request_drain(&self) {
        self.scheduler.request_drain(&self.arrows, &self.queues);
    }

    pub fn wait_until_paused(&self) {
        self.scheduler.wait_until_paused();
    }

    pub fn take_error(&self) -> Option<EngineError> {
        self.scheduler.take_error()
    }

    /// Runs each arrow's one-shot user finalization and marks the topology
    /// `Finished`. Idempotent (arrow-level `finish()` is idempotent, and
    /// calling this again after `Finished` just re-confirms the state).
    pub fn finish(&self) -> Result<(), EngineError> {
        for arrow in &self.arrows {
            arrow.finish()?;
        }
        self.scheduler.mark_finished();
        Ok(())
    }

    pub fn next_assignment(
        &self,
        worker_id: usize,
        returning: Option<(usize, crate::arrow::ShotResult)>,
    ) -> Option<usize> {
        self.scheduler
            .next_assignment(worker_id, returning, &self.arrows, &self.queues)
    }

    pub fn last_assignment(&self, worker_id: usize, idx: usize, result: crate::arrow::ShotResult) {
        self.scheduler
            .last_assignment(worker_id, idx, result, &self.arrows, &self.queues);
    }

    pub fn execute_shot(&self, idx: usize) -> crate::arrow::ShotResult {
        self.arrows[idx].execute(&self.queues, &self.arrow_metrics[idx])
    }

    /// Checks whether the arrow just executed is a source that asked, via
    /// its `SourceControl` handle, to quit or pause the whole topology, and
    /// applies the request if so. Called by the worker immediately after
    /// each shot, per the design note that such calls only ever set a flag
    /// read back on the next poll rather than mutating engine state
    /// synchronously from inside user code.
    pub fn apply_pending_source_control(&self, idx: usize) {
        match self.arrows[idx].poll_source_control() {
            Some(crate::arrow::SourceControlEvent::Quit { drain: true }) => self.request_drain(),
            Some(crate::arrow::SourceControlEvent::Quit { drain: false }) => self.request_pause(),
            Some(crate::arrow::SourceControlEvent::Pause) => self.request_pause(),
            None => {}
        }
    }

    pub fn sample_metrics(&self) {
        let total: u64 = self.arrow_metrics.iter().map(|m| m.total_processed()).sum();
        self.topology_metrics.sample(total);
    }

    pub fn snapshot(&self) -> TopologySnapshot {
        let arrows = self
            .arrows
            .iter()
            .zip(self.arrow_metrics.iter())
            .enumerate()
            .map(|(idx, (arrow, metrics))| ArrowSnapshot {
                name: arrow.name().to_string(),
                thread_count: self.scheduler.thread_count(idx),
                pending: arrow
                    .base
                    .input_queues
                    .iter()
                    .map(|&q| self.queues[q].size())
                    .sum(),
                shot_count: metrics.shot_count(),
                total_cpu_time: metrics.total_elapsed(),
                total_processed: metrics.total_processed(),
                last_status: metrics.last_status(),
            })
            .collect::<Vec<_>>();
        let total_events_processed: u64 = arrows.iter().map(|a| a.total_processed).sum();
        TopologySnapshot {
            integrated_rate: self.topology_metrics.integrated_rate(total_events_processed),
            instantaneous_rate: self.topology_metrics.instantaneous_rate(),
            total_events_processed,
            arrows,
        }
    }

    pub fn arrow_names_and_kinds(&self) -> Vec<(String, ArrowKind, bool)> {
        self.arrows
            .iter()
            .map(|a| (a.name().to_string(), a.kind(), a.is_parallel()))
            .collect()
    }

    /// Used by the `.dot` exporter: downstream indices and arrow names.
    pub fn edges(&self) -> Vec<(usize, usize)> {
        let mut edges = Vec::new();
        for (idx, arrow) in self.arrows.iter().enumerate() {
            for &d in &arrow.base.downstream {
                edges.push((idx, d));
            }
        }
        edges
    }

    pub fn arrow_metrics_for(&self, idx: usize) -> Option<LastStatus> {
        self.arrow_metrics.get(idx).map(|m| m.last_status())
    }

    /// True once at least one arrow's one-shot finalization has run.
    /// `finish()` runs it for every arrow at once, so this is really an
    /// all-or-nothing check, useful for asserting finalization has *not*
    /// happened after a pause (as opposed to a stop).
    pub fn any_arrow_finished(&self) -> bool {
        self.arrows.iter().any(|a| a.finish_called())
    }
}
