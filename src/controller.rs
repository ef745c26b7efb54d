//! `ProcessingController`: the engine's entire external control surface.
//! Grounded on `main.rs`'s `run_simulation_with_dashboard`/
//! `run_sweep_series` -- the one place in the teacher that owns run-level
//! lifecycle (start, wait on a condition, signal shutdown, join, export) --
//! generalized into a reusable façade instead of one inlined `fn main`.

use crate::error::EngineError;
use crate::metrics::TopologySnapshot;
use crate::scheduler::TopoStatus;
use crate::topology::Topology;
use crate::worker::{spawn, WorkerHandle};
use parking_lot::Mutex;
use std::sync::Arc;

pub struct ProcessingController {
    topology: Arc<Topology>,
    workers: Mutex<Vec<WorkerHandle>>,
    stop_requested: std::sync::atomic::AtomicBool,
}

impl ProcessingController {
    pub fn new(topology: Topology) -> Self {
        ProcessingController {
            topology: Arc::new(topology),
            workers: Mutex::new(Vec::new()),
            stop_requested: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn initialize(&self) -> Result<(), EngineError> {
        self.topology.initialize()
    }

    /// Idempotent: transitions the topology to `Running` and scales the
    /// worker pool to `nthreads` (0 defaults to the core count).
    pub fn run(&self, nthreads: usize) -> Result<(), EngineError> {
        self.topology.run()?;
        let nthreads = if nthreads == 0 { num_cpus::get() } else { nthreads };
        self.scale(nthreads);
        Ok(())
    }

    /// Grows or shrinks the worker pool while running. Shrinking asks
    /// excess workers to exit at their next check-in rather than killing
    /// them mid-shot.
    pub fn scale(&self, nthreads: usize) {
        let mut workers = self.workers.lock();
        while workers.len() < nthreads {
            let id = workers.len();
            workers.push(spawn(id, self.topology.clone()));
        }
        while workers.len() > nthreads {
            if let Some(w) = workers.pop() {
                w.request_exit();
                w.join();
            }
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.lock().len()
    }

    /// `drain = true` pauses only source arrows; otherwise every arrow
    /// freezes immediately. Non-blocking.
    pub fn request_pause(&self, drain: bool) {
        if drain {
            self.topology.request_drain();
        } else {
            self.topology.request_pause();
        }
    }

    /// `request_pause` plus a flag making `join()` call `finish()`
    /// afterwards.
    pub fn request_stop(&self, drain: bool) {
        self.stop_requested.store(true, std::sync::atomic::Ordering::Release);
        self.request_pause(drain);
    }

    pub fn wait_until_paused(&self) {
        self.topology.wait_until_paused();
    }

    /// Blocks until every worker has exited, then calls `finish()` iff
    /// `request_stop` was used. Workers poll the scheduler forever once the
    /// topology is `Paused` (`next_assignment` just keeps returning `null`),
    /// so every outstanding worker is asked to exit at its next check-in
    /// before we block on it, the same way `scale()`'s shrink path does.
    pub fn join(&self) -> Result<(), EngineError> {
        let workers = std::mem::take(&mut *self.workers.lock());
        for w in &workers {
            w.request_exit();
        }
        for w in workers {
            w.join();
        }
        if let Some(e) = self.topology.take_error() {
            return Err(e);
        }
        if self.stop_requested.load(std::sync::atomic::Ordering::Acquire) {
            self.topology.finish()?;
        }
        Ok(())
    }

    pub fn status(&self) -> TopoStatus {
        self.topology.status()
    }

    pub fn get_metrics(&self) -> TopologySnapshot {
        self.topology.sample_metrics();
        self.topology.snapshot()
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }
}
