//! Worker thread loop. Grounded on `main.rs`'s named `thread::spawn`
//! closures (`spawn_sensor`, `spawn_cpu_load`), joined at shutdown, and
//! `component_a/processor.rs`'s idle-sleep-on-empty-queue discipline
//! generalized from a single fixed sleep to a capped exponential backoff.

use crate::arrow::ShotResult;
use crate::topology::Topology;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const BACKOFF_FLOOR: Duration = Duration::from_millis(1);
const BACKOFF_CEILING: Duration = Duration::from_millis(8);

/// A worker's view of its own assignment history; owned by the pool for
/// the lifetime of the run, per the data model's "Worker record".
pub struct WorkerHandle {
    pub id: usize,
    thread: Option<std::thread::JoinHandle<()>>,
    exit_after_current_shot: Arc<AtomicBool>,
}

impl WorkerHandle {
    pub fn request_exit(&self) {
        self.exit_after_current_shot.store(true, Ordering::Release);
    }

    pub fn join(mut self) {
        if let Some(t) = self.thread.take() {
            let _ = t.join();
        }
    }
}

/// Spawns one worker thread. The loop mirrors the pseudocode in the
/// scheduler's contract exactly: request an assignment, execute it if
/// non-null, report back on the next request; back off when idle.
pub fn spawn(id: usize, topology: Arc<Topology>) -> WorkerHandle {
    let exit_after_current_shot = Arc::new(AtomicBool::new(false));
    let exit_flag = exit_after_current_shot.clone();

    let thread = std::thread::Builder::new()
        .name(format!("arrow-worker-{id}"))
        .spawn(move || run_loop(id, topology, exit_flag))
        .expect("failed to spawn worker thread");

    WorkerHandle {
        id,
        thread: Some(thread),
        exit_after_current_shot,
    }
}

fn run_loop(id: usize, topology: Arc<Topology>, exit_after_current_shot: Arc<AtomicBool>) {
    let mut returning: Option<(usize, ShotResult)> = None;
    let mut backoff = BACKOFF_FLOOR;

    loop {
        if exit_after_current_shot.load(Ordering::Acquire) {
            if let Some((idx, result)) = returning.take() {
                topology.last_assignment(id, idx, result);
            }
            return;
        }

        match topology.next_assignment(id, returning.take()) {
            None => {
                spin_sleep::sleep(backoff);
                backoff = (backoff * 2).min(BACKOFF_CEILING);
                continue;
            }
            Some(idx) => {
                backoff = BACKOFF_FLOOR;
                let result = topology.execute_shot(idx);
                topology.apply_pending_source_control(idx);
                returning = Some((idx, result));
            }
        }
    }
}
