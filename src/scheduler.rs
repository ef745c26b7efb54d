//! The scheduler: the single mutator of arrow activation state and the
//! topology's own lifecycle status. Per the design notes ("concentrate all
//! mutation of activation state behind the scheduler mutex"), both the
//! per-arrow `status`/`thread_count`/`running_upstreams` fields and the
//! topology-level `current_status`/`running_arrow_count` counters are kept
//! here, guarded by one `parking_lot::Mutex`. Grounded on the shape of the
//! teacher's `SyncManager::Mutex` mode (one lock serializing a small state
//! transition) generalized to the round-robin arrow-selection algorithm
//! the spec asks for -- the round-robin dispatch itself has no teacher
//! analogue and is original engineering within that locking idiom.

use crate::arrow::{Arrow, ArrowKind, ArrowStatus, ShotResult};
use crate::error::EngineError;
use crate::metrics::TopologyMetrics;
use crate::queue::Queue;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopoStatus {
    Uninitialized,
    Running,
    Pausing,
    Draining,
    Paused,
    Finished,
}

struct SchedulerState {
    arrow_status: Vec<ArrowStatus>,
    thread_count: Vec<u32>,
    running_upstreams: Vec<usize>,
    next_idx: usize,
    topo_status: TopoStatus,
    running_arrow_count: usize,
    /// Sum of `thread_count` across all arrows. `achieve_pause` only fires
    /// once this reaches zero, so a pause request can't flip
    /// `current_status` to `Paused` while a worker is still mid-`execute` --
    /// `running_arrow_count == 0` alone isn't enough, since
    /// `request_pause` sets every arrow's status to `Paused` (and so
    /// `running_arrow_count` to 0) immediately, while in-flight shots are
    /// still draining their own thread_count back to zero.
    total_thread_count: u32,
    error: Option<EngineError>,
}

pub struct Scheduler {
    state: Mutex<SchedulerState>,
    pause_cv: Condvar,
    metrics: Arc<TopologyMetrics>,
}

fn pending(idx: usize, arrows: &[Arrow], queues: &[Queue]) -> usize {
    arrows[idx]
        .base
        .input_queues
        .iter()
        .map(|&q| queues[q].size())
        .sum()
}

impl Scheduler {
    pub fn new(arrow_count: usize, metrics: Arc<TopologyMetrics>) -> Self {
        Scheduler {
            state: Mutex::new(SchedulerState {
                arrow_status: vec![ArrowStatus::Unopened; arrow_count],
                thread_count: vec![0; arrow_count],
                running_upstreams: vec![0; arrow_count],
                next_idx: 0,
                topo_status: TopoStatus::Uninitialized,
                running_arrow_count: 0,
                total_thread_count: 0,
                error: None,
            }),
            pause_cv: Condvar::new(),
            metrics,
        }
    }

    pub fn topo_status(&self) -> TopoStatus {
        self.state.lock().topo_status
    }

    pub fn running_arrow_count(&self) -> usize {
        self.state.lock().running_arrow_count
    }

    pub fn arrow_status(&self, idx: usize) -> ArrowStatus {
        self.state.lock().arrow_status[idx]
    }

    pub fn thread_count(&self, idx: usize) -> u32 {
        self.state.lock().thread_count[idx]
    }

    pub fn take_error(&self) -> Option<EngineError> {
        self.state.lock().error.take()
    }

    pub fn initialize(&self) -> Result<(), EngineError> {
        let mut st = self.state.lock();
        if st.topo_status != TopoStatus::Uninitialized {
            return Err(EngineError::InvariantViolation(
                "initialize() called more than once".into(),
            ));
        }
        st.topo_status = TopoStatus::Paused;
        Ok(())
    }

    /// Marks every arrow `Running`, recomputes `running_upstreams` from
    /// wiring, seeds each queue's own `running_upstreams` counter from the
    /// arrows that write to it (the queue's counter is otherwise dead --
    /// nothing else sets it), and resets metrics. Returns an error for a
    /// zero-source topology; no-ops (logged) if already `Running` or
    /// `Finished`.
    pub fn run(&self, arrows: &[Arrow], queues: &[Queue]) -> Result<(), EngineError> {
        let mut st = self.state.lock();
        match st.topo_status {
            TopoStatus::Paused => {}
            TopoStatus::Running => {
                log::warn!("run() called while already Running; ignoring");
                return Ok(());
            }
            TopoStatus::Finished => {
                log::warn!("run() called after Finished; ignoring");
                return Ok(());
            }
            other => {
                return Err(EngineError::InvariantViolation(format!(
                    "run() called from invalid state {other:?}"
                )))
            }
        }
        if !arrows.iter().any(|a| a.kind() == ArrowKind::Source) {
            return Err(EngineError::NoSources);
        }
        self.metrics.reset();
        for (idx, arrow) in arrows.iter().enumerate() {
            st.arrow_status[idx] = ArrowStatus::Running;
            st.running_upstreams[idx] = arrow.base.upstream.len();
        }
        st.running_arrow_count = arrows.len();
        st.next_idx = 0;
        st.topo_status = TopoStatus::Running;

        let mut queue_producers = vec![0usize; queues.len()];
        for arrow in arrows {
            for &q in &arrow.base.output_queues {
                queue_producers[q] += 1;
            }
        }
        for (q, count) in queue_producers.into_iter().enumerate() {
            queues[q].set_running_upstreams(count);
        }
        Ok(())
    }

    pub fn request_pause(&self, arrows: &[Arrow], queues: &[Queue]) {
        let mut st = self.state.lock();
        if st.topo_status != TopoStatus::Running {
            return;
        }
        for (idx, status) in st.arrow_status.iter_mut().enumerate() {
            if *status == ArrowStatus::Running {
                for &q in &arrows[idx].base.output_queues {
                    queues[q].dec_running_upstreams();
                }
            }
            *status = ArrowStatus::Paused;
        }
        st.running_arrow_count = 0;
        st.topo_status = TopoStatus::Pausing;
        self.maybe_achieve_pause(&mut st);
    }

    /// Pauses only source arrows; everything else keeps running and drains
    /// naturally as `running_upstreams` reaches zero downstream.
    pub fn request_drain(&self, arrows: &[Arrow], queues: &[Queue]) {
        let mut st = self.state.lock();
        if st.topo_status != TopoStatus::Running {
            return;
        }
        for (idx, arrow) in arrows.iter().enumerate() {
            if arrow.kind() == ArrowKind::Source && st.arrow_status[idx] == ArrowStatus::Running {
                st.arrow_status[idx] = ArrowStatus::Paused;
                st.running_arrow_count = st.running_arrow_count.saturating_sub(1);
                for &d in &arrow.base.downstream {
                    st.running_upstreams[d] = st.running_upstreams[d].saturating_sub(1);
                }
                for &q in &arrow.base.output_queues {
                    queues[q].dec_running_upstreams();
                }
            }
        }
        st.topo_status = TopoStatus::Draining;
        self.maybe_achieve_pause(&mut st);
    }

    pub fn wait_until_paused(&self) {
        let mut st = self.state.lock();
        while !matches!(st.topo_status, TopoStatus::Paused | TopoStatus::Finished) {
            self.pause_cv.wait(&mut st);
        }
    }

    /// Marks the topology `Finished`. Called by the controller after
    /// `join()`, once every arrow's `finish()` has run.
    pub fn mark_finished(&self) {
        let mut st = self.state.lock();
        st.topo_status = TopoStatus::Finished;
        self.pause_cv.notify_all();
    }

    fn maybe_achieve_pause(&self, st: &mut SchedulerState) {
        if st.running_arrow_count == 0 && st.total_thread_count == 0 {
            if matches!(st.topo_status, TopoStatus::Running | TopoStatus::Pausing | TopoStatus::Draining) {
                self.metrics.stop();
                st.topo_status = TopoStatus::Paused;
                self.pause_cv.notify_all();
            }
        }
    }

    fn deactivate(&self, st: &mut SchedulerState, idx: usize, arrows: &[Arrow], queues: &[Queue]) {
        if st.arrow_status[idx] == ArrowStatus::Running {
            st.arrow_status[idx] = ArrowStatus::Paused;
            st.running_arrow_count = st.running_arrow_count.saturating_sub(1);
            for &q in &arrows[idx].base.output_queues {
                queues[q].dec_running_upstreams();
            }
        }
        for &d in &arrows[idx].base.downstream {
            st.running_upstreams[d] = st.running_upstreams[d].saturating_sub(1);
        }
    }

    fn mark_arrow_finished(&self, st: &mut SchedulerState, idx: usize, arrows: &[Arrow], queues: &[Queue]) {
        if st.arrow_status[idx] != ArrowStatus::Finished {
            if st.arrow_status[idx] == ArrowStatus::Running {
                st.running_arrow_count = st.running_arrow_count.saturating_sub(1);
                for &q in &arrows[idx].base.output_queues {
                    queues[q].dec_running_upstreams();
                }
            }
            st.arrow_status[idx] = ArrowStatus::Finished;
        }
        for &d in &arrows[idx].base.downstream {
            st.running_upstreams[d] = st.running_upstreams[d].saturating_sub(1);
        }
    }

    fn check_in(
        &self,
        st: &mut SchedulerState,
        idx: usize,
        result: &ShotResult,
        arrows: &[Arrow],
        queues: &[Queue],
    ) {
        if st.thread_count[idx] == 0 {
            debug_assert!(false, "check-in for arrow {idx} with thread_count already 0");
            crate::error::abort_in_mutex(format!(
                "check-in for arrow {idx} with thread_count already 0"
            ));
        }
        st.thread_count[idx] -= 1;
        st.total_thread_count = st.total_thread_count.saturating_sub(1);

        match result {
            ShotResult::Finished => self.mark_arrow_finished(st, idx, arrows, queues),
            ShotResult::Error(e) => {
                self.mark_arrow_finished(st, idx, arrows, queues);
                if st.error.is_none() {
                    st.error = Some(clone_error(e));
                }
                st.topo_status = TopoStatus::Finished;
            }
            ShotResult::KeepGoing | ShotResult::ComeBackLater => {
                let a = &arrows[idx].base;
                if st.arrow_status[idx] == ArrowStatus::Running
                    && a.kind != ArrowKind::Source
                    && st.running_upstreams[idx] == 0
                    && pending(idx, arrows, queues) == 0
                    && st.thread_count[idx] == 0
                {
                    self.deactivate(st, idx, arrows, queues);
                }
            }
        }

        self.maybe_achieve_pause(st);
    }

    /// `next_assignment(worker_id, returning_arrow, last_result) -> next_arrow | null`.
    /// `worker_id` isn't consulted by the selection algorithm (fairness is
    /// purely round-robin over arrows) but is accepted to match the public
    /// contract and for future per-worker diagnostics.
    pub fn next_assignment(
        &self,
        _worker_id: usize,
        returning: Option<(usize, ShotResult)>,
        arrows: &[Arrow],
        queues: &[Queue],
    ) -> Option<usize> {
        let mut st = self.state.lock();
        if let Some((idx, result)) = returning {
            self.check_in(&mut st, idx, &result, arrows, queues);
        }
        self.select(&mut st, arrows, queues)
    }

    /// Check-in only, no new selection. Used at worker shutdown.
    pub fn last_assignment(
        &self,
        _worker_id: usize,
        idx: usize,
        result: ShotResult,
        arrows: &[Arrow],
        queues: &[Queue],
    ) {
        let mut st = self.state.lock();
        self.check_in(&mut st, idx, &result, arrows, queues);
    }

    fn select(&self, st: &mut SchedulerState, arrows: &[Arrow], queues: &[Queue]) -> Option<usize> {
        if matches!(
            st.topo_status,
            TopoStatus::Paused | TopoStatus::Finished | TopoStatus::Uninitialized
        ) {
            return None;
        }

        let n = arrows.len();
        if n == 0 {
            return None;
        }

        for step in 0..n {
            let idx = (st.next_idx + step) % n;
            if st.arrow_status[idx] != ArrowStatus::Running {
                continue;
            }
            if !arrows[idx].is_parallel() && st.thread_count[idx] != 0 {
                continue;
            }
            let is_source = arrows[idx].kind() == ArrowKind::Source;
            let has_work = is_source || st.running_upstreams[idx] > 0 || pending(idx, arrows, queues) > 0;
            if has_work {
                st.next_idx = (idx + 1) % n;
                st.thread_count[idx] += 1;
                st.total_thread_count += 1;
                return Some(idx);
            } else {
                self.deactivate(st, idx, arrows, queues);
            }
        }

        self.maybe_achieve_pause(st);
        None
    }
}

fn clone_error(e: &EngineError) -> EngineError {
    // EngineError wraps a boxed dyn Error for UserException, which isn't
    // Clone; join() only needs the message, so re-render it as an
    // invariant-free string-carrying variant instead of requiring Clone on
    // every variant.
    EngineError::InvariantViolation(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrow::{
        Arrow, ArrowBase, ArrowKind, ArrowPayload, SourceControl, SourceGenerator, SourcePayload,
    };
    use crate::event::{EventBatch, EventPools, Level};
    use crate::queue::Queue;
    use std::sync::Arc;

    struct NeverEnds;
    impl SourceGenerator for NeverEnds {
        fn emit(
            &mut self,
            out: &mut EventBatch,
            pools: &EventPools,
            level: Level,
            _chunksize: usize,
            _control: &SourceControl,
        ) -> Result<crate::arrow::GeneratorSignal, EngineError> {
            if let Some(h) = pools.acquire(level, None) {
                out.push_back(h);
            }
            Ok(crate::arrow::GeneratorSignal::Produced)
        }
    }

    fn single_source_topology() -> (Vec<Arrow>, Vec<Queue>) {
        let pools = Arc::new(EventPools::new(10, 10, 10));
        let mut base = ArrowBase::new("src", ArrowKind::Source, 4);
        base.output_queues.push(0);
        let payload = ArrowPayload::Source(SourcePayload::new(Box::new(NeverEnds), Level::Event));
        let arrow = Arrow::new(base, payload, Some(pools));
        (vec![arrow], vec![Queue::new(16)])
    }

    #[test]
    fn run_requires_at_least_one_source() {
        let metrics = Arc::new(TopologyMetrics::new(TopologyMetrics::default_window()));
        let sched = Scheduler::new(0, metrics);
        sched.initialize().unwrap();
        assert!(matches!(sched.run(&[], &[]), Err(EngineError::NoSources)));
    }

    #[test]
    fn selects_source_round_robin() {
        let (arrows, queues) = single_source_topology();
        let metrics = Arc::new(TopologyMetrics::new(TopologyMetrics::default_window()));
        let sched = Scheduler::new(arrows.len(), metrics);
        sched.initialize().unwrap();
        sched.run(&arrows, &queues).unwrap();
        let assigned = sched.next_assignment(0, None, &arrows, &queues);
        assert_eq!(assigned, Some(0));
        assert_eq!(sched.thread_count(0), 1);
    }

    #[test]
    fn request_pause_prevents_new_selection_after_checkin() {
        let (arrows, queues) = single_source_topology();
        let metrics = Arc::new(TopologyMetrics::new(TopologyMetrics::default_window()));
        let sched = Scheduler::new(arrows.len(), metrics);
        sched.initialize().unwrap();
        sched.run(&arrows, &queues).unwrap();
        let idx = sched.next_assignment(0, None, &arrows, &queues).unwrap();
        sched.request_pause(&arrows, &queues);
        // still "in flight": total_thread_count > 0, so not Paused yet.
        assert_eq!(sched.topo_status(), TopoStatus::Pausing);
        let next = sched.next_assignment(0, Some((idx, ShotResult::KeepGoing)), &arrows, &queues);
        assert!(next.is_none());
        assert_eq!(sched.topo_status(), TopoStatus::Paused);
    }
}
