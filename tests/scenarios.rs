//! End-to-end scenarios built from whole topologies, exercising the engine
//! through `ProcessingController` the way an embedder would rather than
//! through any single module's internals.

use arrow_engine::arrow::{
    Arrow, ArrowBase, ArrowKind, ArrowPayload, ChildNumberFn, EventProcessor, GeneratorSignal,
    SinkPayload, SourceControl, SourceGenerator, SourcePayload, UnfoldStep, UnfolderLogic,
    UnfolderPayload,
};
use arrow_engine::event::{EventBatch, EventHandle, EventPools, Level};
use arrow_engine::queue::Queue;
use arrow_engine::topology::Topology;
use arrow_engine::ProcessingController;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct BoundedSource {
    remaining: u64,
}

impl SourceGenerator for BoundedSource {
    fn emit(
        &mut self,
        out: &mut EventBatch,
        pools: &EventPools,
        level: Level,
        chunksize: usize,
        _control: &SourceControl,
    ) -> Result<GeneratorSignal, arrow_engine::EngineError> {
        if self.remaining == 0 {
            return Ok(GeneratorSignal::NoMoreEvents);
        }
        let take = chunksize.min(self.remaining as usize);
        for _ in 0..take {
            match pools.acquire(level, None) {
                Some(h) => out.push_back(h),
                None => break,
            }
        }
        self.remaining -= out.len() as u64;
        Ok(GeneratorSignal::Produced)
    }
}

struct CountingSink {
    count: Arc<AtomicU64>,
}

impl EventProcessor for CountingSink {
    fn process(&self, _event: &EventHandle) -> Result<(), arrow_engine::EngineError> {
        self.count.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

fn source_sink_topology(
    generator: Box<dyn SourceGenerator>,
) -> (Topology, Arc<AtomicU64>) {
    let pools = Arc::new(EventPools::new(64, 64, 64));
    let processed = Arc::new(AtomicU64::new(0));

    let mut src_base = ArrowBase::new("source", ArrowKind::Source, 4);
    src_base.output_queues.push(0);
    let src = Arrow::new(
        src_base,
        ArrowPayload::Source(SourcePayload::new(generator, Level::Event)),
        Some(pools),
    );

    let mut sink_base = ArrowBase::new("sink", ArrowKind::Sink, 4);
    sink_base.input_queues.push(0);
    sink_base.upstream.push(0);
    let sink = Arrow::new(
        sink_base,
        ArrowPayload::Sink(SinkPayload::new(vec![Arc::new(CountingSink {
            count: processed.clone(),
        })])),
        None,
    );

    let mut arrows = vec![src, sink];
    arrows[0].base.downstream.push(1);
    (Topology::new(arrows, vec![Queue::new(256)]), processed)
}

/// S1: a source that emits exactly 10 events, a counting sink, run to
/// completion. processed_count == 10, finish called exactly once per arrow,
/// events_processed == 10.
#[test]
fn s1_bounded_source_drains_to_completion() {
    let (topology, processed) = source_sink_topology(Box::new(BoundedSource { remaining: 10 }));
    let controller = ProcessingController::new(topology);
    controller.initialize().unwrap();
    controller.run(2).unwrap();
    controller.wait_until_paused();
    controller.request_stop(false);
    controller.join().unwrap();

    assert_eq!(processed.load(Ordering::Relaxed), 10);
    let snapshot = controller.get_metrics();
    assert_eq!(snapshot.total_events_processed, 10);
    assert!(controller.topology().any_arrow_finished());
}

struct UnboundedSource;

impl SourceGenerator for UnboundedSource {
    fn emit(
        &mut self,
        out: &mut EventBatch,
        pools: &EventPools,
        level: Level,
        _chunksize: usize,
        _control: &SourceControl,
    ) -> Result<GeneratorSignal, arrow_engine::EngineError> {
        spin_sleep::sleep(Duration::from_millis(2));
        match pools.acquire(level, None) {
            Some(h) => {
                out.push_back(h);
                Ok(GeneratorSignal::Produced)
            }
            None => Ok(GeneratorSignal::TryAgainLater),
        }
    }
}

/// S2: an unbounded periodic source, run non-blocking, let it emit for a
/// while, then quit with drain. event_count > 0, finish called once,
/// events_processed == event_count.
#[test]
fn s2_quit_with_drain_stops_cleanly() {
    let (topology, processed) = source_sink_topology(Box::new(UnboundedSource));
    let controller = ProcessingController::new(topology);
    controller.initialize().unwrap();
    controller.run(2).unwrap();

    std::thread::sleep(Duration::from_millis(30));
    controller.request_stop(true);
    controller.wait_until_paused();
    controller.join().unwrap();

    let event_count = processed.load(Ordering::Relaxed);
    assert!(event_count > 0);
    let snapshot = controller.get_metrics();
    assert_eq!(snapshot.total_events_processed, event_count);
}

struct QuitOnOpen;

impl SourceGenerator for QuitOnOpen {
    fn open(&mut self, control: &SourceControl) -> Result<(), arrow_engine::EngineError> {
        control.request_quit(true);
        Ok(())
    }

    fn emit(
        &mut self,
        out: &mut EventBatch,
        pools: &EventPools,
        level: Level,
        _chunksize: usize,
        _control: &SourceControl,
    ) -> Result<GeneratorSignal, arrow_engine::EngineError> {
        // Never legitimately reached once Quit is honored, but defined for
        // completeness in case the worker observes the flag a shot late.
        let _ = pools.acquire(level, None);
        let _ = out;
        Ok(GeneratorSignal::NoMoreEvents)
    }
}

/// S3: a source that requests Quit(drain=true) from inside `open()`. No
/// events should ever be emitted or processed, and the topology must reach
/// `Paused` without any shot having produced an event.
#[test]
fn s3_quit_requested_in_open_emits_nothing() {
    let (topology, processed) = source_sink_topology(Box::new(QuitOnOpen));
    let controller = ProcessingController::new(topology);
    controller.initialize().unwrap();
    controller.run(4).unwrap();
    controller.wait_until_paused();

    assert_eq!(processed.load(Ordering::Relaxed), 0);
    assert_eq!(controller.status(), arrow_engine::scheduler::TopoStatus::Paused);

    controller.request_stop(false);
    controller.join().unwrap();
}

struct PauseOnFourthEmit {
    calls: Arc<AtomicU64>,
}

impl SourceGenerator for PauseOnFourthEmit {
    fn emit(
        &mut self,
        out: &mut EventBatch,
        pools: &EventPools,
        level: Level,
        _chunksize: usize,
        control: &SourceControl,
    ) -> Result<GeneratorSignal, arrow_engine::EngineError> {
        let n = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some(h) = pools.acquire(level, None) {
            out.push_back(h);
        }
        if n == 4 {
            control.request_pause();
        }
        Ok(GeneratorSignal::Produced)
    }
}

/// S4: a source that requests Pause(drain=false) on its 4th emit call.
/// Exactly 4 events emitted, at most 4 processed, and the topology pauses
/// rather than finishing (finalization never runs from a plain pause).
#[test]
fn s4_pause_requested_mid_stream_stops_after_fourth_emit() {
    let calls = Arc::new(AtomicU64::new(0));
    let (topology, processed) = source_sink_topology(Box::new(PauseOnFourthEmit {
        calls: calls.clone(),
    }));
    let controller = ProcessingController::new(topology);
    controller.initialize().unwrap();
    controller.run(1).unwrap();
    controller.wait_until_paused();

    assert_eq!(calls.load(Ordering::Relaxed), 4);
    assert!(processed.load(Ordering::Relaxed) <= 4);
    assert_eq!(controller.status(), arrow_engine::scheduler::TopoStatus::Paused);

    // Pausing (not stopping) must not have run finalization.
    assert!(!controller.topology().any_arrow_finished());
    controller.request_stop(false);
    controller.join().unwrap();
}

struct TwoParentSource {
    numbers: Vec<u64>,
    idx: usize,
}

impl SourceGenerator for TwoParentSource {
    fn emit(
        &mut self,
        out: &mut EventBatch,
        pools: &EventPools,
        level: Level,
        _chunksize: usize,
        _control: &SourceControl,
    ) -> Result<GeneratorSignal, arrow_engine::EngineError> {
        if self.idx >= self.numbers.len() {
            return Ok(GeneratorSignal::NoMoreEvents);
        }
        let n = self.numbers[self.idx];
        self.idx += 1;
        match pools.acquire_numbered(level, n, None) {
            Some(h) => {
                out.push_back(h);
                Ok(GeneratorSignal::Produced)
            }
            None => Ok(GeneratorSignal::TryAgainLater),
        }
    }
}

struct ThreeChildrenPerParent;

impl UnfolderLogic for ThreeChildrenPerParent {
    fn unfold(
        &self,
        _parent: &EventHandle,
        _child: &EventHandle,
        iter: usize,
    ) -> Result<UnfoldStep, arrow_engine::EngineError> {
        if iter >= 2 {
            Ok(UnfoldStep::Finished)
        } else {
            Ok(UnfoldStep::KeepGoing)
        }
    }
}

/// S5: an unfolder over two parents (17, 28), 3 iterations each, child pool
/// capacity 5. Child numbers must be exactly [117, 118, 119, 128, 129, 130],
/// all at `Event` level; parents stay at `Timeslice`.
#[test]
fn s5_unfolder_produces_deterministic_child_numbers() {
    let pools = Arc::new(EventPools::new(8, 5, 8));
    let collected = Arc::new(std::sync::Mutex::new(Vec::<u64>::new()));

    let mut src_base = ArrowBase::new("parents", ArrowKind::Source, 1);
    src_base.output_queues.push(0);
    let src = Arrow::new(
        src_base,
        ArrowPayload::Source(SourcePayload::new(
            Box::new(TwoParentSource {
                numbers: vec![17, 28],
                idx: 0,
            }),
            Level::Timeslice,
        )),
        Some(pools.clone()),
    );

    let mut unfolder_base = ArrowBase::new("unfolder", ArrowKind::Unfolder, 1);
    unfolder_base.input_queues.push(0);
    unfolder_base.output_queues.push(1);
    unfolder_base.upstream.push(0);
    let child_number: ChildNumberFn =
        Box::new(|parent: &EventHandle, iter: usize| 100 + parent.number() + iter as u64);
    let unfolder = Arrow::new(
        unfolder_base,
        ArrowPayload::Unfolder(UnfolderPayload::new(
            Box::new(ThreeChildrenPerParent),
            Level::Event,
            Some(child_number),
        )),
        Some(pools),
    );

    let sink_collected = collected.clone();
    let mut sink_base = ArrowBase::new("child-sink", ArrowKind::Sink, 1);
    sink_base.input_queues.push(1);
    sink_base.upstream.push(1);
    let sink = Arrow::new(
        sink_base,
        ArrowPayload::Sink(SinkPayload::new(vec![Arc::new(move |e: &EventHandle| {
            assert_eq!(e.level(), Level::Event);
            sink_collected.lock().unwrap().push(e.number());
            Ok(())
        })])),
        None,
    );

    let mut arrows = vec![src, unfolder, sink];
    arrows[0].base.downstream.push(1);
    arrows[1].base.downstream.push(2);
    let queues = vec![Queue::new(8), Queue::new(8)];
    let topology = Topology::new(arrows, queues);

    let controller = ProcessingController::new(topology);
    controller.initialize().unwrap();
    controller.run(1).unwrap();
    controller.wait_until_paused();
    controller.request_stop(false);
    controller.join().unwrap();

    let mut numbers = collected.lock().unwrap().clone();
    numbers.sort_unstable();
    assert_eq!(numbers, vec![117, 118, 119, 128, 129, 130]);
}

/// S6: scaling the worker pool up and back down while an unbounded source
/// keeps running must not lose events, the pool must actually resize, and
/// the instantaneous rate must stay positive throughout (not just at the
/// very end), per the scenario's "instantaneous_rate > 0 throughout" clause.
#[test]
fn s6_scaling_worker_pool_preserves_throughput() {
    let (topology, processed) = source_sink_topology(Box::new(UnboundedSource));
    let controller = ProcessingController::new(topology);
    controller.initialize().unwrap();
    controller.run(1).unwrap();
    assert_eq!(controller.worker_count(), 1);
    // instantaneous_rate is a windowed derivative: it needs two samples
    // spread over time before it reads non-zero, so sample, wait, sample.
    let rate_after = |controller: &ProcessingController| {
        controller.get_metrics();
        std::thread::sleep(Duration::from_millis(10));
        controller.get_metrics().instantaneous_rate
    };
    assert!(rate_after(&controller) > 0.0);

    controller.scale(4);
    assert_eq!(controller.worker_count(), 4);
    std::thread::sleep(Duration::from_millis(30));
    let mid_count = processed.load(Ordering::Relaxed);
    assert!(mid_count > 0);
    assert!(rate_after(&controller) > 0.0);

    controller.scale(1);
    assert_eq!(controller.worker_count(), 1);
    assert!(rate_after(&controller) > 0.0);

    controller.request_stop(true);
    controller.wait_until_paused();
    controller.join().unwrap();

    let final_count = processed.load(Ordering::Relaxed);
    assert!(final_count >= mid_count);
    let snapshot = controller.get_metrics();
    assert_eq!(snapshot.total_events_processed, final_count);
}
