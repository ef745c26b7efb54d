//! CLI entry point: parses arguments, builds a topology from the requested
//! sources, and drives it to completion through [`ProcessingController`].
//!
//! The component model (what a "source specification" string actually
//! names) is an external collaborator per spec.md §1 -- the core treats
//! sources as opaque callbacks. This binary's own source implementations
//! below are the minimal demo embedding needed to make `arrow-engine`
//! runnable standalone, in the same spirit as the teacher's `main.rs`
//! wiring together a concrete sensor/processor/actuator pipeline.

use arrow_engine::arrow::{
    Arrow, ArrowBase, ArrowKind, ArrowPayload, EventProcessor, GeneratorSignal, SinkPayload,
    SourceControl, SourceGenerator, SourcePayload, StagePayload,
};
use arrow_engine::cli::{Cli, ExitCode};
use arrow_engine::error::EngineError;
use arrow_engine::event::{EventBatch, EventHandle, EventPools, Level};
use arrow_engine::params::ParameterService;
use arrow_engine::queue::Queue;
use arrow_engine::topology::Topology;
use arrow_engine::ProcessingController;
use clap::Parser;
use std::process::ExitCode as ProcessExitCode;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A source that emits `count` events and stops. Positional specs of the
/// form `count:N` select this generator for the demo binary.
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
    ) -> Result<GeneratorSignal, EngineError> {
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
        let produced = out.len() as u64;
        self.remaining -= produced;
        Ok(GeneratorSignal::Produced)
    }
}

/// A source that emits one event roughly every `period`, jittered by up to
/// 10% in either direction the way the teacher's sensor generator jitters
/// its readings, until its input pool is exhausted. Positional specs of the
/// form `periodic:MS` select this generator.
struct PeriodicSource {
    period: Duration,
}

impl SourceGenerator for PeriodicSource {
    fn open(&mut self, _control: &SourceControl) -> Result<(), EngineError> {
        Ok(())
    }

    fn emit(
        &mut self,
        out: &mut EventBatch,
        pools: &EventPools,
        level: Level,
        _chunksize: usize,
        _control: &SourceControl,
    ) -> Result<GeneratorSignal, EngineError> {
        let factor = rand::random_range(0.9..1.1);
        spin_sleep::sleep(self.period.mul_f64(factor));
        match pools.acquire(level, None) {
            Some(h) => {
                out.push_back(h);
                Ok(GeneratorSignal::Produced)
            }
            None => Ok(GeneratorSignal::TryAgainLater),
        }
    }
}

struct LoggingProcessor {
    counter: Arc<AtomicU64>,
}

impl EventProcessor for LoggingProcessor {
    fn process(&self, event: &EventHandle) -> Result<(), EngineError> {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        log::debug!(target: "arrow_engine::demo", "processed event {} (count={n})", event.number());
        Ok(())
    }
}

/// Wraps a generator so the sum of events it (and its siblings sharing the
/// same `remaining` counter) ever emits is capped at `NEVENTS`. Caps the
/// chunksize it hands the inner generator rather than truncating after the
/// fact, so a well-behaved generator never over-produces in the first place.
struct NEventsCapped {
    inner: Box<dyn SourceGenerator>,
    remaining: Arc<AtomicU64>,
}

impl SourceGenerator for NEventsCapped {
    fn open(&mut self, control: &SourceControl) -> Result<(), EngineError> {
        self.inner.open(control)
    }

    fn emit(
        &mut self,
        out: &mut EventBatch,
        pools: &EventPools,
        level: Level,
        chunksize: usize,
        control: &SourceControl,
    ) -> Result<GeneratorSignal, EngineError> {
        let remaining = self.remaining.load(Ordering::Acquire);
        if remaining == 0 {
            return Ok(GeneratorSignal::NoMoreEvents);
        }
        let capped_chunksize = chunksize.min(remaining as usize).max(1);
        let before = out.len();
        let signal = self.inner.emit(out, pools, level, capped_chunksize, control)?;
        let produced = (out.len() - before) as u64;
        if produced > 0 {
            self.remaining.fetch_sub(produced.min(remaining), Ordering::AcqRel);
        }
        Ok(signal)
    }

    fn close(&mut self) -> Result<(), EngineError> {
        self.inner.close()
    }
}

fn parse_source_spec(spec: &str) -> Box<dyn SourceGenerator> {
    if let Some(rest) = spec.strip_prefix("count:") {
        let count: u64 = rest.parse().unwrap_or(10);
        Box::new(BoundedSource { remaining: count })
    } else if let Some(rest) = spec.strip_prefix("periodic:") {
        let ms: u64 = rest.parse().unwrap_or(200);
        Box::new(PeriodicSource {
            period: Duration::from_millis(ms),
        })
    } else {
        log::warn!(target: "arrow_engine::demo", "unrecognized source spec `{spec}`, defaulting to count:10");
        Box::new(BoundedSource { remaining: 10 })
    }
}

fn build_topology(cli: &Cli, params: &ParameterService) -> (Topology, Arc<AtomicU64>) {
    let pools = Arc::new(EventPools::new(64, 1024, 256));
    let chunksize = params.event_source_chunksize();

    let specs: Vec<&str> = if cli.sources.is_empty() {
        vec!["count:10"]
    } else {
        cli.sources.iter().map(String::as_str).collect()
    };

    let mut arrows = Vec::new();
    let mut queues = Vec::new();
    let mut source_indices = Vec::new();

    // NEVENTS caps the total events emitted across every source combined
    // (0 = unlimited); all sources share one countdown so the cap holds
    // topology-wide rather than per-source.
    let nevents_remaining = match params.nevents() {
        0 => None,
        n => Some(Arc::new(AtomicU64::new(n))),
    };

    for spec in &specs {
        let mut generator = parse_source_spec(spec);
        if let Some(remaining) = &nevents_remaining {
            generator = Box::new(NEventsCapped {
                inner: generator,
                remaining: remaining.clone(),
            });
        }
        let mut base = ArrowBase::new(format!("source[{spec}]"), ArrowKind::Source, chunksize.max(1));
        let q_idx = queues.len();
        queues.push(Queue::new(256));
        base.output_queues.push(q_idx);
        let payload = ArrowPayload::Source(SourcePayload::new(generator, Level::Event));
        let idx = arrows.len();
        arrows.push(Arrow::new(base, payload, Some(pools.clone())));
        source_indices.push((idx, q_idx));
    }

    let processed = Arc::new(AtomicU64::new(0));
    let stage_output_idx = queues.len();
    queues.push(Queue::new(256));

    let mut stage_base = ArrowBase::new("log-stage", ArrowKind::Stage, chunksize.max(1).max(8));
    stage_base.output_queues.push(stage_output_idx);
    for &(src_idx, q_idx) in &source_indices {
        stage_base.input_queues.push(q_idx);
        stage_base.upstream.push(src_idx);
    }
    let stage_idx = arrows.len();
    for &(src_idx, _) in &source_indices {
        arrows[src_idx].base.downstream.push(stage_idx);
    }
    let stage_payload = ArrowPayload::Stage(StagePayload::new(vec![Arc::new(LoggingProcessor {
        counter: processed.clone(),
    })]));
    arrows.push(Arrow::new(stage_base, stage_payload, None));

    let mut sink_base = ArrowBase::new("count-sink", ArrowKind::Sink, chunksize.max(1).max(8));
    sink_base.input_queues.push(stage_output_idx);
    sink_base.upstream.push(stage_idx);
    arrows[stage_idx].base.downstream.push(arrows.len());
    let sink_payload = ArrowPayload::Sink(SinkPayload::new(Vec::new()));
    arrows.push(Arrow::new(sink_base, sink_payload, None));

    (Topology::new(arrows, queues), processed)
}

fn run() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    let params = ParameterService::new();
    cli.apply_params(&params);

    let (topology, _processed) = build_topology(&cli, &params);
    let controller = ProcessingController::new(topology);

    if let Err(e) = controller.initialize() {
        log::error!("initialization failed: {e}");
        return ExitCode::UnhandledException;
    }

    let nthreads = if params.nthreads() == 0 {
        num_cpus::get()
    } else {
        params.nthreads()
    };
    if let Err(e) = controller.run(nthreads) {
        log::error!("run failed: {e}");
        return ExitCode::UnhandledException;
    }

    controller.wait_until_paused();
    controller.request_stop(false);

    match controller.join() {
        Ok(()) => {
            let snapshot = controller.get_metrics();
            log::info!(
                "processed {} events, instantaneous_rate={:.2}/s",
                snapshot.total_events_processed,
                snapshot.instantaneous_rate
            );
            if cli.janadot {
                let dot = arrow_engine::export::dot::render(controller.topology(), &snapshot);
                println!("{dot}");
            }
            ExitCode::Success
        }
        Err(e) => {
            log::error!("run finished with error: {e}");
            ExitCode::UnhandledException
        }
    }
}

fn main() -> ProcessExitCode {
    match run() {
        ExitCode::Success => ProcessExitCode::from(0),
        ExitCode::UnhandledException => ProcessExitCode::from(1),
        ExitCode::Timeout => ProcessExitCode::from(2),
    }
}
