//! Source arrow: produces up to `chunksize` new events per shot from an
//! external generator. Grounded on `component_a/sensor.rs`'s periodic
//! generator pushing onto a bounded channel, generalized from a fixed
//! polling cadence to the engine's cooperative shot model (a source may
//! optionally still self-pace with `spin_sleep` between shots, but the
//! scheduler -- not the source -- decides when a shot happens).

use crate::error::EngineError;
use crate::event::{EventBatch, EventHandle, EventPools, Level};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// What a generator reports after attempting to produce events.
pub enum GeneratorSignal {
    /// Events were appended to the output batch (possibly zero if none were
    /// ready yet but more are expected soon -- treat as `TryAgainLater` in
    /// that case instead).
    Produced,
    /// Clean exhaustion. Per the open question in the design notes, this is
    /// handled identically whether it's signaled here or by returning
    /// `Produced` with a batch and then the next call reporting it: both
    /// paths funnel through [`finish_source_shot`].
    NoMoreEvents,
    /// The upstream input (e.g. a socket, a file) is temporarily empty.
    TryAgainLater,
}

/// User-supplied event generator. `open` runs once before the first shot;
/// calling `Pause`/`Quit` from inside `open` is legitimate (per the design
/// notes it must only set a flag observed by the scheduler on the next
/// poll, never synchronously mutate arrow status) -- the generator reports
/// this via the `control` handle rather than reaching into the engine.
pub trait SourceGenerator: Send {
    fn open(&mut self, control: &SourceControl) -> Result<(), EngineError> {
        let _ = control;
        Ok(())
    }

    fn emit(
        &mut self,
        out: &mut EventBatch,
        pools: &EventPools,
        level: Level,
        chunksize: usize,
        control: &SourceControl,
    ) -> Result<GeneratorSignal, EngineError>;

    /// One-shot user finalization, called from the arrow's `finish()`.
    fn close(&mut self) -> Result<(), EngineError> {
        Ok(())
    }
}

/// Flags a generator can set from `open()` or `emit()` without reaching
/// synchronously into scheduler state. The scheduler/controller reads these
/// on its next poll.
#[derive(Default)]
pub struct SourceControl {
    quit_requested: std::sync::atomic::AtomicBool,
    quit_drain: std::sync::atomic::AtomicBool,
    pause_requested: std::sync::atomic::AtomicBool,
}

impl SourceControl {
    pub fn request_quit(&self, drain: bool) {
        self.quit_requested.store(true, Ordering::Release);
        self.quit_drain.store(drain, Ordering::Release);
    }

    pub fn request_pause(&self) {
        self.pause_requested.store(true, Ordering::Release);
    }

    /// Consuming read: used by the worker's post-shot poll, which must
    /// translate the flag into a topology-level action exactly once.
    pub fn take_quit(&self) -> Option<bool> {
        if self.quit_requested.swap(false, Ordering::AcqRel) {
            Some(self.quit_drain.load(Ordering::Acquire))
        } else {
            None
        }
    }

    pub fn take_pause(&self) -> bool {
        self.pause_requested.swap(false, Ordering::AcqRel)
    }

    /// Non-consuming read: used inside `shot()` to short-circuit emitting
    /// further events once a quit/pause has been requested, without racing
    /// the worker's own consuming poll of the same flag.
    pub fn is_quit_or_pause_pending(&self) -> bool {
        self.quit_requested.load(Ordering::Acquire) || self.pause_requested.load(Ordering::Acquire)
    }

    /// Consuming read of whichever control event is pending, for the
    /// worker's post-shot poll. Quit takes priority over pause if somehow
    /// both were requested in the same shot.
    pub fn take_event(&self) -> Option<SourceControlEvent> {
        if let Some(drain) = self.take_quit() {
            return Some(SourceControlEvent::Quit { drain });
        }
        if self.take_pause() {
            return Some(SourceControlEvent::Pause);
        }
        None
    }
}

/// A request a source generator made via its [`SourceControl`] handle,
/// translated by the worker into a topology-level action on its next poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceControlEvent {
    Quit { drain: bool },
    Pause,
}

pub struct SourcePayload {
    generator: Mutex<Box<dyn SourceGenerator>>,
    pub control: Arc<SourceControl>,
    pub level: Level,
    opened: std::sync::atomic::AtomicBool,
    events_emitted: AtomicU64,
}

impl SourcePayload {
    pub fn new(generator: Box<dyn SourceGenerator>, level: Level) -> Self {
        SourcePayload {
            generator: Mutex::new(generator),
            control: Arc::new(SourceControl::default()),
            level,
            opened: std::sync::atomic::AtomicBool::new(false),
            events_emitted: AtomicU64::new(0),
        }
    }

    pub fn events_emitted(&self) -> u64 {
        self.events_emitted.load(Ordering::Relaxed)
    }

    pub fn ensure_open(&self) -> Result<(), EngineError> {
        if self
            .opened
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.generator.lock().open(&self.control)?;
        }
        Ok(())
    }

    /// One shot: ask the generator for up to `chunksize` events.
    ///
    /// `finish_source_shot` is the single choke point both exhaustion
    /// signals funnel through, so a partial batch produced right before
    /// exhaustion is always kept and counted identically regardless of
    /// which signal fired.
    pub fn shot(
        &self,
        pools: &EventPools,
        chunksize: usize,
    ) -> Result<(EventBatch, ShotOutcome), EngineError> {
        self.ensure_open()?;
        if self.control.is_quit_or_pause_pending() {
            return Ok((EventBatch::new(), ShotOutcome::ComeBackLater));
        }
        let mut out = EventBatch::new();
        let signal = self
            .generator
            .lock()
            .emit(&mut out, pools, self.level, chunksize, &self.control)?;
        self.events_emitted
            .fetch_add(out.len() as u64, Ordering::Relaxed);
        Ok(self.finish_source_shot(out, signal))
    }

    pub fn close(&self) -> Result<(), EngineError> {
        self.generator.lock().close()
    }

    fn finish_source_shot(
        &self,
        out: EventBatch,
        signal: GeneratorSignal,
    ) -> (EventBatch, ShotOutcome) {
        match signal {
            GeneratorSignal::Produced if !out.is_empty() => (out, ShotOutcome::KeepGoing),
            GeneratorSignal::Produced => (out, ShotOutcome::ComeBackLater),
            GeneratorSignal::NoMoreEvents => (out, ShotOutcome::Finished),
            GeneratorSignal::TryAgainLater => (out, ShotOutcome::ComeBackLater),
        }
    }
}

pub enum ShotOutcome {
    KeepGoing,
    ComeBackLater,
    Finished,
}
