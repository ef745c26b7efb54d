//! Metrics collection. Grounded on the teacher's `utils/metrics.rs`
//! `Metrics` struct (bounded buffers behind a lock, a `reset`/`push_capped`
//! shape) generalized from sensor/actuator readings to arrow shot
//! statistics, and its `EventRecorder` (a timestamped event log) for the
//! windowed instantaneous-rate computation's timestamp source.

use crate::arrow::ShotResult;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LastStatus {
    None,
    KeepGoing,
    ComeBackLater,
    Finished,
    Error,
}

impl From<&ShotResult> for LastStatus {
    fn from(r: &ShotResult) -> Self {
        match r {
            ShotResult::KeepGoing => LastStatus::KeepGoing,
            ShotResult::ComeBackLater => LastStatus::ComeBackLater,
            ShotResult::Finished => LastStatus::Finished,
            ShotResult::Error(_) => LastStatus::Error,
        }
    }
}

/// Per-arrow accumulator: shot count, total elapsed time, total processed
/// event count, last status. Cheap to update from the worker's hot path --
/// plain atomics, no lock.
pub struct ArrowMetrics {
    shot_count: AtomicU64,
    total_elapsed_nanos: AtomicU64,
    total_processed: AtomicU64,
    last_status: Mutex<LastStatus>,
}

impl Default for ArrowMetrics {
    fn default() -> Self {
        ArrowMetrics {
            shot_count: AtomicU64::new(0),
            total_elapsed_nanos: AtomicU64::new(0),
            total_processed: AtomicU64::new(0),
            last_status: Mutex::new(LastStatus::None),
        }
    }
}

impl ArrowMetrics {
    pub fn record_shot(&self, elapsed: Duration, processed: u64) {
        self.shot_count.fetch_add(1, Ordering::Relaxed);
        self.total_elapsed_nanos
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
        self.total_processed.fetch_add(processed, Ordering::Relaxed);
    }

    pub fn record_status(&self, result: &ShotResult) {
        *self.last_status.lock() = LastStatus::from(result);
    }

    pub fn shot_count(&self) -> u64 {
        self.shot_count.load(Ordering::Relaxed)
    }

    pub fn total_elapsed(&self) -> Duration {
        Duration::from_nanos(self.total_elapsed_nanos.load(Ordering::Relaxed))
    }

    pub fn total_processed(&self) -> u64 {
        self.total_processed.load(Ordering::Relaxed)
    }

    pub fn last_status(&self) -> LastStatus {
        *self.last_status.lock()
    }

    pub fn reset(&self) {
        self.shot_count.store(0, Ordering::Relaxed);
        self.total_elapsed_nanos.store(0, Ordering::Relaxed);
        self.total_processed.store(0, Ordering::Relaxed);
        *self.last_status.lock() = LastStatus::None;
    }
}

/// A snapshot of one arrow's metrics, returned by
/// `ProcessingController::get_metrics`.
#[derive(Debug, Clone)]
pub struct ArrowSnapshot {
    pub name: String,
    pub thread_count: u32,
    pub pending: usize,
    pub shot_count: u64,
    pub total_cpu_time: Duration,
    pub total_processed: u64,
    pub last_status: LastStatus,
}

/// A timestamped counter log, capped at a bounded length, used to compute
/// the windowed instantaneous rate. Grounded on the teacher's
/// `EventRecorder`: a lock-free-ish timestamped ring the dashboard samples
/// for a moving rate.
struct RateWindow {
    window: Duration,
    samples: VecDeque<(Instant, u64)>,
}

impl RateWindow {
    fn new(window: Duration) -> Self {
        RateWindow {
            window,
            samples: VecDeque::new(),
        }
    }

    fn record(&mut self, now: Instant, cumulative: u64) {
        self.samples.push_back((now, cumulative));
        while let Some((t, _)) = self.samples.front() {
            if now.duration_since(*t) > self.window {
                self.samples.pop_front();
            } else {
                break;
            }
        }
    }

    fn rate(&self) -> f64 {
        let (Some(&(t0, c0)), Some(&(t1, c1))) = (self.samples.front(), self.samples.back()) else {
            return 0.0;
        };
        let dt = t1.duration_since(t0).as_secs_f64();
        if dt <= 0.0 {
            return 0.0;
        }
        (c1.saturating_sub(c0)) as f64 / dt
    }
}

/// Topology-wide aggregate: total events processed, integrated rate,
/// instantaneous rate over a configurable window (default ~0.5s).
pub struct TopologyMetrics {
    start: Mutex<Option<Instant>>,
    stop: Mutex<Option<Instant>>,
    rate_window: Mutex<RateWindow>,
}

impl TopologyMetrics {
    pub fn new(window: Duration) -> Self {
        TopologyMetrics {
            start: Mutex::new(None),
            stop: Mutex::new(None),
            rate_window: Mutex::new(RateWindow::new(window)),
        }
    }

    pub fn default_window() -> Duration {
        Duration::from_millis(500)
    }

    /// Called on `run()`.
    pub fn reset(&self) {
        *self.start.lock() = Some(Instant::now());
        *self.stop.lock() = None;
        *self.rate_window.lock() = RateWindow::new(self.rate_window.lock().window);
    }

    /// Called on `achieve_pause()`.
    pub fn stop(&self) {
        *self.stop.lock() = Some(Instant::now());
    }

    pub fn sample(&self, total_processed: u64) {
        self.rate_window.lock().record(Instant::now(), total_processed);
    }

    pub fn instantaneous_rate(&self) -> f64 {
        self.rate_window.lock().rate()
    }

    pub fn integrated_rate(&self, total_processed: u64) -> f64 {
        let start = match *self.start.lock() {
            Some(s) => s,
            None => return 0.0,
        };
        let end = self.stop.lock().unwrap_or_else(Instant::now);
        let elapsed = end.duration_since(start).as_secs_f64();
        if elapsed <= 0.0 {
            0.0
        } else {
            total_processed as f64 / elapsed
        }
    }
}

#[derive(Debug, Clone)]
pub struct TopologySnapshot {
    pub arrows: Vec<ArrowSnapshot>,
    pub total_events_processed: u64,
    pub integrated_rate: f64,
    pub instantaneous_rate: f64,
}
