//! Multi-threaded dataflow execution engine for experimental-physics event
//! reduction: a bounded, statically-shaped graph of arrows evaluated by a
//! pool of symmetric workers pulling work through a cooperative scheduler.
//!
//! The public surface is intentionally small: construct a [`Topology`] out
//! of [`arrow::Arrow`]s and [`queue::Queue`]s, wrap it in a
//! [`controller::ProcessingController`], and drive it through
//! `initialize`/`run`/`scale`/`request_pause`/`request_stop`/`join`.

pub mod arrow;
pub mod cli;
pub mod controller;
pub mod error;
pub mod event;
pub mod export;
pub mod metrics;
pub mod params;
pub mod queue;
pub mod scheduler;
pub mod topology;
pub mod worker;

pub use controller::ProcessingController;
pub use error::{EngineError, EngineResult};
pub use event::{EventHandle, EventPools, Level};
pub use queue::Queue;
pub use topology::Topology;
