//! Error taxonomy for the engine, propagated with `?` rather than panics
//! outside genuine invariant assertions.

use thiserror::Error;

/// The engine's unified error type.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Raised by user code inside an arrow shot.
    #[error("user exception in arrow `{arrow}`: {source}")]
    UserException {
        arrow: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// `initialize()` failed; aborts the run before workers start.
    #[error("initialization error in arrow `{arrow}`: {reason}")]
    InitializationError { arrow: String, reason: String },

    /// A worker shot exceeded its per-arrow timeout.
    #[error("arrow `{arrow}` timed out after {elapsed_ms}ms")]
    Timeout { arrow: String, elapsed_ms: u64 },

    /// An internal bug: an invariant the scheduler relies on did not hold.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// The topology has no source arrows registered.
    #[error("topology has no source arrows")]
    NoSources,

    /// Controller method requires a state the topology isn't in.
    #[error("invalid state transition: {0}")]
    InvalidState(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Invariant violation detected inside the scheduler mutex: log and abort.
///
/// Unwinding here would leave the scheduler mutex poisoned and the engine in
/// a half-locked state no caller could recover from, so this path never
/// returns.
pub fn abort_in_mutex(msg: impl AsRef<str>) -> ! {
    log::error!(target: "arrow_engine::scheduler", "invariant violation: {}", msg.as_ref());
    std::process::abort();
}
