//! Shared book-keeping every arrow variant carries, plus the small
//! vocabulary (`ArrowKind`, `ArrowStatus`, `ShotResult`) the scheduler and
//! metrics layer dispatch on.

use crate::error::EngineError;

/// Which of the five node shapes an arrow is. Doubles as the dot-export
/// category and the default `is_parallel` the builder picks when the
/// caller doesn't override it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrowKind {
    Source,
    Stage,
    Sink,
    Unfolder,
    Folder,
}

impl ArrowKind {
    pub fn default_is_parallel(self) -> bool {
        match self {
            ArrowKind::Source => false,
            ArrowKind::Stage => true,
            ArrowKind::Sink => false,
            ArrowKind::Unfolder => false,
            ArrowKind::Folder => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrowStatus {
    Unopened,
    Running,
    Paused,
    Finished,
}

/// Outcome of one shot. `Error` carries the failure that will surface at
/// `join()`.
#[derive(Debug)]
pub enum ShotResult {
    KeepGoing,
    ComeBackLater,
    Finished,
    Error(EngineError),
}

/// Book-keeping shared by every arrow variant. Activation fields
/// (`status`, `thread_count`, `running_upstreams`) are NOT stored here --
/// per the shared-resource policy they live in the scheduler's own table so
/// that mutation is concentrated behind one mutex. `ArrowBase` carries only
/// the immutable shape of the node: name, kind, wiring.
pub struct ArrowBase {
    pub name: String,
    pub kind: ArrowKind,
    pub is_parallel: bool,
    pub chunksize: usize,
    /// Queue indices this arrow consumes from.
    pub input_queues: Vec<usize>,
    /// Queue indices this arrow produces to.
    pub output_queues: Vec<usize>,
    /// Arrow indices that read any of this arrow's output queues.
    pub downstream: Vec<usize>,
    /// Arrow indices that write any of this arrow's input queues.
    pub upstream: Vec<usize>,
}

impl ArrowBase {
    pub fn new(name: impl Into<String>, kind: ArrowKind, chunksize: usize) -> Self {
        ArrowBase {
            name: name.into(),
            is_parallel: kind.default_is_parallel(),
            kind,
            chunksize,
            input_queues: Vec::new(),
            output_queues: Vec::new(),
            downstream: Vec::new(),
            upstream: Vec::new(),
        }
    }
}
