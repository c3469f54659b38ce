//! # Error Types
//!
//! Failures surfaced by the causality worker, the reference dispatcher, and
//! configuration loading. Conflict detection itself is not an error: a
//! conflict is an expected branch that produces a barrier job.

use std::io;

/// Errors returned by the causality engine and its downstream dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum CausalityError {
    /// The downstream receiver was dropped while jobs were still being produced.
    #[error("causality output channel closed by downstream consumer")]
    OutputClosed,

    /// An apply-worker queue was closed while the dispatcher still routed to it.
    #[error("apply worker {worker} queue closed")]
    WorkerClosed { worker: usize },
    /// A conflict barrier sized for a different number of apply-workers than
    /// the dispatcher drains; it would release early or never.
    #[error("conflict barrier sized for {barrier} workers, dispatcher has {workers}")]
    BarrierMismatch { barrier: usize, workers: usize },

    /// The merge step saw keys resolving to more than one existing group.
    ///
    /// Conflict detection must run (and clear the relation) before merging,
    /// so this only surfaces when that ordering is violated.
    #[error("keys resolve to distinct causality groups without a prior conflict check: {keys:?}")]
    UnresolvedConflict { keys: Vec<String> },

    /// The background worker thread could not be started.
    #[error("failed to spawn causality worker: {0}")]
    Spawn(#[source] io::Error),

    /// The background worker thread panicked.
    #[error("causality worker panicked")]
    WorkerPanicked,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A provider (file, environment) failed to load or extract.
    #[error("configuration error: {0}")]
    Load(String),

    /// A value loaded successfully but is not usable.
    #[error("invalid configuration for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl From<figment::Error> for ConfigError {
    fn from(e: figment::Error) -> Self {
        Self::Load(e.to_string())
    }
}
