//! Default constants for causality configuration.

/// Default capacity of the causality output channel.
/// This is the only backpressure point between the engine and the dispatcher.
pub const DEFAULT_QUEUE_SIZE: usize = 1024;

/// Default number of downstream apply-workers a conflict barrier waits for.
pub const DEFAULT_WORKER_COUNT: usize = 16;

/// Default task label (observability only).
pub const DEFAULT_TASK: &str = "task";

/// Default source label (observability only).
pub const DEFAULT_SOURCE_ID: &str = "source";

/// Environment variable prefix for configuration overrides.
pub const ENV_PREFIX: &str = "CAUSALITY_";
