//! # Causality
//!
//! Conflict detection for replicating row changes with concurrent apply-workers.
//!
//! Row changes are labelled with a causality group so that dependent changes
//! are serialized on one worker. When a change links two groups that are
//! already in flight, a conflict barrier is emitted ahead of it and all
//! workers drain before it is admitted.
//!
//! ```text
//! upstream decoder ──► causality worker ──► dispatcher ──► apply-workers
//!                      (single owner of      (routes by label,
//!                       the key relation)     drains on barrier)
//! ```

pub mod barrier;
pub mod causality;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod metrics;
pub mod model;
pub mod relation;
pub mod row;
pub mod worker;

// Re-export main types for convenience
pub use barrier::ConflictBarrier;
pub use causality::{Causality, CausalityStats, Step};
pub use config::{CausalityConfig, ConfigOverrides};
pub use dispatch::{DispatchStats, Dispatcher};
pub use error::{CausalityError, ConfigError};
pub use metrics::{CausalityMetrics, MetricsSink, MetricsSnapshot, NoopMetrics};
pub use model::{ChangeJob, FlushSeq, Job, JobKind};
pub use relation::CausalityRelation;
pub use row::{ChangeKind, RowChange, TableRef, UniqueIndex};
pub use worker::{causality_wrap, CausalityHandle};
