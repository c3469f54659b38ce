//! # Data Model
//!
//! Jobs flowing through the causality engine: labelled row changes,
//! checkpoint (flush) markers, reclamation markers, and synthesized conflict
//! barriers.

use crate::barrier::ConflictBarrier;
use crate::row::RowChange;
use std::fmt;

/// Checkpoint sequence number, monotonically increasing and supplied externally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FlushSeq(pub i64);

impl FlushSeq {
    /// Tag of a generation opened before any checkpoint was seen.
    pub const NONE: FlushSeq = FlushSeq(-1);
    /// Reclaim-everything sentinel.
    pub const MAX: FlushSeq = FlushSeq(i64::MAX);

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for FlushSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "F{}", self.0)
    }
}

impl From<i64> for FlushSeq {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/// Discriminant of a [`Job`], used for logging and routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    Change,
    Flush,
    AsyncFlush,
    Gc,
    Conflict,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Change => "change",
            JobKind::Flush => "flush",
            JobKind::AsyncFlush => "async_flush",
            JobKind::Gc => "gc",
            JobKind::Conflict => "conflict",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A row change plus the causality label the engine assigned to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeJob {
    pub change: RowChange,
    /// Causality group label. Empty means no tracked dependency.
    pub queue_key: String,
}

impl ChangeJob {
    pub fn new(change: RowChange) -> Self {
        Self {
            change,
            queue_key: String::new(),
        }
    }

    /// Whether this change may be dispatched without ordering constraints.
    pub fn is_unconstrained(&self) -> bool {
        self.queue_key.is_empty()
    }
}

/// Unit of work consumed and produced by the causality engine.
#[derive(Debug, Clone)]
pub enum Job {
    Change(ChangeJob),
    /// Durability boundary; rotates the relation and is forwarded downstream
    Flush { seq: FlushSeq },
    /// Asynchronous durability boundary, handled like `Flush`
    AsyncFlush { seq: FlushSeq },
    /// Reclaims causality history covered by `seq`; never forwarded
    Gc { seq: FlushSeq },
    /// Synthesized barrier; downstream must drain all workers before the next job
    Conflict(ConflictBarrier),
}

impl Job {
    pub fn change(change: RowChange) -> Self {
        Job::Change(ChangeJob::new(change))
    }

    pub fn flush(seq: FlushSeq) -> Self {
        Job::Flush { seq }
    }

    pub fn async_flush(seq: FlushSeq) -> Self {
        Job::AsyncFlush { seq }
    }

    pub fn gc(seq: FlushSeq) -> Self {
        Job::Gc { seq }
    }

    pub fn conflict(worker_count: usize) -> Self {
        Job::Conflict(ConflictBarrier::new(worker_count))
    }

    pub fn kind(&self) -> JobKind {
        match self {
            Job::Change(_) => JobKind::Change,
            Job::Flush { .. } => JobKind::Flush,
            Job::AsyncFlush { .. } => JobKind::AsyncFlush,
            Job::Gc { .. } => JobKind::Gc,
            Job::Conflict(_) => JobKind::Conflict,
        }
    }

    /// Checkpoint sequence carried by flush and gc jobs.
    pub fn flush_seq(&self) -> Option<FlushSeq> {
        match self {
            Job::Flush { seq } | Job::AsyncFlush { seq } | Job::Gc { seq } => Some(*seq),
            Job::Change(_) | Job::Conflict(_) => None,
        }
    }

    pub fn as_change(&self) -> Option<&ChangeJob> {
        match self {
            Job::Change(change) => Some(change),
            _ => None,
        }
    }

    /// Causality label of a change job.
    pub fn queue_key(&self) -> Option<&str> {
        self.as_change().map(|c| c.queue_key.as_str())
    }
}
