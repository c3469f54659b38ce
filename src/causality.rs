//! # Causality
//!
//! Detects cross-key dependencies between row changes.
//!
//! Changes are fanned out to apply-workers by their causality label, so
//! changes sharing a key are serialized on one worker. A table may carry
//! several unique keys though, and two changes that never share a key can
//! still depend on each other through a third. Take `t(a unique, b unique)`:
//!
//! - insert `(a=1, b=1)` goes to worker 1
//! - insert `(a=2, b=2)` goes to worker 2
//! - delete `(a=2, b=2)` goes to worker 2
//! - `update t set b=2 where a=1` depends on all of the above
//!
//! The update must not run until everything touching `(a=2, b=2)` is done.
//! Keys that have co-occurred in a change share a group label; when a change
//! bridges two different groups, a conflict barrier is emitted so that every
//! worker drains before the change is admitted, and the relation restarts
//! from scratch. This gives quiescent consistency without tracking the full
//! dependency graph.

use crate::error::CausalityError;
use crate::model::{FlushSeq, Job};
use crate::relation::CausalityRelation;
use tracing::debug;

/// Result of running one job through the causality state machine.
#[derive(Debug)]
pub enum Step {
    /// Forward the job unchanged or labelled.
    Forward(Job),
    /// Emit the barrier, then the job that triggered it.
    Conflict { barrier: Job, job: Job },
    /// The job was consumed internally.
    Consumed,
}

impl Step {
    /// Visit the output jobs of this step in emission order.
    pub fn emit<F, E>(self, mut f: F) -> Result<(), E>
    where
        F: FnMut(Job) -> Result<(), E>,
    {
        match self {
            Step::Forward(job) => f(job),
            Step::Conflict { barrier, job } => {
                f(barrier)?;
                f(job)
            }
            Step::Consumed => Ok(()),
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Step::Conflict { .. })
    }
}

/// Counters describing the work a causality instance has done.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CausalityStats {
    pub jobs: u64,
    pub changes: u64,
    pub conflicts: u64,
    pub flushes: u64,
    pub gcs: u64,
    /// Entries in the relation when the stats were taken
    pub relation_size: usize,
    pub generations: usize,
}

/// Single-owner causality state: the key relation plus barrier sizing.
#[derive(Debug)]
pub struct Causality {
    relation: CausalityRelation,
    worker_count: usize,
    stats: CausalityStats,
}

impl Causality {
    pub fn new(worker_count: usize) -> Self {
        Self {
            relation: CausalityRelation::new(),
            worker_count,
            stats: CausalityStats::default(),
        }
    }

    pub fn relation(&self) -> &CausalityRelation {
        &self.relation
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn stats(&self) -> CausalityStats {
        CausalityStats {
            relation_size: self.relation.len(),
            generations: self.relation.generation_count(),
            ..self.stats
        }
    }

    /// Run one job through the state machine.
    ///
    /// Flushes rotate the relation and are forwarded, gc jobs are consumed,
    /// and changes are labelled after conflict detection. A change that
    /// bridges two groups yields a barrier ahead of it and clears the relation.
    pub fn process(&mut self, job: Job) -> Result<Step, CausalityError> {
        self.stats.jobs += 1;
        match job {
            Job::Flush { seq } | Job::AsyncFlush { seq } => {
                self.stats.flushes += 1;
                self.relation.rotate(seq);
                Ok(Step::Forward(job))
            }
            Job::Gc { seq } => {
                self.stats.gcs += 1;
                self.gc(seq);
                Ok(Step::Consumed)
            }
            Job::Change(mut change) => {
                self.stats.changes += 1;
                let keys = change.change.causality_keys();

                let barrier = if self.detect_conflict(&keys) {
                    debug!(
                        keys = ?keys,
                        "causality key conflict, emitting conflict job to flush all workers"
                    );
                    self.stats.conflicts += 1;
                    self.relation.clear();
                    Some(Job::conflict(self.worker_count))
                } else {
                    None
                };

                change.queue_key = self.add(&keys)?;
                debug!(key = %change.queue_key, keys = ?keys, "assigned causality key");

                let job = Job::Change(change);
                Ok(match barrier {
                    Some(barrier) => Step::Conflict { barrier, job },
                    None => Step::Forward(job),
                })
            }
            // Barriers only originate here; one arriving from upstream passes through.
            Job::Conflict(_) => Ok(Step::Forward(job)),
        }
    }

    /// Whether `keys` resolve to more than one existing causality group.
    pub fn detect_conflict(&self, keys: &[String]) -> bool {
        if keys.is_empty() {
            return false;
        }

        let mut existing: Option<&str> = None;
        for key in keys {
            if let Some(group) = self.relation.get(key) {
                match existing {
                    Some(prev) if prev != group => return true,
                    _ => existing = Some(group),
                }
            }
        }
        false
    }

    /// Merge `keys` into one group and return its label.
    ///
    /// The label is the group of any already-known key, or else the first
    /// key. Unknown keys join that group in the current generation. An empty
    /// key set yields an empty label.
    ///
    /// Callers must run [`Causality::detect_conflict`] first: keys resolving to
    /// two different groups are refused rather than silently merged.
    pub fn add(&mut self, keys: &[String]) -> Result<String, CausalityError> {
        let Some(first) = keys.first() else {
            return Ok(String::new());
        };

        let mut selected: Option<&str> = None;
        let mut missing = Vec::new();
        for key in keys {
            match self.relation.get(key) {
                Some(group) => {
                    if selected.is_some_and(|prev| prev != group) {
                        return Err(CausalityError::UnresolvedConflict {
                            keys: keys.to_vec(),
                        });
                    }
                    selected = Some(group);
                }
                None => missing.push(key),
            }
        }
        let selected = selected.unwrap_or(first.as_str()).to_string();

        for key in missing {
            self.relation.set(key.as_str(), selected.as_str());
        }
        Ok(selected)
    }

    /// Reclaim relation generations covered by a durable flush.
    pub fn gc(&mut self, seq: FlushSeq) {
        self.relation.gc(seq);
    }

    /// Forget every relation.
    pub fn clear(&mut self) {
        self.relation.clear();
    }
}
