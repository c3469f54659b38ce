//! # Dispatch
//!
//! Reference consumer of the causality output. Routes labelled changes to a
//! fixed set of apply-worker queues so that equal labels always land on the
//! same worker, broadcasts flushes, and turns conflict jobs into a full drain:
//! the barrier is handed to every worker and dispatch stops until all of them
//! have arrived. A barrier must be sized to this dispatcher's worker count.
//!
//! Workers are caller-owned; each one is expected to call
//! [`ConflictBarrier::arrive`](crate::barrier::ConflictBarrier::arrive) after
//! finishing every job it received before the barrier.

use crate::barrier::ConflictBarrier;
use crate::error::CausalityError;
use crate::model::Job;
use crossbeam_channel::{Receiver, Sender};
use rustc_hash::FxHasher;
use std::hash::{Hash, Hasher};
use tracing::{debug, instrument, warn};

/// Counters describing what a dispatcher routed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub changes: u64,
    pub unconstrained: u64,
    pub flushes: u64,
    pub barriers: u64,
    /// Changes routed to each worker
    pub per_worker: Vec<u64>,
}

/// Routes causality output to apply-worker queues.
pub struct Dispatcher {
    workers: Vec<Sender<Job>>,
    next_unconstrained: usize,
    stats: DispatchStats,
}

impl Dispatcher {
    pub fn new(workers: Vec<Sender<Job>>) -> Self {
        let per_worker = vec![0; workers.len()];
        Self {
            workers,
            next_unconstrained: 0,
            stats: DispatchStats {
                per_worker,
                ..DispatchStats::default()
            },
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    /// Worker index for a causality label.
    #[inline]
    pub fn worker_for_key(&self, queue_key: &str) -> usize {
        if self.workers.is_empty() {
            return 0;
        }
        let mut hasher = FxHasher::default();
        queue_key.hash(&mut hasher);
        (hasher.finish() as usize) % self.workers.len()
    }

    /// Route one job. Blocks on a conflict job until every worker has drained.
    pub fn dispatch(&mut self, job: Job) -> Result<(), CausalityError> {
        match job {
            Job::Change(change) => {
                if self.workers.is_empty() {
                    return Err(CausalityError::WorkerClosed { worker: 0 });
                }
                let worker = if change.is_unconstrained() {
                    self.stats.unconstrained += 1;
                    let worker = self.next_unconstrained % self.workers.len();
                    self.next_unconstrained = self.next_unconstrained.wrapping_add(1);
                    worker
                } else {
                    self.worker_for_key(&change.queue_key)
                };
                self.stats.changes += 1;
                self.stats.per_worker[worker] += 1;
                self.send(worker, Job::Change(change))
            }
            Job::Flush { .. } | Job::AsyncFlush { .. } => {
                self.stats.flushes += 1;
                self.broadcast(&job)
            }
            Job::Conflict(barrier) => {
                self.stats.barriers += 1;
                self.drain(barrier)
            }
            Job::Gc { seq } => {
                warn!(%seq, "gc job reached dispatcher, ignoring");
                Ok(())
            }
        }
    }

    /// Dispatch until the causality output closes.
    #[instrument(skip_all, level = "debug")]
    pub fn run(mut self, input: Receiver<Job>) -> Result<DispatchStats, CausalityError> {
        for job in input.iter() {
            self.dispatch(job)?;
        }
        debug!(changes = self.stats.changes, barriers = self.stats.barriers, "dispatch finished");
        Ok(self.stats)
    }

    fn drain(&self, barrier: ConflictBarrier) -> Result<(), CausalityError> {
        if barrier.worker_count() != self.workers.len() {
            return Err(CausalityError::BarrierMismatch {
                barrier: barrier.worker_count(),
                workers: self.workers.len(),
            });
        }
        debug!(workers = self.workers.len(), "conflict barrier, draining all workers");
        self.broadcast(&Job::Conflict(barrier.clone()))?;
        barrier.wait();
        Ok(())
    }

    fn broadcast(&self, job: &Job) -> Result<(), CausalityError> {
        for worker in 0..self.workers.len() {
            self.send(worker, job.clone())?;
        }
        Ok(())
    }

    fn send(&self, worker: usize, job: Job) -> Result<(), CausalityError> {
        self.workers[worker]
            .send(job)
            .map_err(|_| CausalityError::WorkerClosed { worker })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FlushSeq;
    use crate::row::{ChangeKind, RowChange, TableRef};
    use crossbeam_channel::unbounded;
    use std::thread;

    fn labelled(label: &str) -> Job {
        let mut job = Job::change(RowChange::with_keys(
            TableRef::new("db", "t"),
            ChangeKind::Insert,
            [label],
        ));
        if let Job::Change(change) = &mut job {
            change.queue_key = label.to_string();
        }
        job
    }

    #[test]
    fn test_equal_labels_route_to_same_worker() {
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..4).map(|_| unbounded()).unzip();
        let mut dispatcher = Dispatcher::new(senders);

        for _ in 0..3 {
            dispatcher.dispatch(labelled("a")).unwrap();
        }

        let target = dispatcher.worker_for_key("a");
        assert_eq!(receivers[target].len(), 3);
        assert_eq!(dispatcher.stats().per_worker[target], 3);
    }

    #[test]
    fn test_unconstrained_round_robin() {
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..3).map(|_| unbounded()).unzip();
        let mut dispatcher = Dispatcher::new(senders);

        for _ in 0..6 {
            dispatcher.dispatch(labelled("")).unwrap();
        }
        for rx in &receivers {
            assert_eq!(rx.len(), 2);
        }
        assert_eq!(dispatcher.stats().unconstrained, 6);
    }

    #[test]
    fn test_flush_broadcast() {
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..3).map(|_| unbounded()).unzip();
        let mut dispatcher = Dispatcher::new(senders);
        dispatcher.dispatch(Job::flush(FlushSeq(4))).unwrap();
        for rx in &receivers {
            assert_eq!(rx.try_recv().unwrap().flush_seq(), Some(FlushSeq(4)));
        }
    }

    #[test]
    fn test_conflict_waits_for_every_worker() {
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..2).map(|_| unbounded::<Job>()).unzip();
        let workers: Vec<_> = receivers
            .into_iter()
            .map(|rx| {
                thread::spawn(move || {
                    let mut seen = 0;
                    for job in rx.iter() {
                        if let Job::Conflict(barrier) = job {
                            barrier.arrive();
                        } else {
                            seen += 1;
                        }
                    }
                    seen
                })
            })
            .collect();

        let mut dispatcher = Dispatcher::new(senders);
        dispatcher.dispatch(labelled("x")).unwrap();
        let barrier = ConflictBarrier::new(2);
        dispatcher.dispatch(Job::Conflict(barrier.clone())).unwrap();
        assert!(barrier.is_released());
        drop(dispatcher);

        let seen: usize = workers.into_iter().map(|w| w.join().unwrap()).sum();
        assert_eq!(seen, 1);
    }

    #[test]
    fn test_undersized_barrier_is_rejected_before_broadcast() {
        let (senders, receivers): (Vec<_>, Vec<_>) = (0..4).map(|_| unbounded::<Job>()).unzip();
        let mut dispatcher = Dispatcher::new(senders);
        dispatcher.dispatch(labelled("busy")).unwrap();

        let barrier = ConflictBarrier::new(2);
        let result = dispatcher.dispatch(Job::Conflict(barrier.clone()));

        assert!(matches!(
            result,
            Err(CausalityError::BarrierMismatch { barrier: 2, workers: 4 })
        ));
        assert!(!barrier.is_released());
        let conflicts = receivers
            .iter()
            .flat_map(|rx| rx.try_iter())
            .filter(|job| matches!(job, Job::Conflict(_)))
            .count();
        assert_eq!(conflicts, 0);
    }

    #[test]
    fn test_oversized_barrier_does_not_block() {
        let (senders, _receivers): (Vec<_>, Vec<_>) = (0..4).map(|_| unbounded::<Job>()).unzip();
        let mut dispatcher = Dispatcher::new(senders);
        assert!(matches!(
            dispatcher.dispatch(Job::conflict(16)),
            Err(CausalityError::BarrierMismatch { barrier: 16, workers: 4 })
        ));
    }

    #[test]
    fn test_closed_worker_is_reported() {
        let (tx, rx) = unbounded();
        drop(rx);
        let mut dispatcher = Dispatcher::new(vec![tx]);
        assert!(matches!(
            dispatcher.dispatch(labelled("a")),
            Err(CausalityError::WorkerClosed { worker: 0 })
        ));
    }
}
