//! # Causality Metrics
//!
//! Side channel for observability. The engine reports the input queue depth
//! for every job it receives and the conflict-detection latency for every job
//! it forwards; none of it affects correctness.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Queue label under which the engine reports its input depth.
pub const CAUSALITY_INPUT_QUEUE: &str = "causality_input";

/// Number of exponential latency buckets (1µs, 2µs, 4µs, ... ~8.4s).
pub const LATENCY_BUCKETS: usize = 24;

/// Receiver of engine measurements.
pub trait MetricsSink: Send + Sync {
    /// Current depth of a named queue.
    fn set_queue_size(&self, task: &str, queue: &str, source: &str, size: usize);

    /// Time spent classifying one job, conflict detection and merge included.
    fn observe_conflict_detect_duration(&self, task: &str, source: &str, elapsed: Duration);
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn set_queue_size(&self, _task: &str, _queue: &str, _source: &str, _size: usize) {}

    fn observe_conflict_detect_duration(&self, _task: &str, _source: &str, _elapsed: Duration) {}
}

/// In-process sink backed by atomic counters.
#[derive(Debug)]
pub struct CausalityMetrics {
    queue_observations: AtomicU64,
    queue_depth: AtomicU64,
    max_queue_depth: AtomicU64,
    detect_count: AtomicU64,
    detect_nanos: AtomicU64,
    buckets: [AtomicU64; LATENCY_BUCKETS],
}

impl CausalityMetrics {
    pub fn new() -> Self {
        Self {
            queue_observations: AtomicU64::new(0),
            queue_depth: AtomicU64::new(0),
            max_queue_depth: AtomicU64::new(0),
            detect_count: AtomicU64::new(0),
            detect_nanos: AtomicU64::new(0),
            buckets: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }

    /// Index of the first bucket whose upper bound covers `elapsed`.
    fn bucket_for(elapsed: Duration) -> usize {
        let micros = elapsed.as_micros().max(1);
        let idx = (u128::BITS - (micros - 1).leading_zeros()) as usize;
        idx.min(LATENCY_BUCKETS - 1)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut latency_buckets = [0u64; LATENCY_BUCKETS];
        for (slot, bucket) in latency_buckets.iter_mut().zip(self.buckets.iter()) {
            *slot = bucket.load(Ordering::Relaxed);
        }
        MetricsSnapshot {
            queue_observations: self.queue_observations.load(Ordering::Relaxed),
            queue_depth: self.queue_depth.load(Ordering::Relaxed),
            max_queue_depth: self.max_queue_depth.load(Ordering::Relaxed),
            detect_count: self.detect_count.load(Ordering::Relaxed),
            detect_total: Duration::from_nanos(self.detect_nanos.load(Ordering::Relaxed)),
            latency_buckets,
        }
    }
}

impl Default for CausalityMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSink for CausalityMetrics {
    fn set_queue_size(&self, _task: &str, queue: &str, _source: &str, size: usize) {
        if queue != CAUSALITY_INPUT_QUEUE {
            return;
        }
        let size = size as u64;
        self.queue_observations.fetch_add(1, Ordering::Relaxed);
        self.queue_depth.store(size, Ordering::Relaxed);
        self.max_queue_depth.fetch_max(size, Ordering::Relaxed);
    }

    fn observe_conflict_detect_duration(&self, _task: &str, _source: &str, elapsed: Duration) {
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.detect_count.fetch_add(1, Ordering::Relaxed);
        self.detect_nanos.fetch_add(nanos, Ordering::Relaxed);
        self.buckets[Self::bucket_for(elapsed)].fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub queue_observations: u64,
    /// Most recently reported input depth
    pub queue_depth: u64,
    pub max_queue_depth: u64,
    pub detect_count: u64,
    pub detect_total: Duration,
    /// Bucket `i` counts observations in `(2^(i-1), 2^i]` microseconds
    pub latency_buckets: [u64; LATENCY_BUCKETS],
}

impl MetricsSnapshot {
    pub fn mean_detect_duration(&self) -> Option<Duration> {
        if self.detect_count == 0 {
            return None;
        }
        let count = u32::try_from(self.detect_count).unwrap_or(u32::MAX);
        Some(self.detect_total / count)
    }
}
