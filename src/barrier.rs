//! # Conflict Barrier
//!
//! Drain handshake carried by conflict jobs. The dispatcher hands the same
//! barrier to every apply-worker; each worker arrives once after finishing all
//! work it had accepted, and the dispatcher blocks until every worker arrived
//! before admitting the next job.

use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

struct BarrierState {
    remaining: Mutex<usize>,
    released: Condvar,
}

/// Countdown latch sized to the number of apply-workers.
#[derive(Clone)]
pub struct ConflictBarrier {
    state: Arc<BarrierState>,
    worker_count: usize,
}

impl ConflictBarrier {
    pub fn new(worker_count: usize) -> Self {
        Self {
            state: Arc::new(BarrierState {
                remaining: Mutex::new(worker_count),
                released: Condvar::new(),
            }),
            worker_count,
        }
    }

    /// Number of arrivals this barrier was sized for.
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Record that one worker has drained. Extra arrivals are ignored.
    pub fn arrive(&self) {
        let mut remaining = self.state.remaining.lock();
        if *remaining == 0 {
            return;
        }
        *remaining -= 1;
        if *remaining == 0 {
            self.state.released.notify_all();
        }
    }

    pub fn remaining(&self) -> usize {
        *self.state.remaining.lock()
    }

    pub fn is_released(&self) -> bool {
        self.remaining() == 0
    }

    /// Block until every worker has arrived.
    pub fn wait(&self) {
        let mut remaining = self.state.remaining.lock();
        while *remaining > 0 {
            self.state.released.wait(&mut remaining);
        }
    }

    /// Block until released or `timeout` elapses. Returns whether released.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut remaining = self.state.remaining.lock();
        while *remaining > 0 {
            if self
                .state
                .released
                .wait_until(&mut remaining, deadline)
                .timed_out()
            {
                return *remaining == 0;
            }
        }
        true
    }
}

impl fmt::Debug for ConflictBarrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConflictBarrier")
            .field("worker_count", &self.worker_count)
            .field("remaining", &self.remaining())
            .finish()
    }
}
