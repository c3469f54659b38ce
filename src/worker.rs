//! Background causality worker.
//!
//! One dedicated thread owns the [`Causality`] state and is its only mutator.
//! It drains the input channel in order, labels changes, and republishes jobs
//! on a bounded output channel; a full output blocks the loop, which is the
//! only backpressure. The loop ends when every input sender has been dropped
//! and the buffer is empty, and dropping its output sender closes the output.

use crate::causality::{Causality, CausalityStats};
use crate::config::CausalityConfig;
use crate::error::CausalityError;
use crate::metrics::{MetricsSink, CAUSALITY_INPUT_QUEUE};
use crate::model::{Job, JobKind};
use crossbeam_channel::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{info, info_span, warn};

/// Handle to a running causality worker.
pub struct CausalityHandle {
    output: Option<Receiver<Job>>,
    handle: Option<JoinHandle<Result<CausalityStats, CausalityError>>>,
}

impl CausalityHandle {
    /// Labelled jobs, in input order, with barriers inserted before conflicting changes.
    ///
    /// Returns `None` once the receiver has been taken.
    pub fn output(&self) -> Option<&Receiver<Job>> {
        self.output.as_ref()
    }

    /// Take ownership of the output receiver, e.g. to move it into a dispatcher thread.
    pub fn take_output(&mut self) -> Option<Receiver<Job>> {
        self.output.take()
    }

    /// Wait for the worker to finish and return its final counters.
    ///
    /// The worker only finishes after its input is closed, so close the input
    /// first. If the output receiver is still held here it is dropped, so a
    /// worker blocked on a full output fails with [`CausalityError::OutputClosed`]
    /// instead of hanging.
    pub fn join(mut self) -> Result<CausalityStats, CausalityError> {
        self.output.take();
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| CausalityError::WorkerPanicked)?,
            None => Err(CausalityError::WorkerPanicked),
        }
    }
}

/// Start a causality worker reading `input` and return its handle.
pub fn causality_wrap(
    input: Receiver<Job>,
    config: &CausalityConfig,
    metrics: Arc<dyn MetricsSink>,
) -> Result<CausalityHandle, CausalityError> {
    config.validate()?;

    let (tx, rx) = crossbeam_channel::bounded(config.queue_size);
    let worker = CausalityWorker {
        causality: Causality::new(config.worker_count),
        input,
        output: tx,
        metrics,
        task: config.task.clone(),
        source: config.source_id.clone(),
    };

    let handle = thread::Builder::new()
        .name(format!("causality-{}", config.task))
        .spawn(move || worker.run())
        .map_err(CausalityError::Spawn)?;

    Ok(CausalityHandle {
        output: Some(rx),
        handle: Some(handle),
    })
}

struct CausalityWorker {
    causality: Causality,
    input: Receiver<Job>,
    output: Sender<Job>,
    metrics: Arc<dyn MetricsSink>,
    task: String,
    source: String,
}

impl CausalityWorker {
    fn run(mut self) -> Result<CausalityStats, CausalityError> {
        let span = info_span!("causality", task = %self.task, source = %self.source);
        let _entered = span.enter();
        info!(worker_count = self.causality.worker_count(), "causality worker started");

        let result = self.run_loop();
        let stats = self.causality.stats();
        match &result {
            Ok(()) => info!(
                jobs = stats.jobs,
                conflicts = stats.conflicts,
                "causality worker stopped"
            ),
            Err(e) => warn!(error = %e, jobs = stats.jobs, "causality worker aborted"),
        }
        result.map(|()| stats)
    }

    fn run_loop(&mut self) -> Result<(), CausalityError> {
        for job in self.input.iter() {
            self.metrics.set_queue_size(
                &self.task,
                CAUSALITY_INPUT_QUEUE,
                &self.source,
                self.input.len(),
            );

            let start = Instant::now();
            let kind = job.kind();
            let step = self.causality.process(job)?;
            if kind != JobKind::Gc {
                self.metrics
                    .observe_conflict_detect_duration(&self.task, &self.source, start.elapsed());
            }

            let output = &self.output;
            step.emit(|out| output.send(out).map_err(|_| CausalityError::OutputClosed))?;
        }
        Ok(())
    }
}
