//! Fans patient keys out over a bounded worker pool and owns the
//! termination protocol of the handoff channel.
//!
//! Every patient runs as its own task; a semaphore caps how many convert at
//! once. The scheduler always publishes the termination sentinel exactly
//! once, after the pool has fully drained, regardless of how many workers
//! failed. Per-patient failures are collected into the run summary; only
//! fatal faults (lost channel, broken protocol) abort the run itself.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::error::{PipelineError, Result};
use crate::factory::ConversionContext;
use crate::metrics::TimingLog;
use crate::queue::BundlePublisher;
use crate::source::RecordSource;
use crate::summary::{PatientOutcome, RunSummary};
use crate::worker;

/// Cooperative cancellation shared between the scheduler and its workers.
///
/// Workers observe it between admissions, so a cancelled run still ends on a
/// clean fragment boundary.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Runs the conversion of a batch of patients over a bounded task pool.
pub struct ConversionScheduler {
    source: Arc<dyn RecordSource>,
    context: Arc<ConversionContext>,
    timing: Arc<TimingLog>,
    cancel: CancelFlag,
}

impl ConversionScheduler {
    pub fn new(
        source: Arc<dyn RecordSource>,
        context: Arc<ConversionContext>,
        timing: Arc<TimingLog>,
    ) -> Self {
        Self {
            source,
            context,
            timing,
            cancel: CancelFlag::new(),
        }
    }

    /// Handle for cancelling the run from outside, e.g. a signal handler.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Converts `keys` and resolves once all workers have finished and the
    /// termination sentinel has been published.
    ///
    /// Outcomes come back ordered by patient index. A fatal worker fault is
    /// returned as the run's error, but only after the sentinel went out, so
    /// the consumer side always shuts down cleanly.
    pub async fn run(&self, keys: &[String], publisher: BundlePublisher) -> Result<RunSummary> {
        let started = Instant::now();
        let pool = Arc::new(Semaphore::new(self.context.config.pool_size));
        tracing::info!(
            patients = keys.len(),
            pool_size = self.context.config.pool_size,
            "starting conversion run"
        );

        let mut tasks = JoinSet::new();
        for (patient_index, key) in keys.iter().enumerate() {
            let pool = pool.clone();
            let source = self.source.clone();
            let context = self.context.clone();
            let timing = self.timing.clone();
            let cancel = self.cancel.clone();
            let publisher = publisher.clone();
            let key = key.clone();

            tasks.spawn(async move {
                let _permit = pool
                    .acquire_owned()
                    .await
                    .map_err(|_| PipelineError::protocol("worker pool closed"))?;
                let result = worker::convert_patient(
                    source.as_ref(),
                    publisher,
                    &context,
                    &timing,
                    &cancel,
                    patient_index,
                    &key,
                )
                .await;
                if let Err(e) = &result {
                    tracing::warn!(patient = patient_index, key = %key, error = %e, "patient failed");
                }
                Ok::<_, PipelineError>(PatientOutcome {
                    patient_index,
                    patient_key: key,
                    result,
                })
            });
        }

        let mut outcomes = Vec::with_capacity(keys.len());
        let mut fatal: Option<PipelineError> = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(outcome)) => {
                    if let Err(e) = &outcome.result {
                        if e.is_fatal() && fatal.is_none() {
                            self.cancel.cancel();
                            fatal = Some(PipelineError::protocol(format!(
                                "worker for {} hit a fatal fault: {e}",
                                outcome.patient_key
                            )));
                        }
                    }
                    outcomes.push(outcome);
                }
                Ok(Err(e)) => {
                    if fatal.is_none() {
                        self.cancel.cancel();
                        fatal = Some(e);
                    }
                }
                Err(join_error) => {
                    if fatal.is_none() {
                        self.cancel.cancel();
                        fatal = Some(PipelineError::protocol(format!(
                            "worker task panicked: {join_error}"
                        )));
                    }
                }
            }
        }
        outcomes.sort_by_key(|o| o.patient_index);

        // Pool drained. The sentinel goes out unconditionally, exactly once,
        // even when the run is about to report a fatal fault.
        publisher.publish_end().await?;

        if let Some(e) = fatal {
            return Err(e);
        }

        let summary = RunSummary {
            outcomes,
            elapsed: started.elapsed(),
        };
        tracing::info!(%summary, "conversion run finished");
        Ok(summary)
    }
}
