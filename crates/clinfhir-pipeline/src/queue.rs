//! Asynchronous handoff between bundle production and consumption.
//!
//! A bounded mpsc channel decouples the worker pool from the sink. The
//! publisher side is cloned into every worker; the consumer is a single
//! long-lived task bound to the receiving end. Messages from one publisher
//! arrive in publication order. Termination follows a sentinel protocol: the
//! scheduler publishes [`QueueMessage::end`] exactly once after the pool has
//! drained, and the consumer stops on it and releases the channel.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use clinfhir_core::{Bundle, QueueMessage, SequenceLabel};

use crate::error::{PipelineError, Result};

/// Default bound of the handoff channel, in messages.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Creates a connected publisher/receiver pair.
pub fn bundle_channel(capacity: usize) -> (BundlePublisher, mpsc::Receiver<QueueMessage>) {
    let (tx, rx) = mpsc::channel(capacity);
    (BundlePublisher { tx }, rx)
}

/// Producer half of the handoff channel.
///
/// A failed send means the consumer is gone and a flushed fragment would be
/// silently lost, so it surfaces as the fatal [`PipelineError::ChannelClosed`].
#[derive(Clone)]
pub struct BundlePublisher {
    tx: mpsc::Sender<QueueMessage>,
}

impl BundlePublisher {
    /// Publishes one labelled bundle.
    pub async fn publish(&self, label: SequenceLabel, bundle: &Bundle) -> Result<()> {
        let message = QueueMessage::data(label, bundle)?;
        tracing::debug!(label = %label, resources = bundle.resource_count(), "publishing bundle");
        self.tx
            .send(message)
            .await
            .map_err(|_| PipelineError::ChannelClosed)
    }

    /// Publishes the termination sentinel.
    pub async fn publish_end(&self) -> Result<()> {
        self.tx
            .send(QueueMessage::end())
            .await
            .map_err(|_| PipelineError::ChannelClosed)
    }
}

/// Terminal consumer of one labelled bundle.
///
/// Implemented by the output dispatcher; handler failures are per-fragment
/// and do not stop consumption.
#[async_trait]
pub trait BundleHandler: Send + Sync {
    async fn handle(&self, label: SequenceLabel, bundle: Bundle) -> anyhow::Result<()>;
}

/// What the consumer saw over its lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerReport {
    /// Data messages successfully dispatched to the handler.
    pub dispatched: usize,
    /// Data messages the handler rejected (reported, not fatal).
    pub sink_failures: usize,
}

/// Consumer half of the handoff channel.
pub struct BundleConsumer {
    rx: mpsc::Receiver<QueueMessage>,
    handler: Arc<dyn BundleHandler>,
}

impl BundleConsumer {
    pub fn new(rx: mpsc::Receiver<QueueMessage>, handler: Arc<dyn BundleHandler>) -> Self {
        Self { rx, handler }
    }

    /// Consumes until the termination sentinel arrives, then releases the
    /// channel.
    ///
    /// Channel exhaustion without a sentinel means data messages may have
    /// been lost and is surfaced as a protocol violation.
    pub async fn run(mut self) -> Result<ConsumerReport> {
        let mut report = ConsumerReport::default();
        loop {
            match self.rx.recv().await {
                Some(message) if message.is_end() => {
                    tracing::info!(
                        dispatched = report.dispatched,
                        sink_failures = report.sink_failures,
                        "termination sentinel received, releasing channel"
                    );
                    return Ok(report);
                }
                Some(message) => {
                    let label = message.label()?;
                    let bundle = message.bundle()?;
                    match self.handler.handle(label, bundle).await {
                        Ok(()) => report.dispatched += 1,
                        Err(e) => {
                            report.sink_failures += 1;
                            tracing::error!(label = %label, error = %e, "sink rejected bundle");
                        }
                    }
                }
                None => {
                    return Err(PipelineError::protocol(
                        "all publishers dropped before the termination sentinel",
                    ));
                }
            }
        }
    }
}
