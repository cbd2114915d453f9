//! Audit pipeline
//!
//! Background task tying the stages together: classify, filter, scrub,
//! route. Records are ingested through a non-blocking handle; a failure
//! anywhere in the pipeline never reaches the decision path.

use charter_core::{AuditSink, RawAuditRecord, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::classify::EventClassifier;
use crate::filter::{FilterConfig, QualityFilter};
use crate::metrics::MetricsCollector;
use crate::router::{AuditRouter, RouteResult, RouterConfig, Transport};
use crate::scrub::PiiScrubber;

/// Audit pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuditConfig {
    /// Quality filter and dedup settings
    #[serde(default)]
    pub filter: FilterConfig,

    /// Router retry and spillover settings
    #[serde(default)]
    pub router: RouterConfig,
}

/// Commands sent to the background task
enum PipelineCommand {
    /// Process a raw record
    Record(Box<RawAuditRecord>),

    /// Re-attempt delivery of spilled events
    Replay,

    /// Stop the pipeline
    Shutdown,
}

/// Non-blocking ingestion handle; implements `AuditSink` for the engine
#[derive(Clone)]
pub struct AuditHandle {
    sender: mpsc::UnboundedSender<PipelineCommand>,
}

impl AuditHandle {
    /// Ask the pipeline to replay spilled events
    pub fn replay(&self) {
        if let Err(e) = self.sender.send(PipelineCommand::Replay) {
            warn!("failed to send replay command: {}", e);
        }
    }
}

impl AuditSink for AuditHandle {
    fn record(&self, record: RawAuditRecord) {
        if let Err(e) = self.sender.send(PipelineCommand::Record(Box::new(record))) {
            // Audit-path failures are isolated from the decision path.
            warn!("failed to enqueue audit record: {}", e);
        }
    }
}

/// Running audit pipeline
pub struct AuditPipeline {
    handle: AuditHandle,
    metrics: MetricsCollector,
    task: JoinHandle<()>,
}

impl AuditPipeline {
    /// Spawn the pipeline over the given transport
    pub fn spawn(config: AuditConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        let scrubber = PiiScrubber::new()?;
        let classifier = EventClassifier::new();
        let filter = QualityFilter::new(config.filter);
        let router = AuditRouter::new(transport, config.router);
        let metrics = MetricsCollector::new();

        let (sender, receiver) = mpsc::unbounded_channel();
        let task_metrics = metrics.clone();
        let task = tokio::spawn(run_pipeline(
            receiver,
            classifier,
            filter,
            scrubber,
            router,
            task_metrics,
        ));

        Ok(Self {
            handle: AuditHandle { sender },
            metrics,
            task,
        })
    }

    /// Ingestion handle for the decision service
    pub fn handle(&self) -> AuditHandle {
        self.handle.clone()
    }

    /// Pipeline metrics
    pub fn metrics(&self) -> MetricsCollector {
        self.metrics.clone()
    }

    /// Stop the pipeline after draining queued commands
    pub async fn shutdown(self) {
        let _ = self.handle.sender.send(PipelineCommand::Shutdown);
        if let Err(e) = self.task.await {
            warn!("audit pipeline task failed: {}", e);
        }
    }
}

async fn run_pipeline(
    mut receiver: mpsc::UnboundedReceiver<PipelineCommand>,
    classifier: EventClassifier,
    filter: QualityFilter,
    scrubber: PiiScrubber,
    router: AuditRouter,
    metrics: MetricsCollector,
) {
    while let Some(command) = receiver.recv().await {
        match command {
            PipelineCommand::Record(record) => {
                metrics.record_ingested();
                let event = classifier.classify(*record);

                if !filter.should_forward(&event) {
                    metrics.record_filtered();
                    continue;
                }

                // Scrubbing is mandatory and ordered before transport; a
                // failed scrub drops the event.
                let scrubbed = match scrubber.scrub(&event.record.payload) {
                    Ok(payload) => payload,
                    Err(e) => {
                        error!(
                            event = %event.record.id,
                            error = %e,
                            "scrub failed; event dropped"
                        );
                        metrics.record_scrub_failure();
                        continue;
                    }
                };

                metrics.record_forwarded();
                match router.route(&event, scrubbed).await {
                    RouteResult::Published { topic } => {
                        debug!(event = %event.record.id, %topic, "audit event delivered");
                        metrics.record_published();
                    }
                    RouteResult::Spilled { topic } => {
                        warn!(event = %event.record.id, %topic, "audit event spilled");
                        metrics.record_spilled();
                    }
                }
            }

            PipelineCommand::Replay => {
                let delivered = router.replay().await;
                if delivered > 0 {
                    debug!(delivered, "spilled audit events replayed");
                }
            }

            PipelineCommand::Shutdown => {
                debug!("audit pipeline shutting down");
                break;
            }
        }
    }
}
