//! Audit event routing
//!
//! Publishes scrubbed, classified events to their fixed transport topic,
//! enriched with priority, ruleset version, and timestamp. Publish failures
//! are retried with bounded exponential backoff; exhausted events land in a
//! spillover queue for later replay rather than being lost.

use async_trait::async_trait;
use charter_core::Result;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::classify::ClassifiedEvent;

/// Outbound audit transport
#[async_trait]
pub trait Transport: Send + Sync {
    /// Publish an event to a topic
    async fn publish(&self, topic: &str, event: &Value) -> Result<()>;
}

/// Retry policy for publish attempts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts before spilling over
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial backoff delay in milliseconds
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    /// Backoff ceiling in milliseconds
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay() -> u64 {
    50
}

fn default_max_delay() -> u64 {
    1000
}

/// Router configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RouterConfig {
    /// Publish retry policy
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Spillover file for events that exhaust their retries; in-memory
    /// when unset
    #[serde(default)]
    pub spillover_path: Option<PathBuf>,
}

/// Result of routing one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteResult {
    /// Delivered to the transport
    Published {
        /// Topic the event landed on
        topic: String,
    },
    /// Retries exhausted; event persisted for replay
    Spilled {
        /// Topic the event was destined for
        topic: String,
    },
}

enum Spillover {
    Memory(Mutex<VecDeque<SpilledEvent>>),
    File(Mutex<PathBuf>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SpilledEvent {
    topic: String,
    event: Value,
}

/// Audit router with retry and spillover
pub struct AuditRouter {
    transport: Arc<dyn Transport>,
    retry: RetryPolicy,
    spillover: Spillover,
}

impl AuditRouter {
    /// Create a router over the given transport
    pub fn new(transport: Arc<dyn Transport>, config: RouterConfig) -> Self {
        let spillover = match config.spillover_path {
            Some(path) => Spillover::File(Mutex::new(path)),
            None => Spillover::Memory(Mutex::new(VecDeque::new())),
        };
        Self {
            transport,
            retry: config.retry,
            spillover,
        }
    }

    /// Route a scrubbed event to its topic.
    ///
    /// The caller passes the scrubbed payload separately; the raw payload on
    /// the record never reaches the envelope.
    pub async fn route(&self, event: &ClassifiedEvent, scrubbed_payload: Value) -> RouteResult {
        let topic = event.category.topic();
        let envelope = self.enrich(event, scrubbed_payload);

        for attempt in 1..=self.retry.max_attempts {
            match self.transport.publish(topic, &envelope).await {
                Ok(()) => {
                    debug!(topic, event = %event.record.id, attempt, "event published");
                    metrics::counter!(
                        "charter_audit_events_total",
                        "category" => event.category.as_str(),
                        "outcome" => "published"
                    )
                    .increment(1);
                    return RouteResult::Published {
                        topic: topic.to_string(),
                    };
                }
                Err(e) => {
                    warn!(topic, event = %event.record.id, attempt, error = %e, "publish failed");
                    if attempt < self.retry.max_attempts {
                        tokio::time::sleep(self.backoff(attempt)).await;
                    }
                }
            }
        }

        self.spill(topic, envelope);
        metrics::counter!(
            "charter_audit_events_total",
            "category" => event.category.as_str(),
            "outcome" => "spilled"
        )
        .increment(1);
        RouteResult::Spilled {
            topic: topic.to_string(),
        }
    }

    /// Re-attempt delivery of spilled events, one publish attempt each.
    /// Returns how many were delivered; failures stay spilled.
    pub async fn replay(&self) -> usize {
        let spilled = self.drain_spillover();
        let mut delivered = 0;

        for entry in spilled {
            match self.transport.publish(&entry.topic, &entry.event).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(topic = %entry.topic, error = %e, "replay failed; re-spilling");
                    self.spill_entry(entry);
                }
            }
        }

        delivered
    }

    /// Number of events currently spilled
    pub fn spilled_count(&self) -> usize {
        match &self.spillover {
            Spillover::Memory(queue) => queue.lock().len(),
            Spillover::File(path) => {
                let path = path.lock();
                std::fs::read_to_string(&*path)
                    .map(|s| s.lines().filter(|l| !l.trim().is_empty()).count())
                    .unwrap_or(0)
            }
        }
    }

    fn enrich(&self, event: &ClassifiedEvent, scrubbed_payload: Value) -> Value {
        let timestamp: DateTime<Utc> = event.record.timestamp.into();
        json!({
            "id": event.record.id,
            "category": event.category.as_str(),
            "priority": event.category.priority(),
            "action_id": event.record.action_id,
            "ruleset_version": event.record.ruleset_version,
            "allow": event.record.allow,
            "score": event.record.score,
            "tier": event.record.tier.as_str(),
            "violations": event.record.violations,
            "payload": scrubbed_payload,
            "timestamp": timestamp.to_rfc3339(),
        })
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let exp = self
            .retry
            .base_delay_ms
            .saturating_mul(1u64 << (attempt - 1).min(16))
            .min(self.retry.max_delay_ms);
        // Jitter keeps concurrent retries from synchronizing.
        let jitter = rand::thread_rng().gen_range(0..=exp / 2 + 1);
        Duration::from_millis(exp + jitter)
    }

    fn spill(&self, topic: &str, event: Value) {
        self.spill_entry(SpilledEvent {
            topic: topic.to_string(),
            event,
        });
    }

    fn spill_entry(&self, entry: SpilledEvent) {
        match &self.spillover {
            Spillover::Memory(queue) => queue.lock().push_back(entry),
            Spillover::File(path) => {
                let path = path.lock();
                let result = OpenOptions::new()
                    .append(true)
                    .create(true)
                    .open(&*path)
                    .and_then(|mut file| {
                        let line = serde_json::to_string(&entry).unwrap_or_default();
                        writeln!(file, "{}", line)
                    });
                if let Err(e) = result {
                    // Last resort: the event is lost only if the local disk
                    // also fails; log loudly.
                    tracing::error!(error = %e, topic = %entry.topic, "failed to spill audit event");
                }
            }
        }
    }

    fn drain_spillover(&self) -> Vec<SpilledEvent> {
        match &self.spillover {
            Spillover::Memory(queue) => queue.lock().drain(..).collect(),
            Spillover::File(path) => {
                let path = path.lock();
                let Ok(file) = std::fs::File::open(&*path) else {
                    return Vec::new();
                };
                let entries: Vec<SpilledEvent> = BufReader::new(file)
                    .lines()
                    .map_while(|l| l.ok())
                    .filter(|l| !l.trim().is_empty())
                    .filter_map(|l| serde_json::from_str(&l).ok())
                    .collect();
                if let Err(e) = std::fs::write(&*path, b"") {
                    warn!(error = %e, "failed to truncate spillover file");
                }
                entries
            }
        }
    }
}
