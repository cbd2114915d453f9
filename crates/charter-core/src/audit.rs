//! Raw audit records emitted by the decision path

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::types::{Decision, Tier, Violation};

/// How the underlying decision was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordSource {
    /// Produced by the automated tier pipeline
    Automated,
    /// Resolved by a human reviewer
    HumanResolved,
}

/// Raw telemetry record emitted for every decision request, consumed by the
/// audit pipeline for classification, filtering, scrubbing, and routing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawAuditRecord {
    /// Unique event id
    pub id: String,

    /// Action the record describes
    pub action_id: String,

    /// Ruleset snapshot version in effect
    pub ruleset_version: String,

    /// Decision outcome (false while suspended in review)
    pub allow: bool,

    /// Compliance score
    pub score: f64,

    /// Violations attached to the decision
    pub violations: Vec<Violation>,

    /// Tier the decision reached
    pub tier: Tier,

    /// Decision provenance
    pub source: RecordSource,

    /// Explicit classification tag supplied by the emitter, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,

    /// Action payload carried for downstream audit (scrubbed before leaving
    /// the process)
    pub payload: serde_json::Value,

    /// Emission timestamp
    pub timestamp: SystemTime,
}

impl RawAuditRecord {
    /// Build a record from a decision and the originating payload
    pub fn from_decision(
        decision: &Decision,
        payload: serde_json::Value,
        source: RecordSource,
    ) -> Self {
        Self {
            id: format!("evt_{}", uuid::Uuid::new_v4()),
            action_id: decision.action_id.clone(),
            ruleset_version: decision.ruleset_version.clone(),
            allow: decision.allow,
            score: decision.score,
            violations: decision.violations.clone(),
            tier: decision.tier_reached,
            source,
            tag: None,
            payload,
            timestamp: SystemTime::now(),
        }
    }

    /// Attach an explicit classification tag
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }
}

/// Sink for raw audit records.
///
/// Implementations must never block or fail the decision path; a failed
/// record is logged and dropped on the emitter side.
pub trait AuditSink: Send + Sync {
    /// Accept a record for asynchronous processing
    fn record(&self, record: RawAuditRecord);
}

/// Sink that discards every record (for tests and cache-only deployments)
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl AuditSink for NullSink {
    fn record(&self, _record: RawAuditRecord) {}
}
