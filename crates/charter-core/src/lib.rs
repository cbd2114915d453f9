//! Charter Core
//!
//! Core types, traits, and utilities shared across Charter components.
//!
//! This crate provides:
//! - Common types for actions, decisions, violations, and escalation tiers
//! - Error types and result handling
//! - The versioned ruleset model with atomically-swappable snapshots
//! - Deterministic fingerprints for cache and dedup keys
//! - The raw audit record emitted by the decision path

pub mod audit;
pub mod error;
pub mod fingerprint;
pub mod ruleset;
pub mod types;

pub use audit::{AuditSink, NullSink, RawAuditRecord, RecordSource};
pub use error::{Error, Result};
pub use fingerprint::{canonical_json, content_hash, Fingerprint};
pub use ruleset::{CompositeOperator, Predicate, Rule, RuleSet, RuleSetHandle};
pub use types::{
    Action, ContextRiskLevel, Decision, DecisionOutcome, EvaluationResult, Health, HealthStatus,
    HumanVerdict, PendingToken, Severity, Tier, Violation, ViolationKind,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::audit::{AuditSink, RawAuditRecord, RecordSource};
    pub use crate::error::{Error, Result};
    pub use crate::fingerprint::Fingerprint;
    pub use crate::ruleset::{Predicate, Rule, RuleSet, RuleSetHandle};
    pub use crate::types::{
        Action, ContextRiskLevel, Decision, DecisionOutcome, EvaluationResult, HumanVerdict,
        PendingToken, Severity, Tier, Violation, ViolationKind,
    };
}
