//! Audit event classification
//!
//! Assigns every raw record to exactly one topic category. Precedence is
//! fixed and evaluated in order; the first matching rule wins.

use charter_core::{RawAuditRecord, RecordSource};
use serde::{Deserialize, Serialize};

/// Score below which a forwarded evaluation is flagged as an optimization
/// candidate
const OPTIMIZATION_SCORE_CEILING: f64 = 0.8;

/// Topic category for a classified event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    /// At least one violation present
    Violation,
    /// Low-scoring evaluation worth feeding back into tuning
    OptimizationTrigger,
    /// Resolved by a human reviewer
    HumanFeedback,
    /// Explicitly tagged policy evaluation
    PolicyEvaluation,
    /// Routine trail record
    AuditTrail,
}

/// Delivery priority, derived from category
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl EventCategory {
    /// Fixed transport topic for this category
    pub fn topic(&self) -> &'static str {
        match self {
            Self::Violation => "constitutional-violations",
            Self::OptimizationTrigger => "model-optimization-triggers",
            Self::HumanFeedback => "human-feedback-loops",
            Self::PolicyEvaluation => "policy-evaluations",
            Self::AuditTrail => "audit-trail-events",
        }
    }

    /// Delivery priority for this category
    pub fn priority(&self) -> Priority {
        match self {
            Self::Violation => Priority::Critical,
            Self::OptimizationTrigger => Priority::High,
            Self::HumanFeedback => Priority::High,
            Self::PolicyEvaluation => Priority::Medium,
            Self::AuditTrail => Priority::Low,
        }
    }

    /// Stable label for metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Violation => "violation",
            Self::OptimizationTrigger => "optimization_trigger",
            Self::HumanFeedback => "human_feedback",
            Self::PolicyEvaluation => "policy_evaluation",
            Self::AuditTrail => "audit_trail",
        }
    }
}

/// A raw record with its assigned category
#[derive(Debug, Clone)]
pub struct ClassifiedEvent {
    /// The underlying record
    pub record: RawAuditRecord,

    /// Assigned topic category
    pub category: EventCategory,
}

/// Deterministic event classifier
#[derive(Debug, Clone, Copy, Default)]
pub struct EventClassifier;

impl EventClassifier {
    /// Create a classifier
    pub fn new() -> Self {
        Self
    }

    /// Classify a raw record. First match wins:
    /// violation, optimization trigger, human feedback, explicit tag,
    /// audit trail.
    pub fn classify(&self, record: RawAuditRecord) -> ClassifiedEvent {
        let category = if !record.violations.is_empty() {
            EventCategory::Violation
        } else if record.score < OPTIMIZATION_SCORE_CEILING {
            EventCategory::OptimizationTrigger
        } else if record.source == RecordSource::HumanResolved {
            EventCategory::HumanFeedback
        } else if record.tag.as_deref() == Some("policy_evaluation") {
            EventCategory::PolicyEvaluation
        } else {
            EventCategory::AuditTrail
        };

        ClassifiedEvent { record, category }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use charter_core::{Severity, Tier, Violation, ViolationKind};
    use serde_json::json;
    use std::time::SystemTime;

    fn record(score: f64) -> RawAuditRecord {
        RawAuditRecord {
            id: "evt_1".to_string(),
            action_id: "act_1".to_string(),
            ruleset_version: "v1".to_string(),
            allow: true,
            score,
            violations: Vec::new(),
            tier: Tier::Standard,
            source: RecordSource::Automated,
            tag: None,
            payload: json!({}),
            timestamp: SystemTime::now(),
        }
    }

    #[test]
    fn test_violation_takes_precedence() {
        let mut r = record(0.2);
        r.source = RecordSource::HumanResolved;
        r.violations.push(Violation::new(
            ViolationKind::PolicyBreach,
            Severity::Low,
            "flag",
        ));

        let classified = EventClassifier::new().classify(r);
        assert_eq!(classified.category, EventCategory::Violation);
    }

    #[test]
    fn test_low_score_is_optimization_trigger() {
        let classified = EventClassifier::new().classify(record(0.79));
        assert_eq!(classified.category, EventCategory::OptimizationTrigger);
    }

    #[test]
    fn test_human_resolved_is_feedback() {
        let mut r = record(0.96);
        r.source = RecordSource::HumanResolved;
        let classified = EventClassifier::new().classify(r);
        assert_eq!(classified.category, EventCategory::HumanFeedback);
    }

    #[test]
    fn test_explicit_tag_is_policy_evaluation() {
        let r = record(0.96).with_tag("policy_evaluation");
        let classified = EventClassifier::new().classify(r);
        assert_eq!(classified.category, EventCategory::PolicyEvaluation);
    }

    #[test]
    fn test_default_is_audit_trail() {
        let classified = EventClassifier::new().classify(record(0.99));
        assert_eq!(classified.category, EventCategory::AuditTrail);
    }

    #[test]
    fn test_topic_mapping_is_fixed() {
        assert_eq!(EventCategory::Violation.topic(), "constitutional-violations");
        assert_eq!(EventCategory::PolicyEvaluation.topic(), "policy-evaluations");
        assert_eq!(
            EventCategory::OptimizationTrigger.topic(),
            "model-optimization-triggers"
        );
        assert_eq!(EventCategory::HumanFeedback.topic(), "human-feedback-loops");
        assert_eq!(EventCategory::AuditTrail.topic(), "audit-trail-events");
    }

    #[test]
    fn test_priority_ordering() {
        assert!(EventCategory::Violation.priority() > EventCategory::AuditTrail.priority());
        assert!(
            EventCategory::OptimizationTrigger.priority()
                > EventCategory::PolicyEvaluation.priority()
        );
    }
}
