//! Core types for Charter decisions

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Risk level attached to the context an action executes in
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum ContextRiskLevel {
    /// Routine, low-stakes context
    #[default]
    Low,
    /// Elevated context (e.g. external-facing output)
    Medium,
    /// Sensitive context (e.g. financial or medical)
    High,
    /// Maximum-scrutiny context
    Critical,
}

impl ContextRiskLevel {
    /// Stable label for metrics and audit payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// Severity of a rule violation
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Score penalty contributed by a violation of this severity,
    /// before rule weighting. A single critical violation at weight 1.0
    /// zeroes the compliance score.
    pub fn penalty(&self) -> f64 {
        match self {
            Self::Low => 0.02,
            Self::Medium => 0.08,
            Self::High => 0.25,
            Self::Critical => 1.0,
        }
    }

    /// Stable label for metrics and audit payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// Category of compliance violation a rule maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// Content that could cause harm to users or third parties
    HarmfulContent,
    /// Exposure of personal or confidential data
    PrivacyBreach,
    /// Misleading or deceptive behavior
    Deception,
    /// Action outside the actor's granted authority
    UnauthorizedAction,
    /// Excessive consumption of shared resources
    ResourceAbuse,
    /// Violation of an operator-defined policy
    PolicyBreach,
    /// Internal rule-engine fault, reported fail-closed
    InternalFault,
}

impl ViolationKind {
    /// Stable label for metrics and audit payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HarmfulContent => "harmful_content",
            Self::PrivacyBreach => "privacy_breach",
            Self::Deception => "deception",
            Self::UnauthorizedAction => "unauthorized_action",
            Self::ResourceAbuse => "resource_abuse",
            Self::PolicyBreach => "policy_breach",
            Self::InternalFault => "internal_fault",
        }
    }
}

/// A single rule violation attached to a decision
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    /// Violation category
    pub kind: ViolationKind,

    /// Severity level
    pub severity: Severity,

    /// Human-readable detail (rule id and matched context)
    pub detail: String,
}

impl Violation {
    /// Create a new violation
    pub fn new(kind: ViolationKind, severity: Severity, detail: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            detail: detail.into(),
        }
    }

    /// Violation recording an internal evaluator fault. Always critical.
    pub fn internal_fault(detail: impl Into<String>) -> Self {
        Self::new(ViolationKind::InternalFault, Severity::Critical, detail)
    }
}

/// Escalation tier in the risk-based review pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Tier 1: single evaluator pass
    Standard,
    /// Tier 2: re-evaluation with secondary checks
    EnhancedValidation,
    /// Tier 3: multi-evaluator quorum
    Consensus,
    /// Tier 4: suspended pending human input
    HumanReview,
}

impl Tier {
    /// Tier number (1-4)
    pub fn as_u8(&self) -> u8 {
        match self {
            Self::Standard => 1,
            Self::EnhancedValidation => 2,
            Self::Consensus => 3,
            Self::HumanReview => 4,
        }
    }

    /// Stable label for metrics and audit payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::EnhancedValidation => "enhanced_validation",
            Self::Consensus => "consensus",
            Self::HumanReview => "human_review",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tier{}", self.as_u8())
    }
}

/// The unit under evaluation. Immutable once submitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    /// Unique action identifier
    pub id: String,

    /// Identity of the submitting actor
    pub actor: String,

    /// Action payload under evaluation
    pub payload: serde_json::Value,

    /// Risk level of the execution context
    #[serde(default)]
    pub context_risk_level: ContextRiskLevel,

    /// Submission timestamp
    pub timestamp: SystemTime,
}

impl Action {
    /// Create a new action with a generated id
    pub fn new(actor: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: format!("act_{}", uuid::Uuid::new_v4()),
            actor: actor.into(),
            payload,
            context_risk_level: ContextRiskLevel::Low,
            timestamp: SystemTime::now(),
        }
    }

    /// Set the context risk level
    pub fn with_risk(mut self, level: ContextRiskLevel) -> Self {
        self.context_risk_level = level;
        self
    }

    /// Override the generated id (for replay and testing)
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

/// Output of a single evaluator pass
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// Whether this pass considers the action compliant
    pub allow: bool,

    /// Compliance score in [0, 1]; 1.0 means fully compliant
    pub score: f64,

    /// Violations triggered during this pass
    pub violations: Vec<Violation>,
}

impl EvaluationResult {
    /// Result for an action that triggered no rules
    pub fn compliant() -> Self {
        Self {
            allow: true,
            score: 1.0,
            violations: Vec::new(),
        }
    }

    /// Whether any violation is critical
    pub fn has_critical(&self) -> bool {
        self.violations
            .iter()
            .any(|v| v.severity == Severity::Critical)
    }

    /// Whether any violation is at or above the given severity
    pub fn has_at_least(&self, severity: Severity) -> bool {
        self.violations.iter().any(|v| v.severity >= severity)
    }
}

/// A resolved (or resolving) compliance decision.
///
/// Mutated only by the tier orchestrator while escalation is in progress;
/// frozen once `tier_reached` is terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    /// Action this decision applies to
    pub action_id: String,

    /// Ruleset snapshot version the decision was evaluated against
    pub ruleset_version: String,

    /// Allow or deny
    pub allow: bool,

    /// Compliance score in [0, 1]
    pub score: f64,

    /// Violations aggregated across evaluation passes
    pub violations: Vec<Violation>,

    /// Highest tier the decision passed through
    pub tier_reached: Tier,

    /// End-to-end decision latency in milliseconds
    pub latency_ms: u64,

    /// Reviewer identity for tier-4 resolutions ("timeout" when the
    /// review window elapsed without input)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
}

impl Decision {
    /// Whether any violation is critical
    pub fn has_critical(&self) -> bool {
        self.violations
            .iter()
            .any(|v| v.severity == Severity::Critical)
    }
}

/// Opaque token for a decision suspended in tier-4 human review
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingToken {
    /// Review token, resolves via `resolve(token, verdict)`
    pub token: String,

    /// Action awaiting review
    pub action_id: String,
}

/// Outcome of a decision request: resolved synchronously, or suspended
/// pending human review
#[derive(Debug, Clone)]
pub enum DecisionOutcome {
    /// Terminal decision
    Resolved(Decision),

    /// Suspended in tier-4; resolve via the review interface
    Pending(PendingToken),
}

impl DecisionOutcome {
    /// Whether this outcome is still pending human review
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }

    /// The terminal decision, if resolved
    pub fn decision(&self) -> Option<&Decision> {
        match self {
            Self::Resolved(d) => Some(d),
            Self::Pending(_) => None,
        }
    }
}

/// Human verdict for a pending review
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HumanVerdict {
    /// Whether the reviewer approves the action
    pub allow: bool,

    /// Reviewer identity, recorded as `resolved_by`
    pub reviewer: String,

    /// Optional reviewer note
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl HumanVerdict {
    /// Create a new verdict
    pub fn new(allow: bool, reviewer: impl Into<String>) -> Self {
        Self {
            allow,
            reviewer: reviewer.into(),
            note: None,
        }
    }

    /// Attach a reviewer note
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// Service health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// All subsystems operating normally
    Ok,
    /// Operating with reduced guarantees (e.g. cache bypassed)
    Degraded,
}

/// Health report consumed by external orchestration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    /// Overall status
    pub status: HealthStatus,

    /// Currently active ruleset snapshot version
    pub ruleset_version: String,
}
