//! Ruleset and predicate definitions
//!
//! Rulesets are versioned, immutable snapshots loaded from YAML. Predicates
//! are declarative data interpreted by the engine; no code executes at
//! runtime on behalf of a rule.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::types::{ContextRiskLevel, Severity, ViolationKind};

/// Trigger condition for a compliance rule
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    /// Substring match over the action's text content
    Contains {
        /// The substring to look for
        pattern: String,

        /// Case-insensitive matching
        #[serde(default)]
        case_insensitive: bool,
    },

    /// Regex match over the action's text content
    Matches {
        /// The regular expression
        pattern: String,
    },

    /// Match any of a list of keywords (multi-pattern automaton)
    ContainsAny {
        /// Keywords to look for
        patterns: Vec<String>,
    },

    /// Exact match on a top-level payload field
    FieldEquals {
        /// Payload field name
        field: String,

        /// Expected value
        value: serde_json::Value,
    },

    /// Required payload field is absent
    FieldMissing {
        /// Payload field name
        field: String,
    },

    /// Context risk level at or above the given level
    RiskAtLeast {
        /// Minimum risk level
        level: ContextRiskLevel,
    },

    /// Serialized payload exceeds a size budget
    PayloadLargerThan {
        /// Size threshold in bytes
        bytes: usize,
    },

    /// Composite predicate (AND/OR logic)
    Composite {
        /// Logic operator
        operator: CompositeOperator,

        /// Sub-predicates
        predicates: Vec<Predicate>,
    },
}

/// Operator for composite predicates
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompositeOperator {
    And,
    Or,
}

/// A single compliance rule within a ruleset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    /// Rule identifier
    pub id: String,

    /// Description of what this rule enforces
    pub description: String,

    /// Trigger condition
    pub predicate: Predicate,

    /// Contribution of this rule to the score penalty when triggered
    #[serde(default = "default_weight")]
    pub weight: f64,

    /// Violation category recorded when triggered
    pub violation_kind: ViolationKind,

    /// Severity recorded when triggered
    pub severity: Severity,

    /// Whether this rule is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_weight() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

/// A versioned, immutable collection of compliance rules.
///
/// Loaded at startup and swapped atomically on update; in-flight
/// evaluations hold their own `Arc` to the snapshot they started with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSet {
    /// Snapshot version identifier (the constitutional hash)
    pub version: String,

    /// Description of this ruleset
    #[serde(default)]
    pub description: String,

    /// Primary rules, applied on every evaluation
    pub rules: Vec<Rule>,

    /// Secondary checks, applied from tier 2 onward
    #[serde(default)]
    pub secondary_rules: Vec<Rule>,
}

impl RuleSet {
    /// Empty ruleset with the given version
    pub fn empty(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            description: String::new(),
            rules: Vec::new(),
            secondary_rules: Vec::new(),
        }
    }

    /// Load a ruleset from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Load a ruleset from a file
    pub fn from_file(
        path: impl AsRef<std::path::Path>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_yaml(&content)?)
    }
}

/// Atomically-swappable handle to the active ruleset snapshot.
///
/// Readers clone the inner `Arc` under a short read lock; the writer swaps
/// the pointer. Readers are never blocked across an evaluation.
pub struct RuleSetHandle {
    inner: parking_lot::RwLock<Arc<RuleSet>>,
}

impl RuleSetHandle {
    /// Create a handle wrapping the initial snapshot
    pub fn new(ruleset: RuleSet) -> Self {
        Self {
            inner: parking_lot::RwLock::new(Arc::new(ruleset)),
        }
    }

    /// Current snapshot
    pub fn current(&self) -> Arc<RuleSet> {
        self.inner.read().clone()
    }

    /// Swap in a new snapshot, returning the previous one
    pub fn swap(&self, ruleset: RuleSet) -> Arc<RuleSet> {
        let next = Arc::new(ruleset);
        let previous = {
            let mut guard = self.inner.write();
            std::mem::replace(&mut *guard, next.clone())
        };
        tracing::info!(
            from = %previous.version,
            to = %next.version,
            "ruleset snapshot swapped"
        );
        previous
    }

    /// Version of the current snapshot
    pub fn version(&self) -> String {
        self.inner.read().version.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ruleset_deserialization() {
        let yaml = r#"
version: "cc-2026-08-v1"
description: Baseline constitutional rules
rules:
  - id: no-credential-exfil
    description: Block credential exfiltration attempts
    predicate:
      type: contains_any
      patterns: ["api_key", "password dump"]
    violation_kind: privacy_breach
    severity: critical
  - id: risky-context-caution
    description: Flag high-risk contexts
    predicate:
      type: risk_at_least
      level: high
    weight: 0.5
    violation_kind: policy_breach
    severity: low
secondary_rules:
  - id: deceptive-framing
    description: Secondary deception check
    predicate:
      type: matches
      pattern: "(?i)pretend to be"
    violation_kind: deception
    severity: medium
"#;

        let ruleset = RuleSet::from_yaml(yaml).unwrap();
        assert_eq!(ruleset.version, "cc-2026-08-v1");
        assert_eq!(ruleset.rules.len(), 2);
        assert_eq!(ruleset.secondary_rules.len(), 1);
        assert!(ruleset.rules[0].enabled);
        assert_eq!(ruleset.rules[1].weight, 0.5);
    }

    #[test]
    fn test_composite_predicate() {
        let json = r#"{
            "type": "composite",
            "operator": "and",
            "predicates": [
                {"type": "contains", "pattern": "transfer"},
                {"type": "risk_at_least", "level": "medium"}
            ]
        }"#;

        let predicate: Predicate = serde_json::from_str(json).unwrap();
        match predicate {
            Predicate::Composite {
                operator: CompositeOperator::And,
                predicates,
            } => assert_eq!(predicates.len(), 2),
            _ => panic!("Wrong predicate type"),
        }
    }

    #[test]
    fn test_handle_swap() {
        let handle = RuleSetHandle::new(RuleSet::empty("v1"));
        let held = handle.current();

        let old = handle.swap(RuleSet::empty("v2"));
        assert_eq!(old.version, "v1");
        assert_eq!(handle.version(), "v2");

        // In-flight references keep their snapshot
        assert_eq!(held.version, "v1");
    }
}
