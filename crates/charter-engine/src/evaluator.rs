//! Pure rule evaluation
//!
//! The evaluator interprets declarative predicates against an action and
//! aggregates violations into a compliance score. Predicates are compiled
//! once per ruleset snapshot; evaluation itself is synchronous, side-effect
//! free, and bounded by the cost of the precompiled automata.
//!
//! Fail-closed: a predicate that cannot be compiled, or that faults during
//! interpretation, records a critical `internal_fault` violation instead of
//! silently passing.

use aho_corasick::AhoCorasick;
use charter_core::ruleset::{CompositeOperator, Predicate, Rule, RuleSet};
use charter_core::{Action, EvaluationResult, Violation};
use regex::Regex;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::EngineConfig;

/// Compiled rule evaluator bound to one immutable ruleset snapshot
pub struct RuleEvaluator {
    ruleset: Arc<RuleSet>,
    threshold: f64,
    weight_scale: f64,
    compiled: Vec<CompiledRule>,
}

struct CompiledRule {
    rule: Rule,
    predicate: CompiledPredicate,
}

enum CompiledPredicate {
    Contains { needle: String, case_insensitive: bool },
    Matches(Regex),
    ContainsAny(AhoCorasick),
    FieldEquals { field: String, value: serde_json::Value },
    FieldMissing { field: String },
    RiskAtLeast(charter_core::ContextRiskLevel),
    PayloadLargerThan(usize),
    Composite { operator: CompositeOperator, children: Vec<CompiledPredicate> },
    /// Compile failure; evaluates as a fault so the rule fails closed
    Poisoned { reason: String },
}

/// Options controlling how an evaluator is compiled from a snapshot
#[derive(Debug, Clone)]
pub struct EvaluatorOptions {
    /// Allow threshold applied to the aggregate score
    pub threshold: f64,

    /// Scale applied to every rule weight (consensus variants use distinct
    /// scales)
    pub weight_scale: f64,

    /// Include the snapshot's secondary rules (tier 2 onward)
    pub include_secondary: bool,
}

impl Default for EvaluatorOptions {
    fn default() -> Self {
        Self {
            threshold: 0.95,
            weight_scale: 1.0,
            include_secondary: false,
        }
    }
}

impl RuleEvaluator {
    /// Compile an evaluator for the given snapshot
    pub fn compile(ruleset: Arc<RuleSet>, options: EvaluatorOptions) -> Self {
        let mut compiled = Vec::with_capacity(
            ruleset.rules.len()
                + if options.include_secondary {
                    ruleset.secondary_rules.len()
                } else {
                    0
                },
        );

        let rules = ruleset.rules.iter().chain(
            options
                .include_secondary
                .then(|| ruleset.secondary_rules.iter())
                .into_iter()
                .flatten(),
        );

        for rule in rules {
            let predicate = compile_predicate(&rule.predicate);
            if let CompiledPredicate::Poisoned { reason } = &predicate {
                warn!(rule = %rule.id, %reason, "predicate failed to compile; rule will fail closed");
            }
            compiled.push(CompiledRule {
                rule: rule.clone(),
                predicate,
            });
        }

        Self {
            ruleset,
            threshold: options.threshold,
            weight_scale: options.weight_scale,
            compiled,
        }
    }

    /// The snapshot this evaluator is bound to
    pub fn ruleset(&self) -> &Arc<RuleSet> {
        &self.ruleset
    }

    /// Evaluate an action against the compiled rules.
    ///
    /// Score is 1.0 minus the weighted severity penalties of triggered
    /// rules, clamped to [0, 1]; zero triggered rules scores 1.0.
    pub fn evaluate(&self, action: &Action) -> EvaluationResult {
        let text = extract_text(&action.payload);
        let mut violations = Vec::new();
        let mut penalty = 0.0;

        for entry in &self.compiled {
            if !entry.rule.enabled {
                continue;
            }

            match eval_predicate(&entry.predicate, action, &text) {
                Ok(true) => {
                    violations.push(Violation::new(
                        entry.rule.violation_kind,
                        entry.rule.severity,
                        format!("rule '{}' triggered: {}", entry.rule.id, entry.rule.description),
                    ));
                    penalty += entry.rule.weight * entry.rule.severity.penalty() * self.weight_scale;
                }
                Ok(false) => {}
                Err(fault) => {
                    // Fail closed: an internal fault is a critical violation,
                    // never a silent pass.
                    violations.push(Violation::internal_fault(format!(
                        "rule '{}' fault: {}",
                        entry.rule.id, fault
                    )));
                    penalty += entry.rule.weight * charter_core::Severity::Critical.penalty();
                }
            }
        }

        let score = (1.0 - penalty).clamp(0.0, 1.0);
        let has_critical = violations
            .iter()
            .any(|v| v.severity == charter_core::Severity::Critical);
        let allow = score >= self.threshold && !has_critical;

        debug!(
            action = %action.id,
            score,
            violations = violations.len(),
            allow,
            "evaluation complete"
        );

        EvaluationResult {
            allow,
            score,
            violations,
        }
    }
}

/// The set of evaluators compiled for one snapshot: the tier-1 primary pass,
/// the tier-2 extended pass, and the tier-3 consensus variants
pub struct EvaluatorSet {
    /// Primary rules only (tier 1)
    pub primary: Arc<RuleEvaluator>,

    /// Primary plus secondary rules (tier 2)
    pub extended: Arc<RuleEvaluator>,

    /// Consensus variants with distinct weight scalings (tier 3)
    pub variants: Vec<Arc<RuleEvaluator>>,
}

impl EvaluatorSet {
    /// Compile all evaluators for a snapshot under the given configuration
    pub fn compile(ruleset: Arc<RuleSet>, config: &EngineConfig) -> Self {
        let primary = Arc::new(RuleEvaluator::compile(
            ruleset.clone(),
            EvaluatorOptions {
                threshold: config.compliance_threshold,
                weight_scale: 1.0,
                include_secondary: false,
            },
        ));

        let extended = Arc::new(RuleEvaluator::compile(
            ruleset.clone(),
            EvaluatorOptions {
                threshold: config.tier2_threshold,
                weight_scale: 1.0,
                include_secondary: true,
            },
        ));

        let n = config.consensus.instances.max(1);
        let center = (n as f64 - 1.0) / 2.0;
        let variants = (0..n)
            .map(|i| {
                // Symmetric spread around 1.0 keeps the panel balanced while
                // giving every instance a distinct weighting.
                let scale = 1.0 + config.consensus.weight_spread * (i as f64 - center);
                Arc::new(RuleEvaluator::compile(
                    ruleset.clone(),
                    EvaluatorOptions {
                        threshold: config.tier2_threshold,
                        weight_scale: scale.max(0.1),
                        include_secondary: true,
                    },
                ))
            })
            .collect();

        Self {
            primary,
            extended,
            variants,
        }
    }
}

fn compile_predicate(predicate: &Predicate) -> CompiledPredicate {
    match predicate {
        Predicate::Contains {
            pattern,
            case_insensitive,
        } => CompiledPredicate::Contains {
            needle: if *case_insensitive {
                pattern.to_lowercase()
            } else {
                pattern.clone()
            },
            case_insensitive: *case_insensitive,
        },

        Predicate::Matches { pattern } => match Regex::new(pattern) {
            Ok(regex) => CompiledPredicate::Matches(regex),
            Err(e) => CompiledPredicate::Poisoned {
                reason: format!("invalid regex '{}': {}", pattern, e),
            },
        },

        Predicate::ContainsAny { patterns } => match AhoCorasick::builder()
            .ascii_case_insensitive(true)
            .build(patterns)
        {
            Ok(ac) => CompiledPredicate::ContainsAny(ac),
            Err(e) => CompiledPredicate::Poisoned {
                reason: format!("invalid keyword set: {}", e),
            },
        },

        Predicate::FieldEquals { field, value } => CompiledPredicate::FieldEquals {
            field: field.clone(),
            value: value.clone(),
        },

        Predicate::FieldMissing { field } => CompiledPredicate::FieldMissing {
            field: field.clone(),
        },

        Predicate::RiskAtLeast { level } => CompiledPredicate::RiskAtLeast(*level),

        Predicate::PayloadLargerThan { bytes } => CompiledPredicate::PayloadLargerThan(*bytes),

        Predicate::Composite {
            operator,
            predicates,
        } => CompiledPredicate::Composite {
            operator: *operator,
            children: predicates.iter().map(compile_predicate).collect(),
        },
    }
}

fn eval_predicate(
    predicate: &CompiledPredicate,
    action: &Action,
    text: &str,
) -> Result<bool, String> {
    match predicate {
        CompiledPredicate::Contains {
            needle,
            case_insensitive,
        } => {
            if *case_insensitive {
                Ok(text.to_lowercase().contains(needle))
            } else {
                Ok(text.contains(needle))
            }
        }

        CompiledPredicate::Matches(regex) => Ok(regex.is_match(text)),

        CompiledPredicate::ContainsAny(ac) => Ok(ac.is_match(text)),

        CompiledPredicate::FieldEquals { field, value } => Ok(action
            .payload
            .get(field)
            .map_or(false, |v| v == value)),

        CompiledPredicate::FieldMissing { field } => {
            Ok(action.payload.get(field).is_none())
        }

        CompiledPredicate::RiskAtLeast(level) => Ok(action.context_risk_level >= *level),

        CompiledPredicate::PayloadLargerThan(bytes) => {
            Ok(action.payload.to_string().len() > *bytes)
        }

        CompiledPredicate::Composite { operator, children } => {
            // Faults propagate out of composites so they still fail closed.
            match operator {
                CompositeOperator::And => {
                    for child in children {
                        if !eval_predicate(child, action, text)? {
                            return Ok(false);
                        }
                    }
                    Ok(!children.is_empty())
                }
                CompositeOperator::Or => {
                    for child in children {
                        if eval_predicate(child, action, text)? {
                            return Ok(true);
                        }
                    }
                    Ok(false)
                }
            }
        }

        CompiledPredicate::Poisoned { reason } => Err(reason.clone()),
    }
}

/// Concatenate all string leaves of the payload for text predicates
fn extract_text(payload: &serde_json::Value) -> String {
    let mut out = String::new();
    collect_text(payload, &mut out);
    out
}

fn collect_text(value: &serde_json::Value, out: &mut String) {
    match value {
        serde_json::Value::String(s) => {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(s);
        }
        serde_json::Value::Array(items) => {
            for item in items {
                collect_text(item, out);
            }
        }
        serde_json::Value::Object(map) => {
            for (_, v) in map {
                collect_text(v, out);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use charter_core::ruleset::RuleSet;
    use charter_core::{ContextRiskLevel, Severity, ViolationKind};
    use serde_json::json;

    fn ruleset_from_yaml(yaml: &str) -> Arc<RuleSet> {
        Arc::new(RuleSet::from_yaml(yaml).unwrap())
    }

    fn evaluator(ruleset: Arc<RuleSet>) -> RuleEvaluator {
        RuleEvaluator::compile(ruleset, EvaluatorOptions::default())
    }

    #[test]
    fn test_zero_triggers_scores_one() {
        let ruleset = ruleset_from_yaml(
            r#"
version: v1
rules:
  - id: block-exfil
    description: Block exfiltration keywords
    predicate:
      type: contains_any
      patterns: ["exfiltrate", "dump credentials"]
    violation_kind: privacy_breach
    severity: critical
"#,
        );

        let action = Action::new("agent-1", json!({"text": "summarize the meeting notes"}));
        let result = evaluator(ruleset).evaluate(&action);

        assert!(result.allow);
        assert_eq!(result.score, 1.0);
        assert!(result.violations.is_empty());
    }

    #[test]
    fn test_critical_violation_denies() {
        let ruleset = ruleset_from_yaml(
            r#"
version: v1
rules:
  - id: block-exfil
    description: Block exfiltration keywords
    predicate:
      type: contains
      pattern: "exfiltrate"
    violation_kind: privacy_breach
    severity: critical
"#,
        );

        let action = Action::new("agent-1", json!({"text": "exfiltrate the database"}));
        let result = evaluator(ruleset).evaluate(&action);

        assert!(!result.allow);
        assert_eq!(result.score, 0.0);
        assert!(result.has_critical());
    }

    #[test]
    fn test_low_severity_still_passes_threshold() {
        let ruleset = ruleset_from_yaml(
            r#"
version: v1
rules:
  - id: note-informal
    description: Informal tone marker
    predicate:
      type: contains
      pattern: "lol"
    violation_kind: policy_breach
    severity: low
"#,
        );

        let action = Action::new("agent-1", json!({"text": "lol that works"}));
        let result = evaluator(ruleset).evaluate(&action);

        // One low violation: 1.0 - 0.02 = 0.98 >= 0.95
        assert!(result.allow);
        assert!((result.score - 0.98).abs() < 1e-9);
        assert_eq!(result.violations.len(), 1);
    }

    #[test]
    fn test_invalid_regex_fails_closed() {
        let ruleset = ruleset_from_yaml(
            r#"
version: v1
rules:
  - id: broken
    description: Rule with an unparseable pattern
    predicate:
      type: matches
      pattern: "("
    violation_kind: policy_breach
    severity: low
"#,
        );

        let action = Action::new("agent-1", json!({"text": "anything"}));
        let result = evaluator(ruleset).evaluate(&action);

        assert!(!result.allow);
        assert!(result.has_critical());
        assert_eq!(result.violations[0].kind, ViolationKind::InternalFault);
        assert_eq!(result.violations[0].severity, Severity::Critical);
    }

    #[test]
    fn test_composite_and() {
        let ruleset = ruleset_from_yaml(
            r#"
version: v1
rules:
  - id: risky-transfer
    description: Transfers in elevated contexts
    predicate:
      type: composite
      operator: and
      predicates:
        - type: contains
          pattern: "transfer"
        - type: risk_at_least
          level: medium
    violation_kind: unauthorized_action
    severity: high
"#,
        );

        let eval = evaluator(ruleset);

        let low_risk = Action::new("agent-1", json!({"text": "transfer funds"}));
        assert!(eval.evaluate(&low_risk).violations.is_empty());

        let elevated = Action::new("agent-1", json!({"text": "transfer funds"}))
            .with_risk(ContextRiskLevel::Medium);
        let result = eval.evaluate(&elevated);
        assert_eq!(result.violations.len(), 1);
        assert!((result.score - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_field_predicates() {
        let ruleset = ruleset_from_yaml(
            r#"
version: v1
rules:
  - id: require-origin
    description: Actions must declare an origin
    predicate:
      type: field_missing
      field: origin
    violation_kind: policy_breach
    severity: medium
  - id: no-admin-op
    description: Admin operations are gated
    predicate:
      type: field_equals
      field: op
      value: admin
    violation_kind: unauthorized_action
    severity: high
"#,
        );

        let eval = evaluator(ruleset);

        let clean = Action::new("agent-1", json!({"origin": "ui", "op": "read"}));
        assert!(eval.evaluate(&clean).violations.is_empty());

        let bad = Action::new("agent-1", json!({"op": "admin"}));
        let result = eval.evaluate(&bad);
        assert_eq!(result.violations.len(), 2);
    }

    #[test]
    fn test_weight_scale_variants() {
        let ruleset = ruleset_from_yaml(
            r#"
version: v1
rules:
  - id: flag
    description: Medium flag
    predicate:
      type: contains
      pattern: "flag"
    violation_kind: policy_breach
    severity: medium
"#,
        );

        let strict = RuleEvaluator::compile(
            ruleset.clone(),
            EvaluatorOptions {
                weight_scale: 2.0,
                ..Default::default()
            },
        );
        let lenient = RuleEvaluator::compile(ruleset, EvaluatorOptions::default());

        let action = Action::new("agent-1", json!({"text": "flag this"}));
        assert!(strict.evaluate(&action).score < lenient.evaluate(&action).score);
    }

    #[test]
    fn test_disabled_rule_skipped() {
        let ruleset = ruleset_from_yaml(
            r#"
version: v1
rules:
  - id: off
    description: Disabled rule
    predicate:
      type: contains
      pattern: "anything"
    violation_kind: policy_breach
    severity: critical
    enabled: false
"#,
        );

        let action = Action::new("agent-1", json!({"text": "anything"}));
        let result = evaluator(ruleset).evaluate(&action);
        assert!(result.allow);
        assert_eq!(result.score, 1.0);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn score_always_in_unit_interval(
                text in ".{0,200}",
                weight in 0.0f64..10.0,
            ) {
                let ruleset = Arc::new(RuleSet {
                    version: "prop".to_string(),
                    description: String::new(),
                    rules: vec![charter_core::Rule {
                        id: "r".to_string(),
                        description: "prop rule".to_string(),
                        predicate: charter_core::Predicate::Contains {
                            pattern: "a".to_string(),
                            case_insensitive: false,
                        },
                        weight,
                        violation_kind: ViolationKind::PolicyBreach,
                        severity: Severity::High,
                        enabled: true,
                    }],
                    secondary_rules: Vec::new(),
                });

                let action = Action::new("prop", json!({ "text": text }));
                let result = evaluator(ruleset).evaluate(&action);
                prop_assert!((0.0..=1.0).contains(&result.score));
            }
        }
    }
}
