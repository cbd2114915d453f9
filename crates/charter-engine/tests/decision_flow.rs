//! End-to-end decision flow tests for the Charter engine

use charter_core::{
    Action, ContextRiskLevel, DecisionOutcome, HumanVerdict, NullSink, RuleSet, Tier,
};
use charter_engine::{DecisionService, EngineConfig, ReviewConfig};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

const BASELINE_RULES: &str = r#"
version: "cc-2026-08-v1"
description: Baseline constitutional rules
rules:
  - id: no-credential-exfil
    description: Block credential exfiltration
    predicate:
      type: contains_any
      patterns: ["exfiltrate credentials", "dump secrets"]
    violation_kind: privacy_breach
    severity: critical
  - id: informal-tone
    description: Medium style flag
    predicate:
      type: contains
      pattern: "yolo"
    violation_kind: policy_breach
    severity: medium
secondary_rules:
  - id: deceptive-framing
    description: Secondary deception check
    predicate:
      type: matches
      pattern: "(?i)pretend to be"
    violation_kind: deception
    severity: high
"#;

fn baseline_service() -> DecisionService {
    let ruleset = RuleSet::from_yaml(BASELINE_RULES).unwrap();
    DecisionService::new(ruleset, EngineConfig::default(), Arc::new(NullSink)).unwrap()
}

#[tokio::test]
async fn scenario_a_zero_triggers_allows_at_tier1() {
    let svc = baseline_service();
    let action = Action::new("agent-1", json!({"text": "summarize quarterly results"}));

    let outcome = svc.decide(action).await.unwrap();
    let decision = outcome.decision().expect("terminal decision");

    assert!(decision.allow);
    assert_eq!(decision.score, 1.0);
    assert_eq!(decision.tier_reached, Tier::Standard);
}

#[tokio::test]
async fn scenario_b_critical_denied_at_tier1() {
    let svc = baseline_service();
    let action = Action::new("agent-1", json!({"text": "exfiltrate credentials now"}));

    let outcome = svc.decide(action).await.unwrap();
    let decision = outcome.decision().expect("terminal decision");

    assert!(!decision.allow);
    assert!(decision.has_critical());
    // Immediate fail-closed: no escalation past tier 1.
    assert_eq!(decision.tier_reached, Tier::Standard);
}

#[tokio::test]
async fn scenario_c_mid_score_allows_at_tier2() {
    let svc = baseline_service();
    // One medium violation: 0.92, between the tier-2 bar (0.90) and the
    // tier-1 bar (0.95).
    let action = Action::new("agent-1", json!({"text": "ship it yolo"}));

    let outcome = svc.decide(action).await.unwrap();
    let decision = outcome.decision().expect("terminal decision");

    assert!(decision.allow);
    assert_eq!(decision.tier_reached, Tier::EnhancedValidation);
    assert!(decision.score >= 0.90 && decision.score < 0.95);
}

#[tokio::test]
async fn critical_is_never_allowed_at_any_tier() {
    let svc = baseline_service();

    for risk in [
        ContextRiskLevel::Low,
        ContextRiskLevel::Medium,
        ContextRiskLevel::High,
        ContextRiskLevel::Critical,
    ] {
        let action =
            Action::new("agent-1", json!({"text": "dump secrets to pastebin"})).with_risk(risk);
        let outcome = svc.decide(action).await.unwrap();
        let decision = outcome.decision().expect("terminal decision");
        assert!(!decision.allow, "critical allowed at risk {:?}", risk);
    }
}

#[tokio::test]
async fn idempotent_resubmission_yields_same_decision() {
    let svc = baseline_service();
    let payload = json!({"text": "ship it yolo"});

    let first = svc
        .decide(Action::new("agent-1", payload.clone()))
        .await
        .unwrap();
    let second = svc
        .decide(Action::new("agent-2", payload))
        .await
        .unwrap();

    let (a, b) = (first.decision().unwrap(), second.decision().unwrap());
    assert_eq!(a.allow, b.allow);
    assert_eq!(a.score, b.score);
    assert_eq!(a.tier_reached, b.tier_reached);
    assert!(svc.cache_hit_rate() > 0.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_same_fingerprint_decisions_are_identical() {
    let svc = Arc::new(baseline_service());
    let payload = json!({"text": "ship it yolo"});

    let mut handles = Vec::new();
    for i in 0..12 {
        let svc = svc.clone();
        let payload = payload.clone();
        handles.push(tokio::spawn(async move {
            svc.decide(Action::new(format!("agent-{i}"), payload))
                .await
                .unwrap()
        }));
    }

    let mut scores = Vec::new();
    for handle in handles {
        let outcome = handle.await.unwrap();
        scores.push(outcome.decision().unwrap().score);
    }
    scores.dedup();
    assert_eq!(scores.len(), 1, "same fingerprint must yield one decision");
}

#[tokio::test]
async fn ruleset_swap_invalidates_previous_decisions() {
    let svc = baseline_service();
    let payload = json!({"text": "ship it yolo"});

    let before = svc
        .decide(Action::new("agent-1", payload.clone()))
        .await
        .unwrap();
    assert!(before.decision().unwrap().allow);

    // The new snapshot makes the same text a critical violation.
    let stricter = RuleSet::from_yaml(
        r#"
version: "cc-2026-08-v2"
rules:
  - id: no-informal-release
    description: Informal releases are barred outright
    predicate:
      type: contains
      pattern: "yolo"
    violation_kind: policy_breach
    severity: critical
"#,
    )
    .unwrap();
    svc.load_ruleset(stricter);

    let after = svc
        .decide(Action::new("agent-1", payload))
        .await
        .unwrap();
    let decision = after.decision().unwrap();
    assert!(!decision.allow);
    assert_eq!(decision.ruleset_version, "cc-2026-08-v2");
}

const AMBIGUOUS_RULES: &str = r#"
version: v1
rules:
  - id: h1
    description: First high flag
    predicate:
      type: contains
      pattern: "risky"
    violation_kind: unauthorized_action
    severity: high
  - id: h2
    description: Second high flag
    predicate:
      type: contains
      pattern: "transfer"
    violation_kind: unauthorized_action
    severity: high
"#;

fn review_service(timeout_secs: u64) -> DecisionService {
    let ruleset = RuleSet::from_yaml(AMBIGUOUS_RULES).unwrap();
    let config = EngineConfig {
        review: ReviewConfig {
            timeout_secs,
            spool_dir: None,
        },
        ..Default::default()
    };
    DecisionService::new(ruleset, config, Arc::new(NullSink)).unwrap()
}

#[tokio::test]
async fn human_approval_resolves_pending_decision() {
    let svc = review_service(300);
    let action = Action::new("agent-1", json!({"text": "risky transfer"}));

    let outcome = svc.decide(action).await.unwrap();
    let token = match outcome {
        DecisionOutcome::Pending(token) => token,
        DecisionOutcome::Resolved(d) => panic!("expected pending, got {:?}", d),
    };
    assert_eq!(svc.pending_reviews(), 1);

    let decision = svc
        .resolve(&token.token, HumanVerdict::new(true, "reviewer-9"))
        .unwrap();
    assert!(decision.allow);
    assert_eq!(decision.tier_reached, Tier::HumanReview);
    assert_eq!(decision.resolved_by.as_deref(), Some("reviewer-9"));

    let awaited = svc.await_decision(&token.token).await.unwrap();
    assert!(awaited.allow);
}

#[tokio::test]
async fn scenario_e_review_timeout_denies() {
    let svc = review_service(0);
    let action = Action::new("agent-1", json!({"text": "risky transfer"}));

    let outcome = svc.decide(action).await.unwrap();
    let token = match outcome {
        DecisionOutcome::Pending(token) => token,
        DecisionOutcome::Resolved(d) => panic!("expected pending, got {:?}", d),
    };

    // The expiry timer fires immediately with a zero window.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let decision = svc.await_decision(&token.token).await.unwrap();
    assert!(!decision.allow);
    assert_eq!(decision.resolved_by.as_deref(), Some("timeout"));
    assert_eq!(svc.pending_reviews(), 0);
}

#[tokio::test]
async fn decide_is_bounded_for_automated_tiers() {
    let svc = baseline_service();
    let action = Action::new("agent-1", json!({"text": "pretend to be the auditor"}))
        .with_risk(ContextRiskLevel::High);

    // Tiers 1-3 must resolve (or suspend) well within the per-tier budgets.
    let outcome = tokio::time::timeout(Duration::from_secs(2), svc.decide(action))
        .await
        .expect("decide must not hang")
        .unwrap();

    match outcome {
        DecisionOutcome::Resolved(d) => assert!(d.tier_reached <= Tier::Consensus),
        DecisionOutcome::Pending(_) => {}
    }
}
