//! End-to-end flow: decision service wired into the audit pipeline

use async_trait::async_trait;
use charter_core::{Action, DecisionOutcome, HumanVerdict, Result, RuleSet};
use charter_engine::{DecisionService, EngineConfig};
use charter_telemetry::{AuditConfig, AuditPipeline, Transport};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

struct CapturingTransport {
    published: Mutex<Vec<(String, Value)>>,
}

impl CapturingTransport {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            published: Mutex::new(Vec::new()),
        })
    }

    fn topics(&self) -> Vec<String> {
        self.published.lock().iter().map(|(t, _)| t.clone()).collect()
    }
}

#[async_trait]
impl Transport for CapturingTransport {
    async fn publish(&self, topic: &str, event: &Value) -> Result<()> {
        self.published
            .lock()
            .push((topic.to_string(), event.clone()));
        Ok(())
    }
}

const RULES: &str = r#"
version: "cc-2026-08-v1"
rules:
  - id: no-pii-exposure
    description: Block messages exposing personal contact details
    predicate:
      type: matches
      pattern: "[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\\.[A-Za-z]{2,}"
    violation_kind: privacy_breach
    severity: critical
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
  - id: informal-tone
    description: Medium style flag
    predicate:
      type: contains
      pattern: "yolo"
    violation_kind: policy_breach
    severity: medium
"#;

fn wire(transport: Arc<CapturingTransport>) -> (DecisionService, AuditPipeline) {
    let pipeline = AuditPipeline::spawn(AuditConfig::default(), transport).unwrap();
    let service = DecisionService::new(
        RuleSet::from_yaml(RULES).unwrap(),
        EngineConfig::default(),
        Arc::new(pipeline.handle()),
    )
    .unwrap();
    (service, pipeline)
}

#[tokio::test]
async fn violation_event_reaches_transport_scrubbed() {
    let transport = CapturingTransport::new();
    let (service, pipeline) = wire(transport.clone());

    let action = Action::new(
        "agent-1",
        json!({"text": "send the report to jane.doe@corp.example please"}),
    );
    let outcome = service.decide(action).await.unwrap();
    assert!(!outcome.decision().unwrap().allow);

    tokio::time::sleep(Duration::from_millis(150)).await;
    pipeline.shutdown().await;

    let published = transport.published.lock();
    assert_eq!(published.len(), 1);

    let (topic, envelope) = &published[0];
    assert_eq!(topic, "constitutional-violations");
    assert_eq!(envelope["ruleset_version"], "cc-2026-08-v1");
    assert_eq!(envelope["priority"], "critical");

    // The raw email must never reach the transport.
    let text = envelope["payload"]["text"].as_str().unwrap();
    assert!(text.contains("[REDACTED:email]"));
    assert!(!envelope.to_string().contains("jane.doe@corp.example"));
}

#[tokio::test]
async fn repeated_decisions_dedup_to_one_event() {
    let transport = CapturingTransport::new();
    let (service, pipeline) = wire(transport.clone());

    // One medium violation terminates with allow at tier 2; the violation
    // event is always forwarded, then deduplicated.
    let payload = json!({"text": "ship it yolo"});
    for i in 0..3 {
        let outcome = service
            .decide(Action::new(format!("agent-{i}"), payload.clone()))
            .await
            .unwrap();
        assert!(outcome.decision().is_some());
    }

    tokio::time::sleep(Duration::from_millis(150)).await;
    pipeline.shutdown().await;

    // Three submissions, identical content: exactly one forwarded event.
    assert_eq!(transport.topics().len(), 1);
}

#[tokio::test]
async fn human_resolution_emits_feedback_event() {
    let transport = CapturingTransport::new();
    let (service, pipeline) = wire(transport.clone());

    // Two high violations escalate through consensus into human review.
    let action = Action::new("agent-1", json!({"text": "risky transfer"}));
    let outcome = service.decide(action).await.unwrap();
    let token = match outcome {
        DecisionOutcome::Pending(token) => token,
        DecisionOutcome::Resolved(d) => panic!("expected pending, got {:?}", d),
    };

    service
        .resolve(&token.token, HumanVerdict::new(false, "reviewer-2"))
        .unwrap();

    tokio::time::sleep(Duration::from_millis(150)).await;
    pipeline.shutdown().await;

    let topics = transport.topics();
    // Both the suspension and the resolution carry the violations, so both
    // classify as violation-topic events with distinct content.
    assert!(topics
        .iter()
        .all(|t| t == "constitutional-violations"));
    assert_eq!(topics.len(), 2);
}
