//! Compliance decision service
//!
//! Front door for the engine: validates actions, consults the decision
//! cache under its single-flight guarantee, runs the evaluator and tier
//! orchestrator, and emits a raw telemetry record for every request.
//!
//! Evaluation-path faults resolve to a safe deny decision; callers receive
//! an error only for malformed input. Audit emission is isolated from the
//! decision path: a failed record is logged and dropped, never surfaced.

use charter_core::{
    Action, AuditSink, Decision, DecisionOutcome, Error, Fingerprint, Health, HealthStatus,
    HumanVerdict, RawAuditRecord, RecordSource, Result, RuleSet, RuleSetHandle, Tier,
};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, info, warn};

use crate::cache::{CacheStatus, DecisionCache};
use crate::config::EngineConfig;
use crate::evaluator::EvaluatorSet;
use crate::review::ReviewQueue;
use crate::tiers::TierOrchestrator;

/// The compliance decision service
pub struct DecisionService {
    config: EngineConfig,
    rulesets: RuleSetHandle,
    evaluators: parking_lot::RwLock<Arc<EvaluatorSet>>,
    cache: Arc<DecisionCache>,
    review: Arc<ReviewQueue>,
    orchestrator: TierOrchestrator,
    audit: Arc<dyn AuditSink>,
}

impl DecisionService {
    /// Create a service bound to an initial ruleset snapshot
    pub fn new(
        ruleset: RuleSet,
        config: EngineConfig,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self> {
        let rulesets = RuleSetHandle::new(ruleset);
        let snapshot = rulesets.current();
        let evaluators = Arc::new(EvaluatorSet::compile(snapshot, &config));

        let cache = Arc::new(DecisionCache::new(
            Duration::from_secs(config.cache.ttl_secs),
            config.cache.enabled,
        ));
        let review = Arc::new(ReviewQueue::open(&config.review)?);
        let orchestrator = TierOrchestrator::new(config.clone(), review.clone());

        let service = Self {
            config,
            rulesets,
            evaluators: parking_lot::RwLock::new(evaluators),
            cache,
            review,
            orchestrator,
            audit,
        };

        // Reviews reloaded from the journal get fresh expiry timers.
        for token in service.review.reloaded_tokens().to_vec() {
            service.spawn_expiry(token);
        }

        Ok(service)
    }

    /// Evaluate an action and return a terminal decision or a pending token.
    ///
    /// Malformed input is rejected with `MalformedAction` before evaluation;
    /// every other path resolves to a decision (deny on ambiguity or fault).
    pub async fn decide(&self, action: Action) -> Result<DecisionOutcome> {
        validate(&action)?;

        let started = Instant::now();
        let evaluators = self.evaluators.read().clone();
        let version = evaluators.primary.ruleset().version.clone();
        let fingerprint =
            Fingerprint::compute(&action.payload, action.context_risk_level, &version);

        let pipeline_action = action.clone();
        let (outcome, status) = self
            .cache
            .get_or_compute(&fingerprint, &version, || {
                self.run_pipeline(pipeline_action, evaluators.clone(), version.clone(), fingerprint.clone(), started)
            })
            .await;

        self.record_metrics(&outcome, status, started);
        self.emit_audit(&action, &version, &outcome);

        // The flight owner arms the review timer exactly once per token.
        if let DecisionOutcome::Pending(token) = &outcome {
            if matches!(status, CacheStatus::Miss | CacheStatus::Bypass) {
                self.spawn_expiry(token.token.clone());
            }
        }

        Ok(outcome)
    }

    /// Resolve a tier-4 pending review with a human verdict
    pub fn resolve(&self, token: &str, verdict: HumanVerdict) -> Result<Decision> {
        let reviewer = verdict.reviewer.clone();
        let (decision, fingerprint, payload) = self.review.resolve(token, verdict)?;

        self.cache
            .insert_ready(&fingerprint, &decision.ruleset_version, decision.clone());
        self.audit.record(RawAuditRecord::from_decision(
            &decision,
            payload,
            RecordSource::HumanResolved,
        ));

        metrics::counter!(
            "charter_evaluations_total",
            "result" => if decision.allow { "allow" } else { "deny" },
            "tier" => Tier::HumanReview.as_str()
        )
        .increment(1);

        info!(token = %token, reviewer = %reviewer, allow = decision.allow, "review resolved");
        Ok(decision)
    }

    /// Wait for a pending decision to resolve (human input or timeout)
    pub async fn await_decision(&self, token: &str) -> Result<Decision> {
        self.review.await_decision(token).await
    }

    /// Swap in a new ruleset snapshot. In-flight evaluations complete
    /// against their bound snapshot; the cache is invalidated so no
    /// stale-version decision is served afterwards.
    pub fn load_ruleset(&self, ruleset: RuleSet) {
        let version = ruleset.version.clone();
        self.rulesets.swap(ruleset);

        let snapshot = self.rulesets.current();
        let compiled = Arc::new(EvaluatorSet::compile(snapshot, &self.config));
        *self.evaluators.write() = compiled;

        self.cache.invalidate_all();
        info!(%version, "ruleset snapshot loaded");
    }

    /// Version of the active ruleset snapshot
    pub fn current_version(&self) -> String {
        self.rulesets.version()
    }

    /// Health report for external orchestration
    pub fn health(&self) -> Health {
        let status = if self.config.cache.enabled {
            HealthStatus::Ok
        } else {
            HealthStatus::Degraded
        };
        Health {
            status,
            ruleset_version: self.current_version(),
        }
    }

    /// Fraction of lookups served from the decision cache
    pub fn cache_hit_rate(&self) -> f64 {
        self.cache.hit_rate()
    }

    /// Number of reviews currently suspended in tier 4
    pub fn pending_reviews(&self) -> usize {
        self.review.pending_count()
    }

    async fn run_pipeline(
        &self,
        action: Action,
        evaluators: Arc<EvaluatorSet>,
        version: String,
        fingerprint: Fingerprint,
        started: Instant,
    ) -> DecisionOutcome {
        let first = evaluators.primary.evaluate(&action);
        self.orchestrator
            .escalate(&action, &evaluators, &version, &fingerprint, first, started)
            .await
    }

    fn record_metrics(&self, outcome: &DecisionOutcome, status: CacheStatus, started: Instant) {
        metrics::counter!("charter_cache_lookups_total", "outcome" => status.as_str())
            .increment(1);
        metrics::histogram!("charter_decision_latency_ms")
            .record(started.elapsed().as_secs_f64() * 1000.0);

        match outcome {
            DecisionOutcome::Resolved(decision) => {
                metrics::counter!(
                    "charter_evaluations_total",
                    "result" => if decision.allow { "allow" } else { "deny" },
                    "tier" => decision.tier_reached.as_str()
                )
                .increment(1);

                for violation in &decision.violations {
                    metrics::counter!(
                        "charter_violations_total",
                        "kind" => violation.kind.as_str(),
                        "severity" => violation.severity.as_str()
                    )
                    .increment(1);
                }
            }
            DecisionOutcome::Pending(_) => {
                metrics::counter!(
                    "charter_evaluations_total",
                    "result" => "pending",
                    "tier" => Tier::HumanReview.as_str()
                )
                .increment(1);
            }
        }
    }

    fn emit_audit(&self, action: &Action, version: &str, outcome: &DecisionOutcome) {
        let record = match outcome {
            DecisionOutcome::Resolved(decision) => RawAuditRecord::from_decision(
                decision,
                action.payload.clone(),
                RecordSource::Automated,
            ),
            DecisionOutcome::Pending(token) => match self.review.draft(&token.token) {
                Some(draft) => RawAuditRecord::from_decision(
                    &draft,
                    action.payload.clone(),
                    RecordSource::Automated,
                ),
                // Resolved between suspension and emission; trail record.
                None => RawAuditRecord {
                    id: format!("evt_{}", uuid::Uuid::new_v4()),
                    action_id: action.id.clone(),
                    ruleset_version: version.to_string(),
                    allow: false,
                    score: 0.0,
                    violations: Vec::new(),
                    tier: Tier::HumanReview,
                    source: RecordSource::Automated,
                    tag: Some("policy_evaluation".to_string()),
                    payload: action.payload.clone(),
                    timestamp: SystemTime::now(),
                },
            },
        };

        self.audit.record(record);
        debug!(action = %action.id, "telemetry record emitted");
    }

    fn spawn_expiry(&self, token: String) {
        let review = self.review.clone();
        let cache = self.cache.clone();
        let audit = self.audit.clone();

        tokio::spawn(async move {
            if let Some((decision, fingerprint, payload)) = review.expire_after(&token).await {
                cache.insert_ready(&fingerprint, &decision.ruleset_version, decision.clone());
                audit.record(RawAuditRecord::from_decision(
                    &decision,
                    payload,
                    RecordSource::Automated,
                ));
                metrics::counter!(
                    "charter_evaluations_total",
                    "result" => "deny",
                    "tier" => Tier::HumanReview.as_str()
                )
                .increment(1);
            }
        });
    }
}

fn validate(action: &Action) -> Result<()> {
    if action.id.trim().is_empty() {
        return Err(Error::malformed("action id is required"));
    }
    if action.actor.trim().is_empty() {
        return Err(Error::malformed("actor is required"));
    }
    if action.payload.is_null() {
        warn!(action = %action.id, "rejected action with empty payload");
        return Err(Error::malformed("payload is required"));
    }
    Ok(())
}
