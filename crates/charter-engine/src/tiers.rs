//! Risk tier orchestration
//!
//! Routes a decision through the four-tier escalation pipeline. Transitions
//! are strictly forward (1 → 2 → 3 → 4); a decision never returns to a lower
//! tier, and a critical violation terminates escalation immediately at the
//! tier that produced it.

use charter_core::{
    Action, ContextRiskLevel, Decision, DecisionOutcome, EvaluationResult, Fingerprint, Severity,
    Tier,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::config::EngineConfig;
use crate::consensus::{self, ConsensusVerdict};
use crate::evaluator::EvaluatorSet;
use crate::review::ReviewQueue;

/// Orchestrates escalation across the four review tiers
pub struct TierOrchestrator {
    config: EngineConfig,
    review: Arc<ReviewQueue>,
}

impl TierOrchestrator {
    /// Create an orchestrator backed by the given review queue
    pub fn new(config: EngineConfig, review: Arc<ReviewQueue>) -> Self {
        Self { config, review }
    }

    /// Escalate a tier-1 evaluation to a terminal decision or a pending
    /// review token
    pub async fn escalate(
        &self,
        action: &Action,
        evaluators: &EvaluatorSet,
        version: &str,
        fingerprint: &Fingerprint,
        first: EvaluationResult,
        started: Instant,
    ) -> DecisionOutcome {
        // Tier 1: immediate fail-closed on critical, terminal allow only in
        // low-risk contexts.
        if first.has_critical() {
            return self.terminal(action, version, false, &first, Tier::Standard, started);
        }
        if first.score >= self.config.compliance_threshold
            && action.context_risk_level == ContextRiskLevel::Low
        {
            return self.terminal(action, version, true, &first, Tier::Standard, started);
        }

        debug!(action = %action.id, score = first.score, "escalating to tier 2");

        // Tier 2: re-evaluate with secondary checks.
        let second = evaluators.extended.evaluate(action);
        if second.has_critical() {
            return self.terminal(action, version, false, &second, Tier::EnhancedValidation, started);
        }
        if second.score >= self.config.tier2_threshold && !second.has_at_least(Severity::High) {
            return self.terminal(action, version, true, &second, Tier::EnhancedValidation, started);
        }

        debug!(action = %action.id, score = second.score, "escalating to tier 3");

        // Tier 3: multi-evaluator consensus.
        let outcome = consensus::run(&evaluators.variants, action, &self.config.consensus).await;
        let consensus_eval = EvaluationResult {
            allow: outcome.verdict == ConsensusVerdict::Allow,
            score: outcome.score,
            violations: outcome.violations.clone(),
        };

        match outcome.verdict {
            ConsensusVerdict::Allow => {
                self.terminal(action, version, true, &consensus_eval, Tier::Consensus, started)
            }
            ConsensusVerdict::DenyCritical => {
                self.terminal(action, version, false, &consensus_eval, Tier::Consensus, started)
            }
            ConsensusVerdict::DenyTimeout => {
                warn!(
                    action = %action.id,
                    completed = outcome.completed,
                    error = %charter_core::Error::ConsensusTimeout,
                    "quorum not reached; denied"
                );
                self.terminal(action, version, false, &consensus_eval, Tier::Consensus, started)
            }
            ConsensusVerdict::Escalate => {
                debug!(action = %action.id, "escalating to tier 4 human review");

                let draft = build_decision(
                    action,
                    version,
                    false,
                    &consensus_eval,
                    Tier::HumanReview,
                    started,
                );
                let token =
                    self.review
                        .submit(draft, fingerprint.clone(), action.payload.clone());
                DecisionOutcome::Pending(token)
            }
        }
    }

    fn terminal(
        &self,
        action: &Action,
        version: &str,
        allow: bool,
        eval: &EvaluationResult,
        tier: Tier,
        started: Instant,
    ) -> DecisionOutcome {
        DecisionOutcome::Resolved(build_decision(action, version, allow, eval, tier, started))
    }
}

fn build_decision(
    action: &Action,
    version: &str,
    allow: bool,
    eval: &EvaluationResult,
    tier: Tier,
    started: Instant,
) -> Decision {
    Decision {
        action_id: action.id.clone(),
        ruleset_version: version.to_string(),
        allow,
        score: eval.score,
        violations: eval.violations.clone(),
        tier_reached: tier,
        latency_ms: started.elapsed().as_millis() as u64,
        resolved_by: None,
    }
}
