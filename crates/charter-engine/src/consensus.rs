//! Tier 3 multi-evaluator consensus
//!
//! Runs N independent evaluator variants in parallel and tallies a quorum.
//! Each instance gets a hard wall-clock budget; late results are discarded
//! so a prompt quorum decision is never held up by stragglers.

use charter_core::{Action, EvaluationResult, Violation};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::ConsensusConfig;
use crate::evaluator::RuleEvaluator;

/// Terminal verdict of a consensus round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsensusVerdict {
    /// Majority of configured instances voted allow
    Allow,
    /// At least one instance reported a critical violation; denial
    /// regardless of quorum
    DenyCritical,
    /// Too few instances completed within budget to reach quorum
    DenyTimeout,
    /// Quorum completed but did not agree to allow; escalate to human review
    Escalate,
}

/// Aggregate outcome of a consensus round
#[derive(Debug, Clone)]
pub struct ConsensusOutcome {
    /// Verdict of the round
    pub verdict: ConsensusVerdict,

    /// Aggregate score (mean over the votes backing the verdict)
    pub score: f64,

    /// Violations merged across completed instances
    pub violations: Vec<Violation>,

    /// Instances that completed within budget
    pub completed: usize,

    /// Completed instances that voted allow
    pub votes_allow: usize,
}

/// Run a consensus round over the given evaluator variants.
///
/// Quorum is a strict majority of the configured instance count, not of
/// the instances that happened to complete.
pub async fn run(
    variants: &[Arc<RuleEvaluator>],
    action: &Action,
    config: &ConsensusConfig,
) -> ConsensusOutcome {
    let budget = Duration::from_millis(config.instance_timeout_ms);
    let max_revisions = config.max_revisions;

    let handles: Vec<_> = variants
        .iter()
        .map(|evaluator| {
            let evaluator = evaluator.clone();
            let action = action.clone();
            tokio::spawn(async move { run_instance(&evaluator, &action, max_revisions) })
        })
        .collect();

    // Timeouts run concurrently: the whole round is bounded by one instance
    // budget, and a straggler never delays the tally.
    let settled = futures::future::join_all(
        handles
            .into_iter()
            .map(|handle| tokio::time::timeout(budget, handle)),
    )
    .await;

    let mut results: Vec<EvaluationResult> = Vec::with_capacity(settled.len());
    for (i, outcome) in settled.into_iter().enumerate() {
        match outcome {
            Ok(Ok(result)) => results.push(result),
            Ok(Err(e)) => warn!(instance = i, error = %e, "consensus instance panicked"),
            Err(_) => debug!(instance = i, "consensus instance exceeded budget; discarded"),
        }
    }

    tally(&results, variants.len())
}

/// Bounded critique-revision loop over one evaluator instance.
///
/// Re-evaluates up to `max_revisions` extra passes, keeping the best-scoring
/// result, and stops early once the score stops improving.
fn run_instance(
    evaluator: &RuleEvaluator,
    action: &Action,
    max_revisions: usize,
) -> EvaluationResult {
    let mut best = evaluator.evaluate(action);

    for _ in 0..max_revisions {
        if best.allow || best.has_critical() {
            break;
        }
        let next = evaluator.evaluate(action);
        if next.score <= best.score {
            break;
        }
        best = next;
    }

    best
}

fn tally(results: &[EvaluationResult], instances: usize) -> ConsensusOutcome {
    let quorum = instances / 2 + 1;
    let completed = results.len();
    let votes_allow = results.iter().filter(|r| r.allow).count();
    let has_critical = results.iter().any(|r| r.has_critical());

    let violations = merge_violations(results);

    let mean = |selected: Vec<f64>| -> f64 {
        if selected.is_empty() {
            0.0
        } else {
            selected.iter().sum::<f64>() / selected.len() as f64
        }
    };

    let (verdict, score) = if has_critical {
        let worst = results
            .iter()
            .map(|r| r.score)
            .fold(f64::INFINITY, f64::min);
        (ConsensusVerdict::DenyCritical, worst.min(1.0).max(0.0))
    } else if votes_allow >= quorum {
        (
            ConsensusVerdict::Allow,
            mean(results.iter().filter(|r| r.allow).map(|r| r.score).collect()),
        )
    } else if completed < quorum {
        (
            ConsensusVerdict::DenyTimeout,
            mean(results.iter().map(|r| r.score).collect()),
        )
    } else {
        (
            ConsensusVerdict::Escalate,
            mean(results.iter().map(|r| r.score).collect()),
        )
    };

    ConsensusOutcome {
        verdict,
        score,
        violations,
        completed,
        votes_allow,
    }
}

fn merge_violations(results: &[EvaluationResult]) -> Vec<Violation> {
    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    for result in results {
        for violation in &result.violations {
            if seen.insert((violation.kind, violation.severity, violation.detail.clone())) {
                merged.push(violation.clone());
            }
        }
    }
    merged
}
