//! Charter Engine
//!
//! Rule evaluation, decision caching, and tiered escalation for the Charter
//! compliance engine.
//!
//! This crate provides:
//! - A pure, precompiled rule evaluator with fail-closed fault handling
//! - A single-flight decision cache with TTL and version invalidation
//! - The compliance decision service (validate, cache, gate, escalate)
//! - The four-tier risk orchestrator, including multi-evaluator consensus
//!   and the human review queue with a durable pending-state journal

pub mod cache;
pub mod config;
pub mod consensus;
pub mod evaluator;
pub mod review;
pub mod service;
pub mod tiers;

pub use cache::{CacheStatus, DecisionCache};
pub use config::{CacheConfig, ConsensusConfig, EngineConfig, ReviewConfig};
pub use consensus::{ConsensusOutcome, ConsensusVerdict};
pub use evaluator::{EvaluatorOptions, EvaluatorSet, RuleEvaluator};
pub use review::ReviewQueue;
pub use service::DecisionService;
pub use tiers::TierOrchestrator;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::cache::{CacheStatus, DecisionCache};
    pub use crate::config::EngineConfig;
    pub use crate::evaluator::{EvaluatorOptions, RuleEvaluator};
    pub use crate::service::DecisionService;
}
