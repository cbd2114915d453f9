//! Quality filtering and deduplication
//!
//! Decides whether a classified event is worth forwarding. Violations and
//! optimization triggers always go through; policy evaluations are sampled
//! deterministically; routine successful trail events are dropped. A rolling
//! content-hash window suppresses duplicates (best-effort under eviction
//! pressure).

use charter_core::content_hash;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::classify::{ClassifiedEvent, EventCategory};

/// Quality filter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Forward one in N policy-evaluation events
    #[serde(default = "default_sample_every")]
    pub sample_every: u64,

    /// Drop successful trail events scoring above this bar
    #[serde(default = "default_drop_routine_above")]
    pub drop_routine_above: f64,

    /// Rolling dedup window in seconds
    #[serde(default = "default_dedup_window")]
    pub dedup_window_secs: u64,

    /// Soft cap on tracked dedup entries; exceeding it triggers eviction
    #[serde(default = "default_max_dedup_entries")]
    pub max_dedup_entries: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            sample_every: default_sample_every(),
            drop_routine_above: default_drop_routine_above(),
            dedup_window_secs: default_dedup_window(),
            max_dedup_entries: default_max_dedup_entries(),
        }
    }
}

fn default_sample_every() -> u64 {
    5
}

fn default_drop_routine_above() -> f64 {
    0.95
}

fn default_dedup_window() -> u64 {
    3600
}

fn default_max_dedup_entries() -> usize {
    65536
}

/// Quality filter with an embedded dedup window
pub struct QualityFilter {
    config: FilterConfig,
    window: Duration,
    seen: Mutex<HashMap<String, Instant>>,
}

impl QualityFilter {
    /// Create a filter from configuration
    pub fn new(config: FilterConfig) -> Self {
        let window = Duration::from_secs(config.dedup_window_secs);
        Self {
            config,
            window,
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Whether the event should be forwarded downstream.
    ///
    /// Category policy first, then the dedup window; a suppressed duplicate
    /// is never forwarded even for always-forward categories.
    pub fn should_forward(&self, event: &ClassifiedEvent) -> bool {
        let by_category = match event.category {
            EventCategory::Violation | EventCategory::OptimizationTrigger => true,
            EventCategory::HumanFeedback => true,
            EventCategory::PolicyEvaluation => self.sampled(&event.record.id),
            EventCategory::AuditTrail => {
                !(event.record.allow && event.record.score > self.config.drop_routine_above)
            }
        };

        if !by_category {
            debug!(event = %event.record.id, category = event.category.as_str(), "event filtered");
            return false;
        }

        let first_seen = self.observe(content_key(event));
        if !first_seen {
            debug!(event = %event.record.id, "duplicate event suppressed");
        }
        first_seen
    }

    /// Deterministic 1-in-N sampling keyed on the event id
    fn sampled(&self, event_id: &str) -> bool {
        if self.config.sample_every <= 1 {
            return true;
        }
        id_bucket(event_id) % self.config.sample_every == 0
    }

    /// Record a content hash; returns true the first time it is seen within
    /// the window
    fn observe(&self, key: String) -> bool {
        let mut seen = self.seen.lock();
        let now = Instant::now();

        // Best-effort eviction: expired entries first, arbitrary excess if
        // the map is still over its cap.
        if seen.len() >= self.config.max_dedup_entries {
            let window = self.window;
            seen.retain(|_, at| now.duration_since(*at) < window);
            while seen.len() >= self.config.max_dedup_entries {
                let Some(k) = seen.keys().next().cloned() else {
                    break;
                };
                seen.remove(&k);
            }
        }

        match seen.get(&key) {
            Some(at) if now.duration_since(*at) < self.window => false,
            _ => {
                seen.insert(key, now);
                true
            }
        }
    }

    /// Number of content hashes currently tracked
    pub fn tracked(&self) -> usize {
        self.seen.lock().len()
    }
}

/// Dedup key: content hash over everything that makes the event meaningful,
/// excluding the per-emission id and timestamp
fn content_key(event: &ClassifiedEvent) -> String {
    content_hash(&json!({
        "category": event.category.as_str(),
        "action_id": event.record.action_id,
        "ruleset_version": event.record.ruleset_version,
        "allow": event.record.allow,
        "score": event.record.score,
        "source": event.record.source,
        "violations": event.record.violations,
        "payload": event.record.payload,
    }))
}

fn id_bucket(event_id: &str) -> u64 {
    let digest = Sha256::digest(event_id.as_bytes());
    u64::from_be_bytes(digest[..8].try_into().expect("digest is 32 bytes"))
}
