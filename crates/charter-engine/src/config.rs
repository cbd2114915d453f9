//! Engine configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Minimum score for an allow decision at tier 1
    #[serde(default = "default_compliance_threshold")]
    pub compliance_threshold: f64,

    /// Minimum score for a terminal allow at tier 2
    #[serde(default = "default_tier2_threshold")]
    pub tier2_threshold: f64,

    /// Decision cache configuration
    #[serde(default)]
    pub cache: CacheConfig,

    /// Tier 3 consensus configuration
    #[serde(default)]
    pub consensus: ConsensusConfig,

    /// Tier 4 human review configuration
    #[serde(default)]
    pub review: ReviewConfig,
}

impl EngineConfig {
    /// Load configuration from a YAML file, falling back to defaults when
    /// the file does not exist
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Ok(serde_yaml::from_str(&content)?)
        } else {
            Ok(Self::default())
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            compliance_threshold: default_compliance_threshold(),
            tier2_threshold: default_tier2_threshold(),
            cache: CacheConfig::default(),
            consensus: ConsensusConfig::default(),
            review: ReviewConfig::default(),
        }
    }
}

/// Decision cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Enable the cache; when disabled every request evaluates directly
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Entry time-to-live in seconds
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: default_cache_ttl(),
        }
    }
}

/// Tier 3 consensus configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusConfig {
    /// Number of independent evaluator instances
    #[serde(default = "default_instances")]
    pub instances: usize,

    /// Per-instance wall-clock budget in milliseconds; late results are
    /// discarded
    #[serde(default = "default_instance_timeout")]
    pub instance_timeout_ms: u64,

    /// Maximum critique-revision passes per instance
    #[serde(default = "default_max_revisions")]
    pub max_revisions: usize,

    /// Spread applied to rule weights across instances so each votes with a
    /// distinct weighting
    #[serde(default = "default_weight_spread")]
    pub weight_spread: f64,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            instances: default_instances(),
            instance_timeout_ms: default_instance_timeout(),
            max_revisions: default_max_revisions(),
            weight_spread: default_weight_spread(),
        }
    }
}

/// Tier 4 human review configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewConfig {
    /// Seconds to wait for human input before resolving to deny
    #[serde(default = "default_review_timeout")]
    pub timeout_secs: u64,

    /// Directory for the pending-review journal; reviews survive process
    /// restart when set
    #[serde(default)]
    pub spool_dir: Option<PathBuf>,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_review_timeout(),
            spool_dir: None,
        }
    }
}

fn default_compliance_threshold() -> f64 {
    0.95
}

fn default_tier2_threshold() -> f64 {
    0.90
}

fn default_cache_ttl() -> u64 {
    1800
}

fn default_instances() -> usize {
    3
}

fn default_instance_timeout() -> u64 {
    200
}

fn default_max_revisions() -> usize {
    2
}

fn default_weight_spread() -> f64 {
    0.15
}

fn default_review_timeout() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.compliance_threshold, 0.95);
        assert_eq!(config.tier2_threshold, 0.90);
        assert_eq!(config.cache.ttl_secs, 1800);
        assert_eq!(config.consensus.instances, 3);
        assert_eq!(config.consensus.instance_timeout_ms, 200);
        assert_eq!(config.review.timeout_secs, 300);
    }

    #[test]
    fn test_partial_yaml() {
        let yaml = r#"
compliance_threshold: 0.9
consensus:
  instances: 5
"#;
        let config: EngineConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.compliance_threshold, 0.9);
        assert_eq!(config.consensus.instances, 5);
        // Untouched sections keep their defaults
        assert_eq!(config.consensus.instance_timeout_ms, 200);
        assert!(config.cache.enabled);
    }
}
