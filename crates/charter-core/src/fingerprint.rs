//! Deterministic fingerprints for cache and dedup keys

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::types::ContextRiskLevel;

/// Deterministic hash of (normalized action payload, context risk level,
/// ruleset version). Two actions with the same fingerprint receive the same
/// decision while the ruleset version is unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute the fingerprint for an action payload under a ruleset version
    pub fn compute(payload: &Value, risk: ContextRiskLevel, ruleset_version: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(canonical_json(payload).as_bytes());
        hasher.update([0u8]);
        hasher.update(risk.as_str().as_bytes());
        hasher.update([0u8]);
        hasher.update(ruleset_version.as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    /// Reconstruct a fingerprint from its hex digest (journal reload)
    pub fn from_hex(digest: impl Into<String>) -> Self {
        Self(digest.into())
    }

    /// Hex digest
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Content hash over an arbitrary JSON value, used as the dedup key for
/// audit events
pub fn content_hash(value: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_json(value).as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Serialize a JSON value with object keys sorted recursively, so that
/// semantically identical payloads hash identically regardless of key order
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}
