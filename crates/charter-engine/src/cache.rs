//! Decision cache with single-flight semantics
//!
//! Memoizes terminal decisions keyed by action fingerprint. Guarantees
//! at-most-one concurrent computation per fingerprint: concurrent callers
//! subscribe to the in-flight computation instead of duplicating work.
//!
//! Entries expire after a TTL and are removed wholesale when the ruleset
//! version bumps. Reads additionally check the entry's bound version, so a
//! computation that completes after an invalidation can never serve a
//! stale-version decision.

use charter_core::{Decision, DecisionOutcome, Fingerprint};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// How a lookup was served
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Served from a stored terminal decision
    Hit,
    /// Joined an in-flight computation for the same fingerprint
    Joined,
    /// This caller ran the computation
    Miss,
    /// Cache disabled or unavailable; evaluated directly
    Bypass,
}

impl CacheStatus {
    /// Stable label for metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hit => "hit",
            Self::Joined => "joined",
            Self::Miss => "miss",
            Self::Bypass => "bypass",
        }
    }
}

enum Slot {
    Ready {
        decision: Decision,
        version: String,
        inserted_at: Instant,
    },
    InFlight(broadcast::Sender<DecisionOutcome>),
}

/// Shared decision cache. All mutation goes through this type; there is no
/// external write path.
pub struct DecisionCache {
    slots: Mutex<HashMap<Fingerprint, Slot>>,
    ttl: Duration,
    enabled: bool,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl DecisionCache {
    /// Create a cache with the given entry TTL
    pub fn new(ttl: Duration, enabled: bool) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            ttl,
            enabled,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Look up a fingerprint, computing the decision under the single-flight
    /// guarantee on a miss.
    ///
    /// Only terminal (`Resolved`) outcomes are stored; a `Pending` outcome is
    /// broadcast to joiners but leaves no entry behind. If the in-flight
    /// owner is dropped mid-computation, joiners fall back to direct
    /// evaluation (degraded mode, logged).
    pub async fn get_or_compute<F, Fut>(
        &self,
        fingerprint: &Fingerprint,
        version: &str,
        compute: F,
    ) -> (DecisionOutcome, CacheStatus)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = DecisionOutcome>,
    {
        if !self.enabled {
            return (compute().await, CacheStatus::Bypass);
        }

        enum Path {
            Hit(Decision),
            Join(broadcast::Receiver<DecisionOutcome>),
            Owner,
        }

        let path = {
            let mut slots = self.slots.lock();
            match slots.get(fingerprint) {
                Some(Slot::Ready {
                    decision,
                    version: bound,
                    inserted_at,
                }) if bound == version && inserted_at.elapsed() < self.ttl => {
                    Path::Hit(decision.clone())
                }
                Some(Slot::InFlight(tx)) => Path::Join(tx.subscribe()),
                _ => {
                    // Stale, expired, or absent: this caller owns the flight.
                    let (tx, _) = broadcast::channel(1);
                    slots.insert(fingerprint.clone(), Slot::InFlight(tx));
                    Path::Owner
                }
            }
        };

        match path {
            Path::Hit(decision) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                (DecisionOutcome::Resolved(decision), CacheStatus::Hit)
            }

            Path::Join(mut rx) => match rx.recv().await {
                Ok(outcome) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    (outcome, CacheStatus::Joined)
                }
                Err(_) => {
                    warn!(
                        fingerprint = %fingerprint,
                        "in-flight computation dropped; evaluating directly"
                    );
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    (compute().await, CacheStatus::Bypass)
                }
            },

            Path::Owner => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                let guard = FlightGuard {
                    cache: self,
                    fingerprint: fingerprint.clone(),
                    armed: true,
                };
                let outcome = compute().await;
                guard.complete(version, &outcome);
                (outcome, CacheStatus::Miss)
            }
        }
    }

    /// Store a terminal decision directly (tier-4 resolutions)
    pub fn insert_ready(&self, fingerprint: &Fingerprint, version: &str, decision: Decision) {
        let mut slots = self.slots.lock();
        slots.insert(
            fingerprint.clone(),
            Slot::Ready {
                decision,
                version: version.to_string(),
                inserted_at: Instant::now(),
            },
        );
    }

    /// Remove all stored decisions. In-flight computations are left to
    /// complete against their bound snapshot; version-checked reads prevent
    /// their results from being served under the new version.
    pub fn invalidate_all(&self) {
        let mut slots = self.slots.lock();
        let before = slots.len();
        slots.retain(|_, slot| matches!(slot, Slot::InFlight(_)));
        debug!(removed = before - slots.len(), "decision cache invalidated");
    }

    /// Remove expired entries, returning how many were dropped
    pub fn purge_expired(&self) -> usize {
        let mut slots = self.slots.lock();
        let before = slots.len();
        let ttl = self.ttl;
        slots.retain(|_, slot| match slot {
            Slot::Ready { inserted_at, .. } => inserted_at.elapsed() < ttl,
            Slot::InFlight(_) => true,
        });
        before - slots.len()
    }

    /// Number of stored and in-flight entries
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lifetime hit count
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Lifetime miss count (including bypasses)
    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Fraction of lookups served without running a computation
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits() as f64;
        let total = hits + self.misses() as f64;
        if total == 0.0 {
            0.0
        } else {
            hits / total
        }
    }
}

/// Removes the in-flight slot if the owning computation is dropped before
/// completing, so joiners observe channel closure instead of waiting forever.
struct FlightGuard<'a> {
    cache: &'a DecisionCache,
    fingerprint: Fingerprint,
    armed: bool,
}

impl FlightGuard<'_> {
    fn complete(mut self, version: &str, outcome: &DecisionOutcome) {
        self.armed = false;
        let mut slots = self.cache.slots.lock();
        if let Some(Slot::InFlight(tx)) = slots.remove(&self.fingerprint) {
            if let DecisionOutcome::Resolved(decision) = outcome {
                slots.insert(
                    self.fingerprint.clone(),
                    Slot::Ready {
                        decision: decision.clone(),
                        version: version.to_string(),
                        inserted_at: Instant::now(),
                    },
                );
            }
            let _ = tx.send(outcome.clone());
        }
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut slots = self.cache.slots.lock();
            if matches!(slots.get(&self.fingerprint), Some(Slot::InFlight(_))) {
                slots.remove(&self.fingerprint);
            }
        }
    }
}
