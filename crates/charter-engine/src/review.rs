//! Tier 4 human review queue
//!
//! Suspends decisions pending human input without blocking the worker that
//! raised them. Pending state is journaled to a JSONL spool so reviews
//! survive process restart; the journal is append-only, with resolution
//! records superseding pending records on reload.

use charter_core::{Decision, Error, Fingerprint, HumanVerdict, PendingToken, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::broadcast;
use tracing::{info, warn};

struct PendingEntry {
    draft: Decision,
    fingerprint: Fingerprint,
    payload: serde_json::Value,
    submitted_at: Instant,
    notify: broadcast::Sender<Decision>,
}

/// Registry of decisions suspended in human review
pub struct ReviewQueue {
    pending: Mutex<HashMap<String, PendingEntry>>,
    resolved: Mutex<HashMap<String, Decision>>,
    journal: Option<Mutex<PathBuf>>,
    timeout: Duration,
    reloaded: Vec<String>,
}

/// Resolution produced by the queue: the frozen decision, the cache key it
/// belongs under, and the originating payload for the audit trail
pub type Resolution = (Decision, Fingerprint, serde_json::Value);

impl ReviewQueue {
    /// Open a review queue, reloading any unresolved reviews from the spool
    /// directory when one is configured
    pub fn open(config: &crate::config::ReviewConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);

        let (journal, reloaded_entries) = match &config.spool_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir)?;
                let path = dir.join("reviews.jsonl");
                let entries = reload_journal(&path)?;
                (Some(Mutex::new(path)), entries)
            }
            None => (None, Vec::new()),
        };

        let mut pending = HashMap::new();
        let mut reloaded = Vec::new();
        for (token, record) in reloaded_entries {
            info!(token = %token, action = %record.decision.action_id, "reloaded pending review");
            let (notify, _) = broadcast::channel(4);
            pending.insert(
                token.clone(),
                PendingEntry {
                    draft: record.decision,
                    fingerprint: Fingerprint::from_hex(record.fingerprint),
                    payload: record.payload,
                    submitted_at: Instant::now(),
                    notify,
                },
            );
            reloaded.push(token);
        }

        Ok(Self {
            pending: Mutex::new(pending),
            resolved: Mutex::new(HashMap::new()),
            journal,
            timeout,
            reloaded,
        })
    }

    /// Review window duration
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Tokens reloaded from the journal at startup; the caller re-arms their
    /// expiry timers
    pub fn reloaded_tokens(&self) -> &[String] {
        &self.reloaded
    }

    /// Suspend a draft decision pending review and return its token
    pub fn submit(
        &self,
        draft: Decision,
        fingerprint: Fingerprint,
        payload: serde_json::Value,
    ) -> PendingToken {
        let token = format!("rev_{}", uuid::Uuid::new_v4());
        let action_id = draft.action_id.clone();

        self.append_journal(&JournalRecord::Pending(PendingRecord {
            token: token.clone(),
            fingerprint: fingerprint.as_str().to_string(),
            decision: draft.clone(),
            payload: payload.clone(),
            timestamp: unix_now(),
        }));

        let (notify, _) = broadcast::channel(4);
        self.pending.lock().insert(
            token.clone(),
            PendingEntry {
                draft,
                fingerprint,
                payload,
                submitted_at: Instant::now(),
                notify,
            },
        );

        info!(token = %token, action = %action_id, "decision suspended for human review");

        PendingToken { token, action_id }
    }

    /// Draft decision for a pending token, if still pending
    pub fn draft(&self, token: &str) -> Option<Decision> {
        self.pending.lock().get(token).map(|e| e.draft.clone())
    }

    /// Number of reviews currently pending
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Resolve a pending review with a human verdict.
    ///
    /// A verdict cannot approve past a critical violation: the decision
    /// stays denied regardless of `verdict.allow`.
    pub fn resolve(&self, token: &str, verdict: HumanVerdict) -> Result<Resolution> {
        let resolution = self.finish(token, verdict.allow, &verdict.reviewer);

        match resolution {
            Some(res) => {
                self.append_journal(&JournalRecord::Resolved(ResolvedRecord {
                    token: token.to_string(),
                    allow: res.0.allow,
                    resolved_by: verdict.reviewer,
                    note: verdict.note,
                    timestamp: unix_now(),
                }));
                Ok(res)
            }
            None => {
                let resolved = self.resolved.lock();
                match resolved.get(token) {
                    Some(d) if d.resolved_by.as_deref() == Some("timeout") => {
                        Err(Error::HumanReviewTimeout)
                    }
                    Some(_) => Err(Error::internal(format!(
                        "review '{}' already resolved",
                        token
                    ))),
                    None => Err(Error::internal(format!("unknown review token '{}'", token))),
                }
            }
        }
    }

    /// Wait out the review window, then resolve to deny if the review is
    /// still pending (fail-closed). Returns the resolution when this call
    /// performed it.
    pub async fn expire_after(&self, token: &str) -> Option<Resolution> {
        tokio::time::sleep(self.timeout).await;

        let resolution = self.finish(token, false, "timeout");
        if let Some(res) = &resolution {
            warn!(token = %token, action = %res.0.action_id, "review window elapsed; denied by default");
            self.append_journal(&JournalRecord::Resolved(ResolvedRecord {
                token: token.to_string(),
                allow: false,
                resolved_by: "timeout".to_string(),
                note: None,
                timestamp: unix_now(),
            }));
        }
        resolution
    }

    /// Wait for a pending review to resolve and return the frozen decision
    pub async fn await_decision(&self, token: &str) -> Result<Decision> {
        let rx = {
            if let Some(decision) = self.resolved.lock().get(token) {
                return Ok(decision.clone());
            }
            match self.pending.lock().get(token) {
                Some(entry) => entry.notify.subscribe(),
                None => {
                    return Err(Error::internal(format!("unknown review token '{}'", token)))
                }
            }
        };

        let mut rx = rx;
        match rx.recv().await {
            Ok(decision) => Ok(decision),
            // Sender dropped between subscription and resolution; the
            // resolved map is the source of truth.
            Err(_) => self
                .resolved
                .lock()
                .get(token)
                .cloned()
                .ok_or_else(|| Error::internal(format!("review '{}' vanished", token))),
        }
    }

    fn finish(&self, token: &str, allow: bool, resolved_by: &str) -> Option<Resolution> {
        let entry = self.pending.lock().remove(token)?;

        let mut decision = entry.draft;
        // Critical violations are never approvable, by any tier.
        decision.allow = allow && !decision.has_critical();
        decision.resolved_by = Some(resolved_by.to_string());
        decision.latency_ms = decision
            .latency_ms
            .saturating_add(entry.submitted_at.elapsed().as_millis() as u64);

        self.resolved
            .lock()
            .insert(token.to_string(), decision.clone());
        let _ = entry.notify.send(decision.clone());

        Some((decision, entry.fingerprint, entry.payload))
    }

    fn append_journal(&self, record: &JournalRecord) {
        let Some(path) = &self.journal else {
            return;
        };
        let path = path.lock();
        let result = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&*path)
            .and_then(|mut file| {
                let line = serde_json::to_string(record).unwrap_or_default();
                writeln!(file, "{}", line)
            });
        if let Err(e) = result {
            warn!(error = %e, "failed to append review journal");
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
enum JournalRecord {
    Pending(PendingRecord),
    Resolved(ResolvedRecord),
}

#[derive(Serialize, Deserialize)]
struct PendingRecord {
    token: String,
    fingerprint: String,
    decision: Decision,
    payload: serde_json::Value,
    timestamp: u64,
}

#[derive(Serialize, Deserialize)]
struct ResolvedRecord {
    token: String,
    allow: bool,
    resolved_by: String,
    note: Option<String>,
    timestamp: u64,
}

fn reload_journal(path: &PathBuf) -> Result<Vec<(String, PendingRecord)>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let reader = BufReader::new(std::fs::File::open(path)?);
    let mut pending: HashMap<String, PendingRecord> = HashMap::new();

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<JournalRecord>(&line) {
            Ok(JournalRecord::Pending(record)) => {
                pending.insert(record.token.clone(), record);
            }
            Ok(JournalRecord::Resolved(record)) => {
                pending.remove(&record.token);
            }
            Err(e) => warn!(error = %e, "skipping corrupt review journal line"),
        }
    }

    Ok(pending.into_iter().collect())
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
