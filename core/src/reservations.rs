//! File-reservation engine (spec.md §4.C).
//!
//! Files live under `<workspace>/.reservations/<short-hash>.json`. Rename
//! atomicity from `atomic_file::publish` is the only concurrency primitive;
//! correctness rests on the verify-after-publish pattern spec.md §4.C and
//! §9 call out explicitly.

use crate::atomic_file;
use crate::error::Result;
use crate::path_safety;
use chrono::DateTime;
use chrono::Local;
use serde::Deserialize;
use serde::Serialize;
use std::path::Path;
use std::path::PathBuf;

const RESERVATIONS_DIR: &str = ".reservations";
const DEFAULT_TTL_SECS: i64 = 600;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationRecord {
    pub path: String,
    pub agent: String,
    pub reason: String,
    pub created: DateTime<Local>,
    pub expires: DateTime<Local>,
}

impl ReservationRecord {
    pub fn is_expired(&self, now: DateTime<Local>) -> bool {
        self.expires <= now
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Conflict {
    pub path: String,
    pub holder: String,
    pub expires: DateTime<Local>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorItem {
    pub path: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReserveOutcome {
    pub granted: Vec<String>,
    pub conflicts: Vec<Conflict>,
    pub errors: Vec<ErrorItem>,
    pub expires: Option<DateTime<Local>>,
}

pub struct ReservationEngine {
    workspace: PathBuf,
}

impl ReservationEngine {
    pub fn new(workspace: PathBuf) -> Self {
        Self { workspace }
    }

    pub fn default_ttl() -> i64 {
        DEFAULT_TTL_SECS
    }

    fn dir(&self) -> PathBuf {
        self.workspace.join(RESERVATIONS_DIR)
    }

    fn record_path(&self, normalized: &str) -> PathBuf {
        self.dir().join(format!("{}.json", path_safety::short_hash(normalized)))
    }

    async fn read_record(path: &Path) -> Option<ReservationRecord> {
        let bytes = atomic_file::read(path).await.ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    /// Reserve each path in `paths` for `agent`, independently reporting
    /// success/conflict/error per path (spec.md §4.C: "must tolerate
    /// partial success").
    pub async fn reserve(
        &self,
        agent: &str,
        paths: &[String],
        ttl_seconds: i64,
        reason: &str,
    ) -> ReserveOutcome {
        let now = Local::now();
        let expires = now + chrono::Duration::seconds(ttl_seconds);
        let mut granted = Vec::new();
        let mut conflicts = Vec::new();
        let mut errors = Vec::new();

        for raw in paths {
            match self.reserve_one(agent, raw, reason, now, expires).await {
                Ok(normalized) => granted.push(normalized),
                Err(ReserveOneError::Conflict(c)) => conflicts.push(c),
                Err(ReserveOneError::Error(e)) => errors.push(e),
            }
        }

        let expires = if granted.is_empty() { None } else { Some(expires) };
        ReserveOutcome {
            granted,
            conflicts,
            errors,
            expires,
        }
    }

    async fn reserve_one(
        &self,
        agent: &str,
        raw_path: &str,
        reason: &str,
        now: DateTime<Local>,
        expires: DateTime<Local>,
    ) -> std::result::Result<String, ReserveOneError> {
        let normalized = path_safety::normalize(&self.workspace, raw_path).map_err(|e| {
            ReserveOneError::Error(ErrorItem {
                path: raw_path.to_string(),
                error: e.to_string(),
            })
        })?;

        let record_path = self.record_path(&normalized);

        // Pre-read check: if a live record exists for someone else, it's a
        // conflict and we never attempt to publish over it.
        if let Some(existing) = Self::read_record(&record_path).await {
            if !existing.is_expired(now) && existing.agent != agent {
                tracing::debug!(path = %normalized, holder = %existing.agent, "reservation conflict");
                return Err(ReserveOneError::Conflict(Conflict {
                    path: normalized,
                    holder: existing.agent,
                    expires: existing.expires,
                }));
            }
        }

        let record = ReservationRecord {
            path: normalized.clone(),
            agent: agent.to_string(),
            reason: reason.to_string(),
            created: now,
            expires,
        };
        let bytes = serde_json::to_vec(&record).map_err(|e| {
            ReserveOneError::Error(ErrorItem {
                path: raw_path.to_string(),
                error: e.to_string(),
            })
        })?;

        if let Err(e) = atomic_file::publish(
            &self.dir(),
            &format!("{}.json", path_safety::short_hash(&normalized)),
            &bytes,
        )
        .await
        {
            return Err(ReserveOneError::Error(ErrorItem {
                path: raw_path.to_string(),
                error: e.to_string(),
            }));
        }

        // Verify-after-publish: a concurrent writer may have won the final
        // rename after our pre-read check observed an empty slot. Re-read
        // and treat a foreign holder as a conflict rather than trusting our
        // own write blindly (spec.md §4.C, §9).
        if let Some(verified) = Self::read_record(&record_path).await {
            if verified.agent != agent {
                return Err(ReserveOneError::Conflict(Conflict {
                    path: normalized,
                    holder: verified.agent,
                    expires: verified.expires,
                }));
            }
        }

        Ok(normalized)
    }

    /// Release `paths`, or every path in `held` if `paths` is empty
    /// (spec.md §4.C).
    pub async fn release(&self, agent: &str, paths: &[String]) -> Vec<String> {
        let mut released = Vec::new();
        for raw in paths {
            let Ok(normalized) = path_safety::normalize(&self.workspace, raw) else {
                continue;
            };
            let record_path = self.record_path(&normalized);
            if let Some(existing) = Self::read_record(&record_path).await {
                if existing.agent == agent {
                    if tokio::fs::remove_file(&record_path).await.is_ok() {
                        released.push(normalized);
                    }
                }
            }
        }
        released
    }

    /// Sweep expired records and return all that remain live
    /// (spec.md §4.C `reservations()`, which always sweeps first).
    pub async fn reservations(&self) -> Result<Vec<ReservationRecord>> {
        self.sweep().await
    }

    /// Remove expired records, returning the survivors.
    pub async fn sweep(&self) -> Result<Vec<ReservationRecord>> {
        let dir = self.dir();
        let mut live = Vec::new();
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(live),
            Err(e) => return Err(e.into()),
        };

        let now = Local::now();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(record) = Self::read_record(&path).await else {
                continue;
            };
            if record.is_expired(now) {
                let _ = tokio::fs::remove_file(&path).await;
            } else {
                live.push(record);
            }
        }
        Ok(live)
    }
}

enum ReserveOneError {
    Conflict(Conflict),
    Error(ErrorItem),
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn reserve_then_conflict_from_second_agent() {
        let dir = tempdir().unwrap();
        let engine = ReservationEngine::new(dir.path().to_path_buf());

        let a = engine
            .reserve("agent-a", &["x/y.txt".to_string()], 60, "editing")
            .await;
        assert_eq!(a.granted, vec!["x/y.txt".to_string()]);
        assert!(a.conflicts.is_empty());

        let b = engine
            .reserve("agent-b", &["x/y.txt".to_string()], 60, "editing")
            .await;
        assert!(b.granted.is_empty());
        assert_eq!(b.conflicts.len(), 1);
        assert_eq!(b.conflicts[0].holder, "agent-a");
    }

    #[tokio::test]
    async fn same_agent_refreshes_silently() {
        let dir = tempdir().unwrap();
        let engine = ReservationEngine::new(dir.path().to_path_buf());
        engine
            .reserve("agent-a", &["x.txt".to_string()], 60, "r1")
            .await;
        let second = engine
            .reserve("agent-a", &["x.txt".to_string()], 120, "r2")
            .await;
        assert_eq!(second.granted, vec!["x.txt".to_string()]);
    }

    #[tokio::test]
    async fn release_by_non_holder_is_a_no_op() {
        let dir = tempdir().unwrap();
        let engine = ReservationEngine::new(dir.path().to_path_buf());
        engine
            .reserve("agent-a", &["x.txt".to_string()], 60, "r")
            .await;
        let released = engine.release("agent-b", &["x.txt".to_string()]).await;
        assert!(released.is_empty());
        let live = engine.reservations().await.unwrap();
        assert_eq!(live.len(), 1);
    }

    #[tokio::test]
    async fn release_by_holder_removes_record() {
        let dir = tempdir().unwrap();
        let engine = ReservationEngine::new(dir.path().to_path_buf());
        engine
            .reserve("agent-a", &["x.txt".to_string()], 60, "r")
            .await;
        let released = engine.release("agent-a", &["x.txt".to_string()]).await;
        assert_eq!(released, vec!["x.txt".to_string()]);
        assert!(engine.reservations().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn expired_reservation_is_treated_as_absent() {
        let dir = tempdir().unwrap();
        let engine = ReservationEngine::new(dir.path().to_path_buf());
        engine
            .reserve("agent-a", &["x.txt".to_string()], -1, "r")
            .await;
        let b = engine
            .reserve("agent-b", &["x.txt".to_string()], 60, "r")
            .await;
        assert_eq!(b.granted, vec!["x.txt".to_string()]);
    }

    #[tokio::test]
    async fn path_escape_is_reported_as_error_not_panic() {
        let dir = tempdir().unwrap();
        let engine = ReservationEngine::new(dir.path().to_path_buf());
        let outcome = engine
            .reserve("agent-a", &["../../etc/passwd".to_string()], 60, "r")
            .await;
        assert!(outcome.granted.is_empty());
        assert_eq!(outcome.errors.len(), 1);
    }

    #[tokio::test]
    async fn partial_success_across_a_batch() {
        let dir = tempdir().unwrap();
        let engine = ReservationEngine::new(dir.path().to_path_buf());
        let outcome = engine
            .reserve(
                "agent-a",
                &["ok.txt".to_string(), "../escape.txt".to_string()],
                60,
                "r",
            )
            .await;
        assert_eq!(outcome.granted, vec!["ok.txt".to_string()]);
        assert_eq!(outcome.errors.len(), 1);
    }
}
