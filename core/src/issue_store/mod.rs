//! Issue-store driver abstraction (spec.md §4.F).
//!
//! The embedded issue tracker is an external collaborator; this module
//! exposes it as a trait so the rest of the crate never cares whether a
//! given call went over a long-lived daemon or a spawned child process.

pub mod child;
pub mod rpc;
pub mod router;

use crate::error::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

/// Per-call timeout for any issue-store operation (spec.md §5).
pub const CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// How long a daemon-reachability probe result is trusted before the
/// driver re-checks (spec.md §9 "cache the selection briefly").
pub const PROBE_CACHE: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewIssue {
    pub title: String,
    #[serde(rename = "issue_type", default)]
    pub typ: String,
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub deps: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Unified async API over the external issue store (spec.md §4.F).
#[async_trait]
pub trait IssueStore: Send + Sync {
    async fn init(&self) -> Result<Value>;
    async fn create(&self, issue: NewIssue) -> Result<Value>;
    async fn list(&self, status: Option<&str>, limit: Option<i64>, offset: Option<i64>) -> Result<Value>;
    async fn ready(&self, limit: Option<i64>) -> Result<Value>;
    async fn show(&self, id: &str) -> Result<Value>;
    async fn update(&self, id: &str, status: Option<&str>, priority: Option<i64>, tags: Option<&[String]>) -> Result<Value>;
    async fn close(&self, id: &str, reason: &str) -> Result<Value>;
    async fn sync(&self) -> Result<Value>;
    async fn stats(&self) -> Result<Value>;
    async fn cleanup(&self, days: i64) -> Result<Value>;
    async fn doctor(&self, fix: bool) -> Result<Value>;
    async fn dep_add(&self, from: &str, to: &str, dep_type: &str) -> Result<Value>;
}

/// Normalize a raw issue-store response per spec.md §4.F: arrays pass
/// through, JSON-encoded strings are parsed, unparseable strings are
/// wrapped as `{output: <raw>}`.
pub fn normalize_response(raw: RawResponse) -> Value {
    match raw {
        RawResponse::Value(v) => v,
        RawResponse::Text(s) => match serde_json::from_str::<Value>(&s) {
            Ok(v) => v,
            Err(_) => serde_json::json!({ "output": s }),
        },
    }
}

pub enum RawResponse {
    Value(Value),
    Text(String),
}

/// Walk upward from `start` looking for a `.beads` marker directory,
/// falling back to the per-user global hub (spec.md §4.F; grounded on
/// `original_source/beads_village/bd_daemon_client.py`'s `_find_socket_path`).
pub fn find_marker_dir(start: &Path) -> Option<PathBuf> {
    let mut current = start.canonicalize().unwrap_or_else(|_| start.to_path_buf());
    loop {
        let candidate = current.join(".beads");
        if candidate.is_dir() {
            return Some(candidate);
        }
        match current.parent() {
            Some(parent) if parent != current => current = parent.to_path_buf(),
            _ => return None,
        }
    }
}

pub fn global_marker_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".beads")
}

#[cfg(target_family = "unix")]
pub fn socket_name() -> &'static str {
    "bd.sock"
}

#[cfg(not(target_family = "unix"))]
pub fn socket_name() -> &'static str {
    "bd.pipe"
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn find_marker_dir_walks_up_from_nested_child() {
        let root = tempdir().unwrap();
        std::fs::create_dir_all(root.path().join(".beads")).unwrap();
        std::fs::create_dir_all(root.path().join("a/b/c")).unwrap();

        let found = find_marker_dir(&root.path().join("a/b/c")).unwrap();
        assert_eq!(found, root.path().join(".beads").canonicalize().unwrap());
    }

    #[test]
    fn find_marker_dir_returns_none_when_absent() {
        let root = tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("a/b")).unwrap();
        assert!(find_marker_dir(&root.path().join("a/b")).is_none());
    }

    #[test]
    fn normalize_response_parses_embedded_json_string() {
        let value = normalize_response(RawResponse::Text("{\"ok\":1}".to_string()));
        assert_eq!(value, serde_json::json!({"ok": 1}));
    }

    #[test]
    fn normalize_response_wraps_unparseable_text() {
        let value = normalize_response(RawResponse::Text("plain text".to_string()));
        assert_eq!(value, serde_json::json!({"output": "plain text"}));
    }

    #[test]
    fn normalize_response_passes_through_array() {
        let value = normalize_response(RawResponse::Value(serde_json::json!([1, 2])));
        assert_eq!(value, serde_json::json!([1, 2]));
    }
}
