//! Long-lived daemon driver over a Unix domain socket (or Windows named
//! pipe) (spec.md §4.F.1). Grounded on
//! `original_source/beads_village/bd_daemon_client.py`: one request per
//! connection, no pipelining, daemon discovery by walking up for a
//! `.beads` marker directory and falling back to the global per-user hub.

use crate::error::CoreError;
use crate::error::Result;
use crate::issue_store::CALL_TIMEOUT;
use crate::issue_store::IssueStore;
use crate::issue_store::NewIssue;
use crate::issue_store::PROBE_CACHE;
use crate::issue_store::RawResponse;
use crate::issue_store::find_marker_dir;
use crate::issue_store::global_marker_dir;
use crate::issue_store::normalize_response;
use crate::issue_store::socket_name;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Instant;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::time::timeout;

#[derive(Serialize)]
struct RpcRequest<'a> {
    operation: &'a str,
    args: Value,
    cwd: String,
    actor: Option<&'a str>,
}

#[derive(serde::Deserialize)]
struct RpcResponse {
    success: bool,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    error: Option<String>,
}

struct ProbeCache {
    checked_at: Instant,
    path: Option<PathBuf>,
}

/// RPC driver over a Unix domain socket (Windows named-pipe support is not
/// wired into this abstraction; on that platform every call falls back to
/// the child-process driver, matching the original's documented
/// limitation).
pub struct RpcDriver {
    workspace: PathBuf,
    actor: String,
    probe: Mutex<Option<ProbeCache>>,
}

impl RpcDriver {
    pub fn new(workspace: PathBuf, actor: String) -> Self {
        Self {
            workspace,
            actor,
            probe: Mutex::new(None),
        }
    }

    /// Locate a reachable socket, caching the result briefly
    /// (spec.md §9: "cache the selection briefly (tens of seconds)").
    async fn socket_path(&self) -> Option<PathBuf> {
        if let Some(cached) = self.probe.lock().unwrap_or_else(|e| e.into_inner()).as_ref() {
            if cached.checked_at.elapsed() < PROBE_CACHE {
                return cached.path.clone();
            }
        }

        let path = self.discover_socket();
        *self.probe.lock().unwrap_or_else(|e| e.into_inner()) = Some(ProbeCache {
            checked_at: Instant::now(),
            path: path.clone(),
        });
        path
    }

    fn discover_socket(&self) -> Option<PathBuf> {
        let name = socket_name();
        if let Some(marker) = find_marker_dir(&self.workspace) {
            let candidate = marker.join(name);
            if candidate.exists() {
                return Some(candidate);
            }
        }
        let global = global_marker_dir().join(name);
        if global.exists() {
            return Some(global);
        }
        None
    }

    #[cfg(target_family = "unix")]
    async fn call(&self, operation: &str, args: Value) -> Result<Value> {
        use tokio::net::UnixStream;

        let Some(sock_path) = self.socket_path().await else {
            return Err(CoreError::IssueStoreUnavailable(
                "daemon socket not found".to_string(),
            ));
        };

        let connect = UnixStream::connect(&sock_path);
        let mut stream = timeout(CALL_TIMEOUT, connect)
            .await
            .map_err(|_| CoreError::IssueStoreTimeout)?
            .map_err(|e| CoreError::IssueStoreUnavailable(e.to_string()))?;

        let request = RpcRequest {
            operation,
            args,
            cwd: self.workspace.display().to_string(),
            actor: Some(&self.actor),
        };
        let mut line = serde_json::to_vec(&request)?;
        line.push(b'\n');

        timeout(CALL_TIMEOUT, stream.write_all(&line))
            .await
            .map_err(|_| CoreError::IssueStoreTimeout)?
            .map_err(|e| CoreError::IssueStoreUnavailable(e.to_string()))?;

        let mut reader = BufReader::new(stream);
        let mut response_line = String::new();
        let bytes_read = timeout(CALL_TIMEOUT, reader.read_line(&mut response_line))
            .await
            .map_err(|_| CoreError::IssueStoreTimeout)?
            .map_err(|e| CoreError::IssueStoreUnavailable(e.to_string()))?;

        if bytes_read == 0 {
            return Err(CoreError::IssueStoreUnavailable(
                "daemon closed connection without responding".to_string(),
            ));
        }

        let response: RpcResponse = serde_json::from_str(&response_line)?;
        if !response.success {
            return Err(CoreError::IssueStoreError(
                response.error.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }
        Ok(normalize_response(RawResponse::Value(response.data)))
    }

    #[cfg(not(target_family = "unix"))]
    async fn call(&self, _operation: &str, _args: Value) -> Result<Value> {
        // Named-pipe support mirrors the original's documented limitation:
        // without it wired up, every call here reports unavailable so the
        // caller falls back to the child-process driver for this call.
        Err(CoreError::IssueStoreUnavailable(
            "named pipe transport not implemented on this platform".to_string(),
        ))
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }
}

#[async_trait]
impl IssueStore for RpcDriver {
    async fn init(&self) -> Result<Value> {
        // `init` is never issued over RPC; the dispatcher always routes it
        // to the child-process driver (spec.md §4.F).
        Err(CoreError::IssueStoreUnavailable(
            "init is not available over rpc".to_string(),
        ))
    }

    async fn create(&self, issue: NewIssue) -> Result<Value> {
        self.call("create", serde_json::to_value(issue)?).await
    }

    async fn list(&self, status: Option<&str>, limit: Option<i64>, offset: Option<i64>) -> Result<Value> {
        self.call(
            "list",
            serde_json::json!({ "status": status, "limit": limit, "offset": offset }),
        )
        .await
    }

    async fn ready(&self, limit: Option<i64>) -> Result<Value> {
        self.call("ready", serde_json::json!({ "limit": limit })).await
    }

    async fn show(&self, id: &str) -> Result<Value> {
        self.call("show", serde_json::json!({ "id": id })).await
    }

    async fn update(&self, id: &str, status: Option<&str>, priority: Option<i64>, tags: Option<&[String]>) -> Result<Value> {
        self.call(
            "update",
            serde_json::json!({ "id": id, "status": status, "priority": priority, "tags": tags }),
        )
        .await
    }

    async fn close(&self, id: &str, reason: &str) -> Result<Value> {
        self.call("close", serde_json::json!({ "id": id, "reason": reason }))
            .await
    }

    async fn sync(&self) -> Result<Value> {
        self.call("sync", serde_json::json!({})).await
    }

    async fn stats(&self) -> Result<Value> {
        self.call("stats", serde_json::json!({})).await
    }

    async fn cleanup(&self, days: i64) -> Result<Value> {
        self.call("cleanup", serde_json::json!({ "days": days })).await
    }

    async fn doctor(&self, fix: bool) -> Result<Value> {
        self.call("doctor", serde_json::json!({ "fix": fix })).await
    }

    async fn dep_add(&self, from: &str, to: &str, dep_type: &str) -> Result<Value> {
        self.call(
            "dep_add",
            serde_json::json!({ "from_id": from, "to_id": to, "dep_type": dep_type }),
        )
        .await
    }
}
