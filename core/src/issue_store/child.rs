//! Short-lived child-process issue-store driver (spec.md §4.F.2).
//!
//! Invokes the external `bd` command-line tool in the workspace directory,
//! appending `--json` to operations that support it, and parses standard
//! output. Grounded on the teacher's `git_info.rs` pattern for spawning and
//! timing out a child process via `tokio::process::Command`.

use crate::error::CoreError;
use crate::error::Result;
use crate::issue_store::CALL_TIMEOUT;
use crate::issue_store::IssueStore;
use crate::issue_store::NewIssue;
use crate::issue_store::RawResponse;
use crate::issue_store::normalize_response;
use async_trait::async_trait;
use serde_json::Value;
use std::path::Path;
use std::path::PathBuf;
use tokio::process::Command;
use tokio::time::timeout;

const BD_BIN: &str = "bd";

pub struct ChildProcessDriver {
    workspace: PathBuf,
    actor: String,
}

impl ChildProcessDriver {
    pub fn new(workspace: PathBuf, actor: String) -> Self {
        Self { workspace, actor }
    }

    async fn run(&self, args: &[&str], json: bool) -> Result<Value> {
        let mut full: Vec<&str> = args.to_vec();
        if json {
            full.push("--json");
        }

        let output = timeout(
            CALL_TIMEOUT,
            Command::new(BD_BIN)
                .args(&full)
                .current_dir(&self.workspace)
                .env("BEADS_ACTOR", &self.actor)
                .output(),
        )
        .await
        .map_err(|_| CoreError::IssueStoreTimeout)?
        .map_err(|e| CoreError::IssueStoreUnavailable(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(CoreError::IssueStoreError(if stderr.is_empty() {
                format!("bd exited with {}", output.status)
            } else {
                stderr
            }));
        }

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(normalize_response(RawResponse::Text(stdout)))
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }
}

#[async_trait]
impl IssueStore for ChildProcessDriver {
    async fn init(&self) -> Result<Value> {
        self.run(&["init"], true).await
    }

    async fn create(&self, issue: NewIssue) -> Result<Value> {
        let mut args = vec!["create".to_string(), issue.title.clone()];
        if !issue.typ.is_empty() {
            args.push("--type".to_string());
            args.push(issue.typ.clone());
        }
        args.push("--priority".to_string());
        args.push(issue.priority.to_string());
        if !issue.description.is_empty() {
            args.push("--description".to_string());
            args.push(issue.description.clone());
        }
        for dep in &issue.deps {
            args.push("--dep".to_string());
            args.push(dep.clone());
        }
        for tag in &issue.tags {
            args.push("--tag".to_string());
            args.push(tag.clone());
        }
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run(&refs, true).await
    }

    async fn list(&self, status: Option<&str>, limit: Option<i64>, offset: Option<i64>) -> Result<Value> {
        let mut args = vec!["list".to_string()];
        if let Some(s) = status {
            args.push("--status".to_string());
            args.push(s.to_string());
        }
        if let Some(l) = limit {
            args.push("--limit".to_string());
            args.push(l.to_string());
        }
        if let Some(o) = offset {
            args.push("--offset".to_string());
            args.push(o.to_string());
        }
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run(&refs, true).await
    }

    async fn ready(&self, limit: Option<i64>) -> Result<Value> {
        let mut args = vec!["ready".to_string()];
        if let Some(l) = limit {
            args.push("--limit".to_string());
            args.push(l.to_string());
        }
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run(&refs, true).await
    }

    async fn show(&self, id: &str) -> Result<Value> {
        self.run(&["show", id], true).await
    }

    async fn update(&self, id: &str, status: Option<&str>, priority: Option<i64>, tags: Option<&[String]>) -> Result<Value> {
        let mut args = vec!["update".to_string(), id.to_string()];
        if let Some(s) = status {
            args.push("--status".to_string());
            args.push(s.to_string());
        }
        if let Some(p) = priority {
            args.push("--priority".to_string());
            args.push(p.to_string());
        }
        if let Some(tags) = tags {
            for tag in tags {
                args.push("--tag".to_string());
                args.push(tag.clone());
            }
        }
        let refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run(&refs, true).await
    }

    async fn close(&self, id: &str, reason: &str) -> Result<Value> {
        self.run(&["close", id, "--reason", reason], true).await
    }

    async fn sync(&self) -> Result<Value> {
        self.run(&["sync"], true).await
    }

    async fn stats(&self) -> Result<Value> {
        self.run(&["stats"], true).await
    }

    async fn cleanup(&self, days: i64) -> Result<Value> {
        let days = days.to_string();
        self.run(&["cleanup", "--days", &days], true).await
    }

    async fn doctor(&self, fix: bool) -> Result<Value> {
        if fix {
            self.run(&["doctor", "--fix"], true).await
        } else {
            self.run(&["doctor"], true).await
        }
    }

    async fn dep_add(&self, from: &str, to: &str, dep_type: &str) -> Result<Value> {
        self.run(&["dep", "add", from, to, "--type", dep_type], true)
            .await
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn driver_reports_its_workspace() {
        let driver = ChildProcessDriver::new(PathBuf::from("/tmp/w"), "agent-1".to_string());
        assert_eq!(driver.workspace(), Path::new("/tmp/w"));
    }
}
