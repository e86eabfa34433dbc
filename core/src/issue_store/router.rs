//! Per-call daemon→child-process fallback (spec.md §4.F, §9).
//!
//! "The driver selects the RPC path when the marker is present and the
//! endpoint is reachable; otherwise falls back to the child-process path.
//! Any RPC error falls back to child-process for that call, not for the
//! session." `init` always uses the child path.

use crate::error::Result;
use crate::issue_store::IssueStore;
use crate::issue_store::NewIssue;
use crate::issue_store::child::ChildProcessDriver;
use crate::issue_store::rpc::RpcDriver;
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;

pub struct Router {
    rpc: RpcDriver,
    child: ChildProcessDriver,
    use_daemon: bool,
}

impl Router {
    pub fn new(workspace: PathBuf, actor: String, use_daemon: bool) -> Self {
        Self {
            rpc: RpcDriver::new(workspace.clone(), actor.clone()),
            child: ChildProcessDriver::new(workspace, actor),
            use_daemon,
        }
    }
}

macro_rules! with_fallback {
    ($self:expr, $method:ident ( $($arg:expr),* )) => {{
        if $self.use_daemon {
            match $self.rpc.$method($($arg),*).await {
                Ok(v) => return Ok(v),
                Err(_) => {}
            }
        }
        $self.child.$method($($arg),*).await
    }};
}

#[async_trait]
impl IssueStore for Router {
    async fn init(&self) -> Result<Value> {
        // Always child; the daemon path for `init` is intentionally unused
        // (spec.md §4.F).
        self.child.init().await
    }

    async fn create(&self, issue: NewIssue) -> Result<Value> {
        with_fallback!(self, create(issue))
    }

    async fn list(&self, status: Option<&str>, limit: Option<i64>, offset: Option<i64>) -> Result<Value> {
        with_fallback!(self, list(status, limit, offset))
    }

    async fn ready(&self, limit: Option<i64>) -> Result<Value> {
        with_fallback!(self, ready(limit))
    }

    async fn show(&self, id: &str) -> Result<Value> {
        with_fallback!(self, show(id))
    }

    async fn update(&self, id: &str, status: Option<&str>, priority: Option<i64>, tags: Option<&[String]>) -> Result<Value> {
        with_fallback!(self, update(id, status, priority, tags))
    }

    async fn close(&self, id: &str, reason: &str) -> Result<Value> {
        with_fallback!(self, close(id, reason))
    }

    async fn sync(&self) -> Result<Value> {
        with_fallback!(self, sync())
    }

    async fn stats(&self) -> Result<Value> {
        with_fallback!(self, stats())
    }

    async fn cleanup(&self, days: i64) -> Result<Value> {
        with_fallback!(self, cleanup(days))
    }

    async fn doctor(&self, fix: bool) -> Result<Value> {
        with_fallback!(self, doctor(fix))
    }

    async fn dep_add(&self, from: &str, to: &str, dep_type: &str) -> Result<Value> {
        with_fallback!(self, dep_add(from, to, dep_type))
    }
}
