//! Session state (spec.md §4.G, §9).
//!
//! Process-local, never persisted, and threaded through handlers as an
//! explicit context value rather than via mutable globals (spec.md §9
//! "Global/process-wide state").

use chrono::DateTime;
use chrono::Local;
use std::collections::HashSet;
use std::path::PathBuf;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
pub struct SessionFields {
    pub agent: String,
    pub workspace: PathBuf,
    pub team: String,
    pub role: Option<String>,
    pub is_leader: bool,
    pub current_task: Option<String>,
    pub started: DateTime<Local>,
    pub completed_count: u64,
    pub held_reservations: HashSet<String>,
}

impl SessionFields {
    pub fn new(agent: String, workspace: PathBuf, team: String) -> Self {
        Self {
            agent,
            workspace,
            team,
            role: None,
            is_leader: false,
            current_task: None,
            started: Local::now(),
            completed_count: 0,
            held_reservations: HashSet::new(),
        }
    }
}

/// Interior-mutable wrapper so handlers can share one session across the
/// dispatcher without threading `&mut` through every call site (spec.md
/// §5: handlers may suspend mid-operation; mutation of session state must
/// be confined to after I/O completes, which an `RwLock` taken only for
/// the brief synchronous update satisfies).
pub struct SessionState {
    inner: RwLock<SessionFields>,
}

impl SessionState {
    pub fn new(agent: String, workspace: PathBuf, team: String) -> Self {
        Self {
            inner: RwLock::new(SessionFields::new(agent, workspace, team)),
        }
    }

    pub async fn snapshot(&self) -> SessionFields {
        self.inner.read().await.clone()
    }

    pub async fn reinit(&self, workspace: PathBuf, team: String, role: Option<String>, leader: bool) {
        let mut guard = self.inner.write().await;
        guard.workspace = workspace;
        guard.team = team;
        guard.role = role;
        guard.is_leader = leader;
    }

    pub async fn set_current_task(&self, task: Option<String>) {
        self.inner.write().await.current_task = task;
    }

    pub async fn increment_completed(&self) {
        self.inner.write().await.completed_count += 1;
    }

    pub async fn add_reservations<I: IntoIterator<Item = String>>(&self, paths: I) {
        let mut guard = self.inner.write().await;
        guard.held_reservations.extend(paths);
    }

    pub async fn remove_reservations<'a, I: IntoIterator<Item = &'a String>>(&self, paths: I) {
        let mut guard = self.inner.write().await;
        for p in paths {
            guard.held_reservations.remove(p);
        }
    }

    pub async fn clear_reservations(&self) {
        self.inner.write().await.held_reservations.clear();
    }

    pub async fn held_reservations(&self) -> Vec<String> {
        self.inner.read().await.held_reservations.iter().cloned().collect()
    }
}
