//! Agent registry (spec.md §4.E, §6).
//!
//! One record per agent per team, stored at
//! `<BASE>/<team>/agents/<agent-id>.json`. Status is derived, not stored:
//! an agent is *working* if it has a current task, *online* if its
//! `last_seen` falls inside a freshness window, else *offline*.

use crate::atomic_file;
use crate::error::Result;
use chrono::DateTime;
use chrono::Local;
use serde::Deserialize;
use serde::Serialize;
use std::path::PathBuf;

/// Default freshness window for `active`/derived status (spec.md §3, §4.E).
pub const ONLINE_WINDOW_SECS: i64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Working,
    Online,
    Offline,
}

/// On-disk registry entry, field names bit-exact per spec.md §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub agent: String,
    pub ws: PathBuf,
    pub team: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub leader: bool,
    pub registered: DateTime<Local>,
    pub last_seen: DateTime<Local>,
    pub current_task: Option<String>,
}

impl AgentRecord {
    pub fn status(&self, now: DateTime<Local>) -> Status {
        if self.current_task.is_some() {
            return Status::Working;
        }
        let age = now.signed_duration_since(self.last_seen);
        if age <= chrono::Duration::seconds(ONLINE_WINDOW_SECS) {
            Status::Online
        } else {
            Status::Offline
        }
    }
}

pub struct AgentRegistry {
    village_base: PathBuf,
    team: String,
}

impl AgentRegistry {
    pub fn new(village_base: PathBuf, team: String) -> Self {
        Self { village_base, team }
    }

    fn dir(&self) -> PathBuf {
        self.village_base.join(&self.team).join("agents")
    }

    fn record_path(&self, agent: &str) -> PathBuf {
        self.dir().join(format!("{agent}.json"))
    }

    /// Publish a fresh record for `agent` with `registered = last_seen =
    /// now` (spec.md §4.E `register`).
    pub async fn register(
        &self,
        agent: &str,
        ws: PathBuf,
        capabilities: Vec<String>,
        leader: bool,
    ) -> Result<()> {
        let now = Local::now();
        let record = AgentRecord {
            agent: agent.to_string(),
            ws,
            team: self.team.clone(),
            capabilities,
            leader,
            registered: now,
            last_seen: now,
            current_task: None,
        };
        self.save(&record).await
    }

    /// Read-modify-write `last_seen`. No-op if the record vanished
    /// (spec.md §4.E `heartbeat`).
    pub async fn heartbeat(&self, agent: &str) -> Result<()> {
        let Ok(mut record) = self.load(agent).await else {
            return Ok(());
        };
        record.last_seen = Local::now();
        self.save(&record).await
    }

    /// Same as `heartbeat` plus set/clear the current task
    /// (spec.md §4.E `update_task`).
    pub async fn update_task(&self, agent: &str, task: Option<String>) -> Result<()> {
        let mut record = self.load(agent).await?;
        record.current_task = task;
        record.last_seen = Local::now();
        self.save(&record).await
    }

    pub async fn load(&self, agent: &str) -> Result<AgentRecord> {
        let bytes = atomic_file::read(&self.record_path(agent)).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn save(&self, record: &AgentRecord) -> Result<()> {
        let bytes = serde_json::to_vec(record)?;
        atomic_file::publish(&self.dir(), &format!("{}.json", record.agent), &bytes).await?;
        Ok(())
    }

    /// Enumerate records whose `last_seen` falls within `window_minutes`
    /// (spec.md §4.E `active`).
    pub async fn active(&self, window_minutes: i64) -> Result<Vec<AgentRecord>> {
        let now = Local::now();
        let window = chrono::Duration::minutes(window_minutes);
        let mut out = Vec::new();
        for record in self.all_records().await? {
            if now.signed_duration_since(record.last_seen) <= window {
                out.push(record);
            }
        }
        out.sort_by(|a, b| a.agent.cmp(&b.agent));
        Ok(out)
    }

    /// Group active records by workspace (spec.md §4.E `discover_workspaces`).
    pub async fn discover_workspaces(&self, window_minutes: i64) -> Result<Vec<WorkspaceGroup>> {
        let active = self.active(window_minutes).await?;
        let mut groups: Vec<WorkspaceGroup> = Vec::new();
        for record in active {
            if let Some(group) = groups.iter_mut().find(|g| g.workspace == record.ws) {
                group.agents.push(record.agent);
            } else {
                groups.push(WorkspaceGroup {
                    workspace: record.ws.clone(),
                    agents: vec![record.agent],
                });
            }
        }
        groups.sort_by(|a, b| a.workspace.cmp(&b.workspace));
        Ok(groups)
    }

    /// All records in this team with their derived status, malformed files
    /// silently skipped (spec.md §7 `FilesystemError` read policy).
    pub async fn discover(&self) -> Result<Vec<(AgentRecord, Status)>> {
        let now = Local::now();
        let mut out: Vec<_> = self
            .all_records()
            .await?
            .into_iter()
            .map(|r| {
                let status = r.status(now);
                (r, status)
            })
            .collect();
        out.sort_by(|a, b| a.0.agent.cmp(&b.0.agent));
        Ok(out)
    }

    async fn all_records(&self) -> Result<Vec<AgentRecord>> {
        let dir = self.dir();
        let mut out = Vec::new();
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Ok(bytes) = atomic_file::read(&path).await else {
                continue;
            };
            let Ok(record) = serde_json::from_slice::<AgentRecord>(&bytes) else {
                continue;
            };
            out.push(record);
        }
        Ok(out)
    }

    /// Remove records whose `last_seen` is older than `max_age_secs`. Kept
    /// as a library-level capability for operators, not wired to a
    /// dispatcher tool (SPEC_FULL.md §E, supplemented from
    /// `original_source/beads_village/agent_registry.py`'s cleanup path).
    pub async fn cleanup_stale(&self, max_age_secs: i64) -> Result<Vec<String>> {
        let dir = self.dir();
        let mut removed = Vec::new();
        let now = Local::now();
        for record in self.all_records().await? {
            let age = now.signed_duration_since(record.last_seen);
            if age > chrono::Duration::seconds(max_age_secs) {
                let path = dir.join(format!("{}.json", record.agent));
                if tokio::fs::remove_file(&path).await.is_ok() {
                    removed.push(record.agent);
                }
            }
        }
        Ok(removed)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkspaceGroup {
    pub workspace: PathBuf,
    pub agents: Vec<String>,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn register_then_discover_reports_online() {
        let base = tempdir().unwrap();
        let registry = AgentRegistry::new(base.path().to_path_buf(), "team-a".to_string());
        registry
            .register("agent-a", PathBuf::from("/ws/a"), vec!["fe".into()], false)
            .await
            .unwrap();

        let discovered = registry.discover().await.unwrap();
        assert_eq!(discovered.len(), 1);
        assert_eq!(discovered[0].1, Status::Online);
    }

    #[tokio::test]
    async fn update_task_reports_working() {
        let base = tempdir().unwrap();
        let registry = AgentRegistry::new(base.path().to_path_buf(), "team-a".to_string());
        registry
            .register("agent-a", PathBuf::from("/ws/a"), vec![], false)
            .await
            .unwrap();
        registry
            .update_task("agent-a", Some("bd-1".to_string()))
            .await
            .unwrap();

        let discovered = registry.discover().await.unwrap();
        assert_eq!(discovered[0].1, Status::Working);
    }

    #[tokio::test]
    async fn stale_last_seen_reports_offline() {
        let base = tempdir().unwrap();
        let registry = AgentRegistry::new(base.path().to_path_buf(), "team-a".to_string());
        let record = AgentRecord {
            agent: "agent-a".to_string(),
            ws: PathBuf::from("/ws/a"),
            team: "team-a".to_string(),
            capabilities: vec![],
            leader: false,
            registered: Local::now(),
            last_seen: Local::now() - chrono::Duration::seconds(ONLINE_WINDOW_SECS + 60),
            current_task: None,
        };
        registry.save(&record).await.unwrap();

        let discovered = registry.discover().await.unwrap();
        assert_eq!(discovered[0].1, Status::Offline);
    }

    #[tokio::test]
    async fn discover_workspaces_groups_by_workspace() {
        let base = tempdir().unwrap();
        let registry = AgentRegistry::new(base.path().to_path_buf(), "team-a".to_string());
        registry
            .register("agent-a", PathBuf::from("/ws/1"), vec![], false)
            .await
            .unwrap();
        registry
            .register("agent-b", PathBuf::from("/ws/1"), vec![], false)
            .await
            .unwrap();
        registry
            .register("agent-c", PathBuf::from("/ws/2"), vec![], false)
            .await
            .unwrap();

        let groups = registry.discover_workspaces(30).await.unwrap();
        assert_eq!(groups.len(), 2);
        let ws1 = groups.iter().find(|g| g.workspace == PathBuf::from("/ws/1")).unwrap();
        assert_eq!(ws1.agents.len(), 2);
    }

    #[tokio::test]
    async fn heartbeat_on_vanished_record_is_a_no_op() {
        let base = tempdir().unwrap();
        let registry = AgentRegistry::new(base.path().to_path_buf(), "team-a".to_string());
        registry.heartbeat("ghost").await.unwrap();
        assert!(registry.discover().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cleanup_stale_removes_old_records_only() {
        let base = tempdir().unwrap();
        let registry = AgentRegistry::new(base.path().to_path_buf(), "team-a".to_string());
        let stale = AgentRecord {
            agent: "agent-old".to_string(),
            ws: PathBuf::from("/ws/old"),
            team: "team-a".to_string(),
            capabilities: vec![],
            leader: false,
            registered: Local::now(),
            last_seen: Local::now() - chrono::Duration::days(30),
            current_task: None,
        };
        registry.save(&stale).await.unwrap();
        registry
            .register("agent-new", PathBuf::from("/ws/new"), vec![], false)
            .await
            .unwrap();

        let removed = registry.cleanup_stale(3600).await.unwrap();
        assert_eq!(removed, vec!["agent-old".to_string()]);

        let discovered = registry.discover().await.unwrap();
        assert_eq!(discovered.len(), 1);
        assert_eq!(discovered[0].0.agent, "agent-new");
    }
}
