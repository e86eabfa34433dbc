//! File-backed append-only mailbox (spec.md §4.D, §6).
//!
//! Two physical directories per scope: **local** (`<W>/.mail/`) and **team
//! hub** (`<BASE>/<T>/mail/`). Each message is one JSON file named
//! `<epoch-seconds-with-microseconds>_<6-hex>.json`, published through
//! `atomic_file::publish`; lexical sort of the filename is chronological
//! order. A reader's position in a directory is a sidecar `.read_<agent>`
//! file holding one epoch-seconds float, never a mutation of the message
//! store itself.

use crate::atomic_file;
use crate::error::Result;
use chrono::DateTime;
use chrono::Local;
use serde::Deserialize;
use serde::Serialize;
use std::path::Path;
use std::path::PathBuf;

/// `recv` never reads more than this many files from one directory
/// (spec.md §4.D, testable property list item on mailbox bounds). The spec
/// leaves per-directory vs. unified open (§9); this implementation adopts
/// per-directory, as the spec recommends.
pub const MAX_FILES_PER_SCAN: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Local,
    Team,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Importance {
    Low,
    Normal,
    High,
}

impl Default for Importance {
    fn default() -> Self {
        Importance::Normal
    }
}

/// On-disk message schema, field names bit-exact per spec.md §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "f")]
    pub from: String,
    /// `"all"` or a specific agent id.
    #[serde(rename = "t")]
    pub to: String,
    #[serde(rename = "s")]
    pub subject: String,
    #[serde(rename = "b")]
    pub body: String,
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Local>,
    pub thread: Option<String>,
    #[serde(rename = "imp")]
    pub importance: Importance,
    pub issue: Option<String>,
    pub ws: String,
}

/// A message as handed back to a reader: the stored record plus whether it
/// came from the team hub (spec.md §4.D step 5).
#[derive(Debug, Clone, Serialize)]
pub struct InboxEntry {
    #[serde(flatten)]
    pub message: Message,
    pub global: bool,
}

pub struct Mailbox {
    workspace: PathBuf,
    village_base: PathBuf,
    team: String,
}

impl Mailbox {
    pub fn new(workspace: PathBuf, village_base: PathBuf, team: String) -> Self {
        Self {
            workspace,
            village_base,
            team,
        }
    }

    fn dir(&self, scope: Scope) -> PathBuf {
        match scope {
            Scope::Local => self.workspace.join(".mail"),
            Scope::Team => self.village_base.join(&self.team).join("mail"),
        }
    }

    fn cursor_path(&self, scope: Scope, agent: &str) -> PathBuf {
        self.dir(scope).join(format!(".read_{agent}"))
    }

    /// Append one message into `scope` (spec.md §4.D `send`).
    #[allow(clippy::too_many_arguments)]
    pub async fn send(
        &self,
        scope: Scope,
        from: &str,
        to: &str,
        subject: &str,
        body: &str,
        thread: Option<String>,
        importance: Importance,
        issue: Option<String>,
    ) -> Result<()> {
        let now = Local::now();
        let message = Message {
            from: from.to_string(),
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
            timestamp: now,
            thread,
            importance,
            issue,
            ws: self.workspace.display().to_string(),
        };
        let bytes = serde_json::to_vec(&message)?;
        let name = filename_for(now);
        atomic_file::publish(&self.dir(scope), &name, &bytes).await?;
        Ok(())
    }

    /// Messages addressed to `agent` (or `"all"`) from local scope, and
    /// optionally the team hub, newest-bounded at `MAX_FILES_PER_SCAN` per
    /// directory, oldest-first, truncated to the last `max_n` overall
    /// (spec.md §4.D `recv`). Advances each scanned directory's cursor to
    /// "now" after a non-empty read from that directory — not to the
    /// timestamp of the newest message returned, a known gap (spec.md §9).
    pub async fn recv(
        &self,
        agent: &str,
        max_n: usize,
        unread_only: bool,
        include_team: bool,
    ) -> Result<Vec<InboxEntry>> {
        let mut merged = Vec::new();

        let local = self
            .recv_scope(Scope::Local, agent, unread_only, false)
            .await?;
        merged.extend(local);

        if include_team {
            let team = self
                .recv_scope(Scope::Team, agent, unread_only, true)
                .await?;
            merged.extend(team);
        }

        merged.sort_by_key(|e| e.message.timestamp);
        if merged.len() > max_n {
            let drop = merged.len() - max_n;
            merged.drain(0..drop);
        }
        Ok(merged)
    }

    async fn recv_scope(
        &self,
        scope: Scope,
        agent: &str,
        unread_only: bool,
        global: bool,
    ) -> Result<Vec<InboxEntry>> {
        let dir = self.dir(scope);
        let cursor = self.read_cursor(scope, agent).await;

        let mut names = list_message_files(&dir).await?;
        names.sort();
        names.reverse();
        names.truncate(MAX_FILES_PER_SCAN);

        let mut out = Vec::new();
        for name in names {
            let Ok(bytes) = atomic_file::read(&dir.join(&name)).await else {
                continue;
            };
            let Ok(message) = serde_json::from_slice::<Message>(&bytes) else {
                continue;
            };
            if message.to != "all" && message.to != agent {
                continue;
            }
            if unread_only && message.timestamp.timestamp() <= cursor {
                continue;
            }
            out.push(InboxEntry { message, global });
        }

        if !out.is_empty() {
            self.write_cursor(scope, agent, Local::now()).await?;
        }
        Ok(out)
    }

    async fn read_cursor(&self, scope: Scope, agent: &str) -> i64 {
        match atomic_file::read(&self.cursor_path(scope, agent)).await {
            Ok(bytes) => std::str::from_utf8(&bytes)
                .ok()
                .and_then(|s| s.trim().parse::<f64>().ok())
                .map(|secs| secs as i64)
                .unwrap_or(0),
            Err(_) => 0,
        }
    }

    async fn write_cursor(&self, scope: Scope, agent: &str, at: DateTime<Local>) -> Result<()> {
        let dir = self.dir(scope);
        let name = format!(".read_{agent}");
        let secs = at.timestamp() as f64 + f64::from(at.timestamp_subsec_micros()) / 1_000_000.0;
        atomic_file::publish(&dir, &name, format!("{secs:.6}").as_bytes()).await?;
        Ok(())
    }
}

fn filename_for(at: DateTime<Local>) -> String {
    let secs = at.timestamp() as f64 + f64::from(at.timestamp_subsec_micros()) / 1_000_000.0;
    format!("{secs:.6}_{}.json", random_hex6())
}

fn random_hex6() -> String {
    use rand::Rng;
    let n: u32 = rand::rng().random::<u32>() & 0xff_ffff;
    format!("{n:06x}")
}

async fn list_message_files(dir: &Path) -> Result<Vec<String>> {
    let mut out = Vec::new();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
        Err(e) => return Err(e.into()),
    };
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') || !name.ends_with(".json") {
            continue;
        }
        out.push(name);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use tempfile::tempdir;

    fn mailbox(ws: &Path, base: &Path) -> Mailbox {
        Mailbox::new(ws.to_path_buf(), base.to_path_buf(), "team-a".to_string())
    }

    #[tokio::test]
    async fn direct_message_is_received_by_addressee_only() {
        let ws = tempdir().unwrap();
        let base = tempdir().unwrap();
        let mb = mailbox(ws.path(), base.path());

        mb.send(
            Scope::Local,
            "alice",
            "bob",
            "hi",
            "hi bob",
            None,
            Importance::Normal,
            None,
        )
        .await
        .unwrap();

        let bob_inbox = mb.recv("bob", 5, false, false).await.unwrap();
        assert_eq!(bob_inbox.len(), 1);
        assert_eq!(bob_inbox[0].message.body, "hi bob");
        assert!(!bob_inbox[0].global);

        let carol_inbox = mb.recv("carol", 5, false, false).await.unwrap();
        assert!(carol_inbox.is_empty());
    }

    #[tokio::test]
    async fn broadcast_reaches_every_reader_with_global_flag() {
        let ws = tempdir().unwrap();
        let base = tempdir().unwrap();
        let mb = mailbox(ws.path(), base.path());

        mb.send(
            Scope::Team,
            "lead",
            "all",
            "standup",
            "stand up in 5",
            None,
            Importance::High,
            None,
        )
        .await
        .unwrap();

        let a = mb.recv("agent-a", 5, false, true).await.unwrap();
        let b = mb.recv("agent-b", 5, false, true).await.unwrap();
        assert_eq!(a.len(), 1);
        assert!(a[0].global);
        assert_eq!(b.len(), 1);
    }

    #[tokio::test]
    async fn team_scope_excluded_without_include_team() {
        let ws = tempdir().unwrap();
        let base = tempdir().unwrap();
        let mb = mailbox(ws.path(), base.path());
        mb.send(
            Scope::Team,
            "lead",
            "all",
            "s",
            "b",
            None,
            Importance::Normal,
            None,
        )
        .await
        .unwrap();

        let inbox = mb.recv("agent-a", 5, false, false).await.unwrap();
        assert!(inbox.is_empty());
    }

    #[tokio::test]
    async fn cursor_prevents_redelivery_of_unread_only() {
        let ws = tempdir().unwrap();
        let base = tempdir().unwrap();
        let mb = mailbox(ws.path(), base.path());

        mb.send(
            Scope::Local,
            "alice",
            "bob",
            "s",
            "first",
            None,
            Importance::Normal,
            None,
        )
        .await
        .unwrap();
        let first = mb.recv("bob", 5, true, false).await.unwrap();
        assert_eq!(first.len(), 1);

        let second = mb.recv("bob", 5, true, false).await.unwrap();
        assert!(second.is_empty());
    }

    #[tokio::test]
    async fn fifo_per_writer() {
        let ws = tempdir().unwrap();
        let base = tempdir().unwrap();
        let mb = mailbox(ws.path(), base.path());

        mb.send(
            Scope::Local,
            "alice",
            "bob",
            "s",
            "m1",
            None,
            Importance::Normal,
            None,
        )
        .await
        .unwrap();
        mb.send(
            Scope::Local,
            "alice",
            "bob",
            "s",
            "m2",
            None,
            Importance::Normal,
            None,
        )
        .await
        .unwrap();

        let inbox = mb.recv("bob", 5, false, false).await.unwrap();
        assert_eq!(inbox.len(), 2);
        assert_eq!(inbox[0].message.body, "m1");
        assert_eq!(inbox[1].message.body, "m2");
    }

    #[tokio::test]
    async fn max_n_keeps_most_recent() {
        let ws = tempdir().unwrap();
        let base = tempdir().unwrap();
        let mb = mailbox(ws.path(), base.path());

        for i in 0..5 {
            mb.send(
                Scope::Local,
                "alice",
                "bob",
                "s",
                &format!("m{i}"),
                None,
                Importance::Normal,
                None,
            )
            .await
            .unwrap();
        }

        let inbox = mb.recv("bob", 2, false, false).await.unwrap();
        assert_eq!(inbox.len(), 2);
        assert_eq!(inbox[0].message.body, "m3");
        assert_eq!(inbox[1].message.body, "m4");
    }
}
