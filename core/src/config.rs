//! Environment-derived configuration (spec.md §6).
//!
//! CLI flag parsing is explicitly out of scope (spec.md §1); all
//! configuration here comes from the environment, read once at process
//! start and mutated only through the `init` tool re-deriving a fragment of
//! it into live `SessionState` (spec.md §4.G).

use std::path::PathBuf;

const DEFAULT_TEAM: &str = "default";
const VILLAGE_DIR_NAME: &str = ".beads-village";

#[derive(Debug, Clone)]
pub struct Config {
    pub agent: String,
    pub workspace: PathBuf,
    pub team: String,
    pub village_base: PathBuf,
    pub use_daemon: bool,
}

impl Config {
    /// Load configuration from the environment, matching spec.md §6
    /// exactly: `BEADS_AGENT`, `BEADS_WS`, `BEADS_TEAM`,
    /// `BEADS_VILLAGE_BASE`, `BEADS_USE_DAEMON`.
    pub fn from_env() -> Self {
        let agent = std::env::var("BEADS_AGENT").unwrap_or_else(|_| default_agent_id());
        let workspace = std::env::var("BEADS_WS")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
            });
        let team = std::env::var("BEADS_TEAM").unwrap_or_else(|_| DEFAULT_TEAM.to_string());
        let village_base = std::env::var("BEADS_VILLAGE_BASE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_village_base());
        let use_daemon = std::env::var("BEADS_USE_DAEMON")
            .map(|v| v != "0")
            .unwrap_or(true);

        Self {
            agent,
            workspace,
            team,
            village_base,
            use_daemon,
        }
    }
}

fn default_agent_id() -> String {
    format!("agent-{}", std::process::id())
}

fn default_village_base() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(VILLAGE_DIR_NAME)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn default_agent_id_embeds_pid() {
        let id = default_agent_id();
        assert!(id.starts_with("agent-"));
    }
}
