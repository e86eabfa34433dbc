//! Tool handlers (spec.md §4.H). One module per cluster of related
//! operations; each handler takes a `Ctx` and the already-coerced
//! argument object and returns a plain JSON value or a `CoreError` for
//! the dispatcher to fold into the `{error, hint}` envelope.

pub mod agents;
pub mod issues;
pub mod mail;
pub mod reservations;

use crate::config::Config;
use crate::issue_store::IssueStore;
use crate::issue_store::router::Router;
use crate::mailbox::Mailbox;
use crate::registry::AgentRegistry;
use crate::reservations::ReservationEngine;
use crate::session::SessionFields;
use crate::session::SessionState;
use std::sync::Arc;

/// Everything a handler needs, rebuilt from the live session snapshot on
/// every call so `init` switching workspace/team takes effect immediately
/// (spec.md §9: session fields are runtime-mutable via `init`).
pub struct Ctx {
    pub session: Arc<SessionState>,
    pub config: Config,
}

impl Ctx {
    pub fn new(session: Arc<SessionState>, config: Config) -> Self {
        Self { session, config }
    }

    pub async fn snapshot(&self) -> SessionFields {
        self.session.snapshot().await
    }

    pub async fn reservations(&self) -> ReservationEngine {
        ReservationEngine::new(self.snapshot().await.workspace)
    }

    pub async fn mailbox(&self) -> Mailbox {
        let fields = self.snapshot().await;
        Mailbox::new(fields.workspace, self.config.village_base.clone(), fields.team)
    }

    pub async fn registry(&self) -> AgentRegistry {
        let fields = self.snapshot().await;
        AgentRegistry::new(self.config.village_base.clone(), fields.team)
    }

    pub async fn issue_store(&self) -> impl IssueStore {
        let fields = self.snapshot().await;
        Router::new(fields.workspace, fields.agent, self.config.use_daemon)
    }
}
