//! Registry tool handlers: `discover`, `status` (spec.md §4.H, §4.E).

use crate::error::Result;
use crate::issue_store::IssueStore;
use crate::tools::Ctx;
use serde_json::Value;
use serde_json::json;

pub async fn discover(ctx: &Ctx, _args: &Value) -> Result<Value> {
    let fields = ctx.snapshot().await;
    let registry = ctx.registry().await;
    registry.heartbeat(&fields.agent).await?;

    let agents = registry.active(30).await?;
    let workspaces = registry.discover_workspaces(30).await?;

    Ok(json!({
        "team": fields.team,
        "agents": agents,
        "workspaces": workspaces,
        "totals": { "agents": agents.len(), "workspaces": workspaces.len() },
    }))
}

pub async fn status(ctx: &Ctx, _args: &Value) -> Result<Value> {
    let fields = ctx.snapshot().await;
    let registry = ctx.registry().await;
    registry.heartbeat(&fields.agent).await?;

    let store = ctx.issue_store().await;
    // No `limit` here: a page-limited count would only ever report 0 or 1
    // regardless of how many issues are actually open.
    let open = store.list(Some("open"), None, None).await.ok();
    let open_count = open
        .as_ref()
        .and_then(|v| v.as_array())
        .map(|a| a.len())
        .unwrap_or(0);

    let reservations = ctx.reservations().await.reservations().await?;
    let agents = registry.active(30).await?;

    Ok(json!({
        "agent": fields.agent,
        "team": fields.team,
        "ws": fields.workspace,
        "current_task": fields.current_task,
        "completed_count": fields.completed_count,
        "open_issues": open_count,
        "held_reservations": fields.held_reservations,
        "active_reservations": reservations.len(),
        "team_agents": agents.len(),
    }))
}
