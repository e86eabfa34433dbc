//! Issue-lifecycle tool handlers: `init`, `claim`, `done`, `add`,
//! `assign`, `ls`, `ready`, `show`, `cleanup`, `doctor`, `sync`
//! (spec.md §4.H).

use crate::error::CoreError;
use crate::error::Result;
use crate::issue_store::IssueStore;
use crate::issue_store::NewIssue;
use crate::mailbox::Importance;
use crate::mailbox::Scope;
use crate::tools::Ctx;
use serde_json::Value;
use serde_json::json;
use std::path::PathBuf;

pub async fn init(ctx: &Ctx, args: &Value) -> Result<Value> {
    let fields = ctx.snapshot().await;
    let workspace = args
        .get("ws")
        .and_then(Value::as_str)
        .map(PathBuf::from)
        .unwrap_or(fields.workspace);
    let team = args
        .get("team")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or(fields.team);
    let role = args
        .get("role")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or(fields.role);
    let leader = args
        .get("leader")
        .and_then(Value::as_bool)
        .unwrap_or(fields.is_leader);

    ctx.session
        .reinit(workspace.clone(), team.clone(), role.clone(), leader)
        .await;

    let store = ctx.issue_store().await;
    store.init().await?;

    let registry = ctx.registry().await;
    let capabilities = role.clone().into_iter().collect::<Vec<_>>();
    registry
        .register(&fields.agent, workspace.clone(), capabilities, leader)
        .await?;

    let mailbox = ctx.mailbox().await;
    mailbox
        .send(
            Scope::Local,
            &fields.agent,
            "all",
            "join",
            &format!("{} joined {}", fields.agent, team),
            None,
            Importance::Normal,
            None,
        )
        .await?;
    mailbox
        .send(
            Scope::Team,
            &fields.agent,
            "all",
            "join",
            &format!("{} joined {}", fields.agent, team),
            None,
            Importance::Normal,
            None,
        )
        .await?;

    let available_teams = list_teams(&ctx.config.village_base).await;

    Ok(json!({
        "ok": 1,
        "agent": fields.agent,
        "ws": workspace,
        "team": team,
        "role": role,
        "is_leader": leader,
        "available_teams": available_teams,
    }))
}

async fn list_teams(village_base: &std::path::Path) -> Vec<String> {
    let mut out = Vec::new();
    let Ok(mut entries) = tokio::fs::read_dir(village_base).await else {
        return out;
    };
    while let Ok(Some(entry)) = entries.next_entry().await {
        if entry.path().is_dir() {
            out.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    out.sort();
    out
}

pub async fn claim(ctx: &Ctx, _args: &Value) -> Result<Value> {
    let fields = ctx.snapshot().await;
    let store = ctx.issue_store().await;
    store.sync().await?;

    let ready = store.ready(Some(20)).await?;
    let items = ready.as_array().cloned().unwrap_or_default();

    let selected = items.iter().find(|issue| match &fields.role {
        None => true,
        Some(role) => match issue.get("tags").and_then(Value::as_array) {
            None => true,
            Some(tags) => {
                tags.is_empty()
                    || tags
                        .iter()
                        .any(|t| t.as_str() == Some(role.as_str()))
            }
        },
    });

    let Some(issue) = selected else {
        let msg = match &fields.role {
            Some(role) => format!("no tasks for role '{role}'"),
            None => "no tasks ready".to_string(),
        };
        return Ok(json!({ "ok": 0, "msg": msg }));
    };

    let id = issue
        .get("id")
        .and_then(|v| v.as_str().map(str::to_string).or_else(|| v.as_i64().map(|n| n.to_string())))
        .ok_or_else(|| CoreError::IssueStoreError("ready issue missing id".to_string()))?;

    store.update(&id, Some("in_progress"), None, None).await?;
    let registry = ctx.registry().await;
    registry.update_task(&fields.agent, Some(id.clone())).await?;
    ctx.session.set_current_task(Some(id.clone())).await;

    let mailbox = ctx.mailbox().await;
    mailbox
        .send(
            Scope::Local,
            &fields.agent,
            "all",
            "claimed",
            &format!("claimed:{id}"),
            Some(id.clone()),
            Importance::Normal,
            Some(id.clone()),
        )
        .await?;

    Ok(issue.clone())
}

pub async fn done(ctx: &Ctx, args: &Value) -> Result<Value> {
    let id = args
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| CoreError::InvalidInput("done requires 'id'".to_string()))?;
    let msg = args.get("msg").and_then(Value::as_str).unwrap_or("Completed");

    let fields = ctx.snapshot().await;
    let store = ctx.issue_store().await;
    store.close(id, msg).await?;

    let reservation_engine = ctx.reservations().await;
    let held = ctx.session.held_reservations().await;
    if !held.is_empty() {
        reservation_engine.release(&fields.agent, &held).await;
        ctx.session.clear_reservations().await;
    }

    store.sync().await?;
    ctx.session.set_current_task(None).await;
    ctx.session.increment_completed().await;

    let mailbox = ctx.mailbox().await;
    mailbox
        .send(
            Scope::Local,
            &fields.agent,
            "all",
            "done",
            &format!("done:{id}"),
            Some(id.to_string()),
            Importance::Normal,
            Some(id.to_string()),
        )
        .await?;

    Ok(json!({ "ok": 1, "done": id }))
}

pub async fn add(ctx: &Ctx, args: &Value) -> Result<Value> {
    let title = args
        .get("title")
        .and_then(Value::as_str)
        .ok_or_else(|| CoreError::InvalidInput("add requires 'title'".to_string()))?
        .to_string();
    let description = args
        .get("desc")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let typ = args.get("typ").and_then(Value::as_str).unwrap_or("task").to_string();
    let priority = args.get("pri").and_then(Value::as_i64).unwrap_or(2);
    let tags = string_list(args.get("tags"));
    let deps = string_list(args.get("deps"));

    let fields = ctx.snapshot().await;
    let parent = args
        .get("parent")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| fields.current_task.clone());

    let store = ctx.issue_store().await;
    let created = store
        .create(NewIssue {
            title,
            typ,
            priority,
            description,
            deps: deps.clone(),
            tags,
        })
        .await?;

    if deps.is_empty() {
        if let Some(parent_id) = parent {
            if let Some(new_id) = created.get("id").and_then(value_as_id_string) {
                store.dep_add(&new_id, &parent_id, "discovered-from").await?;
            }
        }
    }

    Ok(created)
}

pub async fn assign(ctx: &Ctx, args: &Value) -> Result<Value> {
    let fields = ctx.snapshot().await;
    if !fields.is_leader {
        return Err(CoreError::PermissionDenied);
    }

    let id = args
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| CoreError::InvalidInput("assign requires 'id'".to_string()))?;
    let role = args
        .get("role")
        .and_then(Value::as_str)
        .ok_or_else(|| CoreError::InvalidInput("assign requires 'role'".to_string()))?;
    let notify = args.get("notify").and_then(Value::as_bool).unwrap_or(true);

    let store = ctx.issue_store().await;
    // If the store doesn't accept tags through this path, the tag is
    // silently dropped — store-capability detection is left pending
    // (spec.md §9).
    store
        .update(id, None, None, Some(std::slice::from_ref(&role.to_string())))
        .await?;

    if notify {
        let mailbox = ctx.mailbox().await;
        mailbox
            .send(
                Scope::Team,
                &fields.agent,
                "all",
                "assigned",
                &format!("assigned:{id}"),
                Some(id.to_string()),
                Importance::Normal,
                Some(id.to_string()),
            )
            .await?;
    }

    Ok(json!({ "ok": 1, "id": id, "assigned_to": role }))
}

pub async fn ls(ctx: &Ctx, args: &Value) -> Result<Value> {
    let status = args.get("status").and_then(Value::as_str).unwrap_or("open");
    let limit = args.get("limit").and_then(Value::as_i64).unwrap_or(10).clamp(1, 50);
    let offset = args.get("offset").and_then(Value::as_i64).unwrap_or(0).max(0);

    let store = ctx.issue_store().await;
    let page = store.list(Some(status), Some(limit), Some(offset)).await?;
    let items = page.as_array().cloned().unwrap_or_default();
    let count = items.len() as i64;

    // `total` must reflect every matching issue, not just this page, so
    // `has_more`/`next_offset` are meaningful — an unlimited re-query of
    // the same status, not the page-limited `items.len()` (spec.md §4.H).
    let all = store.list(Some(status), None, None).await?;
    let total = all.as_array().map(|a| a.len() as i64).unwrap_or(count);
    let has_more = offset + count < total;

    let mut body = json!({
        "items": items,
        "total": total,
        "count": count,
        "offset": offset,
        "has_more": has_more,
    });
    if has_more {
        body["next_offset"] = json!(offset + count);
    }
    Ok(body)
}

pub async fn ready(ctx: &Ctx, args: &Value) -> Result<Value> {
    let limit = args.get("limit").and_then(Value::as_i64).unwrap_or(5).clamp(1, 20);
    let store = ctx.issue_store().await;
    let result = store.ready(Some(limit)).await?;
    let items = result.as_array().cloned().unwrap_or_default();
    let total = items.len() as i64;
    let count = items.len() as i64;
    Ok(json!({
        "items": items,
        "total": total,
        "count": count,
        "has_more": false,
    }))
}

pub async fn show(ctx: &Ctx, args: &Value) -> Result<Value> {
    let id = args
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| CoreError::InvalidInput("show requires 'id'".to_string()))?;
    let store = ctx.issue_store().await;
    store.show(id).await
}

pub async fn cleanup(ctx: &Ctx, args: &Value) -> Result<Value> {
    let days = args.get("days").and_then(Value::as_i64).unwrap_or(2);
    let store = ctx.issue_store().await;
    let cleaned = store.cleanup(days).await?;
    store.sync().await?;
    Ok(json!({ "ok": 1, "days": days, "cleaned": cleaned }))
}

pub async fn doctor(ctx: &Ctx, args: &Value) -> Result<Value> {
    let fix = args.get("fix").and_then(Value::as_bool).unwrap_or(false);
    let store = ctx.issue_store().await;
    store.doctor(fix).await
}

pub async fn sync(ctx: &Ctx, _args: &Value) -> Result<Value> {
    let store = ctx.issue_store().await;
    let result = store.sync().await?;
    Ok(json!({ "ok": 1, "result": result }))
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Some(Value::String(s)) => vec![s.clone()],
        _ => Vec::new(),
    }
}

fn value_as_id_string(v: &Value) -> Option<String> {
    v.as_str()
        .map(str::to_string)
        .or_else(|| v.as_i64().map(|n| n.to_string()))
}
