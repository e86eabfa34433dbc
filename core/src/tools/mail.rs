//! Mailbox tool handlers: `msg`, `inbox`, `broadcast` (spec.md §4.H, §4.D).

use crate::error::CoreError;
use crate::error::Result;
use crate::mailbox::Importance;
use crate::mailbox::Scope;
use crate::tools::Ctx;
use serde_json::Value;
use serde_json::json;

pub async fn msg(ctx: &Ctx, args: &Value) -> Result<Value> {
    let subject = args
        .get("subj")
        .and_then(Value::as_str)
        .ok_or_else(|| CoreError::InvalidInput("msg requires 'subj'".to_string()))?;
    let body = args.get("body").and_then(Value::as_str).unwrap_or_default();
    let to = args.get("to").and_then(Value::as_str).unwrap_or("all");
    let thread = args.get("thread").and_then(Value::as_str).map(str::to_string);
    let importance = parse_importance(args.get("importance"));
    let global = args.get("global").and_then(Value::as_bool).unwrap_or(false);

    let fields = ctx.snapshot().await;
    let scope = if global { Scope::Team } else { Scope::Local };
    let thread = thread.or_else(|| fields.current_task.clone());
    let issue = fields.current_task.clone();

    let mailbox = ctx.mailbox().await;
    mailbox
        .send(scope, &fields.agent, to, subject, body, thread, importance, issue)
        .await?;

    Ok(json!({ "ok": 1, "global": global }))
}

pub async fn inbox(ctx: &Ctx, args: &Value) -> Result<Value> {
    let n = args.get("n").and_then(Value::as_u64).unwrap_or(5) as usize;
    let unread = args.get("unread").and_then(Value::as_bool).unwrap_or(false);
    let include_team = args.get("global").and_then(Value::as_bool).unwrap_or(true);

    let fields = ctx.snapshot().await;
    let mailbox = ctx.mailbox().await;
    let entries = mailbox.recv(&fields.agent, n, unread, include_team).await?;
    Ok(serde_json::to_value(entries)?)
}

pub async fn broadcast(ctx: &Ctx, args: &Value) -> Result<Value> {
    let subject = args
        .get("subj")
        .and_then(Value::as_str)
        .ok_or_else(|| CoreError::InvalidInput("broadcast requires 'subj'".to_string()))?;
    let body = args.get("body").and_then(Value::as_str).unwrap_or_default();
    let importance = args
        .get("importance")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| "high".to_string());

    let fields = ctx.snapshot().await;
    let mailbox = ctx.mailbox().await;
    mailbox
        .send(
            Scope::Team,
            &fields.agent,
            "all",
            subject,
            body,
            fields.current_task.clone(),
            parse_importance(Some(&Value::String(importance))),
            fields.current_task.clone(),
        )
        .await?;

    Ok(json!({ "ok": 1, "broadcast": subject }))
}

fn parse_importance(value: Option<&Value>) -> Importance {
    match value.and_then(Value::as_str) {
        Some("low") => Importance::Low,
        Some("high") => Importance::High,
        _ => Importance::Normal,
    }
}
