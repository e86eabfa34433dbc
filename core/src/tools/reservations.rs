//! Reservation tool handlers: `reserve`, `release`, `reservations`
//! (spec.md §4.H, §4.C).

use crate::error::CoreError;
use crate::error::Result;
use crate::reservations::ReservationEngine;
use crate::tools::Ctx;
use serde_json::Value;
use serde_json::json;

pub async fn reserve(ctx: &Ctx, args: &Value) -> Result<Value> {
    let paths = string_list(args.get("paths"))
        .ok_or_else(|| CoreError::InvalidInput("reserve requires 'paths'".to_string()))?;
    let ttl = args
        .get("ttl")
        .and_then(Value::as_i64)
        .unwrap_or(ReservationEngine::default_ttl());

    let fields = ctx.snapshot().await;
    let reason = args
        .get("reason")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| fields.current_task.clone())
        .unwrap_or_else(|| "editing".to_string());

    let engine = ctx.reservations().await;
    let outcome = engine.reserve(&fields.agent, &paths, ttl, &reason).await;

    if !outcome.granted.is_empty() {
        ctx.session.add_reservations(outcome.granted.clone()).await;
    }

    let mut body = json!({
        "granted": outcome.granted,
        "conflicts": outcome.conflicts,
        "expires": outcome.expires,
    });
    if !outcome.errors.is_empty() {
        body["errors"] = serde_json::to_value(&outcome.errors)?;
    }
    Ok(body)
}

pub async fn release(ctx: &Ctx, args: &Value) -> Result<Value> {
    let requested = string_list(args.get("paths")).unwrap_or_default();
    let fields = ctx.snapshot().await;
    let paths = if requested.is_empty() {
        ctx.session.held_reservations().await
    } else {
        requested
    };

    let engine = ctx.reservations().await;
    let released = engine.release(&fields.agent, &paths).await;
    if !released.is_empty() {
        ctx.session.remove_reservations(&released).await;
    }

    Ok(json!({ "released": released }))
}

pub async fn reservations(ctx: &Ctx, _args: &Value) -> Result<Value> {
    let engine = ctx.reservations().await;
    let list = engine.reservations().await?;
    Ok(serde_json::to_value(list)?)
}

fn string_list(value: Option<&Value>) -> Option<Vec<String>> {
    match value {
        Some(Value::Array(items)) => Some(
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
        ),
        Some(Value::String(s)) => Some(vec![s.clone()]),
        _ => None,
    }
}
