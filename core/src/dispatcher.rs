//! Tool Dispatcher (spec.md §4.H).
//!
//! A closed catalog of named operations. Input coercion runs uniformly
//! before every handler; handlers never raise through the dispatcher —
//! any `CoreError` is caught here and folded into the `{error, hint}`
//! envelope with the transport's `isError` flag.

use crate::config::Config;
use crate::error::CoreError;
use crate::session::SessionState;
use crate::tools;
use crate::tools::Ctx;
use coordhub_protocol::mcp::CallToolResult;
use coordhub_protocol::mcp::ToolAnnotations;
use coordhub_protocol::mcp::ToolDescriptor;
use serde_json::Value;
use serde_json::json;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

type HandlerFuture<'a> = Pin<Box<dyn Future<Output = crate::error::Result<Value>> + Send + 'a>>;
type Handler = for<'a> fn(&'a Ctx, &'a Value) -> HandlerFuture<'a>;

struct ToolEntry {
    name: &'static str,
    description: &'static str,
    input_schema: fn() -> Value,
    annotations: ToolAnnotations,
    handler: Handler,
}

macro_rules! boxed {
    ($f:path) => {
        |ctx, args| Box::pin($f(ctx, args))
    };
}

fn catalog() -> Vec<ToolEntry> {
    vec![
        ToolEntry {
            name: "init",
            description: "Switch workspace/team, initialize the issue store, register this agent, and announce its join.",
            input_schema: || json!({"type": "object", "properties": {
                "ws": {"type": "string"}, "team": {"type": "string"},
                "role": {"type": "string"}, "leader": {"type": "boolean"}
            }}),
            annotations: ToolAnnotations { read_only: false, destructive: false, idempotent: true, open_world: true },
            handler: boxed!(tools::issues::init),
        },
        ToolEntry {
            name: "claim",
            description: "Claim the next ready issue matching this agent's role, if any.",
            input_schema: || json!({"type": "object", "properties": {}}),
            annotations: ToolAnnotations { read_only: false, destructive: false, idempotent: false, open_world: true },
            handler: boxed!(tools::issues::claim),
        },
        ToolEntry {
            name: "done",
            description: "Close an issue, release held reservations, and clear the current task.",
            input_schema: || json!({"type": "object", "required": ["id"], "properties": {
                "id": {"type": "string"}, "msg": {"type": "string"}
            }}),
            annotations: ToolAnnotations { read_only: false, destructive: false, idempotent: false, open_world: true },
            handler: boxed!(tools::issues::done),
        },
        ToolEntry {
            name: "add",
            description: "Create a new issue.",
            input_schema: || json!({"type": "object", "required": ["title"], "properties": {
                "title": {"type": "string"}, "desc": {"type": "string"}, "typ": {"type": "string"},
                "pri": {"type": "integer"}, "tags": {"type": "array", "items": {"type": "string"}},
                "deps": {"type": "array", "items": {"type": "string"}}, "parent": {"type": "string"}
            }}),
            annotations: ToolAnnotations { read_only: false, destructive: false, idempotent: false, open_world: true },
            handler: boxed!(tools::issues::add),
        },
        ToolEntry {
            name: "assign",
            description: "Assign an issue to a role. Requires this session to be the team leader.",
            input_schema: || json!({"type": "object", "required": ["id", "role"], "properties": {
                "id": {"type": "string"}, "role": {"type": "string"}, "notify": {"type": "boolean"}
            }}),
            annotations: ToolAnnotations { read_only: false, destructive: false, idempotent: true, open_world: true },
            handler: boxed!(tools::issues::assign),
        },
        ToolEntry {
            name: "ls",
            description: "List issues by status.",
            input_schema: || json!({"type": "object", "properties": {
                "status": {"type": "string"}, "limit": {"type": "integer"}, "offset": {"type": "integer"}
            }}),
            annotations: ToolAnnotations { read_only: true, destructive: false, idempotent: true, open_world: true },
            handler: boxed!(tools::issues::ls),
        },
        ToolEntry {
            name: "ready",
            description: "List issues with no unresolved blocking dependency.",
            input_schema: || json!({"type": "object", "properties": {"limit": {"type": "integer"}}}),
            annotations: ToolAnnotations { read_only: true, destructive: false, idempotent: true, open_world: true },
            handler: boxed!(tools::issues::ready),
        },
        ToolEntry {
            name: "show",
            description: "Show one issue's full record.",
            input_schema: || json!({"type": "object", "required": ["id"], "properties": {"id": {"type": "string"}}}),
            annotations: ToolAnnotations { read_only: true, destructive: false, idempotent: true, open_world: true },
            handler: boxed!(tools::issues::show),
        },
        ToolEntry {
            name: "cleanup",
            description: "Clean up closed issues older than the given number of days.",
            input_schema: || json!({"type": "object", "properties": {"days": {"type": "integer"}}}),
            annotations: ToolAnnotations { read_only: false, destructive: true, idempotent: false, open_world: true },
            handler: boxed!(tools::issues::cleanup),
        },
        ToolEntry {
            name: "doctor",
            description: "Run the issue store's health check (and optionally fix issues found).",
            input_schema: || json!({"type": "object", "properties": {"fix": {"type": "boolean"}}}),
            annotations: ToolAnnotations { read_only: false, destructive: false, idempotent: true, open_world: true },
            handler: boxed!(tools::issues::doctor),
        },
        ToolEntry {
            name: "sync",
            description: "Synchronize the issue store.",
            input_schema: || json!({"type": "object", "properties": {}}),
            annotations: ToolAnnotations { read_only: false, destructive: false, idempotent: true, open_world: true },
            handler: boxed!(tools::issues::sync),
        },
        ToolEntry {
            name: "reserve",
            description: "Reserve one or more paths for exclusive editing.",
            input_schema: || json!({"type": "object", "required": ["paths"], "properties": {
                "paths": {"type": "array", "items": {"type": "string"}},
                "ttl": {"type": "integer"}, "reason": {"type": "string"}
            }}),
            annotations: ToolAnnotations { read_only: false, destructive: false, idempotent: false, open_world: false },
            handler: boxed!(tools::reservations::reserve),
        },
        ToolEntry {
            name: "release",
            description: "Release held path reservations.",
            input_schema: || json!({"type": "object", "properties": {"paths": {"type": "array", "items": {"type": "string"}}}}),
            annotations: ToolAnnotations { read_only: false, destructive: false, idempotent: true, open_world: false },
            handler: boxed!(tools::reservations::release),
        },
        ToolEntry {
            name: "reservations",
            description: "List all live path reservations in this workspace.",
            input_schema: || json!({"type": "object", "properties": {}}),
            annotations: ToolAnnotations { read_only: true, destructive: false, idempotent: true, open_world: false },
            handler: boxed!(tools::reservations::reservations),
        },
        ToolEntry {
            name: "msg",
            description: "Send a mailbox message, local or team-scoped.",
            input_schema: || json!({"type": "object", "required": ["subj"], "properties": {
                "subj": {"type": "string"}, "body": {"type": "string"}, "to": {"type": "string"},
                "thread": {"type": "string"}, "importance": {"type": "string"}, "global": {"type": "boolean"}
            }}),
            annotations: ToolAnnotations { read_only: false, destructive: false, idempotent: false, open_world: false },
            handler: boxed!(tools::mail::msg),
        },
        ToolEntry {
            name: "inbox",
            description: "Read unread (or recent) mailbox messages.",
            input_schema: || json!({"type": "object", "properties": {
                "n": {"type": "integer"}, "unread": {"type": "boolean"}, "global": {"type": "boolean"}
            }}),
            annotations: ToolAnnotations { read_only: false, destructive: false, idempotent: false, open_world: false },
            handler: boxed!(tools::mail::inbox),
        },
        ToolEntry {
            name: "broadcast",
            description: "Send a high-importance message to the whole team.",
            input_schema: || json!({"type": "object", "required": ["subj"], "properties": {
                "subj": {"type": "string"}, "body": {"type": "string"}, "importance": {"type": "string"}
            }}),
            annotations: ToolAnnotations { read_only: false, destructive: false, idempotent: false, open_world: false },
            handler: boxed!(tools::mail::broadcast),
        },
        ToolEntry {
            name: "discover",
            description: "List agents and workspaces currently active in this team.",
            input_schema: || json!({"type": "object", "properties": {}}),
            annotations: ToolAnnotations { read_only: true, destructive: false, idempotent: true, open_world: false },
            handler: boxed!(tools::agents::discover),
        },
        ToolEntry {
            name: "status",
            description: "Summarize this agent's session: current task, counts, reservations.",
            input_schema: || json!({"type": "object", "properties": {}}),
            annotations: ToolAnnotations { read_only: true, destructive: false, idempotent: true, open_world: false },
            handler: boxed!(tools::agents::status),
        },
    ]
}

pub struct Dispatcher {
    session: Arc<SessionState>,
    config: Config,
    catalog: Vec<ToolEntry>,
}

impl Dispatcher {
    pub fn new(session: Arc<SessionState>, config: Config) -> Self {
        Self {
            session,
            config,
            catalog: catalog(),
        }
    }

    pub fn list_tools(&self) -> Vec<ToolDescriptor> {
        self.catalog
            .iter()
            .map(|entry| ToolDescriptor {
                name: entry.name.to_string(),
                description: entry.description.to_string(),
                input_schema: (entry.input_schema)(),
                annotations: entry.annotations.clone(),
            })
            .collect()
    }

    /// Dispatch `name` with raw (pre-coercion) arguments. Never returns an
    /// `Err` — every failure path, including "unknown tool", is folded
    /// into a `CallToolResult` with `isError` set (spec.md §4.H, §8
    /// testable property "dispatcher closure").
    pub async fn call(&self, name: &str, raw_args: Value) -> CallToolResult {
        let Some(entry) = self.catalog.iter().find(|e| e.name == name) else {
            return CallToolResult::error(&json!({
                "error": format!("unknown tool: {name}"),
                "hint": "call tools/list to see available operations",
            }));
        };

        let args = coerce(raw_args);
        let ctx = Ctx::new(self.session.clone(), self.config.clone());
        let agent = self.session.snapshot().await.agent;
        tracing::info!(tool = name, agent = %agent, ws = %self.config.workspace.display(), "tool call");

        match (entry.handler)(&ctx, &args).await {
            Ok(value) => {
                let size = value.to_string().len().min(2048);
                tracing::info!(tool = name, result_bytes = size, "tool result");
                CallToolResult::ok(&value)
            }
            Err(err) => {
                tracing::warn!(tool = name, code = err.code(), "{err}");
                CallToolResult::error(&envelope(&err))
            }
        }
    }
}

fn envelope(err: &CoreError) -> Value {
    json!({ "error": err.code(), "message": err.to_string(), "hint": err.hint() })
}

/// Apply spec.md §4.H's uniform input coercion rules before dispatch:
/// `paths|deps|tags` given as a JSON-looking string are parsed as a JSON
/// array (left as-is on failure); `ttl` given as a string is parsed as a
/// bare integer or an `<n>[hms]`-suffixed duration.
fn coerce(mut args: Value) -> Value {
    let Value::Object(ref mut map) = args else {
        return args;
    };

    for key in ["paths", "deps", "tags"] {
        if let Some(Value::String(s)) = map.get(key).cloned() {
            if let Ok(parsed @ Value::Array(_)) = serde_json::from_str::<Value>(&s) {
                map.insert(key.to_string(), parsed);
            }
        }
    }

    if let Some(Value::String(s)) = map.get("ttl").cloned() {
        if let Some(seconds) = coerce_ttl(&s) {
            map.insert("ttl".to_string(), json!(seconds));
        }
    }

    args
}

fn coerce_ttl(raw: &str) -> Option<i64> {
    if raw.chars().all(|c| c.is_ascii_digit()) && !raw.is_empty() {
        return raw.parse().ok();
    }
    let (digits, unit) = raw.split_at(raw.len().saturating_sub(1));
    let multiplier = match unit {
        "h" => 3600,
        "m" => 60,
        "s" => 1,
        _ => return None,
    };
    digits.parse::<i64>().ok().map(|n| n * multiplier)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn coerce_ttl_parses_bare_integer() {
        assert_eq!(coerce_ttl("120"), Some(120));
    }

    #[test]
    fn coerce_ttl_parses_suffixed_durations() {
        assert_eq!(coerce_ttl("2h"), Some(7200));
        assert_eq!(coerce_ttl("5m"), Some(300));
        assert_eq!(coerce_ttl("30s"), Some(30));
    }

    #[test]
    fn coerce_ttl_rejects_garbage() {
        assert_eq!(coerce_ttl("abc"), None);
    }

    #[test]
    fn coerce_parses_json_looking_path_string() {
        let args = json!({"paths": "[\"a.txt\", \"b.txt\"]"});
        let coerced = coerce(args);
        assert_eq!(coerced["paths"], json!(["a.txt", "b.txt"]));
    }

    #[test]
    fn coerce_leaves_non_json_string_untouched() {
        let args = json!({"paths": "a.txt"});
        let coerced = coerce(args);
        assert_eq!(coerced["paths"], json!("a.txt"));
    }

    #[tokio::test]
    async fn unknown_tool_returns_error_envelope_not_panic() {
        let session = Arc::new(SessionState::new(
            "agent-1".to_string(),
            std::path::PathBuf::from("/tmp/w"),
            "default".to_string(),
        ));
        let dispatcher = Dispatcher::new(session, Config::from_env());
        let result = dispatcher.call("nonexistent", json!({})).await;
        assert_eq!(result.is_error, Some(true));
    }
}
