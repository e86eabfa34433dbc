//! Transport-agnostic JSON-RPC method dispatch, shared by the stdio and
//! HTTP transports (spec.md §4.I, §4.J): `initialize`,
//! `notifications/initialized`, `tools/list`, `tools/call`, `ping`.

use coordhub_core::Dispatcher;
use coordhub_protocol::jsonrpc::INTERNAL_ERROR;
use coordhub_protocol::jsonrpc::JsonRpcError;
use coordhub_protocol::jsonrpc::JsonRpcMessage;
use coordhub_protocol::jsonrpc::JsonRpcResponse;
use coordhub_protocol::jsonrpc::METHOD_NOT_FOUND;
use coordhub_protocol::jsonrpc::RequestId;
use coordhub_protocol::mcp::Implementation;
use coordhub_protocol::mcp::InitializeResult;
use coordhub_protocol::mcp::ListToolsResult;
use coordhub_protocol::mcp::PROTOCOL_VERSION;
use coordhub_protocol::mcp::ServerCapabilities;
use coordhub_protocol::mcp::ToolsCapability;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

const SERVER_NAME: &str = "coordhub-mcp-server";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");
const INSTRUCTIONS: &str =
    "Call `init` first to bind this session to a workspace and team, then use `claim`/`done`/`reserve`/`msg` to coordinate.";

#[derive(Deserialize)]
struct CallToolParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

pub struct ProtocolHandler {
    dispatcher: Arc<Dispatcher>,
}

impl ProtocolHandler {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Handle one decoded message. Returns `None` for notifications, which
    /// never produce a reply (spec.md §4.I).
    pub async fn handle(&self, message: JsonRpcMessage) -> Option<JsonRpcMessage> {
        match message {
            JsonRpcMessage::Request(request) => {
                let result = self.handle_method(&request.method, request.params).await;
                Some(match result {
                    Ok(value) => JsonRpcMessage::Response(JsonRpcResponse::new(request.id, value)),
                    Err((code, message)) => {
                        JsonRpcMessage::Error(JsonRpcError::new(Some(request.id), code, message))
                    }
                })
            }
            JsonRpcMessage::Notification(notification) => {
                if notification.method != "notifications/initialized" {
                    tracing::debug!(method = %notification.method, "unhandled notification");
                }
                None
            }
            JsonRpcMessage::Response(_) | JsonRpcMessage::Error(_) => None,
        }
    }

    async fn handle_method(&self, method: &str, params: Option<Value>) -> Result<Value, (i64, String)> {
        match method {
            "initialize" => Ok(serde_json::to_value(InitializeResult {
                protocol_version: PROTOCOL_VERSION.to_string(),
                server_info: Implementation {
                    name: SERVER_NAME.to_string(),
                    version: SERVER_VERSION.to_string(),
                },
                capabilities: ServerCapabilities {
                    tools: ToolsCapability { list_changed: false },
                },
                instructions: INSTRUCTIONS.to_string(),
            })
            .map_err(|e| (INTERNAL_ERROR, e.to_string()))?),

            "ping" => Ok(serde_json::json!({})),

            "tools/list" => Ok(serde_json::to_value(ListToolsResult {
                tools: self.dispatcher.list_tools(),
            })
            .map_err(|e| (INTERNAL_ERROR, e.to_string()))?),

            "tools/call" => {
                let params: CallToolParams = match params {
                    Some(p) => serde_json::from_value(p)
                        .map_err(|e| (INTERNAL_ERROR, format!("invalid tools/call params: {e}")))?,
                    None => return Err((INTERNAL_ERROR, "tools/call requires params".to_string())),
                };
                let result = self.dispatcher.call(&params.name, params.arguments).await;
                Ok(serde_json::to_value(result).map_err(|e| (INTERNAL_ERROR, e.to_string()))?)
            }

            other => Err((METHOD_NOT_FOUND, format!("unknown method: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use coordhub_core::Config;
    use coordhub_core::SessionState;
    use coordhub_protocol::jsonrpc::JsonRpcRequest;
    use coordhub_protocol::jsonrpc::JSONRPC_VERSION;

    fn handler() -> ProtocolHandler {
        let session = Arc::new(SessionState::new(
            "agent-1".to_string(),
            std::path::PathBuf::from("/tmp/w"),
            "default".to_string(),
        ));
        ProtocolHandler::new(Arc::new(Dispatcher::new(session, Config::from_env())))
    }

    #[tokio::test]
    async fn initialize_returns_protocol_version() {
        let handler = handler();
        let request = JsonRpcMessage::Request(JsonRpcRequest {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: RequestId::Integer(1),
            method: "initialize".to_string(),
            params: None,
        });
        let Some(JsonRpcMessage::Response(response)) = handler.handle(request).await else {
            panic!("expected a response");
        };
        assert_eq!(response.result["protocolVersion"], PROTOCOL_VERSION);
    }

    #[tokio::test]
    async fn unknown_method_returns_method_not_found() {
        let handler = handler();
        let request = JsonRpcMessage::Request(JsonRpcRequest {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: RequestId::Integer(2),
            method: "bogus".to_string(),
            params: None,
        });
        let Some(JsonRpcMessage::Error(error)) = handler.handle(request).await else {
            panic!("expected an error");
        };
        assert_eq!(error.error.code, METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn notifications_initialized_produces_no_reply() {
        let handler = handler();
        let notification = JsonRpcMessage::Notification(coordhub_protocol::jsonrpc::JsonRpcNotification {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: "notifications/initialized".to_string(),
            params: None,
        });
        assert!(handler.handle(notification).await.is_none());
    }

    #[tokio::test]
    async fn tools_list_returns_the_full_catalog() {
        let handler = handler();
        let request = JsonRpcMessage::Request(JsonRpcRequest {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: RequestId::Integer(3),
            method: "tools/list".to_string(),
            params: None,
        });
        let Some(JsonRpcMessage::Response(response)) = handler.handle(request).await else {
            panic!("expected a response");
        };
        let tools = response.result["tools"].as_array().unwrap();
        assert!(tools.iter().any(|t| t["name"] == "init"));
        assert!(tools.iter().any(|t| t["name"] == "reserve"));
    }
}
