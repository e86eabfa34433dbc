//! HTTP + server-sent-events transport (spec.md §4.J): `GET /mcp` opens a
//! liveness stream, `POST /mcp` carries one JSON-RPC request/response pair,
//! `GET /health` answers liveness probes.

use crate::protocol_handler::ProtocolHandler;
use axum::Json;
use axum::Router;
use axum::extract::State;
use axum::response::sse::Event;
use axum::response::Sse;
use axum::routing::get;
use coordhub_protocol::jsonrpc::JsonRpcMessage;
use coordhub_protocol::jsonrpc::PARSE_ERROR;
use serde_json::Value;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

const PING_INTERVAL: Duration = Duration::from_secs(15);

#[derive(Clone)]
struct AppState {
    handler: Arc<ProtocolHandler>,
    post_uri: Arc<str>,
}

pub fn router(handler: Arc<ProtocolHandler>, post_uri: impl Into<String>) -> Router {
    let state = AppState {
        handler,
        post_uri: post_uri.into().into(),
    };

    Router::new()
        .route("/mcp", get(stream_handler).post(post_handler))
        .route("/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_handler() -> Json<Value> {
    Json(json!({
        "name": "coordhub-mcp-server",
        "status": "ok",
    }))
}

/// `endpoint` event carrying the literal POST URI, then a `ping` every
/// 15 seconds until the client disconnects (spec.md §4.J). No tool results
/// are ever pushed on this stream.
async fn stream_handler(
    State(state): State<AppState>,
) -> Sse<impl futures::Stream<Item = Result<Event, Infallible>>> {
    let post_uri = state.post_uri.clone();
    let stream = async_stream::stream! {
        yield Ok(Event::default().event("endpoint").data(post_uri.to_string()));
        let mut interval = tokio::time::interval(PING_INTERVAL);
        interval.tick().await; // first tick fires immediately; discard it
        loop {
            interval.tick().await;
            yield Ok(Event::default().event("ping").data(""));
        }
    };
    Sse::new(stream)
}

async fn post_handler(State(state): State<AppState>, body: String) -> Json<Value> {
    let message: JsonRpcMessage = match serde_json::from_str(&body) {
        Ok(message) => message,
        Err(e) => {
            return Json(json!({
                "jsonrpc": "2.0",
                "id": null,
                "error": { "code": PARSE_ERROR, "message": format!("parse error: {e}") },
            }));
        }
    };

    match state.handler.handle(message).await {
        Some(reply) => Json(serde_json::to_value(reply).unwrap_or_else(|e| json!({ "error": e.to_string() }))),
        // `notifications/initialized` and other notifications produce no
        // JSON-RPC reply; the HTTP transport still answers with an empty 200.
        None => Json(json!({})),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::http::StatusCode;
    use coordhub_core::Config;
    use coordhub_core::Dispatcher;
    use coordhub_core::SessionState;
    use tower::ServiceExt;

    fn test_router() -> Router {
        let session = Arc::new(SessionState::new(
            "agent-1".to_string(),
            std::path::PathBuf::from("/tmp/w"),
            "default".to_string(),
        ));
        let dispatcher = Arc::new(Dispatcher::new(session, Config::from_env()));
        let handler = Arc::new(ProtocolHandler::new(dispatcher));
        router(handler, "http://127.0.0.1:3000/mcp")
    }

    #[tokio::test]
    async fn health_endpoint_reports_ok() {
        let response = test_router()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn post_initialize_returns_protocol_version() {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
        })
        .to_string();
        let response = test_router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/mcp")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["result"]["protocolVersion"], coordhub_protocol::mcp::PROTOCOL_VERSION);
    }

    #[tokio::test]
    async fn post_notification_returns_empty_200() {
        let body = json!({
            "jsonrpc": "2.0",
            "method": "notifications/initialized",
        })
        .to_string();
        let response = test_router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/mcp")
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value, json!({}));
    }
}
