//! Entry point: selects the stdio or HTTP+SSE transport over the shared tool
//! dispatcher (spec.md §4.I, §4.J).

use coordhub_core::Config;
use coordhub_core::Dispatcher;
use coordhub_core::SessionState;
use coordhub_mcp_server::ProtocolHandler;
use std::sync::Arc;

/// `COORDHUB_TRANSPORT=http` switches from the default stdio transport.
const TRANSPORT_ENV: &str = "COORDHUB_TRANSPORT";
/// Bind address for the HTTP transport; defaults to loopback-only.
const HTTP_BIND_ENV: &str = "COORDHUB_HTTP_BIND";
const DEFAULT_HTTP_BIND: &str = "127.0.0.1:8787";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env();
    let session = Arc::new(SessionState::new(
        config.agent.clone(),
        config.workspace.clone(),
        config.team.clone(),
    ));
    let dispatcher = Arc::new(Dispatcher::new(session, config));
    let handler = Arc::new(ProtocolHandler::new(dispatcher));

    let transport = std::env::var(TRANSPORT_ENV).unwrap_or_else(|_| "stdio".to_string());
    match transport.as_str() {
        "http" => run_http(handler).await,
        "stdio" => {
            coordhub_mcp_server::stdio_transport::run(handler).await?;
            Ok(())
        }
        other => anyhow::bail!("unknown {TRANSPORT_ENV} value: {other}"),
    }
}

async fn run_http(handler: Arc<ProtocolHandler>) -> anyhow::Result<()> {
    let bind = std::env::var(HTTP_BIND_ENV).unwrap_or_else(|_| DEFAULT_HTTP_BIND.to_string());
    let post_uri = format!("http://{bind}/mcp");
    let app = coordhub_mcp_server::http_transport::router(handler, post_uri);

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    tracing::info!(%bind, "coordhub-mcp-server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
