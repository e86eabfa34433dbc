//! Line-delimited JSON-RPC over stdin/stdout (spec.md §4.I): one message per
//! line, single-threaded processing in arrival order, responses written back
//! with a trailing newline and flushed.

use crate::protocol_handler::ProtocolHandler;
use coordhub_protocol::jsonrpc::JsonRpcError;
use coordhub_protocol::jsonrpc::JsonRpcMessage;
use coordhub_protocol::jsonrpc::PARSE_ERROR;
use std::io::Result as IoResult;
use std::sync::Arc;
use tokio::io;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncWriteExt;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracing::debug;
use tracing::error;
use tracing::info;

const CHANNEL_CAPACITY: usize = 128;

/// Decode one non-empty stdin line. `Ok` is a message to enqueue for
/// dispatch; `Err` is the parse-error reply to send straight back over
/// stdout without ever reaching the processor task.
fn decode_line(line: &str) -> Result<JsonRpcMessage, JsonRpcMessage> {
    serde_json::from_str::<JsonRpcMessage>(line).map_err(|e| {
        error!("failed to deserialize JSON-RPC message: {e}");
        JsonRpcMessage::Error(JsonRpcError::new(None, PARSE_ERROR, format!("parse error: {e}")))
    })
}

pub async fn run(handler: Arc<ProtocolHandler>) -> IoResult<()> {
    let (incoming_tx, mut incoming_rx) = mpsc::channel::<JsonRpcMessage>(CHANNEL_CAPACITY);
    let (outgoing_tx, mut outgoing_rx) = mpsc::channel::<JsonRpcMessage>(CHANNEL_CAPACITY);

    let reader_outgoing_tx = outgoing_tx.clone();
    let stdin_reader_handle = tokio::spawn(async move {
        let stdin = io::stdin();
        let reader = BufReader::new(stdin);
        let mut lines = reader.lines();

        while let Some(line) = lines.next_line().await.unwrap_or_default() {
            if line.trim().is_empty() {
                continue;
            }
            match decode_line(&line) {
                Ok(message) => {
                    if incoming_tx.send(message).await.is_err() {
                        break;
                    }
                }
                Err(reply) => {
                    if reader_outgoing_tx.send(reply).await.is_err() {
                        break;
                    }
                }
            }
        }

        debug!("stdin reader finished (EOF)");
    });

    // Single task draining `incoming_rx` sequentially: this is what keeps
    // requests handled in arrival order even though I/O overlaps across
    // tasks (spec.md §4.I).
    let processor_handle = tokio::spawn(async move {
        while let Some(message) = incoming_rx.recv().await {
            if let Some(reply) = handler.handle(message).await {
                if outgoing_tx.send(reply).await.is_err() {
                    break;
                }
            }
        }

        info!("processor task exited (channel closed)");
    });

    let stdout_writer_handle = tokio::spawn(async move {
        let mut stdout = io::stdout();
        while let Some(message) = outgoing_rx.recv().await {
            match serde_json::to_string(&message) {
                Ok(json) => {
                    if let Err(e) = stdout.write_all(json.as_bytes()).await {
                        error!("failed to write to stdout: {e}");
                        break;
                    }
                    if let Err(e) = stdout.write_all(b"\n").await {
                        error!("failed to write newline to stdout: {e}");
                        break;
                    }
                    if let Err(e) = stdout.flush().await {
                        error!("failed to flush stdout: {e}");
                        break;
                    }
                }
                Err(e) => error!("failed to serialize JSON-RPC message: {e}"),
            }
        }

        info!("stdout writer exited (channel closed)");
    });

    let _ = tokio::join!(stdin_reader_handle, processor_handle, stdout_writer_handle);
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use coordhub_core::Config;
    use coordhub_core::Dispatcher;
    use coordhub_core::SessionState;
    use coordhub_protocol::jsonrpc::RequestId;

    fn handler() -> Arc<ProtocolHandler> {
        let session = Arc::new(SessionState::new(
            "agent-1".to_string(),
            std::path::PathBuf::from("/tmp/w"),
            "default".to_string(),
        ));
        Arc::new(ProtocolHandler::new(Arc::new(Dispatcher::new(session, Config::from_env()))))
    }

    #[test]
    fn decode_line_accepts_a_well_formed_request() {
        let line = r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#;
        let decoded = decode_line(line).expect("valid JSON-RPC line should decode");
        assert!(matches!(decoded, JsonRpcMessage::Request(_)));
    }

    #[test]
    fn decode_line_turns_malformed_json_into_a_parse_error_reply() {
        let reply = decode_line("{not json").expect_err("malformed line must not decode");
        match reply {
            JsonRpcMessage::Error(e) => {
                assert_eq!(e.error.code, PARSE_ERROR);
                assert!(e.id.is_none());
            }
            other => panic!("expected Error, got {other:?}"),
        }
    }

    /// Exercises the same sequential hand-off the processor task performs,
    /// without touching real stdin/stdout: decode, dispatch, collect the
    /// reply, in arrival order.
    #[tokio::test]
    async fn dispatch_processes_messages_in_order_and_skips_notifications() {
        let handler = handler();
        let lines = [
            r#"{"jsonrpc":"2.0","id":1,"method":"initialize"}"#,
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
            r#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#,
        ];

        let mut replies = Vec::new();
        for line in lines {
            let message = decode_line(line).expect("fixture lines are well-formed");
            if let Some(reply) = handler.handle(message).await {
                replies.push(reply);
            }
        }

        assert_eq!(replies.len(), 2);
        let JsonRpcMessage::Response(first) = &replies[0] else {
            panic!("expected a response to initialize");
        };
        assert_eq!(first.id, RequestId::Integer(1));
        let JsonRpcMessage::Response(second) = &replies[1] else {
            panic!("expected a response to ping");
        };
        assert_eq!(second.id, RequestId::Integer(2));
    }

    #[tokio::test]
    async fn parse_error_reply_reaches_outgoing_channel_without_dispatch() {
        let (outgoing_tx, mut outgoing_rx) = mpsc::channel::<JsonRpcMessage>(CHANNEL_CAPACITY);
        match decode_line("{not json") {
            Ok(_) => panic!("malformed line must not decode"),
            Err(reply) => outgoing_tx.send(reply).await.unwrap(),
        }
        drop(outgoing_tx);

        let received = outgoing_rx.recv().await.expect("parse error reply should be queued");
        let JsonRpcMessage::Error(e) = received else {
            panic!("expected an Error message");
        };
        assert_eq!(e.error.code, PARSE_ERROR);
        assert!(outgoing_rx.recv().await.is_none());
    }
}
