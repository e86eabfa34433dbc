//! Coordination substrate MCP server: a stdio JSON-RPC transport and an
//! HTTP + server-sent-events transport over the same tool dispatcher
//! (spec.md §4.I, §4.J).
#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod http_transport;
pub mod protocol_handler;
pub mod stdio_transport;

pub use protocol_handler::ProtocolHandler;
