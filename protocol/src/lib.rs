//! Wire types shared between the stdio and HTTP transports.
#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod jsonrpc;
pub mod mcp;
