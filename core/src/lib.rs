//! Core coordination substrate: path safety, atomic file publication, the
//! reservation engine, mailbox, agent registry, issue-store driver,
//! session state, and the tool dispatcher (spec.md §2).
#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod atomic_file;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod issue_store;
pub mod mailbox;
pub mod path_safety;
pub mod registry;
pub mod reservations;
pub mod session;
pub mod tools;

pub use config::Config;
pub use dispatcher::Dispatcher;
pub use error::CoreError;
pub use error::Result;
pub use session::SessionState;
