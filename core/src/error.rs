//! Error taxonomy for the coordination substrate (spec.md §7).
//!
//! Modeled on the teacher's `CodexErr`: one `thiserror` enum, transparent
//! `#[from]` conversions for the common external error types, and a single
//! `Result<T>` alias used throughout the crate.

use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Error, Debug)]
pub enum CoreError {
    /// A normalized path would resolve outside the workspace root.
    #[error("path outside workspace: {0}")]
    PathEscape(String),

    /// Neither the RPC daemon nor the child-process fallback could reach
    /// the issue store.
    #[error("issue store unavailable: {0}")]
    IssueStoreUnavailable(String),

    /// An issue-store call exceeded its per-call timeout.
    #[error("timeout")]
    IssueStoreTimeout,

    /// The issue store responded with a failure.
    #[error("{0}")]
    IssueStoreError(String),

    /// Dispatcher-level input coercion/validation failure.
    #[error("{0}")]
    InvalidInput(String),

    /// `assign` called by a non-leader session.
    #[error("permission denied")]
    PermissionDenied,

    /// A record was read or looked up and did not exist.
    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    /// A short, stable code for the error envelope returned by the
    /// dispatcher (spec.md §7: every error carries a short code/message).
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::PathEscape(_) => "path_escape",
            CoreError::IssueStoreUnavailable(_) => "issue_store_unavailable",
            CoreError::IssueStoreTimeout => "timeout",
            CoreError::IssueStoreError(_) => "issue_store_error",
            CoreError::InvalidInput(_) => "invalid_input",
            CoreError::PermissionDenied => "permission_denied",
            CoreError::NotFound(_) => "not_found",
            CoreError::Io(_) => "filesystem_error",
            CoreError::Json(_) => "filesystem_error",
        }
    }

    /// Operator-facing remediation hint (spec.md §7: "every error result
    /// carries a short actionable hint").
    pub fn hint(&self) -> &'static str {
        match self {
            CoreError::PathEscape(_) => "use a path inside the workspace",
            CoreError::IssueStoreUnavailable(_) => "run doctor or init",
            CoreError::IssueStoreTimeout => "retry, or run sync",
            CoreError::IssueStoreError(_) => "run doctor",
            CoreError::InvalidInput(_) => "check the tool's input schema",
            CoreError::PermissionDenied => "only the team leader can assign",
            CoreError::NotFound(_) => "run init first",
            CoreError::Io(_) | CoreError::Json(_) => "run doctor",
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn permission_denied_has_stable_code_and_hint() {
        let err = CoreError::PermissionDenied;
        assert_eq!(err.code(), "permission_denied");
        assert!(err.hint().contains("leader"));
    }

    #[test]
    fn io_error_converts_via_from() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "gone");
        let err: CoreError = io_err.into();
        assert_eq!(err.code(), "filesystem_error");
    }
}
