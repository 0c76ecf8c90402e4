//! The core's typed error taxonomy.
//!
//! Handlers and the mediator construct [`ToolError`] rather than hand-formatting
//! a string at every call site; `ToolError`'s `Display` impl produces the
//! stable `"{code}: {message}"` form that ends up in a [`ToolResult`](crate::tools::core::ToolResult)'s
//! `error` field, so the typed form and the wire form never drift apart.

use std::fmt;

/// One of the eight stable error kinds the core ever produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    InvalidArguments,
    PathViolation,
    NotFound,
    PermissionDenied,
    FsFault,
    Blocked,
    Timeout,
    Transport,
    UserCancelled,
}

impl ErrorCode {
    /// The stable prefix used in the `Display` form, e.g. `"path-violation"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidArguments => "invalid-arguments",
            ErrorCode::PathViolation => "path-violation",
            ErrorCode::NotFound => "not-found",
            ErrorCode::PermissionDenied => "permission-denied",
            ErrorCode::FsFault => "fs-fault",
            ErrorCode::Blocked => "blocked",
            ErrorCode::Timeout => "timeout",
            ErrorCode::Transport => "transport",
            ErrorCode::UserCancelled => "user-cancelled",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A typed tool error. Carries a stable [`ErrorCode`] plus a free-form message.
#[derive(Debug, Clone)]
pub struct ToolError {
    pub code: ErrorCode,
    pub message: String,
}

impl ToolError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_arguments(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidArguments, message)
    }

    pub fn path_violation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PathViolation, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PermissionDenied, message)
    }

    pub fn fs_fault(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::FsFault, message)
    }

    pub fn blocked(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Blocked, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Timeout, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Transport, message)
    }

    pub fn user_cancelled(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::UserCancelled, message)
    }

    /// Build a [`ToolError`] from a raw `io::Error`, classifying it into
    /// `not-found` / `permission-denied` / `fs-fault` by `ErrorKind`.
    pub fn from_io(err: &std::io::Error, context: &str) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::NotFound => Self::not_found(format!("{context}: {err}")),
            ErrorKind::PermissionDenied => Self::permission_denied(format!("{context}: {err}")),
            _ => Self::fs_fault(format!("{context}: {err}")),
        }
    }
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ToolError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_stable_prefix_form() {
        let e = ToolError::path_violation("../../etc/passwd escapes workspace root");
        assert_eq!(
            e.to_string(),
            "path-violation: ../../etc/passwd escapes workspace root"
        );
    }

    #[test]
    fn from_io_classifies_not_found() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let e = ToolError::from_io(&io_err, "reading foo.txt");
        assert_eq!(e.code, ErrorCode::NotFound);
    }

    #[test]
    fn from_io_classifies_permission_denied() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let e = ToolError::from_io(&io_err, "writing foo.txt");
        assert_eq!(e.code, ErrorCode::PermissionDenied);
    }

    #[test]
    fn from_io_falls_back_to_fs_fault() {
        let io_err = std::io::Error::other("weird");
        let e = ToolError::from_io(&io_err, "stat foo.txt");
        assert_eq!(e.code, ErrorCode::FsFault);
    }
}
