//! Error types for the orchestration core.

use thiserror::Error;

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while orchestrating runner sessions.
#[derive(Debug, Error)]
pub enum Error {
    /// A remote-control method outside the shared allowlist.
    #[error("{kind} method '{method}' is not supported")]
    UnsupportedMethod {
        kind: &'static str,
        method: String,
    },

    /// No active runner session services the given test file.
    #[error("No active session for test file '{0}'")]
    SessionNotFound(String),

    /// A locator/expect request arrived without its mandatory `testPath`.
    #[error("Browser RPC request {0} is missing testPath")]
    MissingTestPath(String),

    /// An element assertion ran and did not match. Carries the provider's
    /// diagnostic log so the caller can distinguish "matcher ran and
    /// failed" from "matcher crashed".
    #[error("{message}")]
    ExpectFailed {
        message: String,
        log: Vec<String>,
    },

    /// Failure reported by the automation provider.
    #[error("Automation error: {0}")]
    Automation(String),

    /// Position-mapping table missing, unparsable, or unresolvable.
    #[error("Source map error: {0}")]
    SourceMap(String),

    /// A regexp text argument could not be reconstructed host-side.
    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// Dispatch/transport layer failure.
    #[error(transparent)]
    Runtime(#[from] wtr_runtime::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns `true` if this is a failed (but successfully executed)
    /// element assertion.
    pub fn is_expect_failure(&self) -> bool {
        matches!(self, Error::ExpectFailed { .. })
    }

    /// Diagnostic log lines from a failed assertion, if any.
    pub fn expect_log(&self) -> &[String] {
        match self {
            Error::ExpectFailed { log, .. } => log,
            _ => &[],
        }
    }
}
