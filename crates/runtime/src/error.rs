//! Error types for the orchestration runtime.

use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the dispatch/transport layer.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed envelope, mismatched request id, or other wire violation.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The call's response belonged to a superseded run epoch and was
    /// deliberately dropped. Carries the caller-supplied stale message so
    /// upstream logic can distinguish "intentionally dropped" from "failed".
    #[error("{0}")]
    Stale(String),

    /// The call did not settle within its budget.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// No handler registered for the request's namespace.
    #[error("No dispatch handler registered for namespace {0}")]
    NoHandler(String),

    /// The pending-request table is full; the call was rejected rather than
    /// queued.
    #[error("Pending request table full: {0} calls in flight")]
    PendingOverflow(usize),

    /// A channel endpoint went away before the call settled.
    #[error("Channel closed unexpectedly")]
    ChannelClosed,

    /// Capability handler failure, surfaced as the response `error` text.
    #[error("{0}")]
    Handler(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Returns `true` if this is a timeout error.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }

    /// Returns `true` if this call was deliberately dropped as stale.
    pub fn is_stale(&self) -> bool {
        matches!(self, Error::Stale(_))
    }
}
