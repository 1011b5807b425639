//! Dispatch envelope types.
//!
//! Every request crossing the host/runner boundary travels inside a
//! [`DispatchRequest`] and settles with exactly one [`DispatchResponse`].
//! The envelope carries an optional `runToken`: a monotonically increasing
//! integer identifying the execution epoch the request belongs to. Requests
//! tagged with a superseded token are answered with `stale: true` instead of
//! being processed - a deliberate, safe-to-ignore drop, not a failure.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Routing hints identifying which runner session a request concerns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchTarget {
    /// Test file the request targets.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_file: Option<String>,
    /// Specific session id, when the caller already knows it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Project the test file belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
}

/// Request envelope routed to a capability handler by namespace.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchRequest {
    /// Opaque id correlating this request with its response.
    pub request_id: String,
    /// Execution epoch; absence means epoch isolation does not apply.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_token: Option<u64>,
    /// Capability family the request belongs to.
    pub namespace: String,
    /// Method within the namespace.
    pub method: String,
    /// Method arguments as free-form JSON.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
    /// Optional session routing hints.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<DispatchTarget>,
}

impl DispatchRequest {
    /// Creates a request with no run token and no target.
    pub fn new(
        request_id: impl Into<String>,
        namespace: impl Into<String>,
        method: impl Into<String>,
        args: Option<Value>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            run_token: None,
            namespace: namespace.into(),
            method: method.into(),
            args,
            target: None,
        }
    }

    /// Tags the request with an execution epoch.
    pub fn with_run_token(mut self, token: u64) -> Self {
        self.run_token = Some(token);
        self
    }

    /// Attaches session routing hints.
    pub fn with_target(mut self, target: DispatchTarget) -> Self {
        self.target = Some(target);
        self
    }
}

/// Response envelope. Exactly one of `result`, `error`, or `stale = true`
/// is meaningful.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchResponse {
    /// Id of the request this response settles.
    pub request_id: String,
    /// Epoch echoed back from the request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_token: Option<u64>,
    /// Successful result payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error message text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Marks a deliberately dropped response from a superseded epoch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stale: Option<bool>,
}

impl DispatchResponse {
    /// Successful settlement.
    pub fn ok(request_id: impl Into<String>, run_token: Option<u64>, result: Value) -> Self {
        Self {
            request_id: request_id.into(),
            run_token,
            result: Some(result),
            error: None,
            stale: None,
        }
    }

    /// Failed settlement carrying the error message text.
    pub fn err(request_id: impl Into<String>, run_token: Option<u64>, message: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            run_token,
            result: None,
            error: Some(message.into()),
            stale: None,
        }
    }

    /// Stale settlement: the request belonged to a superseded epoch.
    pub fn stale(request_id: impl Into<String>, run_token: Option<u64>) -> Self {
        Self {
            request_id: request_id.into(),
            run_token,
            result: None,
            error: None,
            stale: Some(true),
        }
    }

    /// Returns `true` if this response was deliberately dropped.
    pub fn is_stale(&self) -> bool {
        self.stale == Some(true)
    }
}

/// Discriminated union of messages crossing a restricted messaging boundary
/// (e.g. `postMessage` between an embedded frame and its host).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum BoundaryMessage {
    /// An outbound request envelope.
    DispatchRequest { request: DispatchRequest },
    /// An inbound response envelope, correlated by `requestId`.
    DispatchResponse { response: DispatchResponse },
}
