//! Transport adapter: one async call contract over two channels.
//!
//! A caller either shares a process boundary with the dispatcher (a direct
//! callable bridge is available) or lives behind a restricted messaging
//! boundary such as an embedded frame. [`EmbeddedTransport`] and
//! [`BoundaryTransport`] present the same contract over both:
//!
//! 1. Client calls [`DispatchCall::call`] with an envelope and options
//! 2. The envelope is delivered (bridge invocation, or posted outward)
//! 3. The call settles exactly once: result, error, stale, or timeout
//!
//! In cross-boundary mode a pending table keyed by `requestId` holds one
//! oneshot sender per in-flight call. Whichever of settle/timeout fires
//! first removes the entry, so a late response cannot resurrect a call that
//! already timed out; unmatched responses are silently ignored.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use wtr_protocol::{BoundaryMessage, DispatchRequest, DispatchResponse};

use crate::error::{Error, Result};

/// Default bound on the cross-boundary pending-request table.
pub const DEFAULT_MAX_PENDING: usize = 1024;

/// Per-call options shared by both transport modes.
#[derive(Debug, Clone)]
pub struct CallOptions {
    /// Budget for the call to settle.
    pub timeout: Duration,
    /// Operation name embedded in the timeout message.
    pub operation: String,
    /// Message used when the call is rejected as stale, so upstream logic
    /// can distinguish "intentionally dropped" from "failed".
    pub stale_message: String,
}

impl CallOptions {
    /// Options with the given budget and operation name and a generic stale
    /// message.
    pub fn new(timeout: Duration, operation: impl Into<String>) -> Self {
        let operation = operation.into();
        Self {
            stale_message: format!("{operation} was dropped by a newer run"),
            timeout,
            operation,
        }
    }

    /// Overrides the stale rejection message.
    pub fn with_stale_message(mut self, message: impl Into<String>) -> Self {
        self.stale_message = message.into();
        self
    }

    fn timeout_error(&self) -> Error {
        Error::Timeout(format!(
            "{} did not settle within {}ms",
            self.operation,
            self.timeout.as_millis()
        ))
    }
}

/// The single async call contract both transport modes implement.
pub trait DispatchCall: Send + Sync {
    /// Delivers one envelope and awaits its settlement.
    fn call(
        &self,
        request: DispatchRequest,
        options: CallOptions,
    ) -> BoxFuture<'_, Result<DispatchResponse>>;
}

/// Direct callable bridge into the dispatching side, available when caller
/// and callee share a process boundary.
pub trait CallBridge: Send + Sync {
    /// Invokes the bridge with one envelope.
    fn invoke(&self, request: DispatchRequest) -> BoxFuture<'static, Result<DispatchResponse>>;
}

/// Embedded-call mode: invoke the bridge, race a timer, validate the echo.
pub struct EmbeddedTransport {
    bridge: Arc<dyn CallBridge>,
}

impl EmbeddedTransport {
    /// Wraps a direct bridge.
    pub fn new(bridge: Arc<dyn CallBridge>) -> Self {
        Self { bridge }
    }

    async fn call_inner(
        &self,
        request: DispatchRequest,
        options: CallOptions,
    ) -> Result<DispatchResponse> {
        let sent_id = request.request_id.clone();
        let response = tokio::time::timeout(options.timeout, self.bridge.invoke(request))
            .await
            .map_err(|_| options.timeout_error())??;

        // A mismatched echo is a protocol error, not a silent accept.
        if response.request_id != sent_id {
            return Err(Error::Protocol(format!(
                "bridge returned response for request {} while awaiting {}",
                response.request_id, sent_id
            )));
        }
        if response.is_stale() {
            return Err(Error::Stale(options.stale_message));
        }
        Ok(response)
    }
}

impl DispatchCall for EmbeddedTransport {
    fn call(
        &self,
        request: DispatchRequest,
        options: CallOptions,
    ) -> BoxFuture<'_, Result<DispatchResponse>> {
        Box::pin(self.call_inner(request, options))
    }
}

/// Outward message channel of a restricted boundary.
pub trait MessageSink: Send + Sync {
    /// Posts one serialized message toward the other side.
    fn post(&self, message: Value) -> Result<()>;
}

/// Cross-boundary mode: post envelopes outward and correlate inbound
/// responses by request id.
pub struct BoundaryTransport {
    pending: Arc<Mutex<HashMap<String, oneshot::Sender<DispatchResponse>>>>,
    sink: Arc<dyn MessageSink>,
    max_pending: usize,
}

impl BoundaryTransport {
    /// Creates a transport with the default pending bound.
    pub fn new(sink: Arc<dyn MessageSink>) -> Self {
        Self::with_max_pending(sink, DEFAULT_MAX_PENDING)
    }

    /// Creates a transport with an explicit pending bound. A call arriving
    /// with the table full is rejected immediately rather than queued.
    pub fn with_max_pending(sink: Arc<dyn MessageSink>, max_pending: usize) -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
            sink,
            max_pending,
        }
    }

    /// Number of calls currently awaiting settlement.
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Feeds one inbound message from the boundary.
    ///
    /// Messages that are not dispatch responses, and responses with no
    /// pending entry (e.g. arrived after the caller already timed out and
    /// cleaned up), are silently ignored.
    pub fn handle_inbound(&self, message: Value) {
        match serde_json::from_value::<BoundaryMessage>(message) {
            Ok(BoundaryMessage::DispatchResponse { response }) => {
                let sender = self.pending.lock().remove(&response.request_id);
                match sender {
                    Some(tx) => {
                        let _ = tx.send(response);
                    }
                    None => {
                        debug!(
                            request_id = %response.request_id,
                            "dropping response with no pending request"
                        );
                    }
                }
            }
            Ok(BoundaryMessage::DispatchRequest { .. }) => {
                debug!("ignoring inbound dispatch request on caller-side transport");
            }
            Err(e) => {
                debug!(error = %e, "ignoring non-dispatch inbound message");
            }
        }
    }

    async fn call_inner(
        &self,
        request: DispatchRequest,
        options: CallOptions,
    ) -> Result<DispatchResponse> {
        let id = request.request_id.clone();
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock();
            if pending.len() >= self.max_pending {
                warn!(
                    in_flight = pending.len(),
                    operation = %options.operation,
                    "rejecting call: pending request table full"
                );
                return Err(Error::PendingOverflow(pending.len()));
            }
            pending.insert(id.clone(), tx);
        }

        let envelope = serde_json::to_value(&BoundaryMessage::DispatchRequest { request })?;
        if let Err(e) = self.sink.post(envelope) {
            self.pending.lock().remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(options.timeout, rx).await {
            Ok(Ok(response)) => {
                if response.is_stale() {
                    Err(Error::Stale(options.stale_message))
                } else {
                    Ok(response)
                }
            }
            Ok(Err(_)) => Err(Error::ChannelClosed),
            Err(_) => {
                // Remove our own bookkeeping so a late response cannot
                // resurrect this call.
                self.pending.lock().remove(&id);
                Err(options.timeout_error())
            }
        }
    }
}

impl DispatchCall for BoundaryTransport {
    fn call(
        &self,
        request: DispatchRequest,
        options: CallOptions,
    ) -> BoxFuture<'_, Result<DispatchResponse>> {
        Box::pin(self.call_inner(request, options))
    }
}

#[cfg(test)]
mod tests;
