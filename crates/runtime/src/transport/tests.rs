use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Value, json};

use wtr_protocol::{BoundaryMessage, DispatchRequest, DispatchResponse};

use super::*;
use crate::error::Error;

fn request(id: &str) -> DispatchRequest {
    DispatchRequest::new(id, "rpc", "click", None)
}

fn options_ms(ms: u64) -> CallOptions {
    CallOptions::new(Duration::from_millis(ms), "rpc click")
}

/// Bridge answering every call with a canned closure.
struct FnBridge<F>(F);

impl<F> CallBridge for FnBridge<F>
where
    F: Fn(DispatchRequest) -> Result<DispatchResponse> + Send + Sync,
{
    fn invoke(&self, request: DispatchRequest) -> futures_util::future::BoxFuture<'static, Result<DispatchResponse>> {
        let result = (self.0)(request);
        Box::pin(async move { result })
    }
}

/// Sink that records posted messages.
#[derive(Default)]
struct RecordingSink {
    posted: Mutex<Vec<Value>>,
}

impl MessageSink for RecordingSink {
    fn post(&self, message: Value) -> Result<()> {
        self.posted.lock().push(message);
        Ok(())
    }
}

/// Sink that rejects every post.
struct BrokenSink;

impl MessageSink for BrokenSink {
    fn post(&self, _message: Value) -> Result<()> {
        Err(Error::ChannelClosed)
    }
}

#[tokio::test]
async fn embedded_call_returns_matching_response() {
    let transport = EmbeddedTransport::new(Arc::new(FnBridge(|req: DispatchRequest| {
        Ok(DispatchResponse::ok(req.request_id, req.run_token, json!(7)))
    })));

    let response = transport.call(request("r1"), options_ms(1_000)).await.unwrap();
    assert_eq!(response.result, Some(json!(7)));
}

#[tokio::test]
async fn embedded_call_rejects_mismatched_request_id() {
    let transport = EmbeddedTransport::new(Arc::new(FnBridge(|_| {
        Ok(DispatchResponse::ok("some-other-id", None, Value::Null))
    })));

    let err = transport.call(request("r1"), options_ms(1_000)).await.unwrap_err();
    match err {
        Error::Protocol(message) => {
            assert!(message.contains("some-other-id"));
            assert!(message.contains("r1"));
        }
        other => panic!("expected protocol error, got {other:?}"),
    }
}

#[tokio::test]
async fn embedded_call_surfaces_stale_with_caller_message() {
    let transport = EmbeddedTransport::new(Arc::new(FnBridge(|req: DispatchRequest| {
        Ok(DispatchResponse::stale(req.request_id, req.run_token))
    })));

    let options = options_ms(1_000).with_stale_message("click dropped: superseded run");
    let err = transport.call(request("r1"), options).await.unwrap_err();
    assert!(err.is_stale());
    assert_eq!(err.to_string(), "click dropped: superseded run");
}

#[tokio::test(start_paused = true)]
async fn embedded_call_times_out_with_budget_in_message() {
    struct NeverBridge;
    impl CallBridge for NeverBridge {
        fn invoke(&self, _request: DispatchRequest) -> futures_util::future::BoxFuture<'static, Result<DispatchResponse>> {
            Box::pin(std::future::pending())
        }
    }

    let transport = EmbeddedTransport::new(Arc::new(NeverBridge));
    let err = transport.call(request("r1"), options_ms(250)).await.unwrap_err();
    assert!(err.is_timeout());
    let message = err.to_string();
    assert!(message.contains("250ms"), "budget missing from: {message}");
    assert!(message.contains("rpc click"), "operation missing from: {message}");
}

#[tokio::test]
async fn boundary_call_correlates_response_by_id() {
    let sink = Arc::new(RecordingSink::default());
    let transport = Arc::new(BoundaryTransport::new(sink.clone()));

    let call = {
        let transport = Arc::clone(&transport);
        tokio::spawn(async move { transport.call(request("r1"), options_ms(1_000)).await })
    };

    // Wait for the envelope to be posted outward.
    while sink.posted.lock().is_empty() {
        tokio::task::yield_now().await;
    }
    let posted = sink.posted.lock()[0].clone();
    assert_eq!(posted["type"], "dispatch-request");
    assert_eq!(posted["request"]["requestId"], "r1");

    transport.handle_inbound(
        serde_json::to_value(BoundaryMessage::DispatchResponse {
            response: DispatchResponse::ok("r1", None, json!("done")),
        })
        .unwrap(),
    );

    let response = call.await.unwrap().unwrap();
    assert_eq!(response.result, Some(json!("done")));
    assert_eq!(transport.pending_len(), 0);
}

#[tokio::test]
async fn boundary_unmatched_response_is_silently_ignored() {
    let transport = BoundaryTransport::new(Arc::new(RecordingSink::default()));
    transport.handle_inbound(
        serde_json::to_value(BoundaryMessage::DispatchResponse {
            response: DispatchResponse::ok("nobody-waiting", None, Value::Null),
        })
        .unwrap(),
    );
    assert_eq!(transport.pending_len(), 0);
}

#[tokio::test]
async fn boundary_ignores_non_dispatch_messages() {
    let transport = BoundaryTransport::new(Arc::new(RecordingSink::default()));
    transport.handle_inbound(json!({"type": "viteHmrUpdate", "path": "/src/app.ts"}));
    transport.handle_inbound(json!("not even an object"));
    assert_eq!(transport.pending_len(), 0);
}

#[tokio::test(start_paused = true)]
async fn boundary_timeout_cleans_pending_and_late_response_cannot_resurrect() {
    let transport = Arc::new(BoundaryTransport::new(Arc::new(RecordingSink::default())));

    let err = transport.call(request("r1"), options_ms(100)).await.unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(transport.pending_len(), 0);

    // The late response finds no pending entry and is dropped.
    transport.handle_inbound(
        serde_json::to_value(BoundaryMessage::DispatchResponse {
            response: DispatchResponse::ok("r1", None, Value::Null),
        })
        .unwrap(),
    );
    assert_eq!(transport.pending_len(), 0);
}

#[tokio::test]
async fn boundary_stale_response_rejects_with_caller_message() {
    let transport = Arc::new(BoundaryTransport::new(Arc::new(RecordingSink::default())));

    let call = {
        let transport = Arc::clone(&transport);
        tokio::spawn(async move {
            transport
                .call(
                    request("r1"),
                    options_ms(1_000).with_stale_message("superseded"),
                )
                .await
        })
    };
    while transport.pending_len() == 0 {
        tokio::task::yield_now().await;
    }
    transport.handle_inbound(
        serde_json::to_value(BoundaryMessage::DispatchResponse {
            response: DispatchResponse::stale("r1", Some(1)),
        })
        .unwrap(),
    );

    let err = call.await.unwrap().unwrap_err();
    assert!(err.is_stale());
    assert_eq!(err.to_string(), "superseded");
}

#[tokio::test]
async fn boundary_post_failure_cleans_pending_entry() {
    let transport = BoundaryTransport::new(Arc::new(BrokenSink));
    let err = transport.call(request("r1"), options_ms(1_000)).await.unwrap_err();
    assert!(matches!(err, Error::ChannelClosed));
    assert_eq!(transport.pending_len(), 0);
}

#[tokio::test]
async fn boundary_rejects_when_pending_table_is_full() {
    let transport = Arc::new(BoundaryTransport::with_max_pending(
        Arc::new(RecordingSink::default()),
        1,
    ));

    let first = {
        let transport = Arc::clone(&transport);
        tokio::spawn(async move { transport.call(request("r1"), options_ms(5_000)).await })
    };
    while transport.pending_len() == 0 {
        tokio::task::yield_now().await;
    }

    let err = transport.call(request("r2"), options_ms(5_000)).await.unwrap_err();
    assert!(matches!(err, Error::PendingOverflow(1)));

    transport.handle_inbound(
        serde_json::to_value(BoundaryMessage::DispatchResponse {
            response: DispatchResponse::ok("r1", None, Value::Null),
        })
        .unwrap(),
    );
    first.await.unwrap().unwrap();
}
