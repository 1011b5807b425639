//! Namespace dispatch with epoch-based staleness.
//!
//! The router maps a request's `namespace` to a registered async handler.
//! Before any handler runs, an injected predicate decides whether the
//! request's `runToken` belongs to a superseded epoch; if so the request is
//! answered with `stale: true` and no handler is invoked. Handler-not-found
//! likewise returns an `error` response rather than failing the dispatch
//! call itself - the remote side treats "no response" as a hang, not a
//! recoverable error, so both paths must produce a response.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use parking_lot::RwLock;
use serde_json::Value;
use tracing::debug;

use wtr_protocol::{DispatchRequest, DispatchResponse};

use crate::error::{Error, Result};

/// Boxed async capability handler.
pub type DispatchHandler = Arc<dyn Fn(DispatchRequest) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Predicate deciding whether a run token belongs to a superseded epoch.
pub type StalePredicate = Arc<dyn Fn(u64) -> bool + Send + Sync>;

/// Diagnostic observer invoked for every stale-dropped request.
pub type StaleObserver = Arc<dyn Fn(&DispatchRequest) + Send + Sync>;

/// Wraps an async closure into a [`DispatchHandler`].
pub fn handler<F, Fut>(f: F) -> DispatchHandler
where
    F: Fn(DispatchRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    Arc::new(move |request| Box::pin(f(request)))
}

/// Routes dispatch envelopes to registered capability handlers.
pub struct DispatchRouter {
    handlers: RwLock<HashMap<String, DispatchHandler>>,
    is_run_token_stale: StalePredicate,
    on_stale: Option<StaleObserver>,
}

impl DispatchRouter {
    /// Creates a router with the given staleness predicate.
    pub fn new(is_run_token_stale: StalePredicate) -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            is_run_token_stale,
            on_stale: None,
        }
    }

    /// Attaches a diagnostic observer notified on every stale drop.
    pub fn with_stale_observer(mut self, observer: StaleObserver) -> Self {
        self.on_stale = Some(observer);
        self
    }

    /// Registers a handler for a namespace.
    ///
    /// Re-registering the same namespace replaces the prior handler (last
    /// write wins) - used to rotate capability sets at the start of a new
    /// run without requiring a fresh router instance.
    pub fn register(&self, namespace: impl Into<String>, handler: DispatchHandler) {
        let namespace = namespace.into();
        let replaced = self.handlers.write().insert(namespace.clone(), handler);
        if replaced.is_some() {
            debug!(%namespace, "replaced dispatch handler");
        }
    }

    /// Removes all registered handlers.
    pub fn clear(&self) {
        self.handlers.write().clear();
    }

    /// Dispatches one request to its capability handler.
    ///
    /// Always produces a response: stale epoch, unknown namespace, and
    /// handler errors each settle as the corresponding response shape.
    pub async fn dispatch(&self, request: DispatchRequest) -> DispatchResponse {
        if let Some(token) = request.run_token.filter(|t| (self.is_run_token_stale)(*t)) {
            debug!(
                request_id = %request.request_id,
                run_token = token,
                namespace = %request.namespace,
                "dropping request from superseded run"
            );
            if let Some(observer) = &self.on_stale {
                observer(&request);
            }
            return DispatchResponse::stale(request.request_id, Some(token));
        }

        let handler = self.handlers.read().get(&request.namespace).cloned();
        let Some(handler) = handler else {
            return DispatchResponse::err(
                request.request_id.clone(),
                request.run_token,
                Error::NoHandler(request.namespace.clone()).to_string(),
            );
        };

        let request_id = request.request_id.clone();
        let run_token = request.run_token;
        match handler(request).await {
            Ok(result) => DispatchResponse::ok(request_id, run_token, result),
            Err(e) => DispatchResponse::err(request_id, run_token, e.to_string()),
        }
    }
}
