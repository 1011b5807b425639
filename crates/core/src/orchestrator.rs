//! Host-side capability wiring.
//!
//! The orchestrator owns the run epoch and installs the per-run capability
//! set on a [`DispatchRouter`]: a lifecycle handler that forwards ordered
//! runner events to the [`Reporter`] and drives the scheduler, and a
//! remote-control handler that resolves a request's `testPath` to its live
//! session and executes the compiled locator work. Handlers are
//! re-registered (last write wins) at the start of each run; a fresh run
//! token makes every in-flight request from the previous run stale.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;
use tracing::{debug, warn};

use wtr_protocol::{BrowserRpcRequest, DispatchRequest, LifecycleEvent, LogLevel};
use wtr_runtime::router::StalePredicate;
use wtr_runtime::{DispatchRouter, handler};

use crate::automation::AutomationPage;
use crate::compiler::execute_rpc;
use crate::error::{Error, Result};
use crate::scheduler::{TestFileScheduler, TestFileSpec};
use crate::session::SessionRegistry;

/// Dispatch namespaces this host registers.
pub mod namespaces {
    /// Runner lifecycle reporting (file-start, case-result, ...).
    pub const LIFECYCLE: &str = "lifecycle";
    /// Remote-control locator/expect execution.
    pub const BROWSER_RPC: &str = "browserRpc";
}

/// Receives lifecycle events in emission order. Formatting and persistence
/// happen beyond this seam.
pub trait Reporter: Send + Sync {
    /// Handles one lifecycle event.
    fn on_event(&self, event: LifecycleEvent);
}

/// Ties the router, session registry, scheduler, and reporter into one
/// run-scoped capability set.
pub struct Orchestrator {
    registry: Arc<SessionRegistry>,
    scheduler: Arc<TestFileScheduler>,
    reporter: Arc<dyn Reporter>,
    current_run_token: Arc<AtomicU64>,
}

impl Orchestrator {
    /// Creates an orchestrator; the first run gets token 1.
    pub fn new(
        registry: Arc<SessionRegistry>,
        scheduler: Arc<TestFileScheduler>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            registry,
            scheduler,
            reporter,
            current_run_token: Arc::new(AtomicU64::new(0)),
        }
    }

    /// The current run epoch; requests tagged with an older token are
    /// answered `stale`.
    pub fn run_token(&self) -> u64 {
        self.current_run_token.load(Ordering::SeqCst)
    }

    /// Predicate for [`DispatchRouter::new`]: a token is stale when a newer
    /// run has started since it was issued.
    pub fn stale_predicate(&self) -> StalePredicate {
        let current = Arc::clone(&self.current_run_token);
        Arc::new(move |token| token < current.load(Ordering::SeqCst))
    }

    /// Starts a new run over `files`: bumps the epoch (making all in-flight
    /// requests from the previous run stale) and hands the batch to the
    /// scheduler. Returns the new run token.
    pub fn begin_run(&self, files: Vec<TestFileSpec>) -> u64 {
        let token = self.current_run_token.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(run_token = token, files = files.len(), "beginning run");
        self.scheduler.start(files);
        token
    }

    /// Feeds a watch rerun into the scheduler without bumping the epoch;
    /// files already running or queued are not duplicated.
    pub fn schedule_rerun(&self, files: Vec<TestFileSpec>) {
        self.scheduler.schedule_files(files);
    }

    /// Registers this host's capability handlers on `router`, replacing any
    /// handlers a previous run installed.
    pub fn install_handlers(&self, router: &DispatchRouter) {
        router.register(namespaces::LIFECYCLE, {
            let scheduler = Arc::clone(&self.scheduler);
            let reporter = Arc::clone(&self.reporter);
            handler(move |request: DispatchRequest| {
                let scheduler = Arc::clone(&scheduler);
                let reporter = Arc::clone(&reporter);
                async move {
                    let event: LifecycleEvent =
                        serde_json::from_value(request.args.unwrap_or(Value::Null))
                            .map_err(|e| {
                                wtr_runtime::Error::Protocol(format!(
                                    "malformed lifecycle event: {e}"
                                ))
                            })?;
                    handle_lifecycle_event(&scheduler, &reporter, event);
                    Ok(Value::Null)
                }
            })
        });

        router.register(namespaces::BROWSER_RPC, {
            let registry = Arc::clone(&self.registry);
            handler(move |request: DispatchRequest| {
                let registry = Arc::clone(&registry);
                async move {
                    let rpc: BrowserRpcRequest =
                        serde_json::from_value(request.args.unwrap_or(Value::Null)).map_err(
                            |e| {
                                wtr_runtime::Error::Protocol(format!(
                                    "malformed browser RPC request: {e}"
                                ))
                            },
                        )?;
                    handle_browser_rpc(&registry, rpc)
                        .await
                        .map_err(|e| wtr_runtime::Error::Handler(e.to_string()))
                }
            })
        });
    }

    /// Forwards a page's console stream to the reporter as ordered `Log`
    /// events for the given test file.
    pub fn attach_console(&self, test_file: &str, page: &Arc<dyn AutomationPage>) {
        let reporter = Arc::clone(&self.reporter);
        let test_file = test_file.to_string();
        page.on_console(Arc::new(move |level, text| {
            let level = match level {
                "debug" => LogLevel::Debug,
                "warning" | "warn" => LogLevel::Warn,
                "error" => LogLevel::Error,
                _ => LogLevel::Info,
            };
            reporter.on_event(LifecycleEvent::Log {
                test_file: Some(test_file.clone()),
                level,
                text: text.to_string(),
            });
        }));
    }
}

fn handle_lifecycle_event(
    scheduler: &Arc<TestFileScheduler>,
    reporter: &Arc<dyn Reporter>,
    event: LifecycleEvent,
) {
    reporter.on_event(event.clone());
    match event {
        LifecycleEvent::FileComplete { test_file, .. } => {
            scheduler.on_test_file_complete(&test_file);
        }
        LifecycleEvent::Fatal { message } => {
            warn!(%message, "fatal error reported by runner");
            scheduler.on_fatal();
        }
        LifecycleEvent::FileStart { .. }
        | LifecycleEvent::CaseResult { .. }
        | LifecycleEvent::Log { .. } => {}
    }
}

async fn handle_browser_rpc(
    registry: &Arc<SessionRegistry>,
    rpc: BrowserRpcRequest,
) -> Result<Value> {
    let Some(test_path) = rpc.test_path.clone() else {
        return Err(Error::MissingTestPath(rpc.id.clone()));
    };
    let session = registry
        .get_by_test_file(&test_path)
        .ok_or_else(|| Error::SessionNotFound(test_path.clone()))?;

    // The envelope-level run token guards the dispatch layer; this guards
    // against an RPC issued by a superseded session that the registry has
    // already replaced.
    if rpc.run_id != session.run_token {
        return Err(Error::Automation(format!(
            "browser RPC {} belongs to run {} but '{}' now runs under {}",
            rpc.id, rpc.run_id, test_path, session.run_token
        )));
    }

    let page = session.page.clone().ok_or_else(|| {
        Error::Automation(format!("session for '{test_path}' has no live page"))
    })?;
    execute_rpc(&rpc, &page).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;
    use wtr_protocol::{CaseState, LocatorIr, RpcKind};

    use crate::scheduler::FileDispatcher;
    use crate::session::{RunnerSessionRecord, SessionMode};

    struct NullDispatcher;
    impl FileDispatcher for NullDispatcher {
        fn dispatch(
            &self,
            _file: &TestFileSpec,
        ) -> futures_util::future::BoxFuture<'static, Result<()>> {
            Box::pin(async { Ok(()) })
        }
    }

    #[derive(Default)]
    struct RecordingReporter {
        events: Mutex<Vec<LifecycleEvent>>,
    }
    impl Reporter for RecordingReporter {
        fn on_event(&self, event: LifecycleEvent) {
            self.events.lock().push(event);
        }
    }

    /// Page fake that hands the subscribed console listener back to the
    /// test.
    #[derive(Default)]
    struct ConsolePage {
        listener: Mutex<Option<crate::automation::ConsoleListener>>,
    }

    impl AutomationPage for ConsolePage {
        fn root(&self) -> Arc<dyn crate::automation::AutomationHandle> {
            unimplemented!("console tests never resolve elements")
        }
        fn goto(&self, _url: &str) -> futures_util::future::BoxFuture<'static, Result<()>> {
            Box::pin(async { Ok(()) })
        }
        fn on_console(&self, listener: crate::automation::ConsoleListener) {
            *self.listener.lock() = Some(listener);
        }
        fn close(&self) -> futures_util::future::BoxFuture<'static, Result<()>> {
            Box::pin(async { Ok(()) })
        }
    }

    fn orchestrator() -> (Orchestrator, Arc<RecordingReporter>, Arc<TestFileScheduler>) {
        let registry = Arc::new(SessionRegistry::new());
        let scheduler = TestFileScheduler::new(2, Arc::new(NullDispatcher), Arc::new(|| {}));
        let reporter = Arc::new(RecordingReporter::default());
        let orchestrator = Orchestrator::new(
            registry,
            Arc::clone(&scheduler),
            Arc::clone(&reporter) as Arc<dyn Reporter>,
        );
        (orchestrator, reporter, scheduler)
    }

    #[tokio::test]
    async fn begin_run_bumps_token_and_stales_older_requests() {
        let (orchestrator, _, _) = orchestrator();
        let router = DispatchRouter::new(orchestrator.stale_predicate());
        orchestrator.install_handlers(&router);

        let first = orchestrator.begin_run(vec![TestFileSpec::new("a.test.ts", "default")]);
        assert_eq!(first, 1);
        let second = orchestrator.begin_run(vec![TestFileSpec::new("a.test.ts", "default")]);
        assert_eq!(second, 2);

        let response = router
            .dispatch(
                DispatchRequest::new("r1", namespaces::LIFECYCLE, "event", None)
                    .with_run_token(first),
            )
            .await;
        assert!(response.is_stale());
    }

    #[tokio::test]
    async fn lifecycle_events_reach_reporter_and_drive_scheduler() {
        let (orchestrator, reporter, scheduler) = orchestrator();
        let router = DispatchRouter::new(orchestrator.stale_predicate());
        orchestrator.install_handlers(&router);
        orchestrator.begin_run(vec![TestFileSpec::new("a.test.ts", "default")]);
        assert_eq!(scheduler.running_len(), 1);

        let events = [
            json!({"type": "fileStart", "testFile": "a.test.ts", "projectName": "default"}),
            json!({
                "type": "caseResult", "testFile": "a.test.ts", "caseId": "c1",
                "name": "works", "state": "passed"
            }),
            json!({"type": "fileComplete", "testFile": "a.test.ts", "failed": false}),
        ];
        for (i, event) in events.iter().enumerate() {
            let response = router
                .dispatch(DispatchRequest::new(
                    format!("r{i}"),
                    namespaces::LIFECYCLE,
                    "event",
                    Some(event.clone()),
                ))
                .await;
            assert!(response.error.is_none());
        }

        assert_eq!(scheduler.running_len(), 0);
        let recorded = reporter.events.lock();
        assert_eq!(recorded.len(), 3);
        assert!(matches!(
            recorded[1],
            LifecycleEvent::CaseResult {
                state: CaseState::Passed,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn fatal_event_drains_the_scheduler() {
        let (orchestrator, _, scheduler) = orchestrator();
        let router = DispatchRouter::new(orchestrator.stale_predicate());
        orchestrator.install_handlers(&router);
        orchestrator.begin_run(vec![
            TestFileSpec::new("a.test.ts", "default"),
            TestFileSpec::new("b.test.ts", "default"),
            TestFileSpec::new("c.test.ts", "default"),
        ]);
        assert_eq!(scheduler.queue_len(), 1);

        router
            .dispatch(DispatchRequest::new(
                "r1",
                namespaces::LIFECYCLE,
                "event",
                Some(json!({"type": "fatal", "message": "worker crashed"})),
            ))
            .await;
        assert_eq!(scheduler.queue_len(), 0);
    }

    #[tokio::test]
    async fn malformed_lifecycle_event_is_a_protocol_error_response() {
        let (orchestrator, _, _) = orchestrator();
        let router = DispatchRouter::new(orchestrator.stale_predicate());
        orchestrator.install_handlers(&router);

        let response = router
            .dispatch(DispatchRequest::new(
                "r1",
                namespaces::LIFECYCLE,
                "event",
                Some(json!({"type": "unheard-of"})),
            ))
            .await;
        let error = response.error.unwrap();
        assert!(error.contains("malformed lifecycle event"));
    }

    #[tokio::test]
    async fn rpc_without_test_path_is_rejected() {
        let (orchestrator, _, _) = orchestrator();
        let router = DispatchRouter::new(orchestrator.stale_predicate());
        orchestrator.install_handlers(&router);

        let rpc = BrowserRpcRequest {
            id: "rpc-7".into(),
            test_path: None,
            run_id: 1,
            kind: RpcKind::Locator,
            locator: LocatorIr::locator("button"),
            method: "click".into(),
            args: vec![],
            is_not: None,
            timeout: None,
        };
        let response = router
            .dispatch(DispatchRequest::new(
                "r1",
                namespaces::BROWSER_RPC,
                "locator",
                Some(serde_json::to_value(&rpc).unwrap()),
            ))
            .await;
        assert_eq!(
            response.error.as_deref(),
            Some("Browser RPC request rpc-7 is missing testPath")
        );
    }

    #[tokio::test]
    async fn rpc_for_unknown_session_names_the_test_file() {
        let (orchestrator, _, _) = orchestrator();
        let router = DispatchRouter::new(orchestrator.stale_predicate());
        orchestrator.install_handlers(&router);

        let rpc = BrowserRpcRequest {
            id: "rpc-8".into(),
            test_path: Some("ghost.test.ts".into()),
            run_id: 1,
            kind: RpcKind::Expect,
            locator: LocatorIr::locator("button"),
            method: "toBeVisible".into(),
            args: vec![],
            is_not: None,
            timeout: None,
        };
        let response = router
            .dispatch(DispatchRequest::new(
                "r1",
                namespaces::BROWSER_RPC,
                "expect",
                Some(serde_json::to_value(&rpc).unwrap()),
            ))
            .await;
        assert!(response.error.unwrap().contains("ghost.test.ts"));
    }

    #[tokio::test]
    async fn rpc_from_superseded_session_run_is_rejected() {
        let (orchestrator, _, _) = orchestrator();
        let registry = Arc::clone(&orchestrator.registry);
        let router = DispatchRouter::new(orchestrator.stale_predicate());
        orchestrator.install_handlers(&router);

        registry.register(RunnerSessionRecord::new(
            "a.test.ts",
            "default",
            2,
            SessionMode::EmbeddedPage,
        ));

        let rpc = BrowserRpcRequest {
            id: "rpc-9".into(),
            test_path: Some("a.test.ts".into()),
            run_id: 1,
            kind: RpcKind::Locator,
            locator: LocatorIr::locator("button"),
            method: "click".into(),
            args: vec![],
            is_not: None,
            timeout: None,
        };
        let response = router
            .dispatch(DispatchRequest::new(
                "r1",
                namespaces::BROWSER_RPC,
                "locator",
                Some(serde_json::to_value(&rpc).unwrap()),
            ))
            .await;
        let error = response.error.unwrap();
        assert!(error.contains("run 1"), "unexpected error: {error}");
    }

    #[test]
    fn console_stream_is_forwarded_as_log_events() {
        let (orchestrator, reporter, _) = orchestrator();
        let page = Arc::new(ConsolePage::default());
        let dyn_page = Arc::clone(&page) as Arc<dyn AutomationPage>;
        orchestrator.attach_console("a.test.ts", &dyn_page);

        let listener = page.listener.lock().clone().unwrap();
        listener("debug", "verbose detail");
        listener("warning", "low disk");
        listener("warn", "short form");
        listener("error", "boom");
        listener("stdout", "plain output");

        let events = reporter.events.lock();
        let levels: Vec<LogLevel> = events
            .iter()
            .map(|event| match event {
                LifecycleEvent::Log {
                    test_file, level, ..
                } => {
                    assert_eq!(test_file.as_deref(), Some("a.test.ts"));
                    *level
                }
                other => panic!("unexpected event: {other:?}"),
            })
            .collect();
        assert_eq!(
            levels,
            [
                LogLevel::Debug,
                LogLevel::Warn,
                LogLevel::Warn,
                LogLevel::Error,
                LogLevel::Info,
            ]
        );
    }
}
