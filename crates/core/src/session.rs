//! Runner session registry.
//!
//! An in-memory index of active runner sessions, keyed three ways: by
//! session id, by target test file, and by run epoch. The registry answers
//! ownership questions without imposing scheduling policy, and performs no
//! eviction side effects - closing a context or page is the caller's
//! responsibility, before or after deletion, never implicitly.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use parking_lot::Mutex;
use serde_json::Value;

use crate::automation::{AutomationContext, AutomationPage};

/// How the runner session is hosted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMode {
    /// Test module runs directly in a provider-controlled page.
    EmbeddedPage,
    /// Test module runs inside an iframe hosted by an orchestrator page.
    HostedIframe,
}

/// One active (or superseded but not yet removed) runner session.
#[derive(Clone)]
pub struct RunnerSessionRecord {
    /// Registry-assigned monotonic id (0 until registered).
    pub id: u64,
    /// Test file this session executes.
    pub test_file: String,
    /// Project the test file belongs to.
    pub project_name: String,
    /// Execution epoch the session was created under.
    pub run_token: u64,
    /// Hosting mode.
    pub mode: SessionMode,
    /// Creation time.
    pub created_at: SystemTime,
    /// Live context handle, when this host owns one.
    pub context: Option<Arc<dyn AutomationContext>>,
    /// Live page handle, when this host owns one.
    pub page: Option<Arc<dyn AutomationPage>>,
    /// Free-form session metadata.
    pub metadata: Option<Value>,
}

impl RunnerSessionRecord {
    /// A record ready for [`SessionRegistry::register`]; the registry
    /// assigns the id.
    pub fn new(
        test_file: impl Into<String>,
        project_name: impl Into<String>,
        run_token: u64,
        mode: SessionMode,
    ) -> Self {
        Self {
            id: 0,
            test_file: test_file.into(),
            project_name: project_name.into(),
            run_token,
            mode,
            created_at: SystemTime::now(),
            context: None,
            page: None,
            metadata: None,
        }
    }

    /// Attaches a live page handle.
    pub fn with_page(mut self, page: Arc<dyn AutomationPage>) -> Self {
        self.page = Some(page);
        self
    }

    /// Attaches a live context handle.
    pub fn with_context(mut self, context: Arc<dyn AutomationContext>) -> Self {
        self.context = Some(context);
        self
    }

    /// Attaches free-form metadata.
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

impl fmt::Debug for RunnerSessionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunnerSessionRecord")
            .field("id", &self.id)
            .field("test_file", &self.test_file)
            .field("project_name", &self.project_name)
            .field("run_token", &self.run_token)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct RegistryInner {
    by_id: HashMap<u64, RunnerSessionRecord>,
    by_test_file: HashMap<String, u64>,
}

/// In-memory index of runner sessions.
///
/// For a given test file at most one record is the "current" mapping:
/// registering a new session for the same file supersedes, but does not
/// delete, the previous record - both remain queryable by id until
/// explicitly removed.
#[derive(Default)]
pub struct SessionRegistry {
    inner: Mutex<RegistryInner>,
    next_id: AtomicU64,
}

impl SessionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a session, assigning a monotonic id when the record
    /// carries none, and makes it the current mapping for its test file.
    pub fn register(&self, mut record: RunnerSessionRecord) -> RunnerSessionRecord {
        if record.id == 0 {
            record.id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        }
        let mut inner = self.inner.lock();
        inner.by_test_file.insert(record.test_file.clone(), record.id);
        inner.by_id.insert(record.id, record.clone());
        record
    }

    /// Looks up a session by id.
    pub fn get_by_id(&self, id: u64) -> Option<RunnerSessionRecord> {
        self.inner.lock().by_id.get(&id).cloned()
    }

    /// Returns the most-recently-registered session for a test file.
    pub fn get_by_test_file(&self, test_file: &str) -> Option<RunnerSessionRecord> {
        let inner = self.inner.lock();
        let id = inner.by_test_file.get(test_file)?;
        inner.by_id.get(id).cloned()
    }

    /// Lists every session created under the given run epoch.
    pub fn list_by_run_token(&self, run_token: u64) -> Vec<RunnerSessionRecord> {
        let inner = self.inner.lock();
        let mut sessions: Vec<_> = inner
            .by_id
            .values()
            .filter(|record| record.run_token == run_token)
            .cloned()
            .collect();
        sessions.sort_by_key(|record| record.id);
        sessions
    }

    /// Removes a session by id.
    ///
    /// The file→id mapping is removed only if this id is still the file's
    /// current mapping, so an older session's late cleanup cannot delete a
    /// newer session's mapping.
    pub fn delete_by_id(&self, id: u64) -> Option<RunnerSessionRecord> {
        let mut inner = self.inner.lock();
        let record = inner.by_id.remove(&id)?;
        if inner.by_test_file.get(&record.test_file) == Some(&id) {
            inner.by_test_file.remove(&record.test_file);
        }
        Some(record)
    }

    /// Removes the current session for a test file.
    pub fn delete_by_test_file(&self, test_file: &str) -> Option<RunnerSessionRecord> {
        let id = { self.inner.lock().by_test_file.get(test_file).copied() }?;
        self.delete_by_id(id)
    }

    /// Removes every record.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.by_id.clear();
        inner.by_test_file.clear();
    }

    /// Number of registered sessions (superseded records included).
    pub fn len(&self) -> usize {
        self.inner.lock().by_id.len()
    }

    /// Returns `true` if no sessions are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
