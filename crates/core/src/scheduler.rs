//! Test file scheduler.
//!
//! Enforces a hard ceiling on concurrently active runner sessions and keeps
//! a FIFO backlog draining as capacity frees up. `running.len()` never
//! exceeds `max_workers` at any observable point, including immediately
//! after a burst [`TestFileScheduler::schedule_files`] call.
//!
//! Dispatch failures follow a bounded, never-retry-forever policy: a file
//! whose "load/execute" command fails is treated as completed so its worker
//! slot is not wasted, and the failure is logged rather than retried.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::error::Result;

/// One pending test-file descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TestFileSpec {
    /// Test file identity; scheduler de-duplication keys on this.
    pub test_file: String,
    /// Project the file belongs to.
    pub project_name: String,
}

impl TestFileSpec {
    /// Builds a descriptor.
    pub fn new(test_file: impl Into<String>, project_name: impl Into<String>) -> Self {
        Self {
            test_file: test_file.into(),
            project_name: project_name.into(),
        }
    }
}

/// Issues the remote "load/execute this file" command for an admitted file.
pub trait FileDispatcher: Send + Sync {
    /// Starts remote execution of one test file.
    fn dispatch(&self, file: &TestFileSpec) -> BoxFuture<'static, Result<()>>;
}

/// Invoked exactly once per full drain of queue and running set.
pub type CompletionCallback = Arc<dyn Fn() + Send + Sync>;

struct SchedulerState {
    queue: VecDeque<TestFileSpec>,
    running: HashSet<String>,
    fatal: bool,
    drained_notified: bool,
}

/// Bounded-concurrency FIFO scheduler for runner sessions.
pub struct TestFileScheduler {
    state: Mutex<SchedulerState>,
    max_workers: usize,
    dispatcher: Arc<dyn FileDispatcher>,
    on_drained: CompletionCallback,
}

impl TestFileScheduler {
    /// Creates a scheduler admitting at most `max_workers` concurrent
    /// sessions.
    pub fn new(
        max_workers: usize,
        dispatcher: Arc<dyn FileDispatcher>,
        on_drained: CompletionCallback,
    ) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(SchedulerState {
                queue: VecDeque::new(),
                running: HashSet::new(),
                fatal: false,
                drained_notified: false,
            }),
            max_workers: max_workers.max(1),
            dispatcher,
            on_drained,
        })
    }

    /// Replaces the backlog with `files`, clears the running set and the
    /// fatal flag, and begins dispatching.
    pub fn start(self: &Arc<Self>, files: Vec<TestFileSpec>) {
        {
            let mut state = self.state.lock();
            state.queue = files.into();
            state.running.clear();
            state.fatal = false;
            state.drained_notified = false;
        }
        self.dispatch_next();
    }

    /// Appends files not already running or queued (de-duplicated by test
    /// file identity), clears the fatal flag, and begins dispatching. Used
    /// by watch reruns arriving while a previous batch is still draining.
    pub fn schedule_files(self: &Arc<Self>, files: Vec<TestFileSpec>) {
        {
            let mut state = self.state.lock();
            state.fatal = false;
            for file in files {
                let queued = state.queue.iter().any(|f| f.test_file == file.test_file);
                if !queued && !state.running.contains(&file.test_file) {
                    state.drained_notified = false;
                    state.queue.push_back(file);
                }
            }
        }
        self.dispatch_next();
    }

    /// Marks a file complete, admits the next queued file, and fires the
    /// completion callback on a full drain.
    pub fn on_test_file_complete(self: &Arc<Self>, test_file: &str) {
        let fatal = {
            let mut state = self.state.lock();
            if !state.running.remove(test_file) {
                debug!(test_file, "completion for file not marked running");
            }
            state.fatal
        };
        if !fatal {
            self.dispatch_next();
        }
        self.notify_if_drained();
    }

    /// Handles a fatal remote error: drops the entire backlog and, when
    /// nothing is running, completes immediately so the run cannot hang on
    /// a queue that will never execute.
    pub fn on_fatal(self: &Arc<Self>) {
        {
            let mut state = self.state.lock();
            state.fatal = true;
            let dropped = state.queue.len();
            state.queue.clear();
            if dropped > 0 {
                warn!(dropped, "fatal error: dropping queued test files");
            }
        }
        self.notify_if_drained();
    }

    /// Number of currently active sessions.
    pub fn running_len(&self) -> usize {
        self.state.lock().running.len()
    }

    /// Snapshot of the currently active test files, sorted.
    pub fn running_files(&self) -> Vec<String> {
        let mut files: Vec<_> = self.state.lock().running.iter().cloned().collect();
        files.sort();
        files
    }

    /// Number of queued (not yet admitted) files.
    pub fn queue_len(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Snapshot of the queued test files in FIFO order.
    pub fn queued_files(&self) -> Vec<String> {
        self.state
            .lock()
            .queue
            .iter()
            .map(|f| f.test_file.clone())
            .collect()
    }

    fn dispatch_next(self: &Arc<Self>) {
        loop {
            let file = {
                let mut state = self.state.lock();
                if state.fatal || state.running.len() >= self.max_workers {
                    return;
                }
                let Some(file) = state.queue.pop_front() else {
                    return;
                };
                state.running.insert(file.test_file.clone());
                file
            };

            debug!(test_file = %file.test_file, "dispatching test file");
            let execution = self.dispatcher.dispatch(&file);
            let scheduler = Arc::clone(self);
            tokio::spawn(async move {
                if let Err(e) = execution.await {
                    // The slot must not be wasted on a file whose dispatch
                    // already failed; count it as completed and move on.
                    warn!(
                        test_file = %file.test_file,
                        error = %e,
                        "failed to dispatch test file"
                    );
                    scheduler.on_test_file_complete(&file.test_file);
                }
            });
        }
    }

    fn notify_if_drained(self: &Arc<Self>) {
        let fire = {
            let mut state = self.state.lock();
            if state.running.is_empty() && state.queue.is_empty() && !state.drained_notified {
                state.drained_notified = true;
                true
            } else {
                false
            }
        };
        if fire {
            (self.on_drained)();
        }
    }
}
