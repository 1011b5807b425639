//! Browser test orchestration core.
//!
//! The host side of an out-of-process test runner: test modules execute in
//! isolated pages under a browser automation provider, and this crate keeps
//! the distributed bookkeeping honest:
//!
//! - **Session registry**: which runner session owns which test file, id,
//!   and run epoch
//! - **Scheduler**: a hard ceiling on concurrently active sessions with a
//!   FIFO backlog and fatal-drain semantics
//! - **Locator compiler**: folds serialized locator descriptions against
//!   live [`AutomationHandle`]s and executes remote-control actions and
//!   assertions
//! - **Watch rerun planner**: decides after each rebuild which active test
//!   files changed enough to re-execute
//! - **Source position mapper**: translates bundled stack positions back
//!   to original source coordinates
//!
//! Wire shapes live in `wtr-protocol`; envelope routing and transport live
//! in `wtr-runtime`.

pub mod automation;
pub mod compiler;
pub mod error;
pub mod orchestrator;
pub mod rerun;
pub mod scheduler;
pub mod session;
pub mod sourcemap;

pub use automation::{
    AutomationContext, AutomationHandle, AutomationPage, AutomationProvider, ConsoleListener,
    MatcherResult, TextMatch,
};
pub use compiler::{compile_locator, execute_rpc};
pub use error::{Error, Result};
pub use orchestrator::{Orchestrator, Reporter, namespaces};
pub use rerun::{ChunkRegistry, ProjectEntry, RerunPlan, WatchTestFile};
pub use scheduler::{FileDispatcher, TestFileScheduler, TestFileSpec};
pub use session::{RunnerSessionRecord, SessionMode, SessionRegistry};
pub use sourcemap::{MapFetcher, MappedPosition, SourceMapper};
