//! Wire types for the browser test orchestration protocol.
//!
//! This crate contains the serde-serializable types exchanged between the
//! host process and the sandboxed runner pages. These types represent the
//! "protocol layer" - the shapes of data as they appear on the wire.
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! - **Pure data**: No behavior beyond serialization/deserialization and
//!   value construction
//! - **Exact**: Field names and optionality match the wire verbatim, so an
//!   unmodified remote side interoperates without adaptation
//! - **Stable**: Changes only when the wire protocol changes
//!
//! The host-side machinery that routes, schedules, and executes these
//! messages lives in `wtr-runtime` and `wtr-core`.

pub mod build;
pub mod dispatch;
pub mod lifecycle;
pub mod locator;
pub mod rpc;

pub use build::EmittedChunk;
pub use dispatch::{BoundaryMessage, DispatchRequest, DispatchResponse, DispatchTarget};
pub use lifecycle::{CaseState, LifecycleEvent, LogLevel};
pub use locator::{LocatorIr, LocatorStep, TextArg};
pub use rpc::{
    BrowserRpcRequest, EXPECT_METHODS, LOCATOR_METHODS, RpcKind, is_expect_method,
    is_locator_method,
};
