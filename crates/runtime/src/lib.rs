//! Runtime for the browser test orchestration protocol.
//!
//! This crate provides the two boundary-crossing pieces of the host:
//!
//! - **Router**: maps `(namespace, method)` envelopes to registered
//!   capability handlers, applying epoch-based staleness before any handler
//!   runs
//! - **Transport**: one async request/response contract over two physically
//!   different channels (a direct in-process bridge, or message passing
//!   across a restricted boundary with id correlation)
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐
//! │   wtr-core   │  Sessions, scheduling, locator compilation
//! └──────┬───────┘
//!        │ registers handlers / issues calls
//! ┌──────▼───────┐
//! │  wtr-runtime │  This crate
//! │  ┌─────────┐ │
//! │  │ Router  │ │  namespace dispatch + staleness
//! │  └─────────┘ │
//! │  ┌─────────┐ │
//! │  │Transport│ │  bridge call / correlated messaging
//! │  └─────────┘ │
//! └──────────────┘
//! ```

pub mod error;
pub mod router;
pub mod transport;

pub use error::{Error, Result};
pub use router::{DispatchHandler, DispatchRouter, StalePredicate, handler};
pub use transport::{
    BoundaryTransport, CallBridge, CallOptions, DispatchCall, EmbeddedTransport, MessageSink,
};
