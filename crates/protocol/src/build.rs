//! Rebuild output shapes supplied by the bundler/dev-server.
//!
//! The orchestration core only reads these; it never requests a rebuild.

use serde::{Deserialize, Serialize};

/// One emitted bundle chunk from a rebuild.
///
/// `key` is stable across rebuilds (unlike an output path, which can be
/// ambiguous); a changed `hash` under the same key means the chunk's
/// content changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmittedChunk {
    /// Stable chunk identity.
    pub key: String,
    /// Content hash of this emission.
    pub hash: String,
    /// Original module paths bundled into the chunk.
    pub modules: Vec<String>,
}
