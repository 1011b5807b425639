//! Watch rerun planning.
//!
//! Between rebuilds the planner decides two things: whether the active
//! test-file set changed at all, and which currently active files were
//! structurally affected by the edit. Affected-file detection works on
//! rebuild output - a stable per-chunk key and its content hash - rather
//! than naive timestamp comparison, because output paths can be ambiguous
//! across rebuilds.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use wtr_protocol::EmittedChunk;

/// One project's contribution to the active watch set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectEntry {
    /// Project name.
    pub project_name: String,
    /// Test files the project currently runs.
    pub test_files: Vec<String>,
}

/// A normalized `(testFile, projectName)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchTestFile {
    pub test_file: String,
    pub project_name: String,
}

/// Output of [`plan_watch_rerun`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RerunPlan {
    /// Whether the active test-file set differs from the previous rebuild.
    pub files_changed: bool,
    /// The current normalized active set.
    pub current_test_files: Vec<WatchTestFile>,
    /// All caller-supplied affected paths after normalization, including
    /// those that no longer map to an active file.
    pub normalized_affected: Vec<String>,
    /// Affected paths intersected with the current set. A file that was
    /// deleted cannot be rerun, so it is dropped here.
    pub affected_test_files: Vec<String>,
}

/// Normalizes a test-file path for identity comparison.
fn normalize_path(path: &str) -> String {
    let mut normalized = path.replace('\\', "/");
    while let Some(stripped) = normalized.strip_prefix("./") {
        normalized = stripped.to_string();
    }
    normalized
}

/// Flattens per-project file lists into normalized pairs.
pub fn collect_watch_test_files(project_entries: &[ProjectEntry]) -> Vec<WatchTestFile> {
    project_entries
        .iter()
        .flat_map(|entry| {
            entry.test_files.iter().map(|file| WatchTestFile {
                test_file: normalize_path(file),
                project_name: entry.project_name.clone(),
            })
        })
        .collect()
}

/// Canonical serialization of a set: sorted, one entry per pair.
fn canonical(files: &[WatchTestFile]) -> Vec<(String, String)> {
    let mut pairs: Vec<_> = files
        .iter()
        .map(|f| (f.project_name.clone(), normalize_path(&f.test_file)))
        .collect();
    pairs.sort();
    pairs.dedup();
    pairs
}

/// Computes the rerun scope after a rebuild.
pub fn plan_watch_rerun(
    project_entries: &[ProjectEntry],
    previous_test_files: &[WatchTestFile],
    affected_test_files: &[String],
) -> RerunPlan {
    let current_test_files = collect_watch_test_files(project_entries);
    let files_changed = canonical(&current_test_files) != canonical(previous_test_files);

    let normalized_affected: Vec<String> =
        affected_test_files.iter().map(|p| normalize_path(p)).collect();

    let active: HashSet<&str> = current_test_files
        .iter()
        .map(|f| f.test_file.as_str())
        .collect();
    let affected_test_files: Vec<String> = normalized_affected
        .iter()
        .filter(|path| active.contains(path.as_str()))
        .cloned()
        .collect();

    debug!(
        files_changed,
        current = current_test_files.len(),
        affected = affected_test_files.len(),
        "planned watch rerun"
    );

    RerunPlan {
        files_changed,
        current_test_files,
        normalized_affected,
        affected_test_files,
    }
}

struct ChunkState {
    hash: String,
    entries: HashSet<String>,
}

/// Per-chunk hash bookkeeping across rebuilds of one watch session.
///
/// A chunk whose hash changed between two consecutive rebuilds marks every
/// entry test file it contains as affected. Entries persist for the
/// lifetime of the watch process and are overwritten each rebuild.
#[derive(Default)]
pub struct ChunkRegistry {
    chunks: Mutex<HashMap<String, ChunkState>>,
}

impl ChunkRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one rebuild's emitted chunks and returns the test files
    /// whose containing chunk's content hash changed since the previous
    /// rebuild. `is_test_file` identifies entry test files among a chunk's
    /// module paths.
    ///
    /// A chunk seen for the first time is recorded but marks nothing
    /// affected - "affected" means changed *between* two rebuilds.
    pub fn record_rebuild(
        &self,
        emitted: &[EmittedChunk],
        is_test_file: impl Fn(&str) -> bool,
    ) -> Vec<String> {
        let mut chunks = self.chunks.lock();
        let mut affected = Vec::new();

        for chunk in emitted {
            let entries: HashSet<String> = chunk
                .modules
                .iter()
                .map(|m| normalize_path(m))
                .filter(|m| is_test_file(m))
                .collect();

            let changed = chunks
                .get(&chunk.key)
                .is_some_and(|previous| previous.hash != chunk.hash);
            if changed {
                for entry in &entries {
                    if !affected.contains(entry) {
                        affected.push(entry.clone());
                    }
                }
            }

            chunks.insert(
                chunk.key.clone(),
                ChunkState {
                    hash: chunk.hash.clone(),
                    entries,
                },
            );
        }

        affected.sort();
        affected
    }

    /// Test files known to live in the given chunk, sorted.
    pub fn entries_for_chunk(&self, key: &str) -> Vec<String> {
        let chunks = self.chunks.lock();
        let mut entries: Vec<_> = chunks
            .get(key)
            .map(|state| state.entries.iter().cloned().collect())
            .unwrap_or_default();
        entries.sort();
        entries
    }
}
