//! Content-diff primitive: human-readable change snippets.
//!
//! When a changed record has diff tracking enabled, the reconciler asks this
//! primitive for a snippet to append to the alert. The provider keeps a
//! bounded snapshot of the last observed content per path and produces a
//! unified diff against it. The first observation of a path has nothing to
//! diff against and yields no snippet.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use similar::TextDiff;
use tracing::{debug, warn};

use crate::alert::truncate_to_boundary;

/// Longest file content kept as a snapshot; larger files are truncated
/// before diffing.
const SNAPSHOT_MAX_LEN: usize = 64 * 1024;

/// Hard cap on a produced snippet.
const SNIPPET_MAX_LEN: usize = 4096;

/// Unified diff context lines.
const CONTEXT_RADIUS: usize = 2;

/// Seam for the content-diff primitive.
pub trait DiffProvider: Send {
    /// Returns a human-readable snippet of what changed in `path`, if
    /// anything is known to compare against.
    fn snippet(&mut self, path: &Path) -> Option<String>;
}

/// Line-oriented diff provider with in-memory snapshots.
#[derive(Debug, Default)]
pub struct ContentDiff {
    snapshots: HashMap<PathBuf, String>,
}

impl ContentDiff {
    /// Creates a provider with no snapshots.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of paths with a stored snapshot.
    #[must_use]
    pub fn tracked_paths(&self) -> usize {
        self.snapshots.len()
    }
}

impl DiffProvider for ContentDiff {
    fn snippet(&mut self, path: &Path) -> Option<String> {
        let current = match fs::read(path) {
            Ok(bytes) => {
                let mut text = String::from_utf8_lossy(&bytes).into_owned();
                text = truncate_to_boundary(text, SNAPSHOT_MAX_LEN);
                text
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unable to read file for diffing");
                return None;
            }
        };

        let previous = self.snapshots.insert(path.to_path_buf(), current.clone());

        let Some(previous) = previous else {
            debug!(path = %path.display(), "first observation, no snapshot to diff against");
            return None;
        };

        if previous == current {
            return None;
        }

        let diff = TextDiff::from_lines(&previous, &current);
        let snippet = diff
            .unified_diff()
            .context_radius(CONTEXT_RADIUS)
            .to_string();

        if snippet.is_empty() {
            return None;
        }

        Some(truncate_to_boundary(snippet, SNIPPET_MAX_LEN))
    }
}
