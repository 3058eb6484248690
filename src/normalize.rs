//! Event normalization: raw records to absolute paths.
//!
//! A raw event carries only a native watch identifier and a file name. The
//! normalizer resolves the identifier through the watch registry and joins
//! the name onto the directory to obtain the absolute path the reconciler
//! works with. Events whose identifier is unknown belong to stale watches and
//! resolve to nothing.

use std::path::PathBuf;

use tracing::debug;

use crate::registry::WatchRegistry;
use crate::source::RawEvent;

/// Normalizes backslash separators in a reported name to forward slashes.
///
/// Only the asynchronous-callback strategy reports names with backslashes;
/// it applies this before forwarding.
#[must_use]
pub fn normalize_separators(name: &str) -> String {
    name.replace('\\', "/")
}

/// Resolves a raw event to an absolute path.
///
/// Returns `None` for stale watches (identifier not in the registry); the
/// event is dropped.
#[must_use]
pub fn resolve_path(registry: &WatchRegistry, event: &RawEvent) -> Option<PathBuf> {
    let Some(entry) = registry.lookup(event.wd) else {
        debug!(wd = %event.wd, name = %event.name, "event for unregistered watch, dropping");
        return None;
    };

    Some(entry.dir.join(&event.name))
}
