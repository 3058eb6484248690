//! Watch registry: native watch identifiers mapped to directory context.
//!
//! Every strategy of the platform event source reports events keyed by a
//! native watch identifier. The registry resolves that identifier back to the
//! monitored directory and guarantees one entry per distinct directory.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Native watch identifier.
///
/// Integer on every platform: the inotify watch descriptor on the
/// blocking-batch strategy, a sequential id minted by the callback strategy
/// elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchId(pub i32);

impl fmt::Display for WatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Directory context for one native watch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEntry {
    /// Absolute path of the watched directory.
    pub dir: PathBuf,
}

/// Registry of active watches.
///
/// Lookups by identifier are O(1) average; the reverse index keeps adds
/// idempotent per directory.
#[derive(Debug, Default)]
pub struct WatchRegistry {
    by_id: HashMap<WatchId, WatchEntry>,
    by_dir: HashMap<PathBuf, WatchId>,
}

impl WatchRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a watch for `dir` under `id`.
    ///
    /// If the directory is already registered, the existing entry is kept and
    /// its identifier returned; callers must not have created a second native
    /// watch in that case.
    pub fn add(&mut self, id: WatchId, dir: &Path) -> WatchId {
        if let Some(existing) = self.by_dir.get(dir) {
            return *existing;
        }

        self.by_id.insert(
            id,
            WatchEntry {
                dir: dir.to_path_buf(),
            },
        );
        self.by_dir.insert(dir.to_path_buf(), id);
        id
    }

    /// Resolves a native identifier to its directory context.
    #[must_use]
    pub fn lookup(&self, id: WatchId) -> Option<&WatchEntry> {
        self.by_id.get(&id)
    }

    /// Returns the identifier registered for `dir`, if any.
    #[must_use]
    pub fn id_for(&self, dir: &Path) -> Option<WatchId> {
        self.by_dir.get(dir).copied()
    }

    /// Returns `true` if `dir` already has a watch.
    #[must_use]
    pub fn contains_dir(&self, dir: &Path) -> bool {
        self.by_dir.contains_key(dir)
    }

    /// Removes the watch registered under `id`, returning its entry.
    pub fn remove(&mut self, id: WatchId) -> Option<WatchEntry> {
        let entry = self.by_id.remove(&id)?;
        self.by_dir.remove(&entry.dir);
        Some(entry)
    }

    /// Number of registered watches.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Returns `true` if no watches are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_returns_directory_context() {
        let mut registry = WatchRegistry::new();
        registry.add(WatchId(3), Path::new("/etc"));

        let entry = registry.lookup(WatchId(3)).unwrap();
        assert_eq!(entry.dir, Path::new("/etc"));
        assert!(registry.lookup(WatchId(4)).is_none());
    }

    #[test]
    fn add_is_idempotent_per_directory() {
        let mut registry = WatchRegistry::new();
        let first = registry.add(WatchId(1), Path::new("/etc"));
        let second = registry.add(WatchId(99), Path::new("/etc"));

        assert_eq!(first, second);
        assert_eq!(registry.len(), 1);
        assert!(registry.lookup(WatchId(99)).is_none());
    }

    #[test]
    fn distinct_directories_get_distinct_entries() {
        let mut registry = WatchRegistry::new();
        registry.add(WatchId(1), Path::new("/etc"));
        registry.add(WatchId(2), Path::new("/usr/bin"));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.id_for(Path::new("/usr/bin")), Some(WatchId(2)));
    }

    #[test]
    fn remove_clears_both_indexes() {
        let mut registry = WatchRegistry::new();
        registry.add(WatchId(1), Path::new("/etc"));

        let entry = registry.remove(WatchId(1)).unwrap();
        assert_eq!(entry.dir, Path::new("/etc"));
        assert!(registry.is_empty());
        assert!(!registry.contains_dir(Path::new("/etc")));
    }
}
