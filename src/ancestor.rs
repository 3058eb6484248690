//! Ancestor resolution for paths with no baseline entry.
//!
//! When the reconciler sees a path it has no baseline for, the file is new.
//! The engine cannot seed a baseline itself; instead it finds which
//! configured monitored root encloses the path and asks the external scanner
//! to rescan, carrying that root's scan options and restriction pattern so
//! the new file is seeded consistently with its neighbours.
//!
//! Resolution strips the final path component repeatedly until the remaining
//! prefix exactly equals a configured root or no separator remains, so it
//! terminates after at most D steps for a path of depth D. Paths outside
//! every configured root (stale watches) resolve to nothing and are dropped
//! silently.

use std::path::{Path, PathBuf};

/// One configured monitored root.
///
/// Options and the restriction pattern are opaque to the realtime engine;
/// they are forwarded verbatim on rescan requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitoredDir {
    /// Absolute root path.
    pub path: PathBuf,

    /// Scan option bitset, interpreted by the scanner.
    pub options: u32,

    /// Optional filename restriction pattern, interpreted by the scanner.
    pub restrict: Option<String>,
}

impl MonitoredDir {
    /// Creates a root with no options and no restriction.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            options: 0,
            restrict: None,
        }
    }
}

/// A request for the external scanner to seed a baseline entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RescanRequest {
    /// The original full path the event arrived for.
    pub path: PathBuf,

    /// Options of the enclosing monitored root.
    pub options: u32,

    /// Restriction pattern of the enclosing monitored root.
    pub restrict: Option<String>,
}

/// Finds the configured monitored root enclosing `path`.
///
/// Ancestors are tried from the deepest proper prefix outwards; the first one
/// that exactly equals a configured root wins, with configuration order
/// breaking ties. Returns `None` when no root matches.
#[must_use]
pub fn find_monitored_root<'a>(path: &Path, roots: &'a [MonitoredDir]) -> Option<&'a MonitoredDir> {
    for ancestor in path.ancestors().skip(1) {
        if ancestor.as_os_str().is_empty() {
            break;
        }
        if let Some(root) = roots.iter().find(|root| root.path == ancestor) {
            return Some(root);
        }
    }
    None
}

/// Builds the rescan request for `path`, if an enclosing root exists.
#[must_use]
pub fn rescan_request(path: &Path, roots: &[MonitoredDir]) -> Option<RescanRequest> {
    let root = find_monitored_root(path, roots)?;
    Some(RescanRequest {
        path: path.to_path_buf(),
        options: root.options,
        restrict: root.restrict.clone(),
    })
}
