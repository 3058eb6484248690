//! Baseline scanner: seeds and reseeds baseline entries.
//!
//! The realtime engine never creates baseline entries itself. Startup seeding
//! and rescan requests for newly observed files both land here: the scanner
//! walks (or revisits) paths, computes the attribute block from the root's
//! scan options, checksums the file and writes the record into the store.

use std::fs;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::ancestor::{MonitoredDir, RescanRequest};
use crate::baseline::{BaselineRecord, BaselineStore};
use crate::checksum::ChecksumReader;

/// Scan option bit requesting content-diff tracking for the root.
pub const OPT_REPORT_CHANGES: u32 = 1;

/// Number of option bits rendered as `+`/`-` markers in the attribute block.
const OPTION_MARKER_BITS: u32 = 6;

/// Renders the fixed-width attribute block for a root's scan options.
///
/// Six `+`/`-` markers for the low option bits, the diff-tracking flag byte,
/// then the options value zero-padded to seven digits and a trailing space.
/// The result is always exactly [`crate::baseline::ATTR_BLOCK_LEN`] bytes.
#[must_use]
pub fn attribute_block(options: u32) -> String {
    let mut block = String::with_capacity(crate::baseline::ATTR_BLOCK_LEN);
    for bit in 0..OPTION_MARKER_BITS {
        block.push(if options & (1 << bit) != 0 { '+' } else { '-' });
    }
    block.push(if options & OPT_REPORT_CHANGES != 0 {
        's'
    } else {
        '+'
    });
    block.push_str(&format!("{:07} ", options % 10_000_000));
    block
}

/// Seeds baseline records for monitored roots and rescan requests.
pub struct Scanner<S, C> {
    store: S,
    checksums: C,
}

impl<S, C> Scanner<S, C>
where
    S: BaselineStore,
    C: ChecksumReader,
{
    /// Creates a scanner writing into `store`.
    pub fn new(store: S, checksums: C) -> Self {
        Self { store, checksums }
    }

    /// Handles one rescan request from the reconciler.
    pub fn handle(&mut self, request: &RescanRequest) {
        self.seed_path(&request.path, request.options, request.restrict.as_deref());
    }

    /// Seeds a baseline entry for a single file.
    ///
    /// Restriction patterns match as substrings of the file name; files that
    /// do not match are skipped. Unreadable files are skipped too (the
    /// checksum primitive reports the failure).
    pub fn seed_path(&mut self, path: &Path, options: u32, restrict: Option<&str>) {
        if let Some(pattern) = restrict {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            if !name.contains(pattern) {
                debug!(
                    path = %path.display(),
                    pattern,
                    "file name outside restriction pattern, skipping"
                );
                return;
            }
        }

        let Some(line) = self.checksums.read_checksum(path) else {
            return;
        };
        let token = line.split_whitespace().next().unwrap_or_default().to_string();

        self.store
            .insert(path, BaselineRecord::new(attribute_block(options), token));
        debug!(path = %path.display(), "baseline entry seeded");
    }

    /// Recursively seeds every regular file under a monitored root.
    pub fn seed_directory(&mut self, root: &MonitoredDir) {
        info!(dir = %root.path.display(), options = root.options, "seeding baseline");
        self.walk(&root.path, root.options, root.restrict.as_deref());
    }

    fn walk(&mut self, dir: &Path, options: u32, restrict: Option<&str>) {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "unable to read directory, skipping");
                return;
            }
        };

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "unable to read directory entry");
                    continue;
                }
            };

            let path = entry.path();
            match entry.file_type() {
                Ok(file_type) if file_type.is_dir() => {
                    self.walk(&path, options, restrict);
                }
                Ok(file_type) if file_type.is_file() => {
                    self.seed_path(&path, options, restrict);
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "unable to stat entry");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::{SharedBaselineStore, ATTR_BLOCK_LEN, DIFF_FLAG_OFFSET};
    use crate::checksum::Sha256Checksum;
    use std::path::PathBuf;
    use tempfile::tempdir;

    #[test]
    fn attribute_block_has_fixed_width() {
        for options in [0, 1, 3, 7, 63, 9_999_999, u32::MAX] {
            assert_eq!(attribute_block(options).len(), ATTR_BLOCK_LEN);
        }
    }

    #[test]
    fn report_changes_bit_sets_the_diff_flag() {
        let with = attribute_block(OPT_REPORT_CHANGES | 2);
        assert_eq!(with.as_bytes()[DIFF_FLAG_OFFSET], b's');

        let without = attribute_block(2);
        assert_eq!(without.as_bytes()[DIFF_FLAG_OFFSET], b'+');
    }

    #[test]
    fn seeded_record_has_diff_tracking_when_requested() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.conf");
        fs::write(&path, "a=1\n").unwrap();

        let store = SharedBaselineStore::new();
        let mut scanner = Scanner::new(store.clone(), Sha256Checksum);
        scanner.seed_path(&path, OPT_REPORT_CHANGES, None);

        let record = store.get(&path).unwrap();
        assert!(record.diff_tracking);
        assert!(!record.checksum.is_empty());
    }

    #[test]
    fn restriction_pattern_filters_by_file_name() {
        let dir = tempdir().unwrap();
        let matching = dir.path().join("app.conf");
        let other = dir.path().join("notes.txt");
        fs::write(&matching, "x").unwrap();
        fs::write(&other, "y").unwrap();

        let store = SharedBaselineStore::new();
        let mut scanner = Scanner::new(store.clone(), Sha256Checksum);
        scanner.seed_path(&matching, 0, Some(".conf"));
        scanner.seed_path(&other, 0, Some(".conf"));

        assert!(store.get(&matching).is_some());
        assert!(store.get(&other).is_none());
    }

    #[test]
    fn seed_directory_walks_recursively() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("top.txt"), "t").unwrap();
        fs::write(dir.path().join("sub/nested.txt"), "n").unwrap();

        let store = SharedBaselineStore::new();
        let mut scanner = Scanner::new(store.clone(), Sha256Checksum);
        scanner.seed_directory(&MonitoredDir::new(dir.path()));

        assert_eq!(store.len(), 2);
        assert!(store.get(&dir.path().join("sub/nested.txt")).is_some());
    }

    #[test]
    fn missing_directory_is_skipped_without_panicking() {
        let store = SharedBaselineStore::new();
        let mut scanner = Scanner::new(store.clone(), Sha256Checksum);
        scanner.seed_directory(&MonitoredDir::new(PathBuf::from("/nonexistent/fimwatch")));
        assert!(store.is_empty());
    }

    #[test]
    fn rescan_request_seeds_the_requested_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("new.txt");
        fs::write(&path, "fresh").unwrap();

        let store = SharedBaselineStore::new();
        let mut scanner = Scanner::new(store.clone(), Sha256Checksum);
        scanner.handle(&RescanRequest {
            path: path.clone(),
            options: 0,
            restrict: None,
        });

        assert!(store.get(&path).is_some());
    }
}
