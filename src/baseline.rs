//! Baseline records and the baseline store.
//!
//! The baseline maps each monitored path to the state it had when it was last
//! scanned. At the storage boundary a record is a fixed-layout string:
//!
//! ```text
//! [attribute block, ATTR_BLOCK_LEN bytes][checksum]
//! ```
//!
//! The attribute block is opaque to the realtime engine and preserved
//! verbatim across updates. One byte inside it, at [`DIFF_FLAG_OFFSET`],
//! selects whether content-diff tracking is enabled for the path: `'s'` or
//! `'n'` enable it, any other value disables it. Unrecognized flag values are
//! never an error.
//!
//! In memory the record is typed ([`BaselineRecord`]); the string layout only
//! appears in [`BaselineRecord::decode`] and [`BaselineRecord::encode`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use thiserror::Error;

/// Width of the opaque attribute block in the encoded record. The checksum
/// always begins exactly at this offset.
pub const ATTR_BLOCK_LEN: usize = 15;

/// Offset of the diff-tracking flag byte within the attribute block.
pub const DIFF_FLAG_OFFSET: usize = 6;

/// Checksum sentinel written when a monitored file can no longer be read.
pub const DELETED_CHECKSUM: &str = "-1";

/// Errors that can occur when decoding a stored baseline record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BaselineError {
    /// The raw record is shorter than the attribute block.
    #[error("baseline record too short: {len} bytes, need at least {ATTR_BLOCK_LEN}")]
    Truncated { len: usize },
}

/// A decoded per-path baseline entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaselineRecord {
    /// Opaque attribute block, exactly [`ATTR_BLOCK_LEN`] bytes when encoded.
    pub attributes: String,

    /// Whether the stored flag byte requests content-diff tracking.
    pub diff_tracking: bool,

    /// The stored checksum token, or [`DELETED_CHECKSUM`] after a failed read.
    pub checksum: String,
}

impl BaselineRecord {
    /// Creates a record from an attribute block and checksum token.
    ///
    /// The diff-tracking flag is derived from the attribute block.
    #[must_use]
    pub fn new(attributes: impl Into<String>, checksum: impl Into<String>) -> Self {
        let attributes = attributes.into();
        let diff_tracking = flag_enables_diff(&attributes);
        Self {
            attributes,
            diff_tracking,
            checksum: checksum.into(),
        }
    }

    /// Decodes the fixed-layout string form.
    ///
    /// # Errors
    ///
    /// Returns [`BaselineError::Truncated`] if `raw` is shorter than the
    /// attribute block.
    pub fn decode(raw: &str) -> Result<Self, BaselineError> {
        let bytes = raw.as_bytes();
        if bytes.len() < ATTR_BLOCK_LEN {
            return Err(BaselineError::Truncated { len: bytes.len() });
        }

        let attributes = String::from_utf8_lossy(&bytes[..ATTR_BLOCK_LEN]).into_owned();
        let checksum = String::from_utf8_lossy(&bytes[ATTR_BLOCK_LEN..]).into_owned();
        let diff_tracking = flag_enables_diff(&attributes);

        Ok(Self {
            attributes,
            diff_tracking,
            checksum,
        })
    }

    /// Encodes back to the fixed-layout string form.
    #[must_use]
    pub fn encode(&self) -> String {
        format!("{}{}", self.attributes, self.checksum)
    }

    /// Returns a copy with the checksum field replaced, attributes verbatim.
    #[must_use]
    pub fn with_checksum(&self, checksum: impl Into<String>) -> Self {
        Self {
            attributes: self.attributes.clone(),
            diff_tracking: self.diff_tracking,
            checksum: checksum.into(),
        }
    }

    /// Returns a copy marked as deleted: attributes verbatim, checksum
    /// replaced by the deletion sentinel.
    #[must_use]
    pub fn deleted(&self) -> Self {
        self.with_checksum(DELETED_CHECKSUM)
    }
}

/// Reads the diff-tracking flag byte out of an attribute block.
fn flag_enables_diff(attributes: &str) -> bool {
    matches!(
        attributes.as_bytes().get(DIFF_FLAG_OFFSET),
        Some(b's') | Some(b'n')
    )
}

/// Storage seam for baseline records.
///
/// The realtime engine only needs point lookups and single-record mutations;
/// the periodic scanner that owns bulk (re)population sits behind the same
/// trait.
pub trait BaselineStore: Send {
    /// Returns the record for `path`, if one exists.
    fn get(&self, path: &Path) -> Option<BaselineRecord>;

    /// Replaces the record for `path`. Returns `false` if no record existed,
    /// in which case nothing is stored.
    fn update(&mut self, path: &Path, record: BaselineRecord) -> bool;

    /// Inserts or overwrites the record for `path`.
    fn insert(&mut self, path: &Path, record: BaselineRecord);
}

/// In-memory baseline store, cheaply cloneable and shareable across tasks.
///
/// Seeding (startup scan, rescan requests) and reconciliation run on
/// different tasks, so access is explicitly serialized behind an `RwLock`.
#[derive(Debug, Clone, Default)]
pub struct SharedBaselineStore {
    inner: Arc<RwLock<HashMap<PathBuf, BaselineRecord>>>,
}

impl SharedBaselineStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().expect("baseline store lock poisoned").len()
    }

    /// Returns `true` if no paths are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BaselineStore for SharedBaselineStore {
    fn get(&self, path: &Path) -> Option<BaselineRecord> {
        self.inner
            .read()
            .expect("baseline store lock poisoned")
            .get(path)
            .cloned()
    }

    fn update(&mut self, path: &Path, record: BaselineRecord) -> bool {
        let mut guard = self.inner.write().expect("baseline store lock poisoned");
        match guard.get_mut(path) {
            Some(existing) => {
                *existing = record;
                true
            }
            None => false,
        }
    }

    fn insert(&mut self, path: &Path, record: BaselineRecord) {
        self.inner
            .write()
            .expect("baseline store lock poisoned")
            .insert(path.to_path_buf(), record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ATTRS_PLAIN: &str = "ATTR0000000123 ";
    const ATTRS_DIFF: &str = "ATTR00s0000123 ";

    #[test]
    fn decode_splits_at_attribute_block() {
        let record =
            BaselineRecord::decode("ATTR0000000123 d41d8cd98f00b204e9800998ecf8427e").unwrap();
        assert_eq!(record.attributes, ATTRS_PLAIN);
        assert_eq!(record.checksum, "d41d8cd98f00b204e9800998ecf8427e");
        assert!(!record.diff_tracking);
    }

    #[test]
    fn decode_rejects_short_records() {
        let err = BaselineRecord::decode("short").unwrap_err();
        assert_eq!(err, BaselineError::Truncated { len: 5 });
    }

    #[test]
    fn encode_round_trips() {
        let raw = "ATTR0000000123 d41d8cd98f00b204e9800998ecf8427e";
        let record = BaselineRecord::decode(raw).unwrap();
        assert_eq!(record.encode(), raw);
    }

    #[test]
    fn flag_byte_s_and_n_enable_diff_tracking() {
        assert!(BaselineRecord::new(ATTRS_DIFF, "abc").diff_tracking);
        assert!(BaselineRecord::new("ATTR00n0000123 ", "abc").diff_tracking);
    }

    #[test]
    fn unrecognized_flag_values_default_to_disabled() {
        for flag in ['0', '+', '-', 'x', 'S'] {
            let mut attrs = ATTRS_PLAIN.to_string();
            attrs.replace_range(DIFF_FLAG_OFFSET..=DIFF_FLAG_OFFSET, &flag.to_string());
            assert!(
                !BaselineRecord::new(attrs, "abc").diff_tracking,
                "flag {flag:?} should not enable diff tracking"
            );
        }
    }

    #[test]
    fn with_checksum_preserves_attributes() {
        let record = BaselineRecord::new(ATTRS_PLAIN, "old");
        let updated = record.with_checksum("new");
        assert_eq!(updated.attributes, ATTRS_PLAIN);
        assert_eq!(updated.checksum, "new");
    }

    #[test]
    fn deleted_writes_sentinel() {
        let record = BaselineRecord::new(ATTRS_PLAIN, "old");
        let deleted = record.deleted();
        assert_eq!(deleted.checksum, DELETED_CHECKSUM);
        assert_eq!(deleted.attributes, ATTRS_PLAIN);
    }

    #[test]
    fn store_update_requires_existing_entry() {
        let mut store = SharedBaselineStore::new();
        let path = Path::new("/etc/passwd");
        let record = BaselineRecord::new(ATTRS_PLAIN, "abc");

        assert!(!store.update(path, record.clone()));
        assert!(store.get(path).is_none());

        store.insert(path, record.clone());
        assert_eq!(store.get(path), Some(record.clone()));

        let changed = record.with_checksum("def");
        assert!(store.update(path, changed.clone()));
        assert_eq!(store.get(path), Some(changed));
    }

    #[test]
    fn store_clones_share_state() {
        let mut store = SharedBaselineStore::new();
        let clone = store.clone();
        store.insert(Path::new("/a"), BaselineRecord::new(ATTRS_PLAIN, "abc"));
        assert_eq!(clone.len(), 1);
    }
}
