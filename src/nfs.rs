//! Network-filesystem detection.
//!
//! inotify does not deliver events for files modified on other NFS clients,
//! so watching an NFS-backed directory gives a false sense of coverage. When
//! NFS exclusion is configured, the engine consults this predicate before
//! creating a watch and rejects network-backed directories deterministically.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Filesystem types treated as network-backed.
const NETWORK_FS_TYPES: &[&str] = &["nfs", "nfs4", "cifs", "smbfs"];

/// Seam for mount-table lookups.
pub trait MountPredicate: Send {
    /// Returns `true` if `path` resides on a network filesystem.
    fn is_network_fs(&self, path: &Path) -> bool;
}

/// Mount table loaded from `/proc/mounts`.
///
/// Off Linux (or when the table cannot be read) the table is empty and every
/// lookup answers `false`.
#[derive(Debug, Default)]
pub struct ProcMounts {
    /// (mount point, filesystem type), as listed by the kernel.
    entries: Vec<(PathBuf, String)>,
}

impl ProcMounts {
    /// Loads the current mount table.
    #[must_use]
    pub fn load() -> Self {
        let contents = fs::read_to_string("/proc/mounts").unwrap_or_default();
        Self::parse(&contents)
    }

    /// Parses mount-table text in `/proc/mounts` format.
    #[must_use]
    pub fn parse(contents: &str) -> Self {
        let entries = contents
            .lines()
            .filter_map(|line| {
                let mut fields = line.split_whitespace();
                let _device = fields.next()?;
                let mount_point = fields.next()?;
                let fs_type = fields.next()?;
                Some((PathBuf::from(mount_point), fs_type.to_string()))
            })
            .collect();

        Self { entries }
    }
}

impl MountPredicate for ProcMounts {
    fn is_network_fs(&self, path: &Path) -> bool {
        // The deepest mount point containing the path decides.
        let governing = self
            .entries
            .iter()
            .filter(|(mount_point, _)| path.starts_with(mount_point))
            .max_by_key(|(mount_point, _)| mount_point.as_os_str().len());

        match governing {
            Some((mount_point, fs_type)) => {
                let network = NETWORK_FS_TYPES.contains(&fs_type.as_str());
                debug!(
                    path = %path.display(),
                    mount_point = %mount_point.display(),
                    fs_type = %fs_type,
                    network,
                    "mount lookup"
                );
                network
            }
            None => false,
        }
    }
}
