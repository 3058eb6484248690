//! Checksum primitive: content fingerprints for change detection.
//!
//! The reconciler only needs a single opaque line per file whose exact
//! equality means "unchanged". The production implementation produces
//! `<size>:<mode-octal>:<sha256-hex>` — one space-free token, so the alert's
//! checksum-diff token is the whole line.
//!
//! A failed read surfaces as `None`; the primitive logs the failure itself
//! and the reconciler writes the deletion sentinel without alerting.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::warn;

/// Read buffer size for hashing.
const READ_BUF_LEN: usize = 64 * 1024;

/// Seam for the checksum-read primitive.
pub trait ChecksumReader: Send {
    /// Returns the checksum line for `path`, or `None` when the file cannot
    /// be read. Implementations report the failure themselves.
    fn read_checksum(&mut self, path: &Path) -> Option<String>;
}

/// SHA-256 based checksum lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Checksum;

impl ChecksumReader for Sha256Checksum {
    fn read_checksum(&mut self, path: &Path) -> Option<String> {
        match checksum_line(path) {
            Ok(line) => Some(line),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unable to read monitored file");
                None
            }
        }
    }
}

fn checksum_line(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let metadata = file.metadata()?;

    let mut hasher = Sha256::new();
    let mut buf = [0u8; READ_BUF_LEN];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    let digest = hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<String>();

    Ok(format!(
        "{}:{:o}:{}",
        metadata.len(),
        file_mode(&metadata),
        digest
    ))
}

#[cfg(unix)]
fn file_mode(metadata: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode()
}

#[cfg(not(unix))]
fn file_mode(_metadata: &std::fs::Metadata) -> u32 {
    0
}
