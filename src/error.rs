//! Crate-level error type.

use std::path::PathBuf;

use thiserror::Error;

use crate::baseline::BaselineError;
use crate::config::ConfigError;
use crate::source::SourceError;

/// Errors surfaced by the realtime engine and its setup.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Configuration could not be parsed.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The platform event source failed.
    #[error("event source error: {0}")]
    Source(#[from] SourceError),

    /// Filesystem access failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored baseline record could not be decoded.
    #[error("baseline error: {0}")]
    Baseline(#[from] BaselineError),

    /// The directory resides on a network filesystem and NFS exclusion is on.
    #[error("refusing to watch network filesystem path: {0}")]
    NfsExcluded(PathBuf),

    /// The watch ceiling has been reached.
    #[error("watch limit of {limit} reached, cannot watch {dir}")]
    WatchLimit { dir: PathBuf, limit: usize },
}

/// Convenience alias for engine results.
pub type Result<T> = std::result::Result<T, EngineError>;
