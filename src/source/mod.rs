//! Platform event source: raw filesystem notifications.
//!
//! Three interchangeable strategies, selected once per build/deployment:
//!
//! - [`inotify::InotifySource`] (Linux): blocking-batch reads from the
//!   inotify queue on a dedicated reader thread.
//! - [`callback::CallbackSource`]: one asynchronous read outstanding per
//!   watched directory, drained and re-armed by a per-directory pump task.
//! - [`unsupported::UnsupportedSource`]: every operation reports realtime as
//!   unavailable; never fatal, the periodic scanner remains the fallback.
//!
//! All strategies forward [`RawEvent`]s into a single bounded channel drained
//! by the engine's processing task.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::registry::WatchId;

pub mod callback;
#[cfg(target_os = "linux")]
pub mod inotify;
pub mod unsupported;

/// One raw filesystem notification, before normalization.
///
/// Records with no actionable name (attribute/self events) are filtered out
/// at the source and never reach the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    /// Native watch identifier of the directory the event belongs to.
    pub wd: WatchId,

    /// File name reported by the platform, relative to the watched directory.
    /// Separators are already normalized to forward slashes.
    pub name: String,
}

/// Errors produced by the platform event source.
#[derive(Error, Debug)]
pub enum SourceError {
    /// Realtime monitoring is not available in this build or on this host.
    #[error("realtime monitoring is not available")]
    Unavailable,

    /// The native facility could not be initialized.
    #[error("failed to initialize event source: {0}")]
    Init(#[from] std::io::Error),

    /// A directory could not be watched.
    #[error("unable to watch {dir}: {message}")]
    Watch { dir: PathBuf, message: String },

    /// The event channel to the engine has been closed.
    #[error("event channel closed")]
    ChannelClosed,
}

/// Which scheduling model a source uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Dedicated task performing read-and-process passes over a batch queue.
    BlockingBatch,

    /// Per-directory asynchronous reads with cooperative re-arm.
    Callback,

    /// No realtime coverage.
    Unsupported,
}

/// A strategy of the platform event source.
///
/// Implementations deliver [`RawEvent`]s through the channel handed to them
/// at construction; this trait only covers watch management and teardown.
pub trait EventSource: Send {
    /// The scheduling model of this source.
    fn kind(&self) -> SourceKind;

    /// Starts watching `dir`, returning its native identifier.
    ///
    /// # Errors
    ///
    /// Returns a [`SourceError`] if the native watch cannot be created. A
    /// failed add leaves the directory without realtime coverage until an
    /// explicit re-add; there is no automatic retry.
    fn add_watch(&mut self, dir: &Path) -> Result<WatchId, SourceError>;

    /// Releases the native handle and any pending reads without draining
    /// them. In-flight buffers are discarded.
    fn shutdown(&mut self);
}

/// Builds the event source for this platform.
///
/// Strategy selection happens here, once: the blocking-batch strategy on
/// Linux, the asynchronous-callback strategy elsewhere, and the unsupported
/// strategy when realtime is disabled or initialization fails. Failure to
/// initialize is logged and degraded, never fatal.
#[must_use]
pub fn create_source(
    events: mpsc::Sender<RawEvent>,
    settle: Duration,
    realtime: bool,
) -> Box<dyn EventSource> {
    if !realtime {
        tracing::info!("realtime monitoring disabled by configuration");
        return Box::new(unsupported::UnsupportedSource);
    }

    platform_source(events, settle)
}

#[cfg(target_os = "linux")]
fn platform_source(events: mpsc::Sender<RawEvent>, settle: Duration) -> Box<dyn EventSource> {
    match inotify::InotifySource::new(events, settle) {
        Ok(source) => Box::new(source),
        Err(e) => {
            tracing::error!(error = %e, "unable to initialize realtime monitoring");
            Box::new(unsupported::UnsupportedSource)
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn platform_source(events: mpsc::Sender<RawEvent>, _settle: Duration) -> Box<dyn EventSource> {
    Box::new(callback::CallbackSource::new(events))
}
