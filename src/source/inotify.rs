//! Blocking-batch event source backed by inotify (Linux).
//!
//! A dedicated reader thread performs read-and-process passes over the
//! inotify queue. Each pass fetches whatever batch of variable-length records
//! the kernel has buffered; an empty pass is a no-op poll, a failed read is a
//! transient error that is logged before the loop continues. Records without
//! a name (attribute/self events) carry no actionable path and are skipped.
//!
//! The configured settling delay is applied per actionable record, on this
//! thread only, before the event is forwarded. This suppresses false
//! positives from editors that create, delete and rename scratch files in
//! quick succession.
//!
//! Watches are added from the engine through the crate's cloneable
//! [`Watches`] handle, so the reader thread keeps exclusive ownership of the
//! queue itself. The read uses the non-blocking variant plus a short idle
//! sleep between empty passes, which lets [`InotifySource::shutdown`]
//! interrupt the loop and release the native handle promptly.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use inotify::{Inotify, WatchMask, Watches};
use tokio::sync::mpsc;
use tracing::{debug, error, trace};

use super::{EventSource, RawEvent, SourceError, SourceKind};
use crate::registry::WatchId;

/// Size of the batch read buffer. Large enough for a burst of a few hundred
/// events with long names.
const EVENT_BUFFER_LEN: usize = 64 * 1024;

/// Idle sleep between empty read passes.
const IDLE_POLL: Duration = Duration::from_millis(250);

/// Kernel events subscribed per directory.
fn watch_mask() -> WatchMask {
    WatchMask::MODIFY
        | WatchMask::ATTRIB
        | WatchMask::MOVED_FROM
        | WatchMask::MOVED_TO
        | WatchMask::CREATE
        | WatchMask::DELETE
        | WatchMask::DELETE_SELF
}

/// Blocking-batch event source.
#[derive(Debug)]
pub struct InotifySource {
    watches: Watches,
    stop: Arc<AtomicBool>,
    reader: Option<thread::JoinHandle<()>>,
}

impl InotifySource {
    /// Initializes the inotify queue and starts the reader thread.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Init`] if the queue cannot be created or the
    /// reader thread cannot be spawned.
    pub fn new(events: mpsc::Sender<RawEvent>, settle: Duration) -> Result<Self, SourceError> {
        let inotify = Inotify::init()?;
        let watches = inotify.watches();
        let stop = Arc::new(AtomicBool::new(false));

        let stop_for_reader = Arc::clone(&stop);
        let reader = thread::Builder::new()
            .name("fimwatch-inotify".to_string())
            .spawn(move || read_loop(inotify, events, settle, stop_for_reader))?;

        debug!("inotify event source initialized");

        Ok(Self {
            watches,
            stop,
            reader: Some(reader),
        })
    }
}

impl EventSource for InotifySource {
    fn kind(&self) -> SourceKind {
        SourceKind::BlockingBatch
    }

    fn add_watch(&mut self, dir: &Path) -> Result<WatchId, SourceError> {
        let wd = self
            .watches
            .add(dir, watch_mask())
            .map_err(|e| SourceError::Watch {
                dir: dir.to_path_buf(),
                message: e.to_string(),
            })?;

        Ok(WatchId(wd.get_watch_descriptor_id()))
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.reader.take() {
            // The reader wakes on its next poll tick; in-flight buffers are
            // dropped with the queue, not drained.
            let _ = handle.join();
        }
        debug!("inotify event source shut down");
    }
}

impl Drop for InotifySource {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

/// The read-and-process loop of the reader thread.
fn read_loop(
    mut inotify: Inotify,
    events: mpsc::Sender<RawEvent>,
    settle: Duration,
    stop: Arc<AtomicBool>,
) {
    let mut buffer = [0u8; EVENT_BUFFER_LEN];

    while !stop.load(Ordering::Relaxed) {
        let batch = match inotify.read_events(&mut buffer) {
            Ok(batch) => batch,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                // No-op poll.
                thread::sleep(IDLE_POLL);
                continue;
            }
            Err(e) => {
                error!(error = %e, "unable to read from realtime queue");
                thread::sleep(IDLE_POLL);
                continue;
            }
        };

        for event in batch {
            let Some(name) = event.name else {
                trace!(wd = event.wd.get_watch_descriptor_id(), "skipping self event");
                continue;
            };
            if name.is_empty() {
                continue;
            }

            let raw = RawEvent {
                wd: WatchId(event.wd.get_watch_descriptor_id()),
                name: name.to_string_lossy().into_owned(),
            };

            // Settling delay: blocks only this reader thread.
            if !settle.is_zero() {
                thread::sleep(settle);
            }

            if events.blocking_send(raw).is_err() {
                debug!("event channel closed, reader exiting");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[tokio::test(flavor = "multi_thread")]
    async fn reports_file_creation_with_watch_id_and_name() {
        let dir = tempdir().expect("tempdir");
        let (tx, mut rx) = mpsc::channel(16);

        let mut source = InotifySource::new(tx, Duration::ZERO).expect("inotify init");
        let wd = source.add_watch(dir.path()).expect("add watch");

        fs::write(dir.path().join("new.txt"), b"payload").expect("write file");

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("channel open");

        assert_eq!(event.wd, wd);
        assert_eq!(event.name, "new.txt");

        source.shutdown();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn add_watch_fails_for_missing_directory() {
        let (tx, _rx) = mpsc::channel(16);
        let mut source = InotifySource::new(tx, Duration::ZERO).expect("inotify init");

        let err = source
            .add_watch(Path::new("/nonexistent/fimwatch/dir"))
            .unwrap_err();
        assert!(matches!(err, SourceError::Watch { .. }));

        source.shutdown();
    }
}
