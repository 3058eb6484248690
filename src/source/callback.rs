//! Asynchronous-callback event source.
//!
//! Each watched directory is a small state machine: armed (one read
//! outstanding) → draining (completion batch being forwarded) → armed again.
//! The original design relied on a bare completion callback remembering to
//! re-issue the read before returning; forgetting silently stopped monitoring
//! for that directory. Here the machine is a [`DirectoryPump`] task whose
//! loop structure makes the re-arm unconditional: issue, await completion,
//! drain, re-issue. A failed re-issue is logged and the directory goes dark
//! until an explicit re-add, never retried automatically.
//!
//! The OS-facing side sits behind the [`DirectoryRead`] seam. The production
//! reader is backed by a per-directory non-recursive `notify` watcher whose
//! callback stays lightweight: it only forwards reported names through a
//! channel, exactly one batch per completion.
//!
//! Names reported on this strategy may use backslash separators; the pump
//! normalizes them to forward slashes before forwarding.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, trace, warn};

use super::{EventSource, RawEvent, SourceError, SourceKind};
use crate::normalize::normalize_separators;
use crate::registry::WatchId;

/// One completion of an outstanding directory read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadCompletion {
    /// File names reported by this completion, relative to the directory.
    pub records: Vec<String>,
}

/// The OS-facing half of the per-directory state machine.
///
/// Exactly one read may be outstanding at a time: callers must pair every
/// [`DirectoryRead::complete`] with a preceding [`DirectoryRead::issue`].
pub trait DirectoryRead: Send + 'static {
    /// Issues the next asynchronous read for the directory.
    ///
    /// # Errors
    ///
    /// Returns a [`SourceError`] if the read cannot be armed; the caller
    /// abandons the directory.
    fn issue(&mut self) -> Result<(), SourceError>;

    /// Waits for the outstanding read to complete. Returns `None` when the
    /// underlying watch has been released.
    fn complete(&mut self) -> impl Future<Output = Option<ReadCompletion>> + Send;
}

/// Per-directory pump enforcing the armed → draining → armed cycle.
#[derive(Debug)]
pub struct DirectoryPump<R> {
    wd: WatchId,
    dir: PathBuf,
    reader: R,
    events: mpsc::Sender<RawEvent>,
}

impl<R: DirectoryRead> DirectoryPump<R> {
    /// Creates a pump forwarding into the engine's event channel.
    #[must_use]
    pub fn new(wd: WatchId, dir: PathBuf, reader: R, events: mpsc::Sender<RawEvent>) -> Self {
        Self {
            wd,
            dir,
            reader,
            events,
        }
    }

    /// Runs the state machine until the watch is released or the engine
    /// channel closes.
    pub async fn run(mut self) {
        if let Err(e) = self.reader.issue() {
            error!(dir = %self.dir.display(), error = %e, "unable to arm directory read");
            return;
        }

        loop {
            let Some(completion) = self.reader.complete().await else {
                debug!(dir = %self.dir.display(), "directory watch released");
                break;
            };

            for name in completion.records {
                if name.is_empty() {
                    continue;
                }
                let raw = RawEvent {
                    wd: self.wd,
                    name: normalize_separators(&name),
                };
                if self.events.send(raw).await.is_err() {
                    debug!(dir = %self.dir.display(), "event channel closed, pump exiting");
                    return;
                }
            }

            // The next read goes out before this completion is considered
            // handled; a directory with a drained batch is never left unarmed.
            if let Err(e) = self.reader.issue() {
                error!(
                    dir = %self.dir.display(),
                    error = %e,
                    "unable to re-arm directory read, realtime coverage lost"
                );
                break;
            }
        }
    }
}

/// Production [`DirectoryRead`] backed by a per-directory `notify` watcher.
pub struct NotifyReader {
    // Kept alive for the watch subscription; dropping it releases the watch.
    _watcher: RecommendedWatcher,
    completions: mpsc::UnboundedReceiver<String>,
    dir: PathBuf,
    armed: bool,
}

impl NotifyReader {
    /// Starts a non-recursive watch on `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Watch`] if the watcher cannot be created or the
    /// directory cannot be watched.
    pub fn new(dir: &Path) -> Result<Self, SourceError> {
        let (tx, completions) = mpsc::unbounded_channel();
        let callback_dir = dir.to_path_buf();

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| {
                forward_notify_event(res, &tx, &callback_dir);
            },
            notify::Config::default(),
        )
        .map_err(|e| SourceError::Watch {
            dir: dir.to_path_buf(),
            message: e.to_string(),
        })?;

        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|e| SourceError::Watch {
                dir: dir.to_path_buf(),
                message: e.to_string(),
            })?;

        Ok(Self {
            _watcher: watcher,
            completions,
            dir: dir.to_path_buf(),
            armed: false,
        })
    }
}

impl DirectoryRead for NotifyReader {
    fn issue(&mut self) -> Result<(), SourceError> {
        self.armed = true;
        Ok(())
    }

    fn complete(&mut self) -> impl Future<Output = Option<ReadCompletion>> + Send {
        async move {
            if !self.armed {
                warn!(dir = %self.dir.display(), "completion awaited without an armed read");
            }

            let first = self.completions.recv().await?;
            let mut records = vec![first];
            while let Ok(more) = self.completions.try_recv() {
                records.push(more);
            }

            self.armed = false;
            Some(ReadCompletion { records })
        }
    }
}

/// Notify callback: forwards reported names, nothing else.
fn forward_notify_event(
    res: Result<Event, notify::Error>,
    tx: &mpsc::UnboundedSender<String>,
    dir: &Path,
) {
    let event = match res {
        Ok(event) => event,
        Err(e) => {
            error!(dir = %dir.display(), error = %e, "directory watch error");
            return;
        }
    };

    trace!(dir = %dir.display(), kind = ?event.kind, paths = ?event.paths, "notify record");

    for path in &event.paths {
        let Ok(relative) = path.strip_prefix(dir) else {
            continue;
        };
        let name = relative.to_string_lossy();
        if name.is_empty() {
            continue;
        }
        let _ = tx.send(name.into_owned());
    }
}

/// Asynchronous-callback event source: one pump task per watched directory.
pub struct CallbackSource {
    events: mpsc::Sender<RawEvent>,
    next_id: i32,
    pumps: HashMap<WatchId, tokio::task::JoinHandle<()>>,
}

impl CallbackSource {
    /// Creates an empty source forwarding into `events`.
    #[must_use]
    pub fn new(events: mpsc::Sender<RawEvent>) -> Self {
        Self {
            events,
            next_id: 0,
            pumps: HashMap::new(),
        }
    }
}

impl EventSource for CallbackSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Callback
    }

    fn add_watch(&mut self, dir: &Path) -> Result<WatchId, SourceError> {
        let reader = NotifyReader::new(dir)?;

        self.next_id += 1;
        let wd = WatchId(self.next_id);

        let pump = DirectoryPump::new(wd, dir.to_path_buf(), reader, self.events.clone());
        self.pumps.insert(wd, tokio::spawn(pump.run()));

        debug!(dir = %dir.display(), wd = %wd, "directory pump started");
        Ok(wd)
    }

    fn shutdown(&mut self) {
        // Pending reads are cancelled, not drained.
        for (_, pump) in self.pumps.drain() {
            pump.abort();
        }
        debug!("callback event source shut down");
    }
}
