//! Realtime engine: watch lifecycle over the platform event source.
//!
//! The engine owns the selected event-source strategy and the watch registry.
//! Directory adds run through a fixed gauntlet: registry idempotence first,
//! then the network-filesystem check, then the watch ceiling, and only then
//! the native add. A directory that fails any step is left without realtime
//! coverage; the periodic scanner remains its fallback, so nothing here is
//! fatal to the agent.

use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{EngineError, Result};
use crate::nfs::{MountPredicate, ProcMounts};
use crate::registry::{WatchId, WatchRegistry};
use crate::source::{create_source, EventSource, RawEvent, SourceKind};

/// The realtime monitoring engine.
pub struct RealtimeEngine {
    source: Box<dyn EventSource>,
    registry: Arc<RwLock<WatchRegistry>>,
    max_watches: usize,
    skip_nfs: bool,
    mounts: Box<dyn MountPredicate>,
}

impl RealtimeEngine {
    /// Creates an engine over an explicit source and mount predicate.
    pub fn new(
        source: Box<dyn EventSource>,
        max_watches: usize,
        skip_nfs: bool,
        mounts: Box<dyn MountPredicate>,
    ) -> Self {
        Self {
            source,
            registry: Arc::new(RwLock::new(WatchRegistry::new())),
            max_watches,
            skip_nfs,
            mounts,
        }
    }

    /// Creates an engine from configuration, selecting the platform source.
    ///
    /// Raw events are delivered into `events`; the caller drains them on its
    /// processing task.
    #[must_use]
    pub fn start(config: &Config, events: mpsc::Sender<RawEvent>) -> Self {
        let source = create_source(
            events,
            Duration::from_millis(config.settle_ms),
            config.realtime,
        );
        info!(kind = ?source.kind(), "realtime engine started");

        Self::new(
            source,
            config.max_watches,
            config.skip_nfs,
            Box::new(ProcMounts::load()),
        )
    }

    /// Shared handle to the watch registry, for event normalization.
    #[must_use]
    pub fn registry(&self) -> Arc<RwLock<WatchRegistry>> {
        Arc::clone(&self.registry)
    }

    /// Starts watching `dir`, registering its native identifier.
    ///
    /// Adding an already-watched directory returns the existing identifier
    /// without touching the native facility.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::NfsExcluded`] when NFS exclusion rejects the
    /// directory, [`EngineError::WatchLimit`] when the callback strategy is at
    /// its ceiling, or the underlying [`crate::source::SourceError`] when the
    /// native add fails.
    pub fn add_directory(&mut self, dir: &Path) -> Result<WatchId> {
        {
            let registry = self.registry.read().expect("watch registry lock poisoned");
            if let Some(existing) = registry.id_for(dir) {
                debug!(dir = %dir.display(), wd = %existing, "directory already watched");
                return Ok(existing);
            }
        }

        if self.skip_nfs && self.mounts.is_network_fs(dir) {
            warn!(dir = %dir.display(), "network filesystem, realtime monitoring skipped");
            return Err(EngineError::NfsExcluded(dir.to_path_buf()));
        }

        // The blocking-batch strategy watches the whole queue with one
        // descriptor; only per-directory reads count against the ceiling.
        if self.source.kind() == SourceKind::Callback {
            let watched = self
                .registry
                .read()
                .expect("watch registry lock poisoned")
                .len();
            if watched >= self.max_watches {
                warn!(
                    dir = %dir.display(),
                    limit = self.max_watches,
                    "watch ceiling reached, realtime monitoring skipped"
                );
                return Err(EngineError::WatchLimit {
                    dir: dir.to_path_buf(),
                    limit: self.max_watches,
                });
            }
        }

        let id = self.source.add_watch(dir)?;
        let registered = self
            .registry
            .write()
            .expect("watch registry lock poisoned")
            .add(id, dir);
        info!(dir = %dir.display(), wd = %registered, "directory watched");
        Ok(registered)
    }

    /// Number of directories with realtime coverage.
    #[must_use]
    pub fn watched_dirs(&self) -> usize {
        self.registry
            .read()
            .expect("watch registry lock poisoned")
            .len()
    }

    /// Stops the event source. Pending reads are discarded, not drained.
    pub fn shutdown(&mut self) {
        self.source.shutdown();
        info!("realtime engine stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceError;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicI32, Ordering};

    struct RecordingSource {
        kind: SourceKind,
        next_id: AtomicI32,
        adds: Vec<PathBuf>,
        fail: bool,
    }

    impl RecordingSource {
        fn new(kind: SourceKind) -> Self {
            Self {
                kind,
                next_id: AtomicI32::new(1),
                adds: Vec::new(),
                fail: false,
            }
        }
    }

    impl EventSource for RecordingSource {
        fn kind(&self) -> SourceKind {
            self.kind
        }

        fn add_watch(&mut self, dir: &Path) -> std::result::Result<WatchId, SourceError> {
            if self.fail {
                return Err(SourceError::Unavailable);
            }
            self.adds.push(dir.to_path_buf());
            Ok(WatchId(self.next_id.fetch_add(1, Ordering::SeqCst)))
        }

        fn shutdown(&mut self) {}
    }

    struct NeverNetwork;

    impl MountPredicate for NeverNetwork {
        fn is_network_fs(&self, _path: &Path) -> bool {
            false
        }
    }

    struct AlwaysNetwork;

    impl MountPredicate for AlwaysNetwork {
        fn is_network_fs(&self, _path: &Path) -> bool {
            true
        }
    }

    fn engine(kind: SourceKind, max_watches: usize, skip_nfs: bool) -> RealtimeEngine {
        let mounts: Box<dyn MountPredicate> = if skip_nfs {
            Box::new(AlwaysNetwork)
        } else {
            Box::new(NeverNetwork)
        };
        RealtimeEngine::new(
            Box::new(RecordingSource::new(kind)),
            max_watches,
            skip_nfs,
            mounts,
        )
    }

    #[test]
    fn repeated_add_returns_existing_id_without_native_add() {
        let mut engine = engine(SourceKind::BlockingBatch, 16, false);

        let first = engine.add_directory(Path::new("/etc")).unwrap();
        let second = engine.add_directory(Path::new("/etc")).unwrap();

        assert_eq!(first, second);
        assert_eq!(engine.watched_dirs(), 1);
    }

    #[test]
    fn distinct_directories_get_distinct_ids() {
        let mut engine = engine(SourceKind::BlockingBatch, 16, false);

        let a = engine.add_directory(Path::new("/etc")).unwrap();
        let b = engine.add_directory(Path::new("/usr/bin")).unwrap();

        assert_ne!(a, b);
        assert_eq!(engine.watched_dirs(), 2);
    }

    #[test]
    fn nfs_exclusion_rejects_before_the_native_add() {
        let mut engine = engine(SourceKind::BlockingBatch, 16, true);

        let err = engine.add_directory(Path::new("/home/user")).unwrap_err();
        assert!(matches!(err, EngineError::NfsExcluded(_)));
        assert_eq!(engine.watched_dirs(), 0);
    }

    #[test]
    fn callback_strategy_enforces_the_watch_ceiling() {
        let mut engine = engine(SourceKind::Callback, 2, false);

        engine.add_directory(Path::new("/a")).unwrap();
        engine.add_directory(Path::new("/b")).unwrap();

        let err = engine.add_directory(Path::new("/c")).unwrap_err();
        assert!(matches!(err, EngineError::WatchLimit { limit: 2, .. }));
        assert_eq!(engine.watched_dirs(), 2);
    }

    #[test]
    fn blocking_batch_strategy_ignores_the_watch_ceiling() {
        let mut engine = engine(SourceKind::BlockingBatch, 1, false);

        engine.add_directory(Path::new("/a")).unwrap();
        engine.add_directory(Path::new("/b")).unwrap();
        assert_eq!(engine.watched_dirs(), 2);
    }

    #[test]
    fn failed_native_add_leaves_the_registry_unchanged() {
        let mut engine = RealtimeEngine::new(
            Box::new(RecordingSource {
                kind: SourceKind::BlockingBatch,
                next_id: AtomicI32::new(1),
                adds: Vec::new(),
                fail: true,
            }),
            16,
            false,
            Box::new(NeverNetwork),
        );

        let err = engine.add_directory(Path::new("/etc")).unwrap_err();
        assert!(matches!(err, EngineError::Source(_)));
        assert_eq!(engine.watched_dirs(), 0);

        // No retry happens implicitly; a later explicit add may succeed.
        engine.source = Box::new(RecordingSource::new(SourceKind::BlockingBatch));
        engine.add_directory(Path::new("/etc")).unwrap();
        assert_eq!(engine.watched_dirs(), 1);
    }
}
