//! No-op event source for platforms without realtime support.
//!
//! Downstream code must treat [`SourceError::Unavailable`] as "realtime
//! unavailable", never as a fatal condition: the periodic scanner keeps the
//! rest of the monitoring system working.

use std::path::Path;

use tracing::debug;

use super::{EventSource, SourceError, SourceKind};
use crate::registry::WatchId;

/// Event source that watches nothing and emits nothing.
#[derive(Debug, Default)]
pub struct UnsupportedSource;

impl EventSource for UnsupportedSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Unsupported
    }

    fn add_watch(&mut self, dir: &Path) -> Result<WatchId, SourceError> {
        debug!(dir = %dir.display(), "realtime unavailable, watch not created");
        Err(SourceError::Unavailable)
    }

    fn shutdown(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_watch_reports_unavailable() {
        let mut source = UnsupportedSource;
        assert_eq!(source.kind(), SourceKind::Unsupported);
        assert!(matches!(
            source.add_watch(Path::new("/etc")),
            Err(SourceError::Unavailable)
        ));
        source.shutdown();
    }
}
