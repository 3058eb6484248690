//! Checksum reconciler: the change-detection decision core.
//!
//! For every normalized path the reconciler compares the current checksum
//! against the baseline and lands in one of four outcomes:
//!
//! 1. **No baseline** — the file is new to us. The ancestor resolver finds
//!    the enclosing monitored root and one rescan request is issued so the
//!    external scanner seeds a baseline entry. No alert.
//! 2. **Read failed** — the checksum primitive could not read the file (and
//!    has already reported that). The baseline keeps its attribute block and
//!    gets the deletion sentinel as its checksum. No alert from here.
//! 3. **Unchanged** — exact checksum match. Nothing is mutated, nothing is
//!    alerted; a repeated unchanged observation never re-alerts.
//! 4. **Changed** — the baseline checksum is replaced (attributes verbatim)
//!    and an alert `<checksum-diff-token> <path>` goes out, with a content
//!    diff snippet appended when the record asks for one. Delivery is
//!    fire-and-forget.

use std::path::Path;

use tokio::sync::mpsc;
use tracing::{debug, error, trace, warn};

use crate::alert::truncate_to_boundary;
use crate::ancestor::{rescan_request, MonitoredDir, RescanRequest};
use crate::baseline::BaselineStore;
use crate::checksum::ChecksumReader;
use crate::diff::DiffProvider;

/// Hard cap on an alert without a diff snippet.
pub const PLAIN_ALERT_MAX: usize = 912;

/// Hard cap on an alert carrying a diff snippet.
pub const DIFF_ALERT_MAX: usize = 6144;

/// How a single reconciliation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// No baseline record existed; ancestor resolution ran.
    NoBaseline,

    /// The checksum could not be computed; deletion sentinel written.
    ReadFailed,

    /// Checksums match exactly; nothing happened.
    Unchanged,

    /// Checksums differ; baseline updated and an alert emitted.
    Changed,
}

/// The decision core.
///
/// Runs on the single event-processing task; the store, checksum and diff
/// primitives are seams so tests can observe every outcome without a real
/// filesystem.
pub struct Reconciler<S, C, D> {
    store: S,
    checksums: C,
    diffs: D,
    roots: Vec<MonitoredDir>,
    alerts: mpsc::Sender<String>,
    rescans: mpsc::Sender<RescanRequest>,
}

impl<S, C, D> Reconciler<S, C, D>
where
    S: BaselineStore,
    C: ChecksumReader,
    D: DiffProvider,
{
    /// Creates a reconciler over the given collaborators.
    pub fn new(
        store: S,
        checksums: C,
        diffs: D,
        roots: Vec<MonitoredDir>,
        alerts: mpsc::Sender<String>,
        rescans: mpsc::Sender<RescanRequest>,
    ) -> Self {
        Self {
            store,
            checksums,
            diffs,
            roots,
            alerts,
            rescans,
        }
    }

    /// Reconciles one path against the baseline.
    pub async fn check(&mut self, path: &Path) -> Outcome {
        let Some(record) = self.store.get(path) else {
            return self.handle_new_file(path).await;
        };

        let Some(line) = self.checksums.read_checksum(path) else {
            // The read primitive has already reported the failure.
            if !self.store.update(path, record.deleted()) {
                error!(path = %path.display(), "unable to update baseline");
            }
            debug!(path = %path.display(), "baseline marked deleted");
            return Outcome::ReadFailed;
        };

        if line == record.checksum {
            trace!(path = %path.display(), "checksum already reported, discarding");
            return Outcome::Unchanged;
        }

        let token = line.split_whitespace().next().unwrap_or_default().to_string();
        if !self.store.update(path, record.with_checksum(&token)) {
            error!(path = %path.display(), "unable to update baseline");
        }

        let mut alert = truncate_to_boundary(
            format!("{token} {}", path.display()),
            PLAIN_ALERT_MAX,
        );

        if record.diff_tracking {
            if let Some(snippet) = self.diffs.snippet(path) {
                alert = truncate_to_boundary(
                    format!("{token} {}\n{snippet}", path.display()),
                    DIFF_ALERT_MAX,
                );
            }
        }

        debug!(path = %path.display(), "change detected");
        if self.alerts.send(alert).await.is_err() {
            warn!("alert channel closed, alert dropped");
        }

        Outcome::Changed
    }

    /// New file: find the enclosing monitored root and request one rescan.
    async fn handle_new_file(&mut self, path: &Path) -> Outcome {
        match rescan_request(path, &self.roots) {
            Some(request) => {
                debug!(
                    path = %path.display(),
                    root_options = request.options,
                    "new file inside monitored root, requesting rescan"
                );
                if self.rescans.send(request).await.is_err() {
                    warn!("rescan channel closed, request dropped");
                }
            }
            None => {
                debug!(
                    path = %path.display(),
                    "new file outside monitored roots, dropping"
                );
            }
        }

        Outcome::NoBaseline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::{BaselineRecord, BaselineStore, SharedBaselineStore, DELETED_CHECKSUM};
    use std::collections::HashMap;
    use std::path::PathBuf;

    struct FakeChecksum(HashMap<PathBuf, Option<String>>);

    impl ChecksumReader for FakeChecksum {
        fn read_checksum(&mut self, path: &Path) -> Option<String> {
            self.0.get(path).cloned().flatten()
        }
    }

    struct FakeDiff(Option<String>);

    impl DiffProvider for FakeDiff {
        fn snippet(&mut self, _path: &Path) -> Option<String> {
            self.0.clone()
        }
    }

    struct Harness {
        reconciler: Reconciler<SharedBaselineStore, FakeChecksum, FakeDiff>,
        store: SharedBaselineStore,
        alerts: mpsc::Receiver<String>,
        rescans: mpsc::Receiver<RescanRequest>,
    }

    fn harness(
        records: &[(&str, &str)],
        checksums: &[(&str, Option<&str>)],
        diff: Option<&str>,
        roots: Vec<MonitoredDir>,
    ) -> Harness {
        let mut store = SharedBaselineStore::new();
        for (path, raw) in records {
            store.insert(Path::new(path), BaselineRecord::decode(raw).unwrap());
        }

        let checksums = FakeChecksum(
            checksums
                .iter()
                .map(|(p, line)| (PathBuf::from(p), line.map(str::to_string)))
                .collect(),
        );

        let (alert_tx, alerts) = mpsc::channel(8);
        let (rescan_tx, rescans) = mpsc::channel(8);

        Harness {
            reconciler: Reconciler::new(
                store.clone(),
                checksums,
                FakeDiff(diff.map(str::to_string)),
                roots,
                alert_tx,
                rescan_tx,
            ),
            store,
            alerts,
            rescans,
        }
    }

    #[tokio::test]
    async fn unchanged_checksum_mutates_nothing() {
        let raw = "ATTR0000000123 d41d8cd98f00b204e9800998ecf8427e";
        let mut h = harness(
            &[("/etc/passwd", raw)],
            &[("/etc/passwd", Some("d41d8cd98f00b204e9800998ecf8427e"))],
            None,
            vec![],
        );

        let outcome = h.reconciler.check(Path::new("/etc/passwd")).await;

        assert_eq!(outcome, Outcome::Unchanged);
        assert!(h.alerts.try_recv().is_err());
        assert_eq!(h.store.get(Path::new("/etc/passwd")).unwrap().encode(), raw);
    }

    #[tokio::test]
    async fn changed_checksum_alerts_and_replaces_checksum_field() {
        let mut h = harness(
            &[("/etc/passwd", "ATTR0000000123 d41d8cd98f00b204e9800998ecf8427e")],
            &[("/etc/passwd", Some("5eb63bbbe01eeed093cb22bb8f5acdc3"))],
            None,
            vec![],
        );

        let outcome = h.reconciler.check(Path::new("/etc/passwd")).await;

        assert_eq!(outcome, Outcome::Changed);
        assert_eq!(
            h.alerts.try_recv().unwrap(),
            "5eb63bbbe01eeed093cb22bb8f5acdc3 /etc/passwd"
        );
        assert!(h.alerts.try_recv().is_err(), "exactly one alert");
        assert_eq!(
            h.store.get(Path::new("/etc/passwd")).unwrap().encode(),
            "ATTR0000000123 5eb63bbbe01eeed093cb22bb8f5acdc3"
        );
    }

    #[tokio::test]
    async fn read_failure_writes_deletion_sentinel_without_alerting() {
        let mut h = harness(
            &[("/etc/shadow", "ATTR0000000123 d41d8cd98f00b204e9800998ecf8427e")],
            &[("/etc/shadow", None)],
            None,
            vec![],
        );

        let outcome = h.reconciler.check(Path::new("/etc/shadow")).await;

        assert_eq!(outcome, Outcome::ReadFailed);
        assert!(h.alerts.try_recv().is_err());

        let record = h.store.get(Path::new("/etc/shadow")).unwrap();
        assert_eq!(record.checksum, DELETED_CHECKSUM);
        assert_eq!(record.attributes, "ATTR0000000123 ");
    }

    #[tokio::test]
    async fn new_file_inside_root_requests_exactly_one_rescan() {
        let mut h = harness(
            &[],
            &[],
            None,
            vec![MonitoredDir {
                path: PathBuf::from("/watched"),
                options: 3,
                restrict: None,
            }],
        );

        let outcome = h.reconciler.check(Path::new("/watched/new.txt")).await;

        assert_eq!(outcome, Outcome::NoBaseline);
        assert!(h.alerts.try_recv().is_err());

        let request = h.rescans.try_recv().unwrap();
        assert_eq!(request.path, Path::new("/watched/new.txt"));
        assert_eq!(request.options, 3);
        assert!(h.rescans.try_recv().is_err(), "exactly one rescan request");
    }

    #[tokio::test]
    async fn new_file_outside_roots_is_dropped_silently() {
        let mut h = harness(&[], &[], None, vec![MonitoredDir::new("/watched")]);

        let outcome = h.reconciler.check(Path::new("/tmp/unrelated/x")).await;

        assert_eq!(outcome, Outcome::NoBaseline);
        assert!(h.alerts.try_recv().is_err());
        assert!(h.rescans.try_recv().is_err());
    }

    #[tokio::test]
    async fn diff_tracking_appends_snippet_on_following_line() {
        let mut h = harness(
            &[("/etc/app.conf", "ATTR00s0000123 oldsum")],
            &[("/etc/app.conf", Some("newsum"))],
            Some("@@ -1 +1 @@\n-a=1\n+a=2"),
            vec![],
        );

        let outcome = h.reconciler.check(Path::new("/etc/app.conf")).await;

        assert_eq!(outcome, Outcome::Changed);
        assert_eq!(
            h.alerts.try_recv().unwrap(),
            "newsum /etc/app.conf\n@@ -1 +1 @@\n-a=1\n+a=2"
        );
    }

    #[tokio::test]
    async fn diff_tracking_without_snippet_falls_back_to_plain_alert() {
        let mut h = harness(
            &[("/etc/app.conf", "ATTR00n0000123 oldsum")],
            &[("/etc/app.conf", Some("newsum"))],
            None,
            vec![],
        );

        h.reconciler.check(Path::new("/etc/app.conf")).await;
        assert_eq!(h.alerts.try_recv().unwrap(), "newsum /etc/app.conf");
    }

    #[tokio::test]
    async fn repeated_unchanged_observations_never_realert() {
        let mut h = harness(
            &[("/etc/passwd", "ATTR0000000123 samesum")],
            &[("/etc/passwd", Some("samesum"))],
            None,
            vec![],
        );

        for _ in 0..3 {
            assert_eq!(
                h.reconciler.check(Path::new("/etc/passwd")).await,
                Outcome::Unchanged
            );
        }
        assert!(h.alerts.try_recv().is_err());
    }

    #[tokio::test]
    async fn change_after_update_is_idempotent_until_next_change() {
        let mut h = harness(
            &[("/etc/passwd", "ATTR0000000123 oldsum")],
            &[("/etc/passwd", Some("newsum"))],
            None,
            vec![],
        );

        assert_eq!(
            h.reconciler.check(Path::new("/etc/passwd")).await,
            Outcome::Changed
        );
        // Same checksum again: the updated baseline absorbs it.
        assert_eq!(
            h.reconciler.check(Path::new("/etc/passwd")).await,
            Outcome::Unchanged
        );
        assert!(h.alerts.try_recv().is_ok());
        assert!(h.alerts.try_recv().is_err());
    }

    #[tokio::test]
    async fn oversized_diff_alert_is_capped() {
        let huge = "x".repeat(3 * DIFF_ALERT_MAX);
        let mut h = harness(
            &[("/etc/app.conf", "ATTR00s0000123 oldsum")],
            &[("/etc/app.conf", Some("newsum"))],
            Some(&huge),
            vec![],
        );

        h.reconciler.check(Path::new("/etc/app.conf")).await;
        let alert = h.alerts.try_recv().unwrap();
        assert!(alert.len() <= DIFF_ALERT_MAX);
        assert!(alert.starts_with("newsum /etc/app.conf\n"));
    }
}
