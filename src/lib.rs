//! fimwatch - realtime file-integrity monitoring agent.
//!
//! This crate watches configured directories for filesystem changes,
//! reconciles each changed file against a checksum baseline and raises
//! integrity alerts when content changes.
//!
//! # Overview
//!
//! A platform event source reports raw change notifications keyed by native
//! watch identifiers. Events are normalized to full paths through the watch
//! registry, then checked against the baseline: unchanged files are dropped,
//! changed files update the baseline and raise one alert, unreadable files
//! are marked deleted, and files with no baseline yet trigger a rescan
//! request resolved through their enclosing monitored root.
//!
//! Realtime coverage is strictly best-effort: any directory the source cannot
//! watch stays covered by the periodic scanner, and no watch failure is fatal.
//!
//! # Modules
//!
//! - [`source`]: Platform event-source strategies
//! - [`registry`]: Watch identifier to directory mapping
//! - [`normalize`]: Raw event to full-path normalization
//! - [`baseline`]: Baseline records and the shared store
//! - [`reconcile`]: The change-detection decision core
//! - [`scan`]: Baseline seeding and rescan handling
//! - [`ancestor`]: Monitored-root resolution for new files
//! - [`checksum`]: Content fingerprint primitive
//! - [`diff`]: Content-diff snippets for alerts
//! - [`alert`]: Alert envelope and delivery sinks
//! - [`nfs`]: Network-filesystem exclusion
//! - [`engine`]: Watch lifecycle over the event source
//! - [`config`]: Configuration from environment variables
//! - [`error`]: Error types

pub mod alert;
pub mod ancestor;
pub mod baseline;
pub mod checksum;
pub mod config;
pub mod diff;
pub mod engine;
pub mod error;
pub mod nfs;
pub mod normalize;
pub mod reconcile;
pub mod registry;
pub mod scan;
pub mod source;

pub use alert::{Alert, AlertSink};
pub use ancestor::{find_monitored_root, rescan_request, MonitoredDir, RescanRequest};
pub use baseline::{BaselineError, BaselineRecord, BaselineStore, SharedBaselineStore};
pub use checksum::{ChecksumReader, Sha256Checksum};
pub use config::{Config, ConfigError};
pub use diff::{ContentDiff, DiffProvider};
pub use engine::RealtimeEngine;
pub use error::{EngineError, Result};
pub use nfs::{MountPredicate, ProcMounts};
pub use normalize::resolve_path;
pub use reconcile::{Outcome, Reconciler};
pub use registry::{WatchId, WatchRegistry};
pub use scan::{Scanner, OPT_REPORT_CHANGES};
pub use source::{create_source, EventSource, RawEvent, SourceError, SourceKind};
