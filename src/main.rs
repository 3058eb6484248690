//! fimwatch - realtime file-integrity monitoring agent.
//!
//! This binary seeds a checksum baseline for the configured directories,
//! watches them for changes and raises integrity alerts.
//!
//! # Commands
//!
//! - `fimwatch run`: Start the monitoring agent
//! - `fimwatch check <path>`: Print the checksum line for a single file
//!
//! # Environment Variables
//!
//! See the [`fimwatch::config`] module for available configuration options.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use fimwatch::alert::{Alert, AlertSink};
use fimwatch::checksum::{ChecksumReader, Sha256Checksum};
use fimwatch::config::Config;
use fimwatch::diff::ContentDiff;
use fimwatch::engine::RealtimeEngine;
use fimwatch::error::EngineError;
use fimwatch::normalize::resolve_path;
use fimwatch::reconcile::Reconciler;
use fimwatch::scan::Scanner;
use fimwatch::source::RawEvent;

/// fimwatch - realtime file-integrity monitoring agent.
///
/// Watches configured directories, reconciles changed files against a
/// checksum baseline and raises integrity alerts.
#[derive(Parser, Debug)]
#[command(name = "fimwatch")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "\
ENVIRONMENT VARIABLES:
    FIMWATCH_DIRS          Monitored roots, `path[:options[:restrict]]`, comma-separated (required for 'run')
    FIMWATCH_SOURCE_ID     Agent identifier (default: hostname)
    FIMWATCH_ALERT_URL     Alert collector endpoint (default: log only)
    FIMWATCH_REALTIME      Enable realtime monitoring (default: true)
    FIMWATCH_SETTLE_MS     Settling delay in milliseconds (default: 10)
    FIMWATCH_SKIP_NFS      Refuse network-backed directories (default: false)
    FIMWATCH_MAX_WATCHES   Watch ceiling for the callback strategy (default: 256)
    FIMWATCH_BUFFER_SIZE   Event channel capacity (default: 1000)

EXAMPLES:
    # Print the checksum line for a file
    fimwatch check /etc/passwd

    # Start the agent
    export FIMWATCH_DIRS=/etc:7,/srv/www:1:.conf
    fimwatch run
")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Start the monitoring agent.
    ///
    /// Seeds the baseline for every configured root, then watches for
    /// changes. Requires the FIMWATCH_DIRS environment variable.
    Run,

    /// Print the checksum line for a single file.
    Check {
        /// File to checksum.
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Check { path } => run_check(&path),
        Command::Run => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("Failed to create tokio runtime")?;

            runtime.block_on(run_agent())
        }
    }
}

/// Runs the check command: one checksum line to stdout.
fn run_check(path: &Path) -> Result<()> {
    match Sha256Checksum.read_checksum(path) {
        Some(line) => {
            println!("{line}");
            Ok(())
        }
        None => {
            eprintln!("Error: unable to read {}", path.display());
            std::process::exit(1);
        }
    }
}

/// Runs the monitoring agent.
async fn run_agent() -> Result<()> {
    init_logging();

    info!("Starting fimwatch");

    let config = Config::from_env().context("Failed to load configuration")?;

    info!(
        source_id = %config.source_id,
        dirs = config.dirs.len(),
        realtime = config.realtime,
        "Configuration loaded"
    );

    // Seed the baseline before watching, so the first realtime events
    // reconcile against known state instead of triggering rescans.
    let store = fimwatch::SharedBaselineStore::new();
    {
        let mut scanner = Scanner::new(store.clone(), Sha256Checksum);
        for dir in &config.dirs {
            scanner.seed_directory(dir);
        }
    }
    info!(paths = store.len(), "Baseline seeded");

    let (raw_tx, mut raw_rx) = mpsc::channel::<RawEvent>(config.buffer_size);
    let (alert_tx, mut alert_rx) = mpsc::channel::<String>(config.buffer_size);
    let (rescan_tx, mut rescan_rx) = mpsc::channel(config.buffer_size);

    // Bring up the event source and watch every configured root. Failures
    // degrade to scanner-only coverage for that root, never abort startup.
    let mut engine = RealtimeEngine::start(&config, raw_tx);
    for dir in &config.dirs {
        match engine.add_directory(&dir.path) {
            Ok(wd) => debug!(dir = %dir.path.display(), wd = %wd, "watching"),
            Err(EngineError::NfsExcluded(path)) => {
                warn!(dir = %path.display(), "network filesystem, scanner-only coverage");
            }
            Err(EngineError::WatchLimit { dir, limit }) => {
                warn!(dir = %dir.display(), limit, "watch ceiling, scanner-only coverage");
            }
            Err(e) => {
                warn!(dir = %dir.path.display(), error = %e, "watch failed, scanner-only coverage");
            }
        }
    }
    info!(watched = engine.watched_dirs(), "Realtime coverage established");

    let registry = engine.registry();

    // Alert delivery task.
    let sink = match &config.alert_url {
        Some(url) => AlertSink::http(url.clone()),
        None => AlertSink::log(),
    };
    let source_id = config.source_id.clone();
    let alert_task = tokio::spawn(async move {
        while let Some(message) = alert_rx.recv().await {
            sink.deliver(&Alert::new(source_id.clone(), message)).await;
        }
    });

    // Rescan task: seeds baseline entries for newly observed files.
    let mut rescan_scanner = Scanner::new(store.clone(), Sha256Checksum);
    let rescan_task = tokio::spawn(async move {
        while let Some(request) = rescan_rx.recv().await {
            rescan_scanner.handle(&request);
        }
    });

    let mut reconciler = Reconciler::new(
        store,
        Sha256Checksum,
        ContentDiff::new(),
        config.dirs.clone(),
        alert_tx,
        rescan_tx,
    );

    info!("Agent running. Press Ctrl+C to stop.");

    loop {
        tokio::select! {
            _ = wait_for_shutdown() => {
                info!("Shutdown signal received");
                break;
            }

            Some(event) = raw_rx.recv() => {
                let path = {
                    let registry = registry.read().expect("watch registry lock poisoned");
                    resolve_path(&registry, &event)
                };
                if let Some(path) = path {
                    reconciler.check(&path).await;
                }
            }
        }
    }

    info!("Shutting down...");
    engine.shutdown();
    alert_task.abort();
    rescan_task.abort();

    info!("Agent stopped");
    Ok(())
}

/// Initializes the logging subsystem.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .init();
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_shutdown() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
