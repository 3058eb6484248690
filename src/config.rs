//! Configuration for the fimwatch agent.
//!
//! All configuration comes from environment variables.
//!
//! # Environment Variables
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `FIMWATCH_DIRS` | Yes | - | Comma-separated `path[:options[:restrict]]` roots |
//! | `FIMWATCH_SOURCE_ID` | No | hostname | Agent identifier carried on alerts |
//! | `FIMWATCH_ALERT_URL` | No | - | Alert collector endpoint (enables HTTP delivery) |
//! | `FIMWATCH_REALTIME` | No | `true` | Set to `false` to disable realtime monitoring |
//! | `FIMWATCH_SETTLE_MS` | No | 10 | Settling delay before checksumming, milliseconds |
//! | `FIMWATCH_SKIP_NFS` | No | `false` | Refuse to watch network-backed directories |
//! | `FIMWATCH_MAX_WATCHES` | No | 256 | Watch ceiling for the callback strategy |
//! | `FIMWATCH_BUFFER_SIZE` | No | 1000 | Event channel capacity |
//!
//! # Example
//!
//! ```no_run
//! use fimwatch::config::Config;
//!
//! let config = Config::from_env().expect("Failed to load configuration");
//! println!("Monitoring {} roots", config.dirs.len());
//! ```

use std::env;
use std::path::PathBuf;

use thiserror::Error;

use crate::ancestor::MonitoredDir;

/// Default event channel capacity.
const DEFAULT_BUFFER_SIZE: usize = 1000;

/// Default settling delay in milliseconds.
const DEFAULT_SETTLE_MS: u64 = 10;

/// Default watch ceiling for the callback strategy.
const DEFAULT_MAX_WATCHES: usize = 256;

/// Errors that can occur during configuration parsing.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// Environment variable has an invalid value.
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Configuration for the fimwatch agent.
#[derive(Debug, Clone)]
pub struct Config {
    /// Monitored roots with their scan options and restriction patterns.
    pub dirs: Vec<MonitoredDir>,

    /// Agent identifier carried on alerts.
    pub source_id: String,

    /// Optional alert collector endpoint. If `None`, alerts go to the log
    /// only.
    pub alert_url: Option<String>,

    /// Whether realtime monitoring is enabled at all.
    pub realtime: bool,

    /// Settling delay applied before checksumming a just-changed file.
    pub settle_ms: u64,

    /// Refuse to watch directories on network filesystems.
    pub skip_nfs: bool,

    /// Watch ceiling enforced on the callback strategy.
    pub max_watches: usize,

    /// Capacity of the raw event channel.
    pub buffer_size: usize,
}

impl Config {
    /// Creates a new `Config` by parsing environment variables.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if:
    /// - `FIMWATCH_DIRS` is not set or contains no roots
    /// - a numeric variable cannot be parsed, or `FIMWATCH_BUFFER_SIZE` is 0
    /// - `FIMWATCH_MAX_WATCHES` is 0
    pub fn from_env() -> Result<Self, ConfigError> {
        // Required: FIMWATCH_DIRS
        let raw_dirs = env::var("FIMWATCH_DIRS")
            .map_err(|_| ConfigError::MissingEnvVar("FIMWATCH_DIRS".to_string()))?;
        let dirs = parse_dirs(&raw_dirs)?;
        if dirs.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "FIMWATCH_DIRS".to_string(),
                message: "at least one monitored root is required".to_string(),
            });
        }

        // Optional: FIMWATCH_SOURCE_ID (default: hostname)
        let source_id = env::var("FIMWATCH_SOURCE_ID").unwrap_or_else(|_| get_hostname());

        // Optional: FIMWATCH_ALERT_URL (default: log-only delivery)
        let alert_url = env::var("FIMWATCH_ALERT_URL").ok().filter(|s| !s.is_empty());

        // Optional: FIMWATCH_REALTIME (default: true)
        let realtime = match env::var("FIMWATCH_REALTIME") {
            Ok(val) => parse_bool("FIMWATCH_REALTIME", &val)?,
            Err(_) => true,
        };

        // Optional: FIMWATCH_SETTLE_MS (default: 10)
        let settle_ms = match env::var("FIMWATCH_SETTLE_MS") {
            Ok(val) => val.parse::<u64>().map_err(|_| ConfigError::InvalidValue {
                key: "FIMWATCH_SETTLE_MS".to_string(),
                message: format!("expected non-negative integer, got '{val}'"),
            })?,
            Err(_) => DEFAULT_SETTLE_MS,
        };

        // Optional: FIMWATCH_SKIP_NFS (default: false)
        let skip_nfs = match env::var("FIMWATCH_SKIP_NFS") {
            Ok(val) => parse_bool("FIMWATCH_SKIP_NFS", &val)?,
            Err(_) => false,
        };

        // Optional: FIMWATCH_MAX_WATCHES (default: 256, must be > 0)
        let max_watches = match env::var("FIMWATCH_MAX_WATCHES") {
            Ok(val) => {
                let limit = val
                    .parse::<usize>()
                    .map_err(|_| ConfigError::InvalidValue {
                        key: "FIMWATCH_MAX_WATCHES".to_string(),
                        message: format!("expected positive integer, got '{val}'"),
                    })?;
                if limit == 0 {
                    return Err(ConfigError::InvalidValue {
                        key: "FIMWATCH_MAX_WATCHES".to_string(),
                        message: "watch ceiling must be greater than 0".to_string(),
                    });
                }
                limit
            }
            Err(_) => DEFAULT_MAX_WATCHES,
        };

        // Optional: FIMWATCH_BUFFER_SIZE (default: 1000, must be > 0)
        let buffer_size = match env::var("FIMWATCH_BUFFER_SIZE") {
            Ok(val) => {
                let size = val
                    .parse::<usize>()
                    .map_err(|_| ConfigError::InvalidValue {
                        key: "FIMWATCH_BUFFER_SIZE".to_string(),
                        message: format!("expected positive integer, got '{val}'"),
                    })?;
                if size == 0 {
                    return Err(ConfigError::InvalidValue {
                        key: "FIMWATCH_BUFFER_SIZE".to_string(),
                        message: "buffer size must be greater than 0".to_string(),
                    });
                }
                size
            }
            Err(_) => DEFAULT_BUFFER_SIZE,
        };

        Ok(Self {
            dirs,
            source_id,
            alert_url,
            realtime,
            settle_ms,
            skip_nfs,
            max_watches,
            buffer_size,
        })
    }
}

/// Parses `FIMWATCH_DIRS`: comma-separated `path[:options[:restrict]]`.
fn parse_dirs(raw: &str) -> Result<Vec<MonitoredDir>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(parse_dir_spec)
        .collect()
}

fn parse_dir_spec(spec: &str) -> Result<MonitoredDir, ConfigError> {
    let mut fields = spec.splitn(3, ':');

    let path = fields.next().unwrap_or_default();
    if path.is_empty() {
        return Err(ConfigError::InvalidValue {
            key: "FIMWATCH_DIRS".to_string(),
            message: format!("empty path in '{spec}'"),
        });
    }

    let options = match fields.next() {
        Some(val) if !val.is_empty() => {
            val.parse::<u32>().map_err(|_| ConfigError::InvalidValue {
                key: "FIMWATCH_DIRS".to_string(),
                message: format!("expected integer options in '{spec}', got '{val}'"),
            })?
        }
        _ => 0,
    };

    let restrict = fields
        .next()
        .map(str::to_string)
        .filter(|s| !s.is_empty());

    Ok(MonitoredDir {
        path: PathBuf::from(path),
        options,
        restrict,
    })
}

fn parse_bool(key: &str, val: &str) -> Result<bool, ConfigError> {
    match val.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected boolean, got '{val}'"),
        }),
    }
}

/// Gets the system hostname, falling back to "unknown" if it cannot be determined.
fn get_hostname() -> String {
    gethostname::gethostname()
        .into_string()
        .unwrap_or_else(|_| "unknown".to_string())
}
