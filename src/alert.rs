//! Alert envelope and delivery sinks.
//!
//! The reconciler produces plain text alert lines; this module wraps them
//! with agent identity and a timestamp and hands them off. Delivery is
//! fire-and-forget: a failed delivery is logged and never retried.

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

/// HTTP delivery timeout.
const DELIVERY_TIMEOUT_SECS: u64 = 30;

/// One alert, ready for delivery.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Alert {
    /// Identifier of the reporting agent.
    pub source: String,

    /// When the alert was raised.
    pub timestamp: DateTime<Utc>,

    /// Alert text: `<checksum-diff-token> <path>`, optionally followed by a
    /// diff snippet on subsequent lines.
    pub message: String,
}

impl Alert {
    /// Wraps a formatted alert line.
    #[must_use]
    pub fn new(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            timestamp: Utc::now(),
            message: message.into(),
        }
    }
}

/// Where alerts go.
pub enum AlertSink {
    /// Structured log output only.
    Log,

    /// JSON POST to a collector endpoint, in addition to the log line.
    Http { client: Client, url: String },
}

impl AlertSink {
    /// Log-only sink.
    #[must_use]
    pub fn log() -> Self {
        Self::Log
    }

    /// HTTP sink posting to `url`.
    #[must_use]
    pub fn http(url: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(DELIVERY_TIMEOUT_SECS))
            .build()
            .expect("failed to create HTTP client");
        Self::Http { client, url }
    }

    /// Delivers one alert. Failures are logged, never retried.
    pub async fn deliver(&self, alert: &Alert) {
        info!(
            target: "fimwatch::alert",
            source = %alert.source,
            message = %alert.message,
            "integrity alert"
        );

        if let Self::Http { client, url } = self {
            match client.post(url).json(alert).send().await {
                Ok(response) if !response.status().is_success() => {
                    warn!(
                        status = %response.status(),
                        url = %url,
                        "alert collector rejected delivery"
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, url = %url, "alert delivery failed");
                }
            }
        }
    }
}

/// Truncates `text` to at most `max` bytes on a char boundary.
///
/// Alert and snippet buffers are hard-capped; overlong content is cut
/// silently, never treated as an error.
#[must_use]
pub(crate) fn truncate_to_boundary(mut text: String, max: usize) -> String {
    if text.len() <= max {
        return text;
    }
    let mut cut = max;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
    text
}
