//! Logging setup shared by the medrag binaries.
//!
//! [`init_telemetry`] installs a global `tracing` subscriber with an
//! `EnvFilter` read from `RUST_LOG` (default `info`) and either
//! human-readable or JSON-lines output on stderr. It is safe to call more
//! than once; only the first call has an effect.
//!
//! [`EventCapture`] is a layer that records events in memory, for asserting
//! on structured log output in tests.

mod capture;

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use tracing_subscriber::{EnvFilter, fmt as tracing_fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub use capture::{CapturedEvent, EventCapture};

/// Filter used when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "info";

static INITIALIZED: OnceLock<()> = OnceLock::new();

/// Errors from telemetry setup.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("unknown log format '{0}' (expected 'pretty' or 'json')")]
    UnknownFormat(String),

    #[error("invalid log filter: {0}")]
    InvalidFilter(String),

    #[error("failed to install tracing subscriber: {0}")]
    Install(String),
}

/// How log lines are rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, one event per line.
    #[default]
    Pretty,
    /// One JSON object per line, for log shippers.
    Json,
}

impl FromStr for LogFormat {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(TelemetryError::UnknownFormat(other.to_string())),
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LogFormat::Pretty => "pretty",
            LogFormat::Json => "json",
        })
    }
}

/// Install the global subscriber, filtering with `RUST_LOG` or [`DEFAULT_FILTER`].
pub fn init_telemetry(format: LogFormat) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    install(format, filter)
}

/// Install the global subscriber with an explicit filter directive such as
/// `"medrag_core=debug,info"`.
pub fn init_with_filter(format: LogFormat, directives: &str) -> Result<(), TelemetryError> {
    let filter =
        EnvFilter::try_new(directives).map_err(|e| TelemetryError::InvalidFilter(e.to_string()))?;
    install(format, filter)
}

fn install(format: LogFormat, filter: EnvFilter) -> Result<(), TelemetryError> {
    if INITIALIZED.get().is_some() {
        return Ok(());
    }

    let registry = tracing_subscriber::registry().with(filter);
    let result = match format {
        LogFormat::Pretty => registry
            .with(tracing_fmt::layer().with_writer(std::io::stderr).with_target(true))
            .try_init(),
        LogFormat::Json => registry
            .with(
                tracing_fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_current_span(false)
                    .flatten_event(true),
            )
            .try_init(),
    };

    match result {
        Ok(()) => {
            let _ = INITIALIZED.set(());
            Ok(())
        }
        // Someone else installed a global subscriber first; keep theirs.
        Err(_) if INITIALIZED.get().is_some() => Ok(()),
        Err(e) => Err(TelemetryError::Install(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_parses_case_insensitively() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!(matches!("xml".parse::<LogFormat>(), Err(TelemetryError::UnknownFormat(_))));
        assert_eq!(LogFormat::Json.to_string(), "json");
    }

    #[test]
    fn init_is_idempotent() {
        assert!(init_telemetry(LogFormat::Pretty).is_ok());
        assert!(init_telemetry(LogFormat::Json).is_ok());
        tracing::info!("telemetry initialized twice");
    }

    #[test]
    fn bad_filter_is_rejected() {
        assert!(matches!(
            init_with_filter(LogFormat::Pretty, "medrag=notalevel"),
            Err(TelemetryError::InvalidFilter(_))
        ));
    }
}
