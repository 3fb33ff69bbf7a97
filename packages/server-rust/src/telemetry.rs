//! Logging and metrics bootstrap.

use std::net::SocketAddr;

use metrics::Unit;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::EnvFilter;

use crate::service::instrument::sink::{DURATION_METRIC, ERROR_METRIC, SUCCESS_METRIC};

/// Log output format, selected by `LOG_FORMAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(String),
    #[error("failed to install prometheus exporter: {0}")]
    Exporter(#[from] metrics_exporter_prometheus::BuildError),
}

/// Installs the global `tracing` subscriber.
///
/// The filter comes from `RUST_LOG` and defaults to `info`.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing(format: LogFormat) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let installed = match format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|e| TelemetryError::Subscriber(e.to_string()))
}

/// Installs the Prometheus recorder with a scrape endpoint on `addr`.
///
/// Must be called from inside a tokio runtime.
///
/// # Errors
///
/// Returns an error if a recorder is already installed or the listener fails.
pub fn install_prometheus(addr: SocketAddr) -> Result<(), TelemetryError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    describe_metrics();
    Ok(())
}

fn describe_metrics() {
    metrics::describe_histogram!(DURATION_METRIC, Unit::Seconds, "Use-case execution time");
    metrics::describe_counter!(SUCCESS_METRIC, "Use-case executions that ended without error");
    metrics::describe_counter!(
        ERROR_METRIC,
        "Use-case executions that ended with an error or no result"
    );
}

#[cfg(test)]
mod tests {
    use clap::ValueEnum;

    use super::*;

    #[test]
    fn log_format_parses_from_env_values() {
        assert_eq!(LogFormat::from_str("json", true), Ok(LogFormat::Json));
        assert_eq!(LogFormat::from_str("PRETTY", true), Ok(LogFormat::Pretty));
        assert!(LogFormat::from_str("xml", true).is_err());
        assert_eq!(LogFormat::default(), LogFormat::Pretty);
    }

    #[test]
    fn second_subscriber_install_is_rejected() {
        let _ = init_tracing(LogFormat::Json);
        assert!(matches!(
            init_tracing(LogFormat::Pretty),
            Err(TelemetryError::Subscriber(_))
        ));
    }
}
