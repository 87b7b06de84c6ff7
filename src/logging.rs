/// Structured logging for the CAT monitoring service
///
/// Installs a `tracing` subscriber (console plus optional append-only log
/// file) and provides source-tagged failure logging so that a missing SPC
/// product is reported differently from a broken endpoint.

use std::fmt;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use crate::model::{CatError, DeliveryError, StateError};

// ---------------------------------------------------------------------------
// Data Source Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSource {
    Spc,
    Nws,
    Counties,
    AlertState,
    Webhook,
    System,
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSource::Spc => write!(f, "SPC"),
            DataSource::Nws => write!(f, "NWS"),
            DataSource::Counties => write!(f, "COUNTIES"),
            DataSource::AlertState => write!(f, "STATE"),
            DataSource::Webhook => write!(f, "WEBHOOK"),
            DataSource::System => write!(f, "SYS"),
        }
    }
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Expected failure - product not issued yet (SPC 404s between cycles)
    Expected,
    /// Unexpected failure - endpoint broken, format changed, or misconfigured
    Unexpected,
    /// Unknown - transient network trouble, cannot tell yet
    Unknown,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Expected => write!(f, "EXPECTED"),
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
            FailureType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Classify a fetch failure by what it says about the upstream service.
pub fn classify_fetch_failure(err: &CatError) -> FailureType {
    match err {
        CatError::HttpStatus { status: 404, .. } => FailureType::Expected,
        CatError::HttpStatus { status, .. } if *status >= 500 => FailureType::Unknown,
        CatError::HttpStatus { .. } => FailureType::Unexpected,
        CatError::Http(e) if e.is_timeout() || e.is_connect() => FailureType::Unknown,
        CatError::Http(_) => FailureType::Unexpected,
        CatError::Parse(_) | CatError::Json(_) | CatError::GeoJson(_) => FailureType::Unexpected,
        CatError::DownloadTooLarge { .. } => FailureType::Unexpected,
        _ => FailureType::Unknown,
    }
}

/// Classify a webhook delivery failure. A rate limit is the receiver working
/// as intended; a 4xx means the payload or URL is wrong.
pub fn classify_delivery_failure(err: &DeliveryError) -> FailureType {
    match err {
        DeliveryError::RateLimited(_) => FailureType::Expected,
        DeliveryError::Status(status) if *status >= 500 => FailureType::Unknown,
        DeliveryError::Status(_) => FailureType::Unexpected,
        DeliveryError::Transport(e) if e.is_timeout() || e.is_connect() => FailureType::Unknown,
        DeliveryError::Transport(_) => FailureType::Unexpected,
    }
}

// ---------------------------------------------------------------------------
// Subscriber setup
// ---------------------------------------------------------------------------

/// Install the global subscriber. `RUST_LOG` overrides `level` when set.
///
/// With `timestamps` off the console output drops the time column, which
/// reads better under cron mail. The log file always gets full records.
pub fn init_logging(level: &str, log_file: Option<&Path>, timestamps: bool) -> Result<(), CatError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    let registry = tracing_subscriber::registry().with(filter).with(file_layer);
    let installed = if timestamps {
        registry.with(console_layer).try_init()
    } else {
        registry.with(console_layer.without_time()).try_init()
    };
    installed.map_err(|e| CatError::Config(format!("logger already installed: {}", e)))
}

// ---------------------------------------------------------------------------
// Structured Failure Logging
// ---------------------------------------------------------------------------

/// Log a failure at the level its classification calls for.
pub fn log_failure(
    source: DataSource,
    target: &str,
    operation: &str,
    failure_type: FailureType,
    err: &dyn fmt::Display,
) {
    match failure_type {
        FailureType::Expected => {
            debug!(%source, endpoint = target, %failure_type, "{} failed: {}", operation, err)
        }
        FailureType::Unexpected => {
            error!(%source, endpoint = target, %failure_type, "{} failed: {}", operation, err)
        }
        FailureType::Unknown => {
            warn!(%source, endpoint = target, %failure_type, "{} failed: {}", operation, err)
        }
    }
}

/// Log a data source failure with automatic classification
pub fn log_fetch_failure(source: DataSource, target: &str, operation: &str, err: &CatError) {
    log_failure(source, target, operation, classify_fetch_failure(err), err);
}

pub fn log_delivery_failure(target: &str, operation: &str, err: &DeliveryError) {
    log_failure(DataSource::Webhook, target, operation, classify_delivery_failure(err), err);
}

/// State file problems always need a human: alerts may repeat or go missing.
pub fn log_state_failure(path: &Path, operation: &str, err: &StateError) {
    let target = path.display().to_string();
    log_failure(DataSource::AlertState, &target, operation, FailureType::Unexpected, err);
}

/// Log a summary of a multi-request fetch
pub fn log_fetch_summary(source: DataSource, total: usize, successful: usize, failed: usize) {
    if failed == 0 {
        info!(%source, "Fetch complete: {}/{} successful", successful, total);
    } else if successful == 0 {
        error!(%source, "Fetch complete: {}/{} successful, {} failed", successful, total, failed);
    } else {
        warn!(%source, "Fetch complete: {}/{} successful, {} failed", successful, total, failed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_tags_are_short_uppercase() {
        for source in [
            DataSource::Spc,
            DataSource::Nws,
            DataSource::Counties,
            DataSource::AlertState,
            DataSource::Webhook,
            DataSource::System,
        ] {
            let tag = source.to_string();
            assert!(tag.len() <= 8, "tag '{}' too long", tag);
            assert_eq!(tag, tag.to_uppercase());
        }
    }

    #[test]
    fn test_failure_classification() {
        let missing = CatError::HttpStatus { status: 404, url: "day4prob".to_string() };
        assert_eq!(classify_fetch_failure(&missing), FailureType::Expected);

        let outage = CatError::HttpStatus { status: 503, url: "day1otlk_cat".to_string() };
        assert_eq!(classify_fetch_failure(&outage), FailureType::Unknown);

        let forbidden = CatError::HttpStatus { status: 403, url: "alerts".to_string() };
        assert_eq!(classify_fetch_failure(&forbidden), FailureType::Unexpected);

        let bad_body = CatError::Parse("features missing".to_string());
        assert_eq!(classify_fetch_failure(&bad_body), FailureType::Unexpected);
    }

    #[test]
    fn test_delivery_failure_classification() {
        assert_eq!(classify_delivery_failure(&DeliveryError::RateLimited(90)), FailureType::Expected);
        assert_eq!(classify_delivery_failure(&DeliveryError::Status(502)), FailureType::Unknown);
        assert_eq!(classify_delivery_failure(&DeliveryError::Status(404)), FailureType::Unexpected);
    }
}
