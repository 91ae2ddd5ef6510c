//! Process-wide tracing setup.
//!
//! Events go through an `EnvFilter` (`RUST_LOG` wins over the configured
//! level) to stderr, or to a [`RotatingFile`] when `logging.file` is set.

pub mod rotation;

pub use rotation::RotatingFile;

use crate::config::types::LoggingConfig;
use std::sync::Mutex;
use thiserror::Error;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to open log file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),
}

/// Filter directive for a configured level.
///
/// A bare level applies to this crate only; anything with a target or
/// several directives is used as is.
pub fn filter_directive(level: &str) -> String {
    if level.contains('=') || level.contains(',') {
        level.to_string()
    } else {
        format!("logpusher={}", level)
    }
}

pub fn build_filter(level: &str) -> Result<EnvFilter, LoggingError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => Ok(EnvFilter::try_new(filter_directive(level))?),
    }
}

/// Install the global subscriber. Call once, before any pusher is started.
pub fn init(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = build_filter(&config.level)?;

    let (stderr_layer, file_layer) = match &config.file {
        Some(path) => {
            let file = RotatingFile::open(path, &config.rotation)?;
            let layer = fmt::layer().with_ansi(false).with_writer(Mutex::new(file));
            (None, Some(layer))
        }
        None => (Some(fmt::layer().with_writer(std::io::stderr)), None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_level_scoped_to_crate() {
        assert_eq!(filter_directive("debug"), "logpusher=debug");
    }

    #[test]
    fn test_full_directives_kept() {
        assert_eq!(filter_directive("info,reqwest=warn"), "info,reqwest=warn");
        assert_eq!(filter_directive("logpusher=trace"), "logpusher=trace");
    }

    #[test]
    fn test_invalid_level_rejected() {
        assert!(EnvFilter::try_new(filter_directive("loud")).is_err());
    }
}
