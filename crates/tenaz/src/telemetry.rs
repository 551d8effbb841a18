//! Tracing subscriber setup.
//!
//! The engine only emits `tracing` events; installing a subscriber is the
//! embedding application's call. [`init_tracing`] is a convenience for
//! binaries and test harnesses that want the engine's logs on stderr.

use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;
use crate::result::{TenazError, TenazResult};

/// Install a global fmt subscriber configured by `config`.
///
/// `RUST_LOG`, when set, takes precedence over `config.filter`.
///
/// # Errors
///
/// Returns [`TenazError::Telemetry`] if the filter does not parse or a
/// global subscriber is already installed.
pub fn init_tracing(config: &LogConfig) -> TenazResult<()> {
    let filter = build_filter(config)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true);

    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| TenazError::Telemetry {
        message: e.to_string(),
    })
}

fn build_filter(config: &LogConfig) -> TenazResult<EnvFilter> {
    if let Ok(from_env) = EnvFilter::try_from_default_env() {
        return Ok(from_env);
    }
    EnvFilter::try_new(&config.filter).map_err(|e| TenazError::Telemetry {
        message: format!("invalid log filter {:?}: {e}", config.filter),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_filter_builds() {
        let config = LogConfig {
            filter: "tenaz=debug,warn".into(),
            json: false,
        };
        assert!(build_filter(&config).is_ok());
    }

    #[test]
    fn test_second_init_reports_error() {
        let config = LogConfig::default();
        // The first call may or may not win depending on test ordering; the
        // second one must fail either way.
        let _ = init_tracing(&config);
        let err = init_tracing(&config).unwrap_err();
        assert!(matches!(err, TenazError::Telemetry { .. }));
    }
}
