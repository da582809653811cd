//! Logging setup
//!
//! Installs a `tracing` subscriber from the `[logging]` configuration
//! section. `RUST_LOG` applies when no explicit filter is configured.

use crate::error::{ActorError, Result};
use stage_config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber; fails if one is already installed
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = env_filter(config)?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true);

    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    installed.map_err(|e| ActorError::configuration(e.to_string(), Some("logging")))
}

fn env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    if let Some(filter) = &config.filter {
        return EnvFilter::try_new(filter)
            .map_err(|e| ActorError::configuration(e.to_string(), Some("logging.filter")));
    }
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| ActorError::configuration(e.to_string(), Some("logging.level")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_filter_is_validated() {
        let config = LoggingConfig {
            filter: Some("stage_actors=debug,warn".to_string()),
            ..LoggingConfig::default()
        };
        assert!(env_filter(&config).is_ok());

        let broken = LoggingConfig {
            filter: Some("stage_actors=[".to_string()),
            ..LoggingConfig::default()
        };
        let error = env_filter(&broken).unwrap_err();
        assert_eq!(error.category(), "configuration");
    }
}
