//! Log Output
//!
//! Installs the global `tracing` subscriber for the binaries. Logs go to
//! stderr so stdout stays free for reports. `RUST_LOG` takes precedence
//! over the configured filter.

use crate::config::{LogFormat, LoggingConfig};
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Calling it twice is a no-op.
pub fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    // try_init fails only if a subscriber is already installed
    let _ = match config.format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_is_harmless() {
        let config = LoggingConfig {
            filter: "not a [valid filter".to_string(),
            format: LogFormat::Json,
        };
        init_logging(&config);
        init_logging(&LoggingConfig::default());
        tracing::info!("logging initialised");
    }
}
