//! Subscriber setup for binaries and test harnesses embedding the crate

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{MailflowError, Result};

/// Install the global subscriber
///
/// `RUST_LOG` wins over the configured level. Fails if a subscriber is
/// already installed or the format is unknown.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| MailflowError::Config(format!("Invalid log level: {}", e)))?;

    let registry = tracing_subscriber::registry().with(filter);

    let installed = match config.format.as_str() {
        "pretty" => registry.with(fmt::layer().pretty()).try_init(),
        "compact" => registry.with(fmt::layer().compact()).try_init(),
        "json" => registry.with(fmt::layer().json()).try_init(),
        other => {
            return Err(MailflowError::Config(format!(
                "Unknown log format: {}",
                other
            )))
        }
    };

    installed.map_err(|e| MailflowError::Config(e.to_string()))
}
