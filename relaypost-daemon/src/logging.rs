//! Tracing subscriber initialization.
//!
//! The `RUST_LOG` environment variable takes precedence over the
//! configured log level, so operators can raise verbosity per target
//! (e.g. `RUST_LOG=info,relaypost_pipeline=debug`) without editing the
//! configuration file.

use anyhow::Result;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use relaypost_core::config::GeneralConfig;

/// Initialize the global tracing subscriber.
///
/// Must be called once, before any other daemon activity. Fails if a
/// subscriber is already installed or the configured format is unknown.
pub fn init_tracing(config: &GeneralConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    match config.log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .try_init()
                .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;
        }
        "pretty" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .try_init()
                .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;
        }
        other => {
            return Err(anyhow::anyhow!(
                "unknown log format '{other}': expected 'json' or 'pretty'"
            ));
        }
    }

    Ok(())
}
