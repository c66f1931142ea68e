//! relaypost-daemon entry point.
//!
//! Parses CLI arguments, loads configuration, initializes logging, and
//! hands control to the [`Orchestrator`].

use anyhow::Result;
use clap::Parser;

use relaypost_core::config::RelaypostConfig;
use relaypost_daemon::cli::DaemonCli;
use relaypost_daemon::logging;
use relaypost_daemon::orchestrator::Orchestrator;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    // Validation runs after all override layers are applied, so a CLI
    // flag can fix a file that would not validate on its own.
    let content = tokio::fs::read_to_string(&cli.config)
        .await
        .map_err(|e| anyhow::anyhow!("failed to read config {}: {}", cli.config.display(), e))?;
    let mut config = RelaypostConfig::parse(&content)
        .map_err(|e| anyhow::anyhow!("failed to parse config {}: {}", cli.config.display(), e))?;
    config.apply_env_overrides();

    if let Some(level) = cli.log_level {
        config.general.log_level = level;
    }
    if let Some(format) = cli.log_format {
        config.general.log_format = format;
    }
    if let Some(pid_file) = cli.pid_file {
        config.general.pid_file = pid_file;
    }

    config
        .validate()
        .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

    if cli.validate {
        println!("configuration OK: {}", cli.config.display());
        return Ok(());
    }

    logging::init_tracing(&config.general)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "relaypost-daemon starting"
    );

    let mut orchestrator = Orchestrator::build_from_config(config).await?;
    orchestrator.run().await?;

    tracing::info!("relaypost-daemon stopped");
    Ok(())
}
