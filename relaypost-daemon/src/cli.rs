//! Command-line interface for the relaypost daemon.

use std::path::PathBuf;

use clap::Parser;

/// Relaypost daemon -- claims queued events and routes or forwards them.
#[derive(Parser, Debug)]
#[command(name = "relaypost-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "/etc/relaypost/relaypost.toml")]
    pub config: PathBuf,

    /// Override the log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override the log format (json, pretty)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Validate the configuration and exit without starting workers
    #[arg(long)]
    pub validate: bool,

    /// Override the PID file path (empty string disables the PID file)
    #[arg(long)]
    pub pid_file: Option<String>,
}
