//! Daemon orchestration -- store wiring, role assembly, and lifecycle management.
//!
//! The [`Orchestrator`] is the central coordinator of `relaypost-daemon`.
//! It connects the shared queue store, builds the enabled worker roles as
//! plugins, manages startup/shutdown ordering, and runs the main signal loop.
//!
//! # Startup Order (producers before consumers)
//!
//! 1. event-router (claims input events, fills the alert queue)
//! 2. alert-forwarder (drains the alert queue to the incident webhook)
//!
//! # Shutdown Order (same as startup - producers first)
//!
//! The router stops first so no new alerts are produced while the
//! forwarder finishes its in-flight deliveries. Any remaining backlog
//! is durable in the store and is picked up after restart.

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::sync::broadcast;

use relaypost_core::config::{RelaypostConfig, StoreConfig};
use relaypost_core::plugin::PluginRegistry;
use relaypost_pipeline::{PipelineConfig, RuleCache, backoff_delay};
use relaypost_store::{MemoryStore, QueueStore, SharedStore};

use crate::health::{DaemonHealth, ModuleHealth, aggregate_status};
use crate::metrics_server;
use crate::modules;

/// The main daemon orchestrator.
///
/// Manages the complete lifecycle of the relaypost worker roles:
/// configuration loading, store connection, ordered startup,
/// health monitoring, and graceful shutdown.
pub struct Orchestrator {
    /// Loaded and validated configuration.
    config: RelaypostConfig,
    /// Registry of all plugins (ordered for start/stop).
    plugins: PluginRegistry,
    /// Shutdown broadcast sender (signals all background tasks).
    shutdown_tx: broadcast::Sender<()>,
    /// Daemon start time (for uptime reporting).
    start_time: Instant,
}

impl Orchestrator {
    /// Load configuration and build the orchestrator.
    ///
    /// This performs the following steps:
    /// 1. Load `relaypost.toml` and apply environment variable overrides
    /// 2. Validate the configuration
    /// 3. Connect the shared queue store (with backoff)
    /// 4. Initialize enabled worker roles
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read or parsed
    /// - Configuration validation fails
    /// - The store stays unreachable past `store.connect_max_attempts`
    /// - Any enabled role fails to initialize
    pub async fn build(config_path: &Path) -> Result<Self> {
        let config = RelaypostConfig::load(config_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
        Self::build_from_config(config).await
    }

    /// Build from an already-loaded configuration.
    ///
    /// Useful for testing or when config has already been loaded.
    pub async fn build_from_config(config: RelaypostConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        // Install metrics recorder before any role records a metric
        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
            tracing::info!(port = config.metrics.port, "metrics endpoint enabled");
        }

        let store = build_store(&config.store)?;
        wait_for_store(&store, &config.store).await?;

        // Cross-role invariants (shared alert queue) are checked on the
        // full pipeline config before it is split per role.
        let pipeline_config = PipelineConfig::from_core(&config);
        pipeline_config
            .validate()
            .map_err(|e| anyhow::anyhow!("pipeline config validation failed: {}", e))?;

        let rules = RuleCache::empty();
        let mut plugins = PluginRegistry::new();

        if let Some(router) = modules::init_router(&pipeline_config, store.clone(), rules.clone())?
        {
            plugins.register(Box::new(router))?;
        }
        if let Some(forwarder) = modules::init_forwarder(&pipeline_config, store.clone())? {
            plugins.register(Box::new(forwarder))?;
        }

        if plugins.count() == 0 {
            tracing::warn!("no worker roles enabled; daemon will only serve metrics");
        }
        tracing::info!(total_plugins = plugins.count(), "orchestrator initialized");

        // Record daemon metrics
        if config.metrics.enabled {
            record_daemon_metrics(plugins.count());
        }

        let (shutdown_tx, _) = broadcast::channel(16);

        Ok(Self {
            config,
            plugins,
            shutdown_tx,
            start_time: Instant::now(),
        })
    }

    /// Start all enabled roles and enter the main signal loop.
    ///
    /// This method blocks until a shutdown signal is received.
    /// Roles are started in dependency order (producers first).
    ///
    /// # Shutdown Triggers
    ///
    /// - `SIGTERM` (from systemd, Docker, or `kill`)
    /// - `SIGINT` (Ctrl+C)
    pub async fn run(&mut self) -> Result<()> {
        // Write PID file if configured
        if !self.config.general.pid_file.is_empty() {
            let path = Path::new(&self.config.general.pid_file);
            write_pid_file(path)?;
        }

        // Initialize and start all plugins
        tracing::info!("initializing all plugins");
        if let Err(e) = self.plugins.init_all().await {
            tracing::error!(error = %e, "plugin initialization failed");
            self.cleanup_pid_file();
            return Err(e.into());
        }

        tracing::info!("starting all plugins");
        if let Err(e) = self.plugins.start_all().await {
            // Rollback: stop any plugins that were successfully started
            tracing::warn!("startup failed, rolling back already-started plugins");
            if let Err(stop_err) = self.plugins.stop_all().await {
                tracing::error!(
                    startup_error = %e,
                    rollback_error = %stop_err,
                    "rollback also failed during startup failure cleanup"
                );
            }
            self.cleanup_pid_file();
            return Err(e.into());
        }

        // Spawn uptime updater task
        let mut uptime_updater_task = if self.config.metrics.enabled {
            let shutdown_rx = self.shutdown_tx.subscribe();
            Some(spawn_uptime_updater(self.start_time, shutdown_rx))
        } else {
            None
        };

        // Main signal loop
        tracing::info!("entering main signal loop");
        let signal = wait_for_shutdown_signal().await?;
        tracing::info!(signal = signal, "shutdown signal received");

        tracing::info!("broadcasting shutdown signal to all tasks");
        let _ = self.shutdown_tx.send(());

        if let Some(task) = uptime_updater_task.take() {
            let _ = task.await;
        }

        // Stop all roles; the PID file is removed even if a stop fails
        let result = self.shutdown().await;
        self.cleanup_pid_file();
        result
    }

    /// Perform graceful shutdown of all plugins.
    ///
    /// Stops plugins in registration order (producers first, consumers
    /// last), so the forwarder can drain alerts the router already queued.
    async fn shutdown(&mut self) -> Result<()> {
        tracing::info!("stopping all plugins");
        self.plugins.stop_all().await.map_err(|e| e.into())
    }

    /// Get the current aggregated health status.
    pub async fn health(&self) -> DaemonHealth {
        let statuses = self.plugins.health_check_all().await;
        let modules: Vec<ModuleHealth> = statuses
            .into_iter()
            .map(|(name, state, status)| ModuleHealth {
                name,
                state,
                status,
            })
            .collect();

        let overall_status = aggregate_status(&modules);
        let uptime_secs = self.start_time.elapsed().as_secs();

        // Update uptime metric
        if self.config.metrics.enabled {
            use relaypost_core::metrics as m;
            #[allow(clippy::cast_precision_loss)]
            metrics::gauge!(m::DAEMON_UPTIME_SECONDS).set(uptime_secs as f64);
        }

        DaemonHealth {
            status: overall_status,
            uptime_secs,
            modules,
        }
    }

    /// Get a reference to the loaded configuration.
    pub fn config(&self) -> &RelaypostConfig {
        &self.config
    }

    fn cleanup_pid_file(&self) {
        if !self.config.general.pid_file.is_empty() {
            remove_pid_file(Path::new(&self.config.general.pid_file));
        }
    }
}

/// Build the shared queue store from the configured URL.
///
/// # Errors
///
/// Returns an error for URL schemes without a backend implementation.
fn build_store(config: &StoreConfig) -> Result<SharedStore> {
    match config.url.as_str() {
        "memory://" => Ok(MemoryStore::shared()),
        other => Err(anyhow::anyhow!(
            "unsupported store url '{}': only 'memory://' is currently supported",
            other
        )),
    }
}

/// Ping the store until it answers, with exponential backoff.
///
/// The first attempt is immediate; later attempts sleep
/// `backoff_delay(base, cap, attempt - 1)` beforehand.
///
/// # Errors
///
/// Returns an error once `store.connect_max_attempts` pings have failed.
/// The daemon exits in that case rather than idling against a dead store.
async fn wait_for_store(store: &SharedStore, config: &StoreConfig) -> Result<()> {
    let base = Duration::from_millis(config.connect_backoff_base_ms);
    let cap = Duration::from_millis(config.connect_backoff_cap_ms);

    let mut last_err = String::new();
    for attempt in 0..config.connect_max_attempts {
        if attempt > 0 {
            tokio::time::sleep(backoff_delay(base, cap, attempt - 1)).await;
        }

        match store.ping().await {
            Ok(()) => {
                if attempt > 0 {
                    tracing::info!(attempt, "store connection established after retry");
                }
                return Ok(());
            }
            Err(e) => {
                tracing::warn!(attempt, error = %e, "store unreachable at startup");
                last_err = e.to_string();
            }
        }
    }

    Err(anyhow::anyhow!(
        "store unreachable after {} attempts: {}",
        config.connect_max_attempts,
        last_err
    ))
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
///
/// Returns the name of the signal that triggered the shutdown.
///
/// # Errors
///
/// Returns an error if signal handlers cannot be installed.
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Write the current process PID to a file.
///
/// Used to prevent duplicate daemon instances.
///
/// # Security
///
/// - Uses `create_new(true)` to atomically create the file
/// - Verifies the created file is a regular file
/// - Creates the parent directory with restrictive permissions (0o700)
///
/// # Errors
///
/// Returns an error if the PID file cannot be written.
fn write_pid_file(path: &Path) -> Result<()> {
    use std::fs::{self, OpenOptions};
    use std::io::{ErrorKind, Write};

    // Create parent directory with restrictive permissions (0o700)
    if let Some(parent) = path.parent() {
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            let mut builder = fs::DirBuilder::new();
            builder.mode(0o700).recursive(true);
            builder.create(parent)?;
        }
        #[cfg(not(unix))]
        {
            fs::create_dir_all(parent)?;
        }
    }

    let pid = std::process::id();

    // Atomically create the file only if it doesn't exist
    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            // File already exists, read the existing PID for error message
            let existing_pid = fs::read_to_string(path).unwrap_or_else(|_| "unknown".to_string());
            return Err(anyhow::anyhow!(
                "PID file {} already exists with PID: {}. Is another instance running?",
                path.display(),
                existing_pid.trim()
            ));
        }
        Err(e) => return Err(e.into()),
    };

    // Verify the created file is a regular file
    let metadata = file.metadata()?;
    if !metadata.is_file() {
        let _ = fs::remove_file(path);
        return Err(anyhow::anyhow!(
            "PID file {} is not a regular file (possible symlink attack)",
            path.display()
        ));
    }

    // Set restrictive permissions on the PID file (0o600)
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let permissions = std::fs::Permissions::from_mode(0o600);
        file.set_permissions(permissions)?;
    }

    writeln!(file, "{}", pid)?;

    tracing::info!(pid = pid, path = %path.display(), "PID file written");
    Ok(())
}

/// Remove the PID file on daemon shutdown.
///
/// Logs a warning but does not fail if the file cannot be removed.
fn remove_pid_file(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        tracing::warn!(
            path = %path.display(),
            error = %e,
            "failed to remove PID file"
        );
    } else {
        tracing::info!(path = %path.display(), "PID file removed");
    }
}

/// Record daemon-level metrics (build info, plugins registered).
///
/// This should be called once during orchestrator initialization.
fn record_daemon_metrics(plugin_count: usize) {
    use relaypost_core::metrics as m;

    // Build info (always 1, with version label)
    metrics::gauge!(m::DAEMON_BUILD_INFO, "version" => env!("CARGO_PKG_VERSION")).set(1.0);

    // Registered plugins count
    #[allow(clippy::cast_precision_loss)]
    metrics::gauge!(m::DAEMON_PLUGINS_REGISTERED).set(plugin_count as f64);

    tracing::debug!(
        plugin_count = plugin_count,
        version = env!("CARGO_PKG_VERSION"),
        "daemon metrics recorded"
    );
}

/// Spawn a background task that periodically updates the uptime metric.
///
/// Updates every 10 seconds to keep the metric fresh for Prometheus scrapes.
fn spawn_uptime_updater(
    start_time: Instant,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    use relaypost_core::metrics as m;

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(10));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let uptime_secs = start_time.elapsed().as_secs();
                    #[allow(clippy::cast_precision_loss)]
                    metrics::gauge!(m::DAEMON_UPTIME_SECONDS).set(uptime_secs as f64);
                }
                _ = shutdown_rx.recv() => {
                    tracing::debug!("uptime updater shutting down");
                    break;
                }
            }
        }
    })
}
