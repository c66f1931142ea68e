//! Worker role initialization and plugin wrapping.
//!
//! Each enabled role (router, forwarder) gets its own [`RelayPipeline`]
//! wrapped as a [`PipelinePlugin`], so the orchestrator can drive both
//! through one [`PluginRegistry`](relaypost_core::plugin::PluginRegistry)
//! and stop them in registration order (producer first).
//!
//! ```text
//! input queue  --claim-->  event-router     --push-->  alert queue
//! alert queue  --claim-->  alert-forwarder  --POST-->  incident webhook
//! ```

use std::fmt;

use anyhow::Result;

use relaypost_core::error::RelaypostError;
use relaypost_core::pipeline::{HealthStatus, Pipeline};
use relaypost_core::plugin::{Plugin, PluginInfo, PluginState, PluginType};
use relaypost_pipeline::{PipelineConfig, RelayPipeline, RelayPipelineBuilder, RuleCache};
use relaypost_store::{QueueStore, SharedStore};

// ─── PipelinePlugin ──────────────────────────────────────────────────

/// A role pipeline wrapped as a daemon plugin.
///
/// Adds plugin metadata and an init-time store readiness check on top
/// of the pipeline's own start/stop/health lifecycle.
pub struct PipelinePlugin {
    info: PluginInfo,
    state: PluginState,
    pipeline: RelayPipeline,
}

impl PipelinePlugin {
    fn new(
        name: &str,
        description: &str,
        plugin_type: PluginType,
        pipeline: RelayPipeline,
    ) -> Self {
        Self {
            info: PluginInfo {
                name: name.to_owned(),
                version: env!("CARGO_PKG_VERSION").to_owned(),
                description: description.to_owned(),
                plugin_type,
            },
            state: PluginState::Created,
            pipeline,
        }
    }
}

impl fmt::Debug for PipelinePlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelinePlugin")
            .field("info", &self.info)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Plugin for PipelinePlugin {
    fn info(&self) -> &PluginInfo {
        &self.info
    }

    fn state(&self) -> PluginState {
        self.state
    }

    async fn init(&mut self) -> Result<(), RelaypostError> {
        // Readiness check only; the orchestrator already established the
        // connection with backoff before building the plugins.
        if let Err(e) = self.pipeline.store().ping().await {
            self.state = PluginState::Failed;
            return Err(e.into());
        }
        self.state = PluginState::Initialized;
        Ok(())
    }

    async fn start(&mut self) -> Result<(), RelaypostError> {
        match self.pipeline.start().await {
            Ok(()) => {
                self.state = PluginState::Running;
                Ok(())
            }
            Err(e) => {
                self.state = PluginState::Failed;
                Err(e)
            }
        }
    }

    async fn stop(&mut self) -> Result<(), RelaypostError> {
        match self.pipeline.stop().await {
            Ok(()) => {
                self.state = PluginState::Stopped;
                Ok(())
            }
            Err(e) => {
                self.state = PluginState::Failed;
                Err(e)
            }
        }
    }

    async fn health_check(&self) -> HealthStatus {
        self.pipeline.health_check().await
    }
}

// ─── Role initialization ─────────────────────────────────────────────

/// Initialize the event router role.
///
/// Returns `Ok(None)` when the router is disabled in configuration.
/// The returned plugin runs only router workers; the forwarder flag is
/// cleared on its copy of the config.
pub fn init_router(
    config: &PipelineConfig,
    store: SharedStore,
    rules: RuleCache,
) -> Result<Option<PipelinePlugin>> {
    if !config.router.enabled {
        tracing::info!("event router disabled in configuration");
        return Ok(None);
    }

    tracing::info!(
        input_queue = %config.router.input_queue,
        rule_dir = %config.router.rule_dir,
        workers = config.workers_per_role,
        "initializing event router"
    );

    let mut role_config = config.clone();
    role_config.forwarder.enabled = false;

    let pipeline = RelayPipelineBuilder::new()
        .config(role_config)
        .store(store)
        .rule_cache(rules)
        .build()
        .map_err(|e| anyhow::anyhow!("failed to build router pipeline: {e}"))?;

    Ok(Some(PipelinePlugin::new(
        "event-router",
        "Claims queued events and routes them through the rule engine",
        PluginType::Router,
        pipeline,
    )))
}

/// Initialize the alert forwarder role.
///
/// Returns `Ok(None)` when the forwarder is disabled in configuration.
/// The returned plugin runs only forwarder workers; the router flag is
/// cleared on its copy of the config so no rules are loaded.
pub fn init_forwarder(
    config: &PipelineConfig,
    store: SharedStore,
) -> Result<Option<PipelinePlugin>> {
    if !config.forwarder.enabled {
        tracing::info!("alert forwarder disabled in configuration");
        return Ok(None);
    }

    tracing::info!(
        alert_queue = %config.forwarder.alert_queue,
        workers = config.workers_per_role,
        "initializing alert forwarder"
    );

    let mut role_config = config.clone();
    role_config.router.enabled = false;

    let pipeline = RelayPipelineBuilder::new()
        .config(role_config)
        .store(store)
        .build()
        .map_err(|e| anyhow::anyhow!("failed to build forwarder pipeline: {e}"))?;

    Ok(Some(PipelinePlugin::new(
        "alert-forwarder",
        "Claims routed alerts and delivers them to the incident webhook",
        PluginType::Forwarder,
        pipeline,
    )))
}

// ─── Tests ───────────────────────────────────────────────────────────
