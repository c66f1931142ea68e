//! Aggregated health reporting.
//!
//! Collects each registered plugin's health into a unified
//! [`DaemonHealth`] report. The overall daemon status is the worst
//! status among all modules: `Unhealthy` > `Degraded` > `Healthy`,
//! with reasons prefixed by the module name.

use serde::Serialize;

use relaypost_core::pipeline::HealthStatus;
use relaypost_core::plugin::PluginState;

/// Aggregated health report for the entire daemon.
#[derive(Debug, Clone, Serialize)]
pub struct DaemonHealth {
    /// Overall daemon status (worst of all modules).
    pub status: HealthStatus,
    /// Seconds elapsed since the orchestrator was built.
    pub uptime_secs: u64,
    /// Per-module health reports, in registration order.
    pub modules: Vec<ModuleHealth>,
}

/// Health report for a single worker role module.
#[derive(Debug, Clone, Serialize)]
pub struct ModuleHealth {
    /// Module name, e.g. `event-router` or `alert-forwarder`.
    pub name: String,
    /// Lifecycle state tracked by the plugin registry.
    pub state: PluginState,
    /// Health status reported by the module itself.
    pub status: HealthStatus,
}

/// Aggregate per-module statuses into a single daemon status.
pub fn aggregate_status(modules: &[ModuleHealth]) -> HealthStatus {
    let mut worst = HealthStatus::Healthy;
    let mut reasons = Vec::new();

    for module in modules {
        match &module.status {
            HealthStatus::Healthy => {}
            HealthStatus::Degraded(reason) => {
                if !worst.is_unhealthy() {
                    reasons.push(format!("{}: {}", module.name, reason));
                    worst = HealthStatus::Degraded(String::new());
                }
            }
            HealthStatus::Unhealthy(reason) => {
                reasons.push(format!("{}: {}", module.name, reason));
                worst = HealthStatus::Unhealthy(String::new());
            }
        }
    }

    match worst {
        HealthStatus::Healthy => HealthStatus::Healthy,
        HealthStatus::Degraded(_) => HealthStatus::Degraded(reasons.join("; ")),
        HealthStatus::Unhealthy(_) => HealthStatus::Unhealthy(reasons.join("; ")),
    }
}
