//! Prometheus metrics endpoint.
//!
//! Installs the global recorder with an HTTP listener and registers
//! histogram buckets for the pipeline duration metrics. Scrape targets
//! point at `http://{listen_addr}:{port}/metrics`.

use std::net::SocketAddr;

use anyhow::Result;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};

use relaypost_core::config::MetricsConfig;
use relaypost_core::metrics as m;

/// Install the global Prometheus recorder and start the scrape endpoint.
///
/// Can only succeed once per process; a second call fails because the
/// global recorder is already set.
pub fn install_metrics_recorder(config: &MetricsConfig) -> Result<()> {
    if config.endpoint != "/metrics" {
        return Err(anyhow::anyhow!(
            "unsupported metrics endpoint '{}': only '/metrics' is currently supported",
            config.endpoint
        ));
    }

    let addr: SocketAddr = format!("{}:{}", config.listen_addr, config.port)
        .parse()
        .map_err(|e| {
            anyhow::anyhow!(
                "invalid metrics listen address '{}:{}': {}",
                config.listen_addr,
                config.port,
                e
            )
        })?;

    if addr.ip().is_unspecified() {
        tracing::warn!(
            addr = %addr,
            "metrics endpoint bound to all interfaces; restrict listen_addr in production"
        );
    }

    let builder = PrometheusBuilder::new()
        .with_http_listener(addr)
        .set_buckets_for_metric(
            Matcher::Full(m::ROUTER_PROCESSING_DURATION_SECONDS.to_owned()),
            &m::PROCESSING_DURATION_BUCKETS,
        )
        .map_err(|e| anyhow::anyhow!("invalid processing duration buckets: {e}"))?
        .set_buckets_for_metric(
            Matcher::Full(m::FORWARDER_SEND_DURATION_SECONDS.to_owned()),
            &m::SEND_DURATION_BUCKETS,
        )
        .map_err(|e| anyhow::anyhow!("invalid send duration buckets: {e}"))?;

    builder
        .install()
        .map_err(|e| anyhow::anyhow!("failed to install metrics recorder on {addr}: {e}"))?;

    m::describe_all();

    tracing::info!(addr = %addr, "metrics endpoint listening");
    Ok(())
}
