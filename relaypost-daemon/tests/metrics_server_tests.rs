//! Integration tests for the metrics endpoint.

use relaypost_core::config::MetricsConfig;
use relaypost_daemon::metrics_server;
use serial_test::serial;

#[test]
#[serial]
fn test_install_metrics_recorder_succeeds_with_valid_config() {
    // Given: A valid metrics configuration
    let config = MetricsConfig {
        enabled: true,
        listen_addr: "127.0.0.1".to_string(),
        port: 19300, // Use non-standard port to avoid conflicts
        endpoint: "/metrics".to_string(),
    };

    // When: Installing the metrics recorder
    let result = metrics_server::install_metrics_recorder(&config);

    // Then: Should succeed
    assert!(
        result.is_ok(),
        "install_metrics_recorder should succeed with valid config: {:?}",
        result.err()
    );
}

#[test]
#[serial]
fn test_install_metrics_recorder_fails_with_invalid_address() {
    // Given: An invalid metrics configuration (invalid IP)
    let config = MetricsConfig {
        enabled: true,
        listen_addr: "999.999.999.999".to_string(),
        port: 9100,
        endpoint: "/metrics".to_string(),
    };

    // When: Installing the metrics recorder
    let result = metrics_server::install_metrics_recorder(&config);

    // Then: Should fail before any global state is touched
    let err_msg = result.err().expect("install should fail").to_string();
    assert!(
        err_msg.contains("invalid metrics listen address"),
        "error should mention the bad address, got: {}",
        err_msg
    );
}

#[test]
#[serial]
fn test_install_metrics_recorder_rejects_unsupported_endpoint() {
    let config = MetricsConfig {
        enabled: true,
        listen_addr: "127.0.0.1".to_string(),
        port: 19301,
        endpoint: "/custom".to_string(),
    };

    let result = metrics_server::install_metrics_recorder(&config);

    assert!(
        result.is_err(),
        "install_metrics_recorder should reject unsupported endpoint paths"
    );
}

#[tokio::test]
#[serial]
async fn test_metrics_disabled_does_not_start_server() {
    use relaypost_core::config::RelaypostConfig;

    // Given: A config with metrics disabled (avoids the global recorder
    // conflict with the install test in this binary)
    let mut config = RelaypostConfig::default();
    config.metrics.enabled = false;
    config.router.enabled = false;
    config.forwarder.enabled = false;

    // When: Building orchestrator
    let result = relaypost_daemon::orchestrator::Orchestrator::build_from_config(config).await;

    // Then: Should succeed without starting the metrics server
    assert!(
        result.is_ok(),
        "orchestrator should build successfully with metrics disabled: {:?}",
        result.err()
    );

    // To verify actual metric recording we would need to scrape the
    // /metrics HTTP endpoint from a fresh process in an end-to-end test.
}
