//! relaypost.toml 통합 설정 테스트
//!
//! - relaypost.toml.example 파싱 테스트
//! - 부분 설정 (일부 섹션만) 로딩 테스트
//! - 환경변수 우선순위 테스트
//! - 빈 파일 / 잘못된 형식 에러 테스트

use relaypost_core::config::RelaypostConfig;
use relaypost_core::error::{ConfigError, RelaypostError};

// =============================================================================
// relaypost.toml.example 파싱 테스트
// =============================================================================

#[test]
fn example_config_parses_successfully() {
    let content = include_str!("../../../relaypost.toml.example");
    let config = RelaypostConfig::parse(content).expect("example config should parse");

    assert_eq!(config.general.log_level, "info");
    assert_eq!(config.general.log_format, "json");
    assert_eq!(config.general.data_dir, "/var/lib/relaypost");
    assert_eq!(config.general.pid_file, "/var/run/relaypost.pid");
}

#[test]
fn example_config_passes_validation() {
    let content = include_str!("../../../relaypost.toml.example");
    let config = RelaypostConfig::parse(content).expect("should parse");
    config
        .validate()
        .expect("example config should pass validation");
}

#[test]
fn example_config_has_correct_store_defaults() {
    let content = include_str!("../../../relaypost.toml.example");
    let config = RelaypostConfig::parse(content).expect("should parse");

    assert_eq!(config.store.url, "memory://");
    assert_eq!(config.store.key_prefix, "relaypost");
    assert_eq!(config.store.claim_timeout_secs, 5);
    assert_eq!(config.store.connect_max_attempts, 10);
    assert_eq!(config.store.connect_backoff_base_ms, 500);
    assert_eq!(config.store.connect_backoff_cap_ms, 30_000);
}

#[test]
fn example_config_has_correct_router_defaults() {
    let content = include_str!("../../../relaypost.toml.example");
    let config = RelaypostConfig::parse(content).expect("should parse");

    assert!(config.router.enabled);
    assert_eq!(config.router.input_queue, "relaypost:queue:input");
    assert_eq!(config.router.alert_queue, "relaypost:queue:alert");
    assert_eq!(config.router.dlq, "relaypost:dlq:router");
    assert_eq!(config.router.default_team, "noc");
    assert_eq!(config.router.max_retries, 3);
}

#[test]
fn example_config_has_correct_forwarder_defaults() {
    let content = include_str!("../../../relaypost.toml.example");
    let config = RelaypostConfig::parse(content).expect("should parse");

    assert!(config.forwarder.enabled);
    assert_eq!(config.forwarder.alert_queue, config.router.alert_queue);
    assert_eq!(config.forwarder.dlq, "relaypost:dlq:forwarder");
    assert!(config.forwarder.webhook_url.starts_with("https://"));
    assert_eq!(config.forwarder.timeout_secs, 10);
    assert_eq!(config.forwarder.backoff_base_secs, 2);
    assert_eq!(config.forwarder.backoff_cap_secs, 60);
    assert_eq!(config.forwarder.max_retries, 5);
}

#[test]
fn example_config_has_correct_protection_defaults() {
    let content = include_str!("../../../relaypost.toml.example");
    let config = RelaypostConfig::parse(content).expect("should parse");

    assert_eq!(config.limiter.max_requests, 30);
    assert_eq!(config.limiter.window_secs, 60);
    assert_eq!(config.breaker.failure_threshold, 5);
    assert_eq!(config.breaker.timeout_secs, 300);
    assert_eq!(config.dedup.threshold, 100);
    assert_eq!(config.dedup.window_secs, 3600);
    assert_eq!(config.dedup.triggered_window_secs, 86_400);
}

#[test]
fn example_config_has_correct_janitor_defaults() {
    let content = include_str!("../../../relaypost.toml.example");
    let config = RelaypostConfig::parse(content).expect("should parse");

    assert_eq!(config.janitor.heartbeat_interval_secs, 10);
    assert_eq!(config.janitor.timeout_secs, 60);
    assert_eq!(config.janitor.scan_count, 100);
}

#[test]
fn example_config_matches_code_defaults() {
    let content = include_str!("../../../relaypost.toml.example");
    let from_file = RelaypostConfig::parse(content).expect("should parse");
    let from_code = RelaypostConfig::default();

    // webhook_url만 예시 값이고 나머지 기본값은 코드 Default와 일치해야 합니다
    assert_eq!(from_file.general.log_level, from_code.general.log_level);
    assert_eq!(from_file.general.log_format, from_code.general.log_format);
    assert_eq!(from_file.store.url, from_code.store.url);
    assert_eq!(from_file.store.key_prefix, from_code.store.key_prefix);
    assert_eq!(from_file.router.input_queue, from_code.router.input_queue);
    assert_eq!(from_file.router.max_retries, from_code.router.max_retries);
    assert_eq!(
        from_file.forwarder.max_retries,
        from_code.forwarder.max_retries
    );
    assert_eq!(
        from_file.limiter.max_requests,
        from_code.limiter.max_requests
    );
    assert_eq!(
        from_file.breaker.failure_threshold,
        from_code.breaker.failure_threshold
    );
    assert_eq!(from_file.dedup.threshold, from_code.dedup.threshold);
    assert_eq!(
        from_file.janitor.heartbeat_interval_secs,
        from_code.janitor.heartbeat_interval_secs
    );
    assert_eq!(from_file.metrics.port, from_code.metrics.port);
}

// =============================================================================
// 부분 설정 로딩 테스트
// =============================================================================

#[test]
fn partial_config_general_only() {
    let toml = r#"
[general]
log_level = "debug"
log_format = "pretty"
"#;
    let config = RelaypostConfig::parse(toml).expect("should parse");

    assert_eq!(config.general.log_level, "debug");
    assert_eq!(config.general.log_format, "pretty");
    // 나머지 섹션은 기본값
    assert_eq!(config.store.url, "memory://");
    assert!(config.router.enabled);
    assert!(config.forwarder.enabled);
}

#[test]
fn partial_config_store_only() {
    let toml = r#"
[store]
url = "redis://queue.internal:6379"
claim_timeout_secs = 2
"#;
    let config = RelaypostConfig::parse(toml).expect("should parse");

    assert_eq!(config.store.url, "redis://queue.internal:6379");
    assert_eq!(config.store.claim_timeout_secs, 2);
    // key_prefix는 기본값 유지
    assert_eq!(config.store.key_prefix, "relaypost");
    assert_eq!(config.general.log_level, "info");
}

#[test]
fn partial_config_limiter_only() {
    let toml = r#"
[limiter]
max_requests = 100
window_secs = 10
"#;
    let config = RelaypostConfig::parse(toml).expect("should parse");

    assert_eq!(config.limiter.max_requests, 100);
    assert_eq!(config.limiter.window_secs, 10);
    assert_eq!(config.limiter.name, "incident-webhook");
}

#[test]
fn partial_config_two_sections() {
    let toml = r#"
[general]
log_level = "warn"

[dedup]
threshold = 10
"#;
    let config = RelaypostConfig::parse(toml).expect("should parse");

    assert_eq!(config.general.log_level, "warn");
    assert_eq!(config.dedup.threshold, 10);
    // 생략된 섹션은 기본값
    assert_eq!(config.dedup.window_secs, 3600);
    assert_eq!(config.breaker.failure_threshold, 5);
}

// =============================================================================
// 환경변수 우선순위 테스트
// =============================================================================

#[test]
#[serial_test::serial]
fn env_override_takes_precedence_over_toml() {
    let toml = r#"
[general]
log_level = "info"
"#;

    let original = std::env::var("RELAYPOST_GENERAL_LOG_LEVEL").ok();
    // SAFETY: serial 테스트로 직렬화되어 환경변수 조작이 안전합니다.
    unsafe {
        std::env::set_var("RELAYPOST_GENERAL_LOG_LEVEL", "error");
    }

    let mut config = RelaypostConfig::parse(toml).expect("should parse");
    config.apply_env_overrides();
    let result = config.general.log_level.clone();

    // SAFETY: 테스트 정리
    unsafe {
        match original {
            Some(val) => std::env::set_var("RELAYPOST_GENERAL_LOG_LEVEL", val),
            None => std::env::remove_var("RELAYPOST_GENERAL_LOG_LEVEL"),
        }
    }

    assert_eq!(result, "error");
}

#[test]
#[serial_test::serial]
fn env_override_takes_precedence_over_defaults() {
    let original = std::env::var("RELAYPOST_STORE_URL").ok();
    // SAFETY: serial 테스트로 직렬화되어 환경변수 조작이 안전합니다.
    unsafe {
        std::env::set_var("RELAYPOST_STORE_URL", "redis://override:6379");
    }

    let mut config = RelaypostConfig::parse("").expect("should parse");
    config.apply_env_overrides();
    let result = config.store.url.clone();

    // SAFETY: 테스트 정리
    unsafe {
        match original {
            Some(val) => std::env::set_var("RELAYPOST_STORE_URL", val),
            None => std::env::remove_var("RELAYPOST_STORE_URL"),
        }
    }

    assert_eq!(result, "redis://override:6379");
}

#[test]
#[serial_test::serial]
fn env_override_bearer_token() {
    let original = std::env::var("RELAYPOST_FORWARDER_BEARER_TOKEN").ok();
    // SAFETY: serial 테스트로 직렬화되어 환경변수 조작이 안전합니다.
    unsafe {
        std::env::set_var("RELAYPOST_FORWARDER_BEARER_TOKEN", "secret-token-123");
    }

    let mut config = RelaypostConfig::parse("").expect("should parse");
    config.apply_env_overrides();
    let result = config.forwarder.bearer_token.clone();

    // SAFETY: 테스트 정리
    unsafe {
        match original {
            Some(val) => std::env::set_var("RELAYPOST_FORWARDER_BEARER_TOKEN", val),
            None => std::env::remove_var("RELAYPOST_FORWARDER_BEARER_TOKEN"),
        }
    }

    assert_eq!(result, "secret-token-123");
}

#[test]
#[serial_test::serial]
fn env_override_numeric_field() {
    let original = std::env::var("RELAYPOST_LIMITER_MAX_REQUESTS").ok();
    // SAFETY: serial 테스트로 직렬화되어 환경변수 조작이 안전합니다.
    unsafe {
        std::env::set_var("RELAYPOST_LIMITER_MAX_REQUESTS", "999");
    }

    let mut config = RelaypostConfig::parse("").expect("should parse");
    config.apply_env_overrides();
    let result = config.limiter.max_requests;

    // SAFETY: 테스트 정리
    unsafe {
        match original {
            Some(val) => std::env::set_var("RELAYPOST_LIMITER_MAX_REQUESTS", val),
            None => std::env::remove_var("RELAYPOST_LIMITER_MAX_REQUESTS"),
        }
    }

    assert_eq!(result, 999);
}

#[test]
#[serial_test::serial]
fn env_override_bool_field() {
    let original = std::env::var("RELAYPOST_METRICS_ENABLED").ok();
    // SAFETY: serial 테스트로 직렬화되어 환경변수 조작이 안전합니다.
    unsafe {
        std::env::set_var("RELAYPOST_METRICS_ENABLED", "true");
    }

    let mut config = RelaypostConfig::parse("").expect("should parse");
    config.apply_env_overrides();
    let result = config.metrics.enabled;

    // SAFETY: 테스트 정리
    unsafe {
        match original {
            Some(val) => std::env::set_var("RELAYPOST_METRICS_ENABLED", val),
            None => std::env::remove_var("RELAYPOST_METRICS_ENABLED"),
        }
    }

    assert!(result);
}

#[test]
#[serial_test::serial]
fn env_override_missing_var_keeps_toml_value() {
    let toml = r#"
[general]
log_level = "warn"
"#;

    // SAFETY: 존재하지 않는 변수를 명시적으로 제거
    unsafe {
        std::env::remove_var("RELAYPOST_GENERAL_LOG_LEVEL");
    }

    let mut config = RelaypostConfig::parse(toml).expect("should parse");
    config.apply_env_overrides();

    assert_eq!(config.general.log_level, "warn");
}

// =============================================================================
// 빈 파일 / 잘못된 형식 에러 테스트
// =============================================================================

#[test]
fn empty_string_parses_with_defaults() {
    let config = RelaypostConfig::parse("").expect("empty string should parse");
    assert_eq!(config.general.log_level, "info");
    assert_eq!(config.store.url, "memory://");
}

#[test]
fn whitespace_only_parses_with_defaults() {
    let config = RelaypostConfig::parse("   \n\n  \t  ").expect("whitespace should parse");
    assert_eq!(config.general.log_level, "info");
}

#[test]
fn comments_only_parses_with_defaults() {
    let toml = r#"
# 이것은 주석입니다
# 모든 줄이 주석입니다
"#;
    let config = RelaypostConfig::parse(toml).expect("comments-only should parse");
    assert_eq!(config.general.log_level, "info");
}

#[test]
fn malformed_toml_returns_parse_error() {
    let result = RelaypostConfig::parse("[invalid toml");
    assert!(result.is_err());
    let err = result.unwrap_err();
    assert!(matches!(
        err,
        RelaypostError::Config(ConfigError::ParseFailed { .. })
    ));
}

#[test]
fn invalid_type_returns_parse_error() {
    let toml = r#"
[router]
enabled = "not_a_bool"
"#;
    let result = RelaypostConfig::parse(toml);
    assert!(result.is_err());
    assert!(matches!(
        result.unwrap_err(),
        RelaypostError::Config(ConfigError::ParseFailed { .. })
    ));
}

#[test]
fn wrong_type_for_numeric_field() {
    let toml = r#"
[limiter]
max_requests = "thirty"
"#;
    let result = RelaypostConfig::parse(toml);
    assert!(result.is_err());
    assert!(matches!(
        result.unwrap_err(),
        RelaypostError::Config(ConfigError::ParseFailed { .. })
    ));
}

#[tokio::test]
async fn from_file_nonexistent_returns_file_not_found() {
    let result = RelaypostConfig::from_file("/tmp/relaypost_test_nonexistent_12345.toml").await;
    assert!(result.is_err());
    assert!(matches!(
        result.unwrap_err(),
        RelaypostError::Config(ConfigError::FileNotFound { .. })
    ));
}

#[tokio::test]
async fn load_example_config_from_disk() {
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    let example_path = format!("{}/../../relaypost.toml.example", manifest_dir);

    let config = RelaypostConfig::from_file(&example_path)
        .await
        .expect("example config should load from disk");
    config.validate().expect("loaded example should validate");
    assert_eq!(config.general.log_level, "info");
}

// =============================================================================
// 직렬화 라운드트립 테스트
// =============================================================================

#[test]
fn serialize_and_reparse_roundtrip() {
    let original = RelaypostConfig::default();
    let toml_str = toml::to_string_pretty(&original).expect("should serialize");
    let parsed = RelaypostConfig::parse(&toml_str).expect("should reparse");

    assert_eq!(original.general.log_level, parsed.general.log_level);
    assert_eq!(original.store.url, parsed.store.url);
    assert_eq!(original.router.input_queue, parsed.router.input_queue);
    assert_eq!(original.limiter.window_secs, parsed.limiter.window_secs);
    assert_eq!(original.dedup.threshold, parsed.dedup.threshold);
}

#[test]
fn example_config_serialize_roundtrip() {
    let content = include_str!("../../../relaypost.toml.example");
    let config = RelaypostConfig::parse(content).expect("should parse");
    let serialized = toml::to_string_pretty(&config).expect("should serialize");
    let reparsed = RelaypostConfig::parse(&serialized).expect("should reparse");
    reparsed.validate().expect("should validate");

    assert_eq!(config.general.log_level, reparsed.general.log_level);
    assert_eq!(config.forwarder.webhook_url, reparsed.forwarder.webhook_url);
}
