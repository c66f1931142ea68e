//! 설정 관리 — relaypost.toml 파싱 및 런타임 설정
//!
//! [`RelaypostConfig`]는 모든 모듈의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`RELAYPOST_STORE_URL=redis://...` 형식)
//! 3. 설정 파일 (`relaypost.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), relaypost_core::error::RelaypostError> {
//! use relaypost_core::config::RelaypostConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = RelaypostConfig::load("relaypost.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = RelaypostConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, RelaypostError};

/// Relaypost 통합 설정
///
/// `relaypost.toml` 파일의 최상위 구조를 나타냅니다.
/// 각 모듈은 자기 섹션만 읽어 사용합니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelaypostConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 공유 큐 스토어 설정
    #[serde(default)]
    pub store: StoreConfig,
    /// 라우터 워커 설정
    #[serde(default)]
    pub router: RouterConfig,
    /// 포워더 워커 설정
    #[serde(default)]
    pub forwarder: ForwarderConfig,
    /// 레이트 리미터 설정
    #[serde(default)]
    pub limiter: LimiterConfig,
    /// 서킷 브레이커 설정
    #[serde(default)]
    pub breaker: BreakerConfig,
    /// 미처리 이벤트 중복 제거 설정
    #[serde(default)]
    pub dedup: DedupConfig,
    /// 하트비트/Janitor 설정
    #[serde(default)]
    pub janitor: JanitorConfig,
    /// 메트릭 엔드포인트 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl RelaypostConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    ///
    /// 설정 로딩 순서:
    /// 1. TOML 파일 파싱
    /// 2. 환경변수 오버라이드 적용
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, RelaypostError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, RelaypostError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RelaypostError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                RelaypostError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, RelaypostError> {
        toml::from_str(toml_str).map_err(|e| {
            RelaypostError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `RELAYPOST_{SECTION}_{FIELD}`
    /// 예: `RELAYPOST_FORWARDER_BEARER_TOKEN=...` (비밀 값은 항상 환경변수로 주입)
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "RELAYPOST_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "RELAYPOST_GENERAL_LOG_FORMAT");
        override_string(&mut self.general.data_dir, "RELAYPOST_GENERAL_DATA_DIR");
        override_string(&mut self.general.pid_file, "RELAYPOST_GENERAL_PID_FILE");

        // Store
        override_string(&mut self.store.url, "RELAYPOST_STORE_URL");
        override_string(&mut self.store.key_prefix, "RELAYPOST_STORE_KEY_PREFIX");
        override_u64(
            &mut self.store.claim_timeout_secs,
            "RELAYPOST_STORE_CLAIM_TIMEOUT_SECS",
        );
        override_u32(
            &mut self.store.connect_max_attempts,
            "RELAYPOST_STORE_CONNECT_MAX_ATTEMPTS",
        );
        override_u64(
            &mut self.store.connect_backoff_base_ms,
            "RELAYPOST_STORE_CONNECT_BACKOFF_BASE_MS",
        );
        override_u64(
            &mut self.store.connect_backoff_cap_ms,
            "RELAYPOST_STORE_CONNECT_BACKOFF_CAP_MS",
        );

        // Router
        override_bool(&mut self.router.enabled, "RELAYPOST_ROUTER_ENABLED");
        override_string(&mut self.router.input_queue, "RELAYPOST_ROUTER_INPUT_QUEUE");
        override_string(&mut self.router.alert_queue, "RELAYPOST_ROUTER_ALERT_QUEUE");
        override_string(&mut self.router.dlq, "RELAYPOST_ROUTER_DLQ");
        override_string(&mut self.router.rule_dir, "RELAYPOST_ROUTER_RULE_DIR");
        override_string(
            &mut self.router.default_team,
            "RELAYPOST_ROUTER_DEFAULT_TEAM",
        );
        override_u32(&mut self.router.max_retries, "RELAYPOST_ROUTER_MAX_RETRIES");

        // Forwarder
        override_bool(&mut self.forwarder.enabled, "RELAYPOST_FORWARDER_ENABLED");
        override_string(
            &mut self.forwarder.alert_queue,
            "RELAYPOST_FORWARDER_ALERT_QUEUE",
        );
        override_string(&mut self.forwarder.dlq, "RELAYPOST_FORWARDER_DLQ");
        override_string(
            &mut self.forwarder.webhook_url,
            "RELAYPOST_FORWARDER_WEBHOOK_URL",
        );
        override_string(
            &mut self.forwarder.bearer_token,
            "RELAYPOST_FORWARDER_BEARER_TOKEN",
        );
        override_u64(
            &mut self.forwarder.timeout_secs,
            "RELAYPOST_FORWARDER_TIMEOUT_SECS",
        );
        override_u64(
            &mut self.forwarder.backoff_base_secs,
            "RELAYPOST_FORWARDER_BACKOFF_BASE_SECS",
        );
        override_u64(
            &mut self.forwarder.backoff_cap_secs,
            "RELAYPOST_FORWARDER_BACKOFF_CAP_SECS",
        );
        override_u32(
            &mut self.forwarder.max_retries,
            "RELAYPOST_FORWARDER_MAX_RETRIES",
        );

        // Limiter
        override_string(&mut self.limiter.name, "RELAYPOST_LIMITER_NAME");
        override_u64(
            &mut self.limiter.max_requests,
            "RELAYPOST_LIMITER_MAX_REQUESTS",
        );
        override_u64(&mut self.limiter.window_secs, "RELAYPOST_LIMITER_WINDOW_SECS");

        // Breaker
        override_string(&mut self.breaker.name, "RELAYPOST_BREAKER_NAME");
        override_u32(
            &mut self.breaker.failure_threshold,
            "RELAYPOST_BREAKER_FAILURE_THRESHOLD",
        );
        override_u64(
            &mut self.breaker.timeout_secs,
            "RELAYPOST_BREAKER_TIMEOUT_SECS",
        );

        // Dedup
        override_u64(&mut self.dedup.threshold, "RELAYPOST_DEDUP_THRESHOLD");
        override_u64(&mut self.dedup.window_secs, "RELAYPOST_DEDUP_WINDOW_SECS");
        override_u64(
            &mut self.dedup.triggered_window_secs,
            "RELAYPOST_DEDUP_TRIGGERED_WINDOW_SECS",
        );

        // Janitor
        override_u64(
            &mut self.janitor.heartbeat_interval_secs,
            "RELAYPOST_JANITOR_HEARTBEAT_INTERVAL_SECS",
        );
        override_u64(
            &mut self.janitor.timeout_secs,
            "RELAYPOST_JANITOR_TIMEOUT_SECS",
        );
        override_u64(&mut self.janitor.scan_count, "RELAYPOST_JANITOR_SCAN_COUNT");

        // Metrics
        override_bool(&mut self.metrics.enabled, "RELAYPOST_METRICS_ENABLED");
        override_string(
            &mut self.metrics.listen_addr,
            "RELAYPOST_METRICS_LISTEN_ADDR",
        );
        override_u16(&mut self.metrics.port, "RELAYPOST_METRICS_PORT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), RelaypostError> {
        // log_level 검증
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".to_owned(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            }
            .into());
        }

        // log_format 검증
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            }
            .into());
        }

        if self.store.key_prefix.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "store.key_prefix".to_owned(),
                reason: "key prefix must not be empty".to_owned(),
            }
            .into());
        }

        if self.store.claim_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "store.claim_timeout_secs".to_owned(),
                reason: "claim timeout must be at least 1 second".to_owned(),
            }
            .into());
        }

        if self.store.connect_max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                field: "store.connect_max_attempts".to_owned(),
                reason: "at least one connection attempt is required".to_owned(),
            }
            .into());
        }

        if self.router.enabled {
            for (field, value) in [
                ("router.input_queue", &self.router.input_queue),
                ("router.alert_queue", &self.router.alert_queue),
                ("router.dlq", &self.router.dlq),
                ("router.rule_dir", &self.router.rule_dir),
            ] {
                if value.is_empty() {
                    return Err(ConfigError::InvalidValue {
                        field: field.to_owned(),
                        reason: "must not be empty when router is enabled".to_owned(),
                    }
                    .into());
                }
            }
        }

        if self.forwarder.enabled {
            if self.forwarder.webhook_url.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "forwarder.webhook_url".to_owned(),
                    reason: "must not be empty when forwarder is enabled".to_owned(),
                }
                .into());
            }
            if !self.forwarder.webhook_url.starts_with("http://")
                && !self.forwarder.webhook_url.starts_with("https://")
            {
                return Err(ConfigError::InvalidValue {
                    field: "forwarder.webhook_url".to_owned(),
                    reason: "must start with http:// or https://".to_owned(),
                }
                .into());
            }
            if self.forwarder.alert_queue.is_empty() || self.forwarder.dlq.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "forwarder.alert_queue".to_owned(),
                    reason: "queue names must not be empty when forwarder is enabled".to_owned(),
                }
                .into());
            }
        }

        if self.limiter.max_requests == 0 || self.limiter.window_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "limiter.max_requests".to_owned(),
                reason: "max_requests and window_secs must both be positive".to_owned(),
            }
            .into());
        }

        if self.breaker.failure_threshold == 0 || self.breaker.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "breaker.failure_threshold".to_owned(),
                reason: "failure_threshold and timeout_secs must both be positive".to_owned(),
            }
            .into());
        }

        if self.dedup.threshold == 0 || self.dedup.window_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "dedup.threshold".to_owned(),
                reason: "threshold and window_secs must both be positive".to_owned(),
            }
            .into());
        }

        // 하트비트가 TTL보다 길면 살아있는 워커도 죽은 것으로 오판됩니다
        if self.janitor.heartbeat_interval_secs >= self.janitor.timeout_secs {
            return Err(ConfigError::InvalidValue {
                field: "janitor.heartbeat_interval_secs".to_owned(),
                reason: "heartbeat interval must be shorter than janitor.timeout_secs".to_owned(),
            }
            .into());
        }

        if self.janitor.scan_count == 0 {
            return Err(ConfigError::InvalidValue {
                field: "janitor.scan_count".to_owned(),
                reason: "scan batch size must be at least 1".to_owned(),
            }
            .into());
        }

        Ok(())
    }
}

// Default는 derive 매크로로 자동 생성 (각 필드가 Default를 구현하므로)

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
    /// 데이터 디렉토리
    pub data_dir: String,
    /// PID 파일 경로
    pub pid_file: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
            data_dir: "/var/lib/relaypost".to_owned(),
            pid_file: "/var/run/relaypost.pid".to_owned(),
        }
    }
}

/// 공유 큐 스토어 설정
///
/// 모든 워커 조율은 이 스토어 하나를 통해서만 이루어집니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// 스토어 연결 URL (`memory://`는 내장 인메모리 스토어)
    pub url: String,
    /// 모든 키 앞에 붙는 네임스페이스 접두어
    pub key_prefix: String,
    /// blocking claim 최대 대기 시간 (초)
    pub claim_timeout_secs: u64,
    /// 접속 실패 시 최대 재시도 횟수 (소진 시 프로세스 종료)
    pub connect_max_attempts: u32,
    /// 재접속 백오프 초기값 (밀리초)
    pub connect_backoff_base_ms: u64,
    /// 재접속 백오프 상한 (밀리초)
    pub connect_backoff_cap_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "memory://".to_owned(),
            key_prefix: "relaypost".to_owned(),
            claim_timeout_secs: 5,
            connect_max_attempts: 10,
            connect_backoff_base_ms: 500,
            connect_backoff_cap_ms: 30_000,
        }
    }
}

/// 라우터 워커 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 입력 큐 이름
    pub input_queue: String,
    /// 알림 큐 이름 (매칭된 이벤트가 전달되는 곳)
    pub alert_queue: String,
    /// 라우터 DLQ 이름
    pub dlq: String,
    /// 규칙 YAML 디렉토리
    pub rule_dir: String,
    /// 호스트-팀 매핑에 없는 호스트의 기본 담당 팀
    pub default_team: String,
    /// 메시지당 최대 재처리 횟수
    pub max_retries: u32,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            input_queue: "relaypost:queue:input".to_owned(),
            alert_queue: "relaypost:queue:alert".to_owned(),
            dlq: "relaypost:dlq:router".to_owned(),
            rule_dir: "/etc/relaypost/rules".to_owned(),
            default_team: "noc".to_owned(),
            max_retries: 3,
        }
    }
}

/// 포워더 워커 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwarderConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 소비할 알림 큐 이름 (router.alert_queue와 일치해야 함)
    pub alert_queue: String,
    /// 포워더 DLQ 이름
    pub dlq: String,
    /// 인시던트 매니저 webhook URL
    pub webhook_url: String,
    /// Bearer 인증 토큰 (환경변수 `RELAYPOST_FORWARDER_BEARER_TOKEN` 권장)
    pub bearer_token: String,
    /// HTTP 요청 타임아웃 (초)
    pub timeout_secs: u64,
    /// 재시도 백오프 초기값 (초)
    pub backoff_base_secs: u64,
    /// 재시도 백오프 상한 (초)
    pub backoff_cap_secs: u64,
    /// 알림당 최대 재전송 횟수
    pub max_retries: u32,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            alert_queue: "relaypost:queue:alert".to_owned(),
            dlq: "relaypost:dlq:forwarder".to_owned(),
            webhook_url: String::new(),
            bearer_token: String::new(),
            timeout_secs: 10,
            backoff_base_secs: 2,
            backoff_cap_secs: 60,
            max_retries: 5,
        }
    }
}

/// 레이트 리미터 설정
///
/// 슬라이딩 윈도우는 fleet 전체에 걸쳐 하나로 공유됩니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimiterConfig {
    /// 리미터 이름 (스토어 키에 사용)
    pub name: String,
    /// 윈도우당 최대 허용 호출 수
    pub max_requests: u64,
    /// 윈도우 길이 (초)
    pub window_secs: u64,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            name: "incident-webhook".to_owned(),
            max_requests: 30,
            window_secs: 60,
        }
    }
}

/// 서킷 브레이커 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// 브레이커 이름 (스토어 키에 사용)
    pub name: String,
    /// OPEN 전환에 필요한 연속 실패 횟수
    pub failure_threshold: u32,
    /// OPEN 상태 유지 시간 (초), 경과 후 HALF_OPEN
    pub timeout_secs: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            name: "incident-webhook".to_owned(),
            failure_threshold: 5,
            timeout_secs: 300,
        }
    }
}

/// 미처리 이벤트 중복 제거 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// 메타 알림을 발생시키는 반복 횟수 임계값
    pub threshold: u64,
    /// 카운터 키 유효 기간 (초)
    pub window_secs: u64,
    /// 발동 마커 유효 기간 (초), 이 기간 동안 같은 시그니처는 무시됩니다
    pub triggered_window_secs: u64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            threshold: 100,
            window_secs: 3600,
            triggered_window_secs: 86_400,
        }
    }
}

/// 하트비트/Janitor 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JanitorConfig {
    /// 하트비트 갱신 주기 (초)
    pub heartbeat_interval_secs: u64,
    /// 하트비트 TTL (초) — 만료되면 Janitor가 해당 워커를 죽은 것으로 간주
    pub timeout_secs: u64,
    /// 워커 레지스트리 incremental scan 배치 크기
    pub scan_count: u64,
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 10,
            timeout_secs: 60,
            scan_count: 100,
        }
    }
}

/// 메트릭 엔드포인트 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 수신 주소
    pub listen_addr: String,
    /// 수신 포트
    pub port: u16,
    /// 스크레이프 경로 (현재 `/metrics`만 지원)
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9100,
            endpoint: "/metrics".to_owned(),
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_u16(target: &mut u16, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u16>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u16 from env var, ignoring"
            ),
        }
    }
}

fn override_u32(target: &mut u32, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u32>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u32 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}
