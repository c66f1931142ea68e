//! 파이프라인 설정
//!
//! [`PipelineConfig`]는 core의 [`RelaypostConfig`](relaypost_core::config::RelaypostConfig)에서
//! 워커들이 사용하는 섹션만 추려 담고, 라우팅 전용 확장 필드를 더합니다.
//!
//! # 사용 예시
//! ```ignore
//! use relaypost_core::config::RelaypostConfig;
//! use relaypost_pipeline::config::PipelineConfig;
//!
//! let core_config = RelaypostConfig::default();
//! let config = PipelineConfig::from_core(&core_config);
//! ```

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use relaypost_core::config::{
    BreakerConfig, DedupConfig, ForwarderConfig, JanitorConfig, LimiterConfig, RelaypostConfig,
    RouterConfig, StoreConfig,
};

use crate::error::RelayPipelineError;

/// 파이프라인 설정
///
/// core 설정의 워커 관련 섹션에 파이프라인 확장 필드를 더한 것입니다.
/// 워커, 하트비트, Janitor가 모두 이 하나의 설정을 공유합니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// 공유 큐 스토어 설정
    pub store: StoreConfig,
    /// 라우터 워커 설정
    pub router: RouterConfig,
    /// 포워더 워커 설정
    pub forwarder: ForwarderConfig,
    /// 레이트 리미터 설정
    pub limiter: LimiterConfig,
    /// 서킷 브레이커 설정
    pub breaker: BreakerConfig,
    /// 미처리 이벤트 중복 제거 설정
    pub dedup: DedupConfig,
    /// 하트비트/Janitor 설정
    pub janitor: JanitorConfig,

    // --- 확장 설정 (core에 없는 추가 필드) ---
    /// dev 환경으로 취급할 호스트명 목록
    ///
    /// 여기 속한 호스트의 이벤트는 규칙의 `dev_handling`이 적용됩니다.
    pub dev_hosts: HashSet<String>,
    /// 호스트명 -> 담당 팀 매핑 (메타 알림의 팀 결정에 사용)
    pub host_team_map: HashMap<String, String>,
    /// 역할별 워커 수 (프로세스 내 동시 워커 태스크 수)
    pub workers_per_role: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            router: RouterConfig::default(),
            forwarder: ForwarderConfig::default(),
            limiter: LimiterConfig::default(),
            breaker: BreakerConfig::default(),
            dedup: DedupConfig::default(),
            janitor: JanitorConfig::default(),
            dev_hosts: HashSet::new(),
            host_team_map: HashMap::new(),
            workers_per_role: 1,
        }
    }
}

impl PipelineConfig {
    /// core의 `RelaypostConfig`에서 파이프라인 설정을 생성합니다.
    ///
    /// core 설정에 없는 확장 필드는 기본값이 적용됩니다.
    pub fn from_core(core: &RelaypostConfig) -> Self {
        Self {
            store: core.store.clone(),
            router: core.router.clone(),
            forwarder: core.forwarder.clone(),
            limiter: core.limiter.clone(),
            breaker: core.breaker.clone(),
            dedup: core.dedup.clone(),
            janitor: core.janitor.clone(),
            ..Self::default()
        }
    }

    /// blocking claim 최대 대기 시간
    pub fn claim_timeout(&self) -> Duration {
        Duration::from_secs(self.store.claim_timeout_secs)
    }

    /// 하트비트 갱신 주기
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.janitor.heartbeat_interval_secs)
    }

    /// 하트비트 TTL. 만료된 워커는 Janitor가 죽은 것으로 간주합니다.
    pub fn janitor_timeout(&self) -> Duration {
        Duration::from_secs(self.janitor.timeout_secs)
    }

    /// 포워더 webhook 요청 타임아웃
    pub fn forwarder_timeout(&self) -> Duration {
        Duration::from_secs(self.forwarder.timeout_secs)
    }

    /// 포워더 재시도 백오프 초기값
    pub fn forwarder_backoff_base(&self) -> Duration {
        Duration::from_secs(self.forwarder.backoff_base_secs)
    }

    /// 포워더 재시도 백오프 상한
    pub fn forwarder_backoff_cap(&self) -> Duration {
        Duration::from_secs(self.forwarder.backoff_cap_secs)
    }

    /// 스토어 재접속 백오프 초기값
    pub fn connect_backoff_base(&self) -> Duration {
        Duration::from_millis(self.store.connect_backoff_base_ms)
    }

    /// 스토어 재접속 백오프 상한
    pub fn connect_backoff_cap(&self) -> Duration {
        Duration::from_millis(self.store.connect_backoff_cap_ms)
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), RelayPipelineError> {
        const MAX_WORKERS_PER_ROLE: usize = 64;

        fn require_non_empty(field: &str, value: &str) -> Result<(), RelayPipelineError> {
            if value.trim().is_empty() {
                return Err(RelayPipelineError::Config {
                    field: field.to_owned(),
                    reason: "must not be empty".to_owned(),
                });
            }
            Ok(())
        }

        fn require_positive(field: &str, value: u64) -> Result<(), RelayPipelineError> {
            if value == 0 {
                return Err(RelayPipelineError::Config {
                    field: field.to_owned(),
                    reason: "must be greater than 0".to_owned(),
                });
            }
            Ok(())
        }

        require_non_empty("store.key_prefix", &self.store.key_prefix)?;
        require_positive("store.claim_timeout_secs", self.store.claim_timeout_secs)?;
        require_positive(
            "store.connect_max_attempts",
            u64::from(self.store.connect_max_attempts),
        )?;
        if self.store.connect_backoff_cap_ms < self.store.connect_backoff_base_ms {
            return Err(RelayPipelineError::Config {
                field: "store.connect_backoff_cap_ms".to_owned(),
                reason: "must be at least connect_backoff_base_ms".to_owned(),
            });
        }

        if self.router.enabled {
            require_non_empty("router.input_queue", &self.router.input_queue)?;
            require_non_empty("router.alert_queue", &self.router.alert_queue)?;
            require_non_empty("router.dlq", &self.router.dlq)?;
            require_non_empty("router.rule_dir", &self.router.rule_dir)?;
            require_non_empty("router.default_team", &self.router.default_team)?;
        }

        if self.forwarder.enabled {
            require_non_empty("forwarder.alert_queue", &self.forwarder.alert_queue)?;
            require_non_empty("forwarder.dlq", &self.forwarder.dlq)?;
            require_non_empty("forwarder.webhook_url", &self.forwarder.webhook_url)?;
            require_positive("forwarder.timeout_secs", self.forwarder.timeout_secs)?;
            if self.forwarder.backoff_cap_secs < self.forwarder.backoff_base_secs {
                return Err(RelayPipelineError::Config {
                    field: "forwarder.backoff_cap_secs".to_owned(),
                    reason: "must be at least backoff_base_secs".to_owned(),
                });
            }
        }

        // 라우터가 넣는 큐와 포워더가 읽는 큐는 같아야 합니다
        if self.router.enabled
            && self.forwarder.enabled
            && self.router.alert_queue != self.forwarder.alert_queue
        {
            return Err(RelayPipelineError::Config {
                field: "forwarder.alert_queue".to_owned(),
                reason: format!(
                    "must match router.alert_queue ('{}' != '{}')",
                    self.forwarder.alert_queue, self.router.alert_queue
                ),
            });
        }

        require_non_empty("limiter.name", &self.limiter.name)?;
        require_positive("limiter.window_secs", self.limiter.window_secs)?;

        require_non_empty("breaker.name", &self.breaker.name)?;
        require_positive(
            "breaker.failure_threshold",
            u64::from(self.breaker.failure_threshold),
        )?;
        require_positive("breaker.timeout_secs", self.breaker.timeout_secs)?;

        require_positive("dedup.threshold", self.dedup.threshold)?;
        require_positive("dedup.window_secs", self.dedup.window_secs)?;
        require_positive(
            "dedup.triggered_window_secs",
            self.dedup.triggered_window_secs,
        )?;

        require_positive(
            "janitor.heartbeat_interval_secs",
            self.janitor.heartbeat_interval_secs,
        )?;
        require_positive("janitor.scan_count", self.janitor.scan_count)?;
        // TTL이 갱신 주기보다 짧으면 살아있는 워커가 죽은 것으로 보입니다
        if self.janitor.timeout_secs <= self.janitor.heartbeat_interval_secs {
            return Err(RelayPipelineError::Config {
                field: "janitor.timeout_secs".to_owned(),
                reason: "must be greater than heartbeat_interval_secs".to_owned(),
            });
        }

        if self.workers_per_role == 0 || self.workers_per_role > MAX_WORKERS_PER_ROLE {
            return Err(RelayPipelineError::Config {
                field: "workers_per_role".to_owned(),
                reason: format!("must be 1-{}", MAX_WORKERS_PER_ROLE),
            });
        }

        Ok(())
    }
}

/// 파이프라인 설정 빌더
///
/// 섹션 단위 교체와 확장 필드 설정을 지원합니다.
#[derive(Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 스토어 설정을 교체합니다.
    pub fn store(mut self, store: StoreConfig) -> Self {
        self.config.store = store;
        self
    }

    /// 라우터 설정을 교체합니다.
    pub fn router(mut self, router: RouterConfig) -> Self {
        self.config.router = router;
        self
    }

    /// 포워더 설정을 교체합니다.
    pub fn forwarder(mut self, forwarder: ForwarderConfig) -> Self {
        self.config.forwarder = forwarder;
        self
    }

    /// 레이트 리미터 설정을 교체합니다.
    pub fn limiter(mut self, limiter: LimiterConfig) -> Self {
        self.config.limiter = limiter;
        self
    }

    /// 서킷 브레이커 설정을 교체합니다.
    pub fn breaker(mut self, breaker: BreakerConfig) -> Self {
        self.config.breaker = breaker;
        self
    }

    /// 중복 제거 설정을 교체합니다.
    pub fn dedup(mut self, dedup: DedupConfig) -> Self {
        self.config.dedup = dedup;
        self
    }

    /// 하트비트/Janitor 설정을 교체합니다.
    pub fn janitor(mut self, janitor: JanitorConfig) -> Self {
        self.config.janitor = janitor;
        self
    }

    /// dev 환경 호스트 목록을 설정합니다.
    pub fn dev_hosts(mut self, hosts: impl IntoIterator<Item = String>) -> Self {
        self.config.dev_hosts = hosts.into_iter().collect();
        self
    }

    /// 호스트-팀 매핑을 설정합니다.
    pub fn host_team_map(mut self, map: HashMap<String, String>) -> Self {
        self.config.host_team_map = map;
        self
    }

    /// 역할별 워커 수를 설정합니다.
    pub fn workers_per_role(mut self, count: usize) -> Self {
        self.config.workers_per_role = count;
        self
    }

    /// 설정을 검증하고 `PipelineConfig`를 생성합니다.
    pub fn build(self) -> Result<PipelineConfig, RelayPipelineError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
