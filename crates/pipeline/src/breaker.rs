//! 공유 서킷 브레이커 핸들
//!
//! 상태 기록은 전부 공유 큐 스토어에 있으므로 fleet의 모든 포워더가
//! 같은 브레이커를 봅니다. 상태 전이는 스토어의 원자적 연산이 수행하며,
//! 이 핸들은 키 조합과 전이 로깅만 담당합니다.

use std::time::Duration;

use relaypost_store::{BreakerState, QueueStore, SharedStore};

use relaypost_core::config::BreakerConfig;

use crate::error::RelayPipelineError;

/// 서킷 브레이커 핸들
pub struct CircuitBreaker {
    store: SharedStore,
    key: String,
    failure_threshold: u64,
    open_timeout: Duration,
}

impl CircuitBreaker {
    /// 설정으로 브레이커 핸들을 생성합니다.
    pub fn new(store: SharedStore, key_prefix: &str, config: &BreakerConfig) -> Self {
        Self {
            store,
            key: format!("{}:breaker:{}", key_prefix, config.name),
            failure_threshold: u64::from(config.failure_threshold),
            open_timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// 현재 브레이커 상태를 반환합니다.
    ///
    /// OPEN 유지 시간이 지난 브레이커는 이 조회 시점에 HALF_OPEN으로
    /// 전이됩니다 (지연 전이).
    pub async fn state(&self) -> Result<BreakerState, RelayPipelineError> {
        let state = self.store.breaker_state(&self.key, self.open_timeout).await?;
        if state == BreakerState::HalfOpen {
            tracing::debug!(key = %self.key, "circuit breaker half-open, probing downstream");
        }
        Ok(state)
    }

    /// 성공을 기록합니다. 상태와 실패 카운터가 완전히 리셋됩니다.
    pub async fn record_success(&self) -> Result<(), RelayPipelineError> {
        self.store.breaker_record_success(&self.key).await?;
        Ok(())
    }

    /// 실패를 기록하고 기록 후의 상태를 반환합니다.
    ///
    /// CLOSED에서 연속 실패가 임계값에 닿으면 OPEN으로,
    /// HALF_OPEN에서의 실패는 즉시 OPEN으로 되돌아갑니다.
    pub async fn record_failure(&self) -> Result<BreakerState, RelayPipelineError> {
        let state = self
            .store
            .breaker_record_failure(&self.key, self.failure_threshold)
            .await?;
        if state == BreakerState::Open {
            tracing::warn!(
                key = %self.key,
                threshold = self.failure_threshold,
                "circuit breaker open, suspending downstream calls"
            );
        }
        Ok(state)
    }
}
