//! fleet 전체 레이트 리미터
//!
//! 슬라이딩 윈도우 판정은 공유 큐 스토어가 원자적으로 수행하므로
//! 모든 포워더 워커가 하나의 윈도우를 나눠 씁니다.
//! 스토어 장애 시에는 경고 후 허용합니다(fail open): 과잉 알림이
//! 알림 유실보다 낫다는 정책입니다.

use std::time::Duration;

use relaypost_store::{QueueStore, SharedStore};

use relaypost_core::config::LimiterConfig;

/// 슬라이딩 윈도우 레이트 리미터 핸들
pub struct RateLimiter {
    store: SharedStore,
    key: String,
    window: Duration,
    max_requests: u64,
}

impl RateLimiter {
    /// 설정으로 리미터 핸들을 생성합니다.
    ///
    /// 같은 `key_prefix`와 이름을 쓰는 모든 워커가 같은 윈도우를 공유합니다.
    pub fn new(store: SharedStore, key_prefix: &str, config: &LimiterConfig) -> Self {
        Self {
            store,
            key: format!("{}:limiter:{}", key_prefix, config.name),
            window: Duration::from_secs(config.window_secs),
            max_requests: config.max_requests,
        }
    }

    /// 호출 하나를 윈도우에 기록하고 허용 여부를 반환합니다.
    ///
    /// 거부된 호출은 윈도우에 기록되지 않습니다.
    pub async fn is_allowed(&self) -> bool {
        match self
            .store
            .sliding_window_allow(&self.key, self.window, self.max_requests)
            .await
        {
            Ok(allowed) => allowed,
            Err(e) => {
                tracing::warn!(
                    key = %self.key,
                    error = %e,
                    "rate limiter store check failed, allowing call"
                );
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaypost_store::MemoryStore;

    fn limiter(store: SharedStore, max: u64) -> RateLimiter {
        let config = LimiterConfig {
            name: "test".to_owned(),
            max_requests: max,
            window_secs: 60,
        };
        RateLimiter::new(store, "relaypost", &config)
    }

    #[tokio::test]
    async fn allows_up_to_max_then_rejects() {
        let store = MemoryStore::shared();
        let limiter = limiter(store, 2);

        assert!(limiter.is_allowed().await);
        assert!(limiter.is_allowed().await);
        assert!(!limiter.is_allowed().await);
    }

    #[tokio::test]
    async fn separate_names_have_separate_windows() {
        let store = MemoryStore::shared();
        let first = limiter(store.clone(), 1);
        let second = RateLimiter::new(
            store,
            "relaypost",
            &LimiterConfig {
                name: "other".to_owned(),
                max_requests: 1,
                window_secs: 60,
            },
        );

        assert!(first.is_allowed().await);
        assert!(!first.is_allowed().await);
        // 다른 이름의 윈도우는 영향을 받지 않습니다
        assert!(second.is_allowed().await);
    }

    #[tokio::test(start_paused = true)]
    async fn window_slides_open_after_time_passes() {
        let store = MemoryStore::shared();
        let limiter = limiter(store, 1);

        assert!(limiter.is_allowed().await);
        assert!(!limiter.is_allowed().await);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(limiter.is_allowed().await);
    }
}
