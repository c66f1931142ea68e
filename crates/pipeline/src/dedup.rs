//! 미처리 이벤트 중복 제거
//!
//! 어떤 규칙에도 매칭되지 않은 이벤트를 (호스트, 내용 시그니처)별로
//! 집계합니다. 카운터 증가와 임계값 판정은 스토어의 원자적 연산 하나로
//! 수행되므로, 워커 수와 무관하게 임계값당 메타 알림은 정확히 한 번입니다.

use std::fmt::Write as _;
use std::time::Duration;

use sha2::{Digest, Sha256};

use relaypost_store::{DedupVerdict, QueueStore, SharedStore};

use relaypost_core::config::DedupConfig;

use crate::error::RelayPipelineError;

/// 내용 시그니처의 해시 길이 (hex 문자 수)
const SIGNATURE_HEX_LEN: usize = 16;

/// 미처리 이벤트 집계기
pub struct UnhandledDeduper {
    store: SharedStore,
    key_prefix: String,
    threshold: u64,
    count_ttl: Duration,
    trigger_ttl: Duration,
}

impl UnhandledDeduper {
    /// 설정으로 집계기를 생성합니다.
    pub fn new(store: SharedStore, key_prefix: &str, config: &DedupConfig) -> Self {
        Self {
            store,
            key_prefix: key_prefix.to_owned(),
            threshold: config.threshold,
            count_ttl: Duration::from_secs(config.window_secs),
            trigger_ttl: Duration::from_secs(config.triggered_window_secs),
        }
    }

    /// 미처리 이벤트 하나를 집계하고 판정을 반환합니다.
    ///
    /// 판정이 [`DedupVerdict::Triggered`]인 호출자만 메타 알림을 만듭니다.
    pub async fn note_unhandled(
        &self,
        hostname: &str,
        message: &str,
    ) -> Result<DedupVerdict, RelayPipelineError> {
        let signature = content_signature(message);
        let counter_key = format!(
            "{}:unhandled:{}:{}",
            self.key_prefix, hostname, signature
        );
        let triggered_key = format!("{}:triggered", counter_key);

        let verdict = self
            .store
            .dedup_increment(
                &counter_key,
                &triggered_key,
                self.count_ttl,
                self.trigger_ttl,
                self.threshold,
            )
            .await?;
        Ok(verdict)
    }
}

/// 메시지 내용 시그니처를 계산합니다.
///
/// SHA-256 해시의 앞 16 hex 문자를 사용합니다. 호스트명과 조합되므로
/// 이 길이면 충돌 확률은 운영상 무시할 수 있습니다.
pub fn content_signature(message: &str) -> String {
    let digest = Sha256::digest(message.as_bytes());
    let mut out = String::with_capacity(SIGNATURE_HEX_LEN);
    for byte in digest.iter().take(SIGNATURE_HEX_LEN / 2) {
        // String 쓰기는 실패하지 않습니다
        let _ = write!(out, "{:02x}", byte);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaypost_store::MemoryStore;

    fn deduper(store: SharedStore, threshold: u64) -> UnhandledDeduper {
        let config = DedupConfig {
            threshold,
            window_secs: 3600,
            triggered_window_secs: 86_400,
        };
        UnhandledDeduper::new(store, "relaypost", &config)
    }

    #[test]
    fn signature_is_stable_and_fixed_length() {
        let a = content_signature("unknown event from fw-03");
        let b = content_signature("unknown event from fw-03");
        assert_eq!(a, b);
        assert_eq!(a.len(), SIGNATURE_HEX_LEN);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn different_messages_have_different_signatures() {
        assert_ne!(
            content_signature("unknown event A"),
            content_signature("unknown event B")
        );
    }

    #[tokio::test]
    async fn triggers_exactly_once_at_threshold() {
        let store = MemoryStore::shared();
        let deduper = deduper(store, 3);

        assert_eq!(
            deduper.note_unhandled("h1", "mystery").await.unwrap(),
            DedupVerdict::Counted(1)
        );
        assert_eq!(
            deduper.note_unhandled("h1", "mystery").await.unwrap(),
            DedupVerdict::Counted(2)
        );
        assert_eq!(
            deduper.note_unhandled("h1", "mystery").await.unwrap(),
            DedupVerdict::Triggered
        );
        // 발동 이후에는 같은 시그니처가 무시됩니다
        assert_eq!(
            deduper.note_unhandled("h1", "mystery").await.unwrap(),
            DedupVerdict::AlreadyTriggered
        );
    }

    #[tokio::test]
    async fn hosts_are_counted_separately() {
        let store = MemoryStore::shared();
        let deduper = deduper(store, 2);

        deduper.note_unhandled("h1", "mystery").await.unwrap();
        // 다른 호스트의 같은 메시지는 별도 카운터입니다
        assert_eq!(
            deduper.note_unhandled("h2", "mystery").await.unwrap(),
            DedupVerdict::Counted(1)
        );
    }

    #[tokio::test]
    async fn threshold_one_triggers_immediately() {
        let store = MemoryStore::shared();
        let deduper = deduper(store, 1);

        assert_eq!(
            deduper.note_unhandled("h1", "first sighting").await.unwrap(),
            DedupVerdict::Triggered
        );
    }
}
