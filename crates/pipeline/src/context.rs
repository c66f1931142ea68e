//! 워커 실행 컨텍스트 -- 호출 체인을 따라 명시적으로 전달되는 상태
//!
//! 스토어 핸들, 해석된 설정, 워커 신원을 하나로 묶어 전달합니다.
//! 전역 싱글턴 없이 모든 협력자가 이 컨텍스트만 바라봅니다.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use relaypost_store::SharedStore;

use crate::config::PipelineConfig;

/// 워커 레지스트리 키 TTL
///
/// 하트비트보다 훨씬 길게 잡아 워커가 죽은 뒤에도 Janitor가 처리 목록의
/// 위치를 찾을 수 있게 합니다. 하트비트 태스크가 주기적으로 연장하며,
/// 영구히 사라진 워커의 항목은 이 TTL로 정리됩니다.
pub const REGISTRY_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// 워커 신원과 스토어 키 이름
///
/// 워커 하나가 소유하는 처리 목록, 하트비트 키, 레지스트리 키는
/// 모두 워커 ID에서 파생됩니다.
#[derive(Debug, Clone)]
pub struct WorkerIdentity {
    /// 워커 ID (`{role}-{uuid}`)
    pub worker_id: String,
    /// 역할 이름 (router, forwarder)
    pub role: String,
    /// 클레임 대상 큐 (죽은 워커 복구 시 메시지가 되돌아가는 곳)
    pub origin_queue: String,
    /// 이 워커 전용 처리 목록
    pub processing_list: String,
    /// 하트비트 키 (TTL = Janitor 타임아웃)
    pub heartbeat_key: String,
    /// 레지스트리 키 (값 = origin_queue)
    pub registry_key: String,
}

impl WorkerIdentity {
    /// 새 워커 신원을 생성합니다. 워커 ID는 UUID v4로 유일성을 보장합니다.
    pub fn new(key_prefix: &str, role: &str, origin_queue: &str) -> Self {
        let worker_id = format!("{}-{}", role, uuid::Uuid::new_v4());
        Self {
            processing_list: processing_list(key_prefix, &worker_id),
            heartbeat_key: heartbeat_key(key_prefix, &worker_id),
            registry_key: registry_key(key_prefix, &worker_id),
            worker_id,
            role: role.to_owned(),
            origin_queue: origin_queue.to_owned(),
        }
    }
}

/// 워커 실행 컨텍스트
///
/// 클론 가능한 값들의 묶음이므로 태스크마다 복제해 소유시킵니다.
#[derive(Clone)]
pub struct WorkerContext {
    /// 공유 큐 스토어
    pub store: SharedStore,
    /// 파이프라인 설정
    pub config: Arc<PipelineConfig>,
    /// 워커 신원
    pub identity: WorkerIdentity,
    /// 종료 신호
    pub shutdown: CancellationToken,
}

impl WorkerContext {
    /// 컨텍스트를 생성합니다.
    pub fn new(
        store: SharedStore,
        config: Arc<PipelineConfig>,
        identity: WorkerIdentity,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            store,
            config,
            identity,
            shutdown,
        }
    }
}

// ─── 스토어 키 네이밍 ───────────────────────────────────────────────

/// 워커의 처리 목록 이름
pub fn processing_list(key_prefix: &str, worker_id: &str) -> String {
    format!("{}:processing:{}", key_prefix, worker_id)
}

/// 워커의 하트비트 키 이름
pub fn heartbeat_key(key_prefix: &str, worker_id: &str) -> String {
    format!("{}:heartbeat:{}", key_prefix, worker_id)
}

/// 워커의 레지스트리 키 이름
pub fn registry_key(key_prefix: &str, worker_id: &str) -> String {
    format!("{}:workers:{}", key_prefix, worker_id)
}

/// 레지스트리 스캔용 접두어. Janitor가 이 접두어로 워커를 열거합니다.
pub fn registry_prefix(key_prefix: &str) -> String {
    format!("{}:workers:", key_prefix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_derives_keys_from_worker_id() {
        let identity = WorkerIdentity::new("relaypost", "router", "relaypost:queue:input");
        assert!(identity.worker_id.starts_with("router-"));
        assert_eq!(
            identity.processing_list,
            format!("relaypost:processing:{}", identity.worker_id)
        );
        assert_eq!(
            identity.heartbeat_key,
            format!("relaypost:heartbeat:{}", identity.worker_id)
        );
        assert_eq!(
            identity.registry_key,
            format!("relaypost:workers:{}", identity.worker_id)
        );
    }

    #[test]
    fn identities_are_unique() {
        let a = WorkerIdentity::new("relaypost", "router", "q");
        let b = WorkerIdentity::new("relaypost", "router", "q");
        assert_ne!(a.worker_id, b.worker_id);
        assert_ne!(a.processing_list, b.processing_list);
    }

    #[test]
    fn registry_keys_fall_under_scan_prefix() {
        let identity = WorkerIdentity::new("relaypost", "forwarder", "q");
        assert!(identity.registry_key.starts_with(&registry_prefix("relaypost")));
        // 접두어를 벗겨내면 워커 ID가 나옵니다
        let stripped = identity
            .registry_key
            .strip_prefix(&registry_prefix("relaypost"))
            .unwrap();
        assert_eq!(stripped, identity.worker_id);
    }
}
