//! 라우팅 규칙 엔진 -- YAML 기반 이벤트 매칭
//!
//! YAML 규칙을 로드하여 불변 스냅샷으로 컴파일하고,
//! 이벤트 엔벨로프에 대해 first-match-wins 평가를 수행합니다.
//!
//! # 규칙 형식
//! ```yaml
//! id: prod_disk_errors
//! priority: 10
//! match_type: contains
//! match_string: "ERROR"
//! severity: high
//! team: storage
//! prod_handling: page_and_ticket
//! ```
//!
//! # 아키텍처
//! - [`RuleCache`]: 현재 스냅샷의 원자적 교체/조회 핸들
//! - [`loader`]: YAML 파일 로딩 및 유효성 검증
//! - [`snapshot`]: 컴파일된 규칙 집합 (정렬, 정규식 사전 컴파일)
//! - [`matcher`]: first-match-wins 매칭 로직
//! - [`types`]: 규칙 데이터 구조 정의

pub mod loader;
pub mod matcher;
pub mod snapshot;
pub mod types;

pub use loader::RuleLoader;
pub use matcher::match_event;
pub use snapshot::{CompiledRule, RuleSnapshot};
pub use types::{MatchType, RouteRule};

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use tokio::sync::watch;

use crate::error::RelayPipelineError;

/// 규칙 캐시 -- 현재 스냅샷의 공유 핸들
///
/// 스냅샷은 통째로만 교체되므로 매칭 중인 워커는 언제나 자신이 집은
/// 세대를 끝까지 봅니다. 핸들은 값싸게 복제하여 워커마다 소유시킵니다.
///
/// # 사용 예시
/// ```ignore
/// let cache = RuleCache::empty();
/// cache.reload_from_dir("/etc/relaypost/rules", dev_hosts, team_map).await?;
///
/// let snapshot = cache.current();
/// if let Some(matched) = match_event(&envelope, &snapshot) {
///     // 규칙 적용
/// }
/// ```
#[derive(Clone)]
pub struct RuleCache {
    tx: Arc<watch::Sender<Arc<RuleSnapshot>>>,
}

impl RuleCache {
    /// 주어진 스냅샷으로 캐시를 생성합니다.
    pub fn new(initial: RuleSnapshot) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(initial));
        Self { tx: Arc::new(tx) }
    }

    /// 빈 스냅샷으로 캐시를 생성합니다.
    pub fn empty() -> Self {
        Self::new(RuleSnapshot::empty())
    }

    /// 현재 스냅샷을 반환합니다.
    ///
    /// 반환된 `Arc`를 쥐고 있는 동안 이후의 교체는 보이지 않습니다.
    pub fn current(&self) -> Arc<RuleSnapshot> {
        self.tx.borrow().clone()
    }

    /// 스냅샷을 원자적으로 교체합니다.
    pub fn swap(&self, snapshot: RuleSnapshot) {
        self.tx.send_replace(Arc::new(snapshot));
    }

    /// 디렉토리에서 규칙을 다시 로드하고 스냅샷을 교체합니다.
    ///
    /// 로드에 실패하면 기존 스냅샷이 그대로 유지됩니다.
    /// 성공 시 로드된 규칙 수를 반환합니다.
    pub async fn reload_from_dir(
        &self,
        dir: impl AsRef<Path>,
        dev_hosts: HashSet<String>,
        host_team_map: HashMap<String, String>,
    ) -> Result<usize, RelayPipelineError> {
        let rules = RuleLoader::load_directory(dir).await?;
        let count = rules.len();
        self.swap(RuleSnapshot::new(rules, dev_hosts, host_team_map));
        Ok(count)
    }
}

impl Default for RuleCache {
    fn default() -> Self {
        Self::empty()
    }
}
