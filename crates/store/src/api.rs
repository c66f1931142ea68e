//! 큐 스토어 인터페이스 -- 공유 상태에 대한 원자적 프리미티브 정의
//!
//! 워커, 재니터, 속도 제한기, 회로 차단기, 중복 카운터가 공유하는 상태는
//! 모두 이 trait의 단일 호출로만 변경됩니다. 여러 단계로 이루어진 연산
//! ([`sliding_window_allow`](QueueStore::sliding_window_allow),
//! [`dedup_increment`](QueueStore::dedup_increment), 차단기 연산)도 trait
//! 수준에서 한 번의 호출이며, 구현체는 이를 하나의 원자적 실행으로
//! 수행해야 합니다. 호출자 쪽 락이나 읽기-수정-쓰기 쌍은 계약 위반입니다.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use relaypost_core::StoreError;

/// 공유 소유를 위한 trait 객체 별칭
pub type SharedStore = Arc<dyn QueueStore>;

/// 회로 차단기 상태
///
/// 상태 전이 규칙은 [`QueueStore::breaker_state`]와
/// [`QueueStore::breaker_record_failure`] 문서를 참조하세요.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// 정상 -- 호출 허용, 연속 실패 카운트 진행 중
    Closed,
    /// 차단 -- 다운스트림 호출 금지
    Open,
    /// 반개방 -- 시험 호출 허용, 결과에 따라 Closed 또는 Open으로 전이
    HalfOpen,
}

impl BreakerState {
    /// 차단 상태인지 확인합니다.
    pub fn is_open(self) -> bool {
        self == BreakerState::Open
    }

    /// 로그/메트릭 레이블용 소문자 이름을 반환합니다.
    pub fn as_str(self) -> &'static str {
        match self {
            BreakerState::Closed => "closed",
            BreakerState::Open => "open",
            BreakerState::HalfOpen => "half_open",
        }
    }
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 중복 카운터 증가 연산의 판정
///
/// [`QueueStore::dedup_increment`]의 반환값입니다. 하나의 시그니처
/// 수명(트리거 키 TTL) 동안 `Triggered`는 플릿 전체에서 정확히 한
/// 호출자에게만 반환됩니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupVerdict {
    /// 트리거 키가 이미 존재 -- 카운터를 건드리지 않음
    AlreadyTriggered,
    /// 카운터 증가 완료, 현재 값이 임계 미만
    Counted(u64),
    /// 이번 증가로 임계에 정확히 도달 -- 카운터가 트리거 키로 전환됨
    Triggered,
}

/// 공유 큐 스토어
///
/// 모든 연산은 스토어 쪽에서 하나의 원자적 실행입니다. 연산 도중 호출자가
/// 죽어도(태스크 취소 포함) 스토어에는 연산이 전부 적용되었거나 전혀
/// 적용되지 않은 상태만 남습니다.
///
/// 리스트 키(큐, 처리 목록, DLQ)와 문자열 키(하트비트, 레지스트리,
/// 카운터)는 별도 네임스페이스입니다. [`scan_keys`](QueueStore::scan_keys)는
/// 문자열 키만 순회합니다.
#[async_trait]
pub trait QueueStore: Send + Sync {
    // ─── 리스트 연산 ───────────────────────────────────────────

    /// 리스트 꼬리에 페이로드를 추가합니다 (FIFO 입구).
    async fn push(&self, queue: &str, payload: &str) -> Result<(), StoreError>;

    /// 큐 머리에서 메시지 하나를 꺼내 처리 목록 꼬리로 옮깁니다.
    ///
    /// 꺼내기와 옮기기는 한 번의 원자적 실행입니다. 큐가 비어 있으면
    /// 최대 `timeout`까지 블로킹하고, 그 안에 메시지가 도착하지 않으면
    /// `None`을 반환합니다. `timeout`이 0이면 논블로킹 폴입니다.
    ///
    /// 반환된 페이로드는 이미 처리 목록에 들어 있으므로, 호출자가 이
    /// 시점 이후에 죽어도 메시지는 유실되지 않고 재니터가 회수합니다.
    async fn claim(
        &self,
        queue: &str,
        processing: &str,
        timeout: Duration,
    ) -> Result<Option<String>, StoreError>;

    /// `from` 머리의 메시지 하나를 `to` 꼬리로 원자적으로 옮깁니다.
    ///
    /// 논블로킹입니다. `from`이 비어 있으면 `None`을 반환합니다.
    /// 재니터의 처리 목록 회수와 종료 시 자기 목록 드레인이 이 연산을
    /// 반복 호출하는 방식으로 이루어집니다.
    async fn transfer(&self, from: &str, to: &str) -> Result<Option<String>, StoreError>;

    /// 리스트에서 `payload`와 동일한 첫 항목 하나를 제거합니다 (ack).
    ///
    /// 제거된 개수(0 또는 1)를 반환합니다. 0은 다른 경로(재니터 회수)가
    /// 먼저 메시지를 가져갔다는 뜻이며 에러가 아닙니다.
    async fn remove(&self, list: &str, payload: &str) -> Result<u64, StoreError>;

    /// 리스트 길이를 반환합니다. 없는 리스트는 0입니다.
    async fn list_len(&self, list: &str) -> Result<usize, StoreError>;

    // ─── TTL 문자열 연산 ───────────────────────────────────────

    /// 키의 값을 읽습니다. 없거나 만료된 키는 `None`입니다.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// 키에 값을 쓰고 TTL을 설정합니다. 기존 키는 값과 TTL이 덮입니다.
    async fn set_with_expiry(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), StoreError>;

    /// 키가 존재하고 만료되지 않았는지 확인합니다.
    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// 키를 삭제합니다. 살아 있던 키를 지웠으면 `true`입니다.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// 접두사로 문자열 키를 증분 순회합니다.
    ///
    /// `cursor` 0에서 시작해 `(next_cursor, keys)`를 반환하며,
    /// `next_cursor`가 0이 되면 순회가 끝난 것입니다. 한 호출은 최대
    /// `count`개의 키만 반환하므로 스토어를 장시간 점유하지 않습니다.
    /// 순회 중 변경된 키스페이스에 대해서는 스냅샷 일관성을 보장하지
    /// 않습니다 (레지스트리 스캔 용도로 충분한 계약).
    async fn scan_keys(
        &self,
        prefix: &str,
        cursor: u64,
        count: usize,
    ) -> Result<(u64, Vec<String>), StoreError>;

    // ─── 스크립트 연산 (여러 단계를 한 번의 원자적 실행으로) ───

    /// 슬라이딩 윈도우 속도 제한 판정을 수행합니다.
    ///
    /// `now - window`보다 오래된 기록을 제거하고, 남은 개수가 `max`
    /// 이상이면 기록 없이 `false`를 반환합니다. 미만이면 현재 시각을
    /// 기록하고 `true`를 반환합니다. 제거-집계-기록이 하나의 실행이므로
    /// 임의의 트레일링 `window` 구간에서 허용 횟수는 `max`를 넘지
    /// 않습니다.
    async fn sliding_window_allow(
        &self,
        key: &str,
        window: Duration,
        max: u64,
    ) -> Result<bool, StoreError>;

    /// 중복 카운터를 증가시키고 임계 도달 여부를 판정합니다.
    ///
    /// `triggered` 키가 살아 있으면 [`DedupVerdict::AlreadyTriggered`]를
    /// 반환하고 아무것도 바꾸지 않습니다. 아니면 `counter`를 1 증가시키되,
    /// 첫 증가에만 `count_ttl`을 설정합니다 (카운팅 윈도우는 첫 이벤트
    /// 기준 고정 윈도우). 증가 결과가 `threshold`와 정확히 같으면
    /// `counter`를 삭제하고 `triggered`를 `trigger_ttl`로 생성한 뒤
    /// [`DedupVerdict::Triggered`]를 반환합니다. 그 외에는
    /// [`DedupVerdict::Counted`]입니다.
    async fn dedup_increment(
        &self,
        counter: &str,
        triggered: &str,
        count_ttl: Duration,
        trigger_ttl: Duration,
        threshold: u64,
    ) -> Result<DedupVerdict, StoreError>;

    /// 차단기 상태를 읽습니다. OPEN 경과 판정은 읽기 시점에 지연 수행됩니다.
    ///
    /// 저장된 상태가 OPEN이고 `opened_at`으로부터 `open_timeout`이
    /// 지났으면 HALF_OPEN으로 전이해 저장한 뒤 반환합니다. 기록이 없는
    /// 이름은 CLOSED입니다.
    async fn breaker_state(
        &self,
        name: &str,
        open_timeout: Duration,
    ) -> Result<BreakerState, StoreError>;

    /// 성공을 기록합니다. 상태는 CLOSED가 되고 실패 카운터는 0이 됩니다.
    async fn breaker_record_success(&self, name: &str) -> Result<(), StoreError>;

    /// 실패를 기록하고 결과 상태를 반환합니다.
    ///
    /// CLOSED에서는 연속 실패 카운터를 증가시키고, `threshold`에 도달하면
    /// OPEN으로 전이하며 `opened_at`을 기록합니다. HALF_OPEN에서의 실패는
    /// 즉시 OPEN으로 되돌리고 `opened_at`을 재설정합니다.
    async fn breaker_record_failure(
        &self,
        name: &str,
        threshold: u64,
    ) -> Result<BreakerState, StoreError>;

    // ─── 연결 상태 ─────────────────────────────────────────────

    /// 스토어 연결 상태를 확인합니다. 재연결 백오프 경로가 사용합니다.
    async fn ping(&self) -> Result<(), StoreError>;
}

/// [`SharedStore`]를 담은 타입이 `Debug`를 derive할 수 있도록
/// 불투명한 표시만 출력합니다.
impl fmt::Debug for dyn QueueStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("QueueStore")
    }
}
