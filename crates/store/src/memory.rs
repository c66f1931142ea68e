//! 인메모리 스토어 -- 단일 프로세스 배포와 테스트용 백엔드
//!
//! [`MemoryStore`]는 [`QueueStore`]의 모든 연산을 하나의 뮤텍스 획득
//! 안에서 수행합니다. 락을 잡은 채 await하지 않으므로 각 연산은 그대로
//! 원자적 실행이 됩니다. 블로킹 클레임은 큐별 [`Notify`]로 구현되어
//! 락 바깥에서 대기합니다.
//!
//! TTL 판정은 [`tokio::time::Instant`] 기준으로 지연 수행되므로
//! `start_paused` 테스트에서 시간을 제어해 만료를 결정적으로 검증할 수
//! 있습니다.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use relaypost_core::StoreError;

use crate::api::{BreakerState, DedupVerdict, QueueStore, SharedStore};

// ─── 내부 상태 ───────────────────────────────────────────────────────

/// TTL이 걸린 문자열 값
///
/// `expires_at`이 `None`이면 표현 가능한 지평선 너머의 만료로,
/// 사실상 만료되지 않습니다.
struct StringEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl StringEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// 차단기 기록: 상태 + 연속 실패 카운터 + 차단 시각
struct BreakerRecord {
    state: BreakerState,
    failures: u64,
    opened_at: Option<Instant>,
}

impl Default for BreakerRecord {
    fn default() -> Self {
        Self {
            state: BreakerState::Closed,
            failures: 0,
            opened_at: None,
        }
    }
}

#[derive(Default)]
struct Inner {
    /// 리스트 키스페이스 (큐, 처리 목록, DLQ)
    lists: HashMap<String, VecDeque<String>>,
    /// 문자열 키스페이스 (하트비트, 레지스트리, 중복 카운터)
    strings: HashMap<String, StringEntry>,
    /// 슬라이딩 윈도우 기록: 키 -> 허용 시각들 (오래된 순)
    windows: HashMap<String, VecDeque<Instant>>,
    /// 차단기 기록
    breakers: HashMap<String, BreakerRecord>,
    /// 큐별 클레임 대기 알림
    notifiers: HashMap<String, Arc<Notify>>,
}

impl Inner {
    /// `from` 머리의 메시지 하나를 `to` 꼬리로 옮깁니다.
    fn move_head(&mut self, from: &str, to: &str) -> Option<String> {
        let deque = self.lists.get_mut(from)?;
        let payload = deque.pop_front()?;
        if deque.is_empty() {
            self.lists.remove(from);
        }
        self.lists
            .entry(to.to_owned())
            .or_default()
            .push_back(payload.clone());
        Some(payload)
    }

    /// 큐의 알림 핸들을 반환합니다. 없으면 만듭니다.
    fn notifier(&mut self, queue: &str) -> Arc<Notify> {
        Arc::clone(self.notifiers.entry(queue.to_owned()).or_default())
    }

    /// 만료된 문자열 키를 제거합니다.
    fn purge_expired(&mut self, key: &str, now: Instant) {
        if self.strings.get(key).is_some_and(|e| e.is_expired(now)) {
            self.strings.remove(key);
        }
    }
}

// ─── MemoryStore ─────────────────────────────────────────────────────

/// 인메모리 [`QueueStore`] 구현
///
/// 모든 상태는 프로세스 안에만 존재합니다. 여러 워커 태스크가 하나의
/// [`MemoryStore`]를 [`Arc`]로 공유하면 네트워크 백엔드와 동일한 클레임,
/// 재니터, 속도 제한, 차단기 동작을 얻습니다.
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// 빈 스토어를 생성합니다.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// 공유 trait 객체로 감싼 스토어를 생성합니다.
    pub fn shared() -> SharedStore {
        Arc::new(Self::new())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueueStore for MemoryStore {
    async fn push(&self, queue: &str, payload: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner
            .lists
            .entry(queue.to_owned())
            .or_default()
            .push_back(payload.to_owned());
        inner.notifier(queue).notify_one();
        Ok(())
    }

    async fn claim(
        &self,
        queue: &str,
        processing: &str,
        timeout: Duration,
    ) -> Result<Option<String>, StoreError> {
        // 오버플로우하면 사실상 무한 대기
        let deadline = Instant::now().checked_add(timeout);
        loop {
            let notify = {
                let mut inner = self.inner.lock().await;
                if let Some(payload) = inner.move_head(queue, processing) {
                    return Ok(Some(payload));
                }
                inner.notifier(queue)
            };
            // 락을 놓은 뒤 대기. 이 사이의 push는 Notify 허가로 남아
            // 아래 await가 즉시 깨어나므로 알림이 유실되지 않습니다.
            let notified = notify.notified();
            match deadline {
                Some(deadline) => {
                    tokio::select! {
                        _ = notified => {}
                        _ = tokio::time::sleep_until(deadline) => return Ok(None),
                    }
                }
                None => notified.await,
            }
        }
    }

    async fn transfer(&self, from: &str, to: &str) -> Result<Option<String>, StoreError> {
        let mut inner = self.inner.lock().await;
        let moved = inner.move_head(from, to);
        if moved.is_some() {
            inner.notifier(to).notify_one();
        }
        Ok(moved)
    }

    async fn remove(&self, list: &str, payload: &str) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().await;
        let Some(deque) = inner.lists.get_mut(list) else {
            return Ok(0);
        };
        let Some(pos) = deque.iter().position(|p| p == payload) else {
            return Ok(0);
        };
        deque.remove(pos);
        if deque.is_empty() {
            inner.lists.remove(list);
        }
        Ok(1)
    }

    async fn list_len(&self, list: &str) -> Result<usize, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.lists.get(list).map_or(0, VecDeque::len))
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.purge_expired(key, Instant::now());
        Ok(inner.strings.get(key).map(|e| e.value.clone()))
    }

    async fn set_with_expiry(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.strings.insert(
            key.to_owned(),
            StringEntry {
                value: value.to_owned(),
                expires_at: Instant::now().checked_add(ttl),
            },
        );
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.purge_expired(key, Instant::now());
        Ok(inner.strings.contains_key(key))
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        inner.purge_expired(key, Instant::now());
        Ok(inner.strings.remove(key).is_some())
    }

    async fn scan_keys(
        &self,
        prefix: &str,
        cursor: u64,
        count: usize,
    ) -> Result<(u64, Vec<String>), StoreError> {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        inner
            .strings
            .retain(|k, e| !(k.starts_with(prefix) && e.is_expired(now)));

        // 커서 안정성을 위해 정렬된 키 목록 위에서 오프셋 페이징
        let mut keys: Vec<String> = inner
            .strings
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort_unstable();

        let count = count.max(1); // 커서가 항상 전진하도록
        let start = usize::try_from(cursor).unwrap_or(usize::MAX).min(keys.len());
        let end = start.saturating_add(count).min(keys.len());
        let page = keys[start..end].to_vec();
        let next = if end < keys.len() { end as u64 } else { 0 };
        Ok((next, page))
    }

    async fn sliding_window_allow(
        &self,
        key: &str,
        window: Duration,
        max: u64,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        let allowed = {
            let hits = inner.windows.entry(key.to_owned()).or_default();
            while let Some(front) = hits.front() {
                if now.duration_since(*front) >= window {
                    hits.pop_front();
                } else {
                    break;
                }
            }
            let allowed = (hits.len() as u64) < max;
            if allowed {
                hits.push_back(now);
            }
            allowed
        };
        if !allowed && inner.windows.get(key).is_some_and(VecDeque::is_empty) {
            inner.windows.remove(key);
        }
        Ok(allowed)
    }

    async fn dedup_increment(
        &self,
        counter: &str,
        triggered: &str,
        count_ttl: Duration,
        trigger_ttl: Duration,
        threshold: u64,
    ) -> Result<DedupVerdict, StoreError> {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        inner.purge_expired(counter, now);
        inner.purge_expired(triggered, now);

        if inner.strings.contains_key(triggered) {
            return Ok(DedupVerdict::AlreadyTriggered);
        }

        let current = match inner.strings.get(counter) {
            Some(entry) => entry.value.parse::<u64>().map_err(|_| StoreError::WrongType {
                key: counter.to_owned(),
                reason: "counter value is not an unsigned integer".to_owned(),
            })?,
            None => 0,
        };
        let next = current.saturating_add(1);

        if next == threshold {
            // 카운터 -> 트리거 전환. 이 분기에 들어오는 호출은 키 수명당
            // 정확히 하나입니다.
            inner.strings.remove(counter);
            inner.strings.insert(
                triggered.to_owned(),
                StringEntry {
                    value: next.to_string(),
                    expires_at: now.checked_add(trigger_ttl),
                },
            );
            return Ok(DedupVerdict::Triggered);
        }

        match inner.strings.get_mut(counter) {
            // 카운팅 윈도우는 첫 증가 기준 고정이므로 TTL을 갱신하지 않음
            Some(entry) => entry.value = next.to_string(),
            None => {
                inner.strings.insert(
                    counter.to_owned(),
                    StringEntry {
                        value: next.to_string(),
                        expires_at: now.checked_add(count_ttl),
                    },
                );
            }
        }
        Ok(DedupVerdict::Counted(next))
    }

    async fn breaker_state(
        &self,
        name: &str,
        open_timeout: Duration,
    ) -> Result<BreakerState, StoreError> {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        let rec = inner.breakers.entry(name.to_owned()).or_default();
        if rec.state == BreakerState::Open {
            let timed_out = rec
                .opened_at
                .map_or(true, |at| now.duration_since(at) >= open_timeout);
            if timed_out {
                rec.state = BreakerState::HalfOpen;
            }
        }
        Ok(rec.state)
    }

    async fn breaker_record_success(&self, name: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.breakers.insert(name.to_owned(), BreakerRecord::default());
        Ok(())
    }

    async fn breaker_record_failure(
        &self,
        name: &str,
        threshold: u64,
    ) -> Result<BreakerState, StoreError> {
        let mut inner = self.inner.lock().await;
        let now = Instant::now();
        let rec = inner.breakers.entry(name.to_owned()).or_default();
        rec.failures = rec.failures.saturating_add(1);
        match rec.state {
            BreakerState::Closed => {
                if rec.failures >= threshold {
                    rec.state = BreakerState::Open;
                    rec.opened_at = Some(now);
                }
            }
            // 반개방 시험 실패는 즉시 재차단, 차단 시각 재설정
            BreakerState::HalfOpen | BreakerState::Open => {
                rec.state = BreakerState::Open;
                rec.opened_at = Some(now);
            }
        }
        Ok(rec.state)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
