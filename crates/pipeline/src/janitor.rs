//! Janitor -- 죽은 워커의 처리 목록 복구
//!
//! 워커 레지스트리를 증분 스캔하며 하트비트가 사라진 워커를 찾고,
//! 그 처리 목록의 메시지를 레지스트리에 기록된 origin 큐로 하나씩
//! 되돌립니다. 모든 단계가 멱등이므로 여러 프로세스가 동시에 돌려도,
//! 도중에 죽어 다시 돌려도 안전합니다.

use relaypost_core::metrics as m;
use relaypost_store::{QueueStore, SharedStore};

use crate::config::PipelineConfig;
use crate::context;
use crate::error::RelayPipelineError;

/// 한 번의 청소 결과
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct JanitorReport {
    /// origin 큐로 되돌린 메시지 수
    pub recovered_messages: u64,
    /// 정리한 죽은 워커 수
    pub reclaimed_workers: u64,
}

/// 처리 목록 청소부
pub struct Janitor {
    store: SharedStore,
    key_prefix: String,
    scan_count: usize,
}

impl Janitor {
    /// 설정으로 Janitor를 생성합니다.
    pub fn new(store: SharedStore, config: &PipelineConfig) -> Self {
        Self {
            store,
            key_prefix: config.store.key_prefix.clone(),
            scan_count: usize::try_from(config.janitor.scan_count).unwrap_or(usize::MAX),
        }
    }

    /// 레지스트리 전체를 한 바퀴 스캔하며 죽은 워커를 수거합니다.
    ///
    /// 워커 수에 비례하는 `scan_keys` 호출로 나눠 진행하므로
    /// 레지스트리가 커도 스토어를 오래 붙잡지 않습니다.
    /// 스캔 중에 레지스트리를 지우면 커서가 흔들리므로
    /// 후보를 모두 모은 뒤에 수거를 시작합니다.
    ///
    /// # Errors
    /// 스토어 연산 실패 시 에러를 반환합니다. 이미 수거한 몫은
    /// 그대로 유효하며, 다음 실행이 남은 몫을 이어받습니다.
    pub async fn run(&self) -> Result<JanitorReport, RelayPipelineError> {
        let registry_prefix = context::registry_prefix(&self.key_prefix);

        // 1단계: 하트비트가 사라진 워커 수집
        let mut dead_workers = Vec::new();
        let mut cursor = 0u64;
        loop {
            let (next_cursor, keys) = self
                .store
                .scan_keys(&registry_prefix, cursor, self.scan_count)
                .await?;

            for registry_key in keys {
                let Some(worker_id) = registry_key
                    .strip_prefix(&registry_prefix)
                    .map(str::to_owned)
                else {
                    continue;
                };
                let heartbeat_key = context::heartbeat_key(&self.key_prefix, &worker_id);
                if !self.store.exists(&heartbeat_key).await? {
                    dead_workers.push((registry_key, worker_id));
                }
            }

            if next_cursor == 0 {
                break;
            }
            cursor = next_cursor;
        }

        // 2단계: 수거
        let mut report = JanitorReport::default();
        for (registry_key, worker_id) in dead_workers {
            if let Some(recovered) = self.reclaim_if_dead(&registry_key, &worker_id).await? {
                report.recovered_messages += recovered;
                report.reclaimed_workers += 1;
            }
        }

        metrics::counter!(m::JANITOR_RUNS_TOTAL).increment(1);
        if report.recovered_messages > 0 {
            metrics::counter!(m::JANITOR_RECOVERED_TOTAL).increment(report.recovered_messages);
        }

        tracing::info!(
            recovered = report.recovered_messages,
            workers = report.reclaimed_workers,
            "janitor sweep finished"
        );
        Ok(report)
    }

    /// 하트비트가 없는 워커의 처리 목록을 비우고 레지스트리를 정리합니다.
    ///
    /// 살아 있는 워커면 `None`을 반환합니다.
    async fn reclaim_if_dead(
        &self,
        registry_key: &str,
        worker_id: &str,
    ) -> Result<Option<u64>, RelayPipelineError> {
        let heartbeat_key = context::heartbeat_key(&self.key_prefix, worker_id);
        if self.store.exists(&heartbeat_key).await? {
            return Ok(None);
        }

        // 레지스트리 값이 드레인 목적지입니다. 다른 Janitor가 먼저
        // 정리를 끝냈으면 값이 없으므로 조용히 넘어갑니다.
        let Some(origin_queue) = self.store.get(registry_key).await? else {
            return Ok(None);
        };

        let processing_list = context::processing_list(&self.key_prefix, worker_id);
        let mut recovered = 0u64;
        // 한 건씩 옮기므로 도중에 죽어도 각 메시지는 두 목록 중
        // 정확히 한 곳에 있습니다
        while self
            .store
            .transfer(&processing_list, &origin_queue)
            .await?
            .is_some()
        {
            recovered += 1;
        }

        self.store.delete(registry_key).await?;

        tracing::info!(
            worker_id,
            recovered,
            origin_queue = %origin_queue,
            "recovered orphaned messages from dead worker"
        );
        Ok(Some(recovered))
    }
}
