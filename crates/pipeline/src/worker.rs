//! 워커 클레임 루프 -- 역할과 무관한 메시지 수명 주기 관리
//!
//! claim -> 포이즌 가드 -> 역할 핸들러 -> ack 순서를 강제합니다.
//! 메시지는 처리 목록에서 제거(ack)되기 전까지 스토어에 남아 있으므로
//! 어느 단계에서 워커가 죽어도 유실되지 않습니다. 성공이 확인된 뒤에만
//! ack하므로 전달 보장은 at-least-once입니다.

use async_trait::async_trait;

use relaypost_core::envelope::EventEnvelope;
use relaypost_core::metrics as m;
use relaypost_store::QueueStore;

use crate::backoff::backoff_delay;
use crate::context::{REGISTRY_TTL, WorkerContext};
use crate::error::RelayPipelineError;

/// 메시지 처분 결과
///
/// 네 가지 모두 해당 메시지의 처리가 끝났음을 뜻하며 ack로 이어집니다.
/// ack 없이 메시지를 남기는 경로(스토어 상실, 미분류 에러)는
/// 처분이 아니라 에러로 표현됩니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// 정상 처리 완료
    Handled,
    /// 재시도를 위해 재큐잉됨 (retry_count 증가)
    Requeued,
    /// DLQ로 격리됨
    DeadLettered,
    /// 폐기됨 (레이트 리밋 등)
    Discarded,
}

impl Disposition {
    /// 로그/메트릭 레이블용 이름
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Handled => "handled",
            Self::Requeued => "requeued",
            Self::DeadLettered => "dead_lettered",
            Self::Discarded => "discarded",
        }
    }
}

/// 역할별 메시지 핸들러
///
/// 워커 루프는 클레임, 파싱, 포이즌 가드, ack를 책임지고
/// 역할 고유의 처리만 핸들러에 위임합니다.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// 역할 이름 (로그와 메트릭 레이블에 사용)
    fn role(&self) -> &'static str;

    /// 이 역할의 DLQ 이름
    fn dlq(&self) -> &str;

    /// 메시지 하나를 처리하고 처분을 반환합니다.
    ///
    /// `raw`는 클레임된 원본 바이트입니다. DLQ 격리는 반드시 `raw`를
    /// 사용해 바이트 동일성을 보존해야 합니다.
    ///
    /// # Errors
    /// 에러 반환은 "처분 불가"를 뜻합니다. 워커 루프는 메시지를 ack하지
    /// 않고 남겨 두며, 스토어 상실 계열이면 재접속을 시작합니다.
    async fn handle(
        &self,
        ctx: &WorkerContext,
        envelope: EventEnvelope,
        raw: &str,
    ) -> Result<Disposition, RelayPipelineError>;
}

/// 워커 클레임 루프
pub struct WorkerLoop<H> {
    ctx: WorkerContext,
    handler: H,
    max_retries: u32,
}

impl<H: MessageHandler> WorkerLoop<H> {
    /// 루프를 생성합니다. `max_retries`는 포이즌 가드의 예산입니다.
    pub fn new(ctx: WorkerContext, handler: H, max_retries: u32) -> Self {
        Self {
            ctx,
            handler,
            max_retries,
        }
    }

    /// 워커를 등록하고 클레임 루프를 실행합니다.
    ///
    /// 종료 신호가 오면 진행 중인 메시지를 끝까지 처리한 뒤
    /// 자기 처리 목록을 origin 큐로 되돌리고 등록을 해제합니다.
    ///
    /// # Errors
    /// 스토어 재접속 한도가 소진되면 [`RelayPipelineError::StoreLost`]를
    /// 반환합니다. 이때도 드레인은 시도됩니다.
    pub async fn run(self) -> Result<(), RelayPipelineError> {
        self.register().await?;
        tracing::info!(
            worker_id = %self.ctx.identity.worker_id,
            role = self.handler.role(),
            queue = %self.ctx.identity.origin_queue,
            "worker registered, entering claim loop"
        );

        let result = self.claim_loop().await;

        self.drain_and_deregister().await;
        match &result {
            Ok(()) => tracing::info!(
                worker_id = %self.ctx.identity.worker_id,
                "worker exited cleanly"
            ),
            Err(e) => tracing::error!(
                worker_id = %self.ctx.identity.worker_id,
                error = %e,
                "worker exited with error"
            ),
        }
        result
    }

    /// 레지스트리 키와 첫 하트비트를 기록합니다.
    ///
    /// 레지스트리 값은 origin 큐 이름입니다. Janitor는 이 값을 읽어
    /// 죽은 워커의 처리 목록을 되돌릴 목적지를 알아냅니다.
    /// 하트비트를 등록과 동시에 기록해야 직후에 도는 Janitor가
    /// 이 워커를 죽은 것으로 오인하지 않습니다.
    async fn register(&self) -> Result<(), RelayPipelineError> {
        let identity = &self.ctx.identity;
        self.ctx
            .store
            .set_with_expiry(&identity.registry_key, &identity.origin_queue, REGISTRY_TTL)
            .await?;
        self.ctx
            .store
            .set_with_expiry(
                &identity.heartbeat_key,
                "alive",
                self.ctx.config.janitor_timeout(),
            )
            .await?;
        Ok(())
    }

    async fn claim_loop(&self) -> Result<(), RelayPipelineError> {
        loop {
            if self.ctx.shutdown.is_cancelled() {
                return Ok(());
            }

            let claimed = tokio::select! {
                _ = self.ctx.shutdown.cancelled() => return Ok(()),
                result = self.ctx.store.claim(
                    &self.ctx.identity.origin_queue,
                    &self.ctx.identity.processing_list,
                    self.ctx.config.claim_timeout(),
                ) => result,
            };

            match claimed {
                Ok(Some(raw)) => self.process_claimed(&raw).await?,
                // 클레임 타임아웃: 종료 신호를 재확인하고 계속
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(
                        worker_id = %self.ctx.identity.worker_id,
                        error = %e,
                        "claim failed, reconnecting to store"
                    );
                    self.reconnect().await?;
                }
            }
        }
    }

    /// 클레임된 메시지 하나를 역할 로직까지 끌고 갑니다.
    ///
    /// 종료 신호가 중간에 와도 이 함수는 끝까지 실행됩니다.
    async fn process_claimed(&self, raw: &str) -> Result<(), RelayPipelineError> {
        let envelope = match EventEnvelope::from_json(raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                // 계약 위반 입력은 재시도 없이 폐기합니다
                tracing::warn!(
                    role = self.handler.role(),
                    error = %e,
                    "discarding malformed message"
                );
                metrics::counter!(
                    m::EVENTS_DISCARDED_TOTAL,
                    m::LABEL_MODULE => self.handler.role(),
                    m::LABEL_REASON => "malformed"
                )
                .increment(1);
                return self.ack(raw).await;
            }
        };

        // 포이즌 가드: 역할 로직보다 먼저 재시도 예산을 확인합니다
        if envelope.retry_count > self.max_retries {
            return self.quarantine_poison(&envelope, raw).await;
        }

        let correlation_id = envelope.correlation_id.clone().unwrap_or_default();
        match self.handler.handle(&self.ctx, envelope, raw).await {
            Ok(disposition) => {
                tracing::debug!(
                    role = self.handler.role(),
                    correlation_id = %correlation_id,
                    disposition = disposition.as_str(),
                    "message processed"
                );
                self.ack(raw).await
            }
            Err(e) if e.is_store_loss() => {
                // 스토어 상실은 메시지 단위 실패가 아닙니다.
                // ack 없이 남겨 두고 재접속하면 재전달로 이어집니다.
                tracing::warn!(
                    role = self.handler.role(),
                    error = %e,
                    "store lost mid-message, leaving message un-acked"
                );
                self.reconnect().await
            }
            Err(e) => {
                // 미분류 에러: ack하지 않고 처리 목록에 남깁니다.
                // 이 워커의 종료 드레인 또는 Janitor가 수거합니다.
                tracing::error!(
                    role = self.handler.role(),
                    correlation_id = %correlation_id,
                    error = %e,
                    "unclassified handler error, message left in processing list"
                );
                Ok(())
            }
        }
    }

    /// 재시도 예산이 소진된 메시지를 DLQ로 격리합니다.
    async fn quarantine_poison(
        &self,
        envelope: &EventEnvelope,
        raw: &str,
    ) -> Result<(), RelayPipelineError> {
        tracing::warn!(
            role = self.handler.role(),
            correlation_id = envelope.correlation_id.as_deref().unwrap_or("none"),
            retry_count = envelope.retry_count,
            max_retries = self.max_retries,
            "retry budget exhausted, quarantining message"
        );

        match self.ctx.store.push(self.handler.dlq(), raw).await {
            Ok(()) => {
                metrics::counter!(
                    m::POISON_MESSAGES_TOTAL,
                    m::LABEL_MODULE => self.handler.role()
                )
                .increment(1);
                metrics::counter!(
                    m::DLQ_MESSAGES_TOTAL,
                    m::LABEL_QUEUE => self.handler.dlq().to_owned(),
                    m::LABEL_REASON => "poison"
                )
                .increment(1);
                self.ack(raw).await
            }
            Err(e) => {
                // 격리 실패 시 ack하지 않습니다. 재전달되면 가드가 다시 겁니다.
                tracing::warn!(error = %e, "failed to quarantine poison message");
                let err = RelayPipelineError::from(e);
                if err.is_store_loss() {
                    self.reconnect().await
                } else {
                    Ok(())
                }
            }
        }
    }

    /// 처리 목록에서 메시지를 제거합니다 (ack).
    ///
    /// 0건 제거는 Janitor가 먼저 수거해 간 경우이며 무해합니다.
    async fn ack(&self, raw: &str) -> Result<(), RelayPipelineError> {
        match self
            .ctx
            .store
            .remove(&self.ctx.identity.processing_list, raw)
            .await
        {
            Ok(0) => {
                tracing::debug!(
                    worker_id = %self.ctx.identity.worker_id,
                    "message already removed from processing list"
                );
                Ok(())
            }
            Ok(_) => Ok(()),
            Err(e) => {
                // ack 실패는 중복 전달로 이어질 수 있지만 유실은 아닙니다
                tracing::warn!(error = %e, "ack failed, message may be redelivered");
                self.reconnect().await
            }
        }
    }

    /// 스토어가 복구될 때까지 지수 백오프로 핑을 보냅니다.
    async fn reconnect(&self) -> Result<(), RelayPipelineError> {
        let max_attempts = self.ctx.config.store.connect_max_attempts;
        let base = self.ctx.config.connect_backoff_base();
        let cap = self.ctx.config.connect_backoff_cap();

        for attempt in 0..max_attempts {
            metrics::counter!(
                m::WORKER_RECONNECTS_TOTAL,
                m::LABEL_MODULE => self.handler.role()
            )
            .increment(1);

            let delay = backoff_delay(base, cap, attempt);
            tokio::select! {
                // 종료 중이면 재접속을 포기하고 드레인으로 넘어갑니다
                _ = self.ctx.shutdown.cancelled() => return Ok(()),
                _ = tokio::time::sleep(delay) => {}
            }

            match self.ctx.store.ping().await {
                Ok(()) => {
                    tracing::info!(attempt, "store connection restored");
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "store still unreachable");
                }
            }
        }

        Err(RelayPipelineError::StoreLost {
            attempts: max_attempts,
        })
    }

    /// 처리 목록을 origin 큐로 되돌리고 등록을 해제합니다.
    ///
    /// 드레인이 실패하면 레지스트리를 남겨 둡니다.
    /// 하트비트가 만료된 뒤 Janitor가 남은 메시지를 수거합니다.
    async fn drain_and_deregister(&self) {
        let identity = &self.ctx.identity;
        let mut drained = 0u64;
        loop {
            match self
                .ctx
                .store
                .transfer(&identity.processing_list, &identity.origin_queue)
                .await
            {
                Ok(Some(_)) => drained += 1,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(
                        worker_id = %identity.worker_id,
                        error = %e,
                        drained,
                        "drain interrupted, janitor will recover the rest"
                    );
                    return;
                }
            }
        }

        if drained > 0 {
            tracing::info!(
                worker_id = %identity.worker_id,
                drained,
                "returned in-flight messages to origin queue"
            );
        }

        if let Err(e) = self.ctx.store.delete(&identity.registry_key).await {
            tracing::warn!(error = %e, "failed to remove worker registry entry");
        }
        if let Err(e) = self.ctx.store.delete(&identity.heartbeat_key).await {
            tracing::warn!(error = %e, "failed to remove worker heartbeat key");
        }
    }
}
