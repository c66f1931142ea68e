//! 워커 하트비트 태스크
//!
//! 워커마다 하나씩 떠서 하트비트 키(TTL = Janitor 타임아웃)와
//! 레지스트리 키(TTL = [`REGISTRY_TTL`])를 주기적으로 연장합니다.
//! 워커가 죽으면 갱신이 멈추고, 하트비트 TTL이 만료된 시점부터
//! Janitor가 그 워커의 처리 목록을 수거할 수 있게 됩니다.

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use relaypost_store::QueueStore;

use crate::context::{REGISTRY_TTL, WorkerContext};

/// 하트비트 태스크를 시작합니다.
///
/// 종료 신호가 오면 키를 건드리지 않고 조용히 끝납니다.
/// 키 정리는 워커 루프의 드레인 단계가 담당합니다.
pub fn spawn_heartbeat(ctx: WorkerContext) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(ctx.config.heartbeat_interval());
        // 지연된 틱을 몰아서 쏘면 의미가 없으므로 건너뜁니다
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ctx.shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    refresh(&ctx).await;
                }
            }
        }

        tracing::debug!(
            worker_id = %ctx.identity.worker_id,
            "heartbeat task exiting"
        );
    })
}

/// 하트비트와 레지스트리 키의 TTL을 연장합니다.
///
/// 실패는 경고만 남깁니다. 연장이 계속 실패하면 하트비트가 만료되어
/// Janitor가 이 워커를 수거하는데, 살아 있는 워커가 스토어에 닿지
/// 못하는 상황에서는 그게 올바른 결과입니다.
async fn refresh(ctx: &WorkerContext) {
    let identity = &ctx.identity;

    if let Err(e) = ctx
        .store
        .set_with_expiry(&identity.heartbeat_key, "alive", ctx.config.janitor_timeout())
        .await
    {
        tracing::warn!(
            worker_id = %identity.worker_id,
            error = %e,
            "failed to refresh heartbeat"
        );
        return;
    }

    if let Err(e) = ctx
        .store
        .set_with_expiry(&identity.registry_key, &identity.origin_queue, REGISTRY_TTL)
        .await
    {
        tracing::warn!(
            worker_id = %identity.worker_id,
            error = %e,
            "failed to refresh registry entry"
        );
    }
}
