//! 라우터 핸들러 -- 입력 큐 소비, 규칙 매칭, 알림 큐 게시
//!
//! 입력 큐에서 클레임한 이벤트를 현재 규칙 스냅샷과 대조하여
//! 정확히 하나의 경로로 보냅니다:
//!
//! - **매칭됨**: handling 결정(개발/운영 호스트), 감사 기록, 알림 큐 게시
//! - **미매칭**: (호스트, 내용 시그니처)별 집계 후 임계값 도달 시 메타 알림 1건
//!
//! 감사 기록은 알림 큐 게시보다 먼저 완료되어야 합니다. 감사 실패는
//! 메시지 전체의 재시도 가능 실패로 취급되어 감사와 전달이 어긋난 채
//! 갈라지는 일이 없습니다.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};

use relaypost_core::envelope::EventEnvelope;
use relaypost_core::metrics as m;
use relaypost_store::{DedupVerdict, QueueStore, SharedStore};

use crate::config::PipelineConfig;
use crate::context::WorkerContext;
use crate::dedup::UnhandledDeduper;
use crate::error::RelayPipelineError;
use crate::rule::{CompiledRule, RouteRule, RuleCache, RuleSnapshot, match_event};
use crate::worker::{Disposition, MessageHandler};

/// 메타 알림에 부여되는 합성 rule_id
///
/// 실제 규칙 파일의 id와 충돌하지 않도록 네임스페이스를 붙입니다.
pub const META_ALERT_RULE_ID: &str = "relaypost.unhandled_threshold";

// ─── AuditSink ───────────────────────────────────────────────────────

/// 매칭된 이벤트의 감사 기록 싱크
///
/// 라우터는 알림 큐에 게시하기 **전에** `record`를 await하고, 에러를
/// 상위로 전파합니다. 워커 루프는 이를 미분류 실패로 취급해 메시지를
/// ack하지 않으므로, 감사 기록 없이 알림만 나가는 일은 없습니다.
///
/// 관계형 저장소 등 외부 감사 백엔드는 이 trait을 구현해 주입합니다.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// 매칭된 이벤트와 적용된 규칙을 기록합니다.
    ///
    /// # Errors
    /// 기록 실패 시 에러를 반환하면 해당 메시지 처리 전체가 재시도됩니다.
    async fn record(
        &self,
        envelope: &EventEnvelope,
        rule: &RouteRule,
    ) -> Result<(), RelayPipelineError>;
}

/// 구조화 로그로 기록하는 기본 감사 싱크
///
/// 외부 감사 백엔드가 없는 구성의 기본값입니다. 로그 기록은 실패하지
/// 않으므로 항상 `Ok`를 반환합니다.
#[derive(Debug, Default)]
pub struct LogAuditSink;

#[async_trait]
impl AuditSink for LogAuditSink {
    async fn record(
        &self,
        envelope: &EventEnvelope,
        rule: &RouteRule,
    ) -> Result<(), RelayPipelineError> {
        tracing::info!(
            correlation_id = envelope.correlation_id.as_deref().unwrap_or("none"),
            hostname = %envelope.hostname,
            rule_id = %rule.id,
            team = %rule.team,
            handling = envelope.handling.as_deref().unwrap_or("none"),
            "event matched"
        );
        Ok(())
    }
}

// ─── RouterHandler ───────────────────────────────────────────────────

/// 입력 큐 역할 핸들러
///
/// 클레임, 파싱, 포이즌 가드, ack는 [`WorkerLoop`](crate::worker::WorkerLoop)가
/// 담당하고, 이 핸들러는 규칙 매칭과 두 경로의 처분만 수행합니다.
pub struct RouterHandler {
    rules: RuleCache,
    deduper: UnhandledDeduper,
    audit: Arc<dyn AuditSink>,
    alert_queue: String,
    dlq: String,
    default_team: String,
}

impl RouterHandler {
    /// 설정과 규칙 캐시로 핸들러를 생성합니다.
    pub fn new(
        config: &PipelineConfig,
        store: SharedStore,
        rules: RuleCache,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            rules,
            deduper: UnhandledDeduper::new(store, &config.store.key_prefix, &config.dedup),
            audit,
            alert_queue: config.router.alert_queue.clone(),
            dlq: config.router.dlq.clone(),
            default_team: config.router.default_team.clone(),
        }
    }

    /// 매칭된 이벤트를 감사 기록 후 알림 큐에 게시합니다.
    async fn route_matched(
        &self,
        ctx: &WorkerContext,
        mut envelope: EventEnvelope,
        compiled: &CompiledRule,
        is_dev_host: bool,
    ) -> Result<Disposition, RelayPipelineError> {
        let rule = &compiled.rule;
        envelope.rule_id = Some(rule.id.clone());
        envelope.team = Some(rule.team.clone());
        envelope.handling = rule.resolve_handling(is_dev_host).map(str::to_owned);

        // 감사 기록이 먼저입니다. 실패하면 게시 없이 전체가 재시도됩니다.
        self.audit.record(&envelope, rule).await?;

        let payload = envelope.to_json()?;
        ctx.store.push(&self.alert_queue, &payload).await?;

        metrics::counter!(
            m::ROUTER_EVENTS_MATCHED_TOTAL,
            m::LABEL_RULE => rule.id.clone(),
            m::LABEL_TEAM => rule.team.clone()
        )
        .increment(1);
        tracing::info!(
            correlation_id = envelope.correlation_id.as_deref().unwrap_or("none"),
            hostname = %envelope.hostname,
            rule_id = %rule.id,
            team = %rule.team,
            handling = envelope.handling.as_deref().unwrap_or("none"),
            dev_host = is_dev_host,
            "event routed to alert queue"
        );
        Ok(Disposition::Handled)
    }

    /// 미매칭 이벤트를 집계하고 임계값 도달 시 메타 알림을 게시합니다.
    async fn route_unhandled(
        &self,
        ctx: &WorkerContext,
        envelope: &EventEnvelope,
        snapshot: &RuleSnapshot,
    ) -> Result<Disposition, RelayPipelineError> {
        metrics::counter!(m::ROUTER_EVENTS_UNHANDLED_TOTAL).increment(1);

        match self
            .deduper
            .note_unhandled(&envelope.hostname, &envelope.message)
            .await?
        {
            DedupVerdict::Triggered => {
                let meta = self.meta_alert(envelope, snapshot);
                let payload = meta.to_json()?;
                ctx.store.push(&self.alert_queue, &payload).await?;

                metrics::counter!(m::ROUTER_META_ALERTS_TOTAL).increment(1);
                tracing::info!(
                    hostname = %envelope.hostname,
                    team = meta.team.as_deref().unwrap_or("none"),
                    "unhandled threshold crossed, meta-alert queued"
                );
            }
            DedupVerdict::Counted(count) => {
                tracing::debug!(
                    hostname = %envelope.hostname,
                    count,
                    "unhandled event counted"
                );
            }
            DedupVerdict::AlreadyTriggered => {
                tracing::debug!(
                    hostname = %envelope.hostname,
                    "unhandled event within triggered window, suppressed"
                );
            }
        }
        Ok(Disposition::Handled)
    }

    /// 미처리 폭주를 대표하는 합성 알림을 만듭니다.
    ///
    /// 팀은 호스트→팀 매핑에서 찾고, 없으면 기본 팀을 씁니다.
    /// 메시지는 임계값을 넘긴 시점의 샘플 하나를 싣습니다.
    fn meta_alert(&self, sample: &EventEnvelope, snapshot: &RuleSnapshot) -> EventEnvelope {
        let team = snapshot
            .team_for_host(&sample.hostname)
            .unwrap_or(&self.default_team)
            .to_owned();
        let message = format!(
            "unhandled event threshold reached for {} (sample: {})",
            sample.hostname, sample.message
        );

        let mut meta = EventEnvelope::new(
            sample.hostname.clone(),
            Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            message,
        );
        meta.severity = Some("medium".to_owned());
        meta.rule_id = Some(META_ALERT_RULE_ID.to_owned());
        meta.team = Some(team);
        meta.ensure_correlation_id();
        meta
    }
}

#[async_trait]
impl MessageHandler for RouterHandler {
    fn role(&self) -> &'static str {
        "router"
    }

    fn dlq(&self) -> &str {
        &self.dlq
    }

    async fn handle(
        &self,
        ctx: &WorkerContext,
        mut envelope: EventEnvelope,
        _raw: &str,
    ) -> Result<Disposition, RelayPipelineError> {
        let started = Instant::now();
        envelope.ensure_correlation_id();
        metrics::counter!(m::ROUTER_EVENTS_TOTAL).increment(1);

        let snapshot = self.rules.current();
        let disposition = match match_event(&envelope, &snapshot) {
            Some(compiled) => {
                let is_dev_host = snapshot.is_dev_host(&envelope.hostname);
                self.route_matched(ctx, envelope, compiled, is_dev_host)
                    .await?
            }
            None => self.route_unhandled(ctx, &envelope, &snapshot).await?,
        };

        metrics::histogram!(m::ROUTER_PROCESSING_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        Ok(disposition)
    }
}
