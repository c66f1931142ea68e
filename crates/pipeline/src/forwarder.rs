//! 포워더 -- 알림 큐 소비, webhook 전송, 실패 분류
//!
//! [`Forwarder`]는 인시던트 매니저 webhook으로 알림 하나를 보내고
//! 결과를 세 가지로 분류합니다:
//!
//! - **Delivered**: 2xx 응답. 브레이커 성공 기록 후 ack.
//! - **Retryable**: 5xx, 타임아웃, 연결 실패. 브레이커 실패 기록 후
//!   백오프를 거쳐 재큐잉. 재시도 예산은 워커 루프의 포이즌 가드가
//!   관리합니다.
//! - **Terminal**: 4xx 응답. 요청 자체가 잘못된 것이므로 재시도 없이
//!   DLQ로 격리하며, 다운스트림 건강과 무관하므로 브레이커는 건드리지
//!   않습니다.
//!
//! [`ForwardHandler`]는 전송 앞에 두 개의 관문을 둡니다. fleet 공유
//! 레이트 리미터(거부 시 폐기)와 서킷 브레이커(OPEN이면 다운스트림
//! 호출 없이 재큐잉)입니다.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;

use relaypost_core::envelope::EventEnvelope;
use relaypost_core::metrics as m;
use relaypost_core::types::Severity;
use relaypost_store::{QueueStore, SharedStore};

use crate::backoff::backoff_delay;
use crate::breaker::CircuitBreaker;
use crate::config::PipelineConfig;
use crate::context::WorkerContext;
use crate::error::RelayPipelineError;
use crate::limiter::RateLimiter;
use crate::worker::{Disposition, MessageHandler};

// ─── SendOutcome ─────────────────────────────────────────────────────

/// webhook 전송 결과 분류
///
/// reason 문자열은 메트릭 레이블로 쓰이므로 `status_503`, `timeout`처럼
/// 카디널리티가 유한한 형태만 사용합니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// 2xx -- 전달 완료
    Delivered,
    /// 5xx, 타임아웃, 연결 실패 -- 백오프 후 재시도
    Retryable(String),
    /// 4xx -- 재시도 무의미, DLQ 격리
    Terminal(String),
}

// ─── AlertSender ─────────────────────────────────────────────────────

/// 알림 전송 seam
///
/// [`ForwardHandler`]는 이 trait으로만 다운스트림을 호출하므로
/// 테스트에서 실제 HTTP 없이 임의의 결과를 주입할 수 있습니다.
#[async_trait]
pub trait AlertSender: Send + Sync {
    /// 알림 하나를 전송하고 분류된 결과를 반환합니다.
    async fn send(&self, envelope: &EventEnvelope) -> SendOutcome;
}

// ─── Webhook 페이로드 ────────────────────────────────────────────────

/// 인시던트 매니저 webhook 요청 본문
#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    /// 정수 심각도 0-5 (0 = 심각도 미상)
    severity: u8,
    /// 이벤트 출처 식별자 (호스트명)
    signature: &'a str,
    /// 이벤트 본문
    description: &'a str,
    /// 파이프라인이 채운 라우팅 문맥
    custom: WebhookCustom<'a>,
}

#[derive(Debug, Serialize)]
struct WebhookCustom<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    correlation_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    team: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rule_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    handling: Option<&'a str>,
}

impl<'a> WebhookPayload<'a> {
    fn from_envelope(envelope: &'a EventEnvelope) -> Self {
        Self {
            severity: envelope
                .severity_parsed()
                .map(Severity::webhook_level)
                .unwrap_or(0),
            signature: &envelope.hostname,
            description: &envelope.message,
            custom: WebhookCustom {
                correlation_id: envelope.correlation_id.as_deref(),
                team: envelope.team.as_deref(),
                rule_id: envelope.rule_id.as_deref(),
                handling: envelope.handling.as_deref(),
            },
        }
    }
}

// ─── Forwarder ───────────────────────────────────────────────────────

/// webhook 전송기
///
/// 연결 풀을 재사용하도록 핸들러 수명 동안 하나만 만들어 공유합니다.
pub struct Forwarder {
    client: reqwest::Client,
    webhook_url: String,
    bearer_token: String,
}

impl Forwarder {
    /// 포워더 설정으로 전송기를 생성합니다.
    ///
    /// # Errors
    /// HTTP 클라이언트 구성이 실패하면 에러를 반환합니다.
    pub fn new(config: &PipelineConfig) -> Result<Self, RelayPipelineError> {
        let client = reqwest::Client::builder()
            .timeout(config.forwarder_timeout())
            .build()
            .map_err(|e| RelayPipelineError::Webhook(e.to_string()))?;
        Ok(Self {
            client,
            webhook_url: config.forwarder.webhook_url.clone(),
            bearer_token: config.forwarder.bearer_token.clone(),
        })
    }

    /// HTTP 상태 코드를 전송 결과로 분류합니다.
    fn classify_status(status: StatusCode) -> SendOutcome {
        if status.is_success() {
            SendOutcome::Delivered
        } else if status.is_client_error() {
            SendOutcome::Terminal(format!("status_{}", status.as_u16()))
        } else {
            SendOutcome::Retryable(format!("status_{}", status.as_u16()))
        }
    }
}

#[async_trait]
impl AlertSender for Forwarder {
    async fn send(&self, envelope: &EventEnvelope) -> SendOutcome {
        let payload = WebhookPayload::from_envelope(envelope);
        let mut request = self.client.post(&self.webhook_url).json(&payload);
        if !self.bearer_token.is_empty() {
            request = request.bearer_auth(&self.bearer_token);
        }

        let started = Instant::now();
        let outcome = match request.send().await {
            Ok(response) => Self::classify_status(response.status()),
            Err(e) if e.is_timeout() => {
                tracing::warn!(error = %e, "webhook request timed out");
                SendOutcome::Retryable("timeout".to_owned())
            }
            Err(e) if e.is_connect() => {
                tracing::warn!(error = %e, "webhook connection failed");
                SendOutcome::Retryable("connect".to_owned())
            }
            Err(e) => {
                tracing::warn!(error = %e, "webhook request failed");
                SendOutcome::Retryable("request".to_owned())
            }
        };
        metrics::histogram!(m::FORWARDER_SEND_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        outcome
    }
}

// ─── ForwardHandler ──────────────────────────────────────────────────

/// 알림 큐 역할 핸들러
///
/// 리미터 -> 브레이커 -> 전송 순서의 관문을 거쳐 처분을 결정합니다.
pub struct ForwardHandler {
    sender: Arc<dyn AlertSender>,
    limiter: RateLimiter,
    breaker: CircuitBreaker,
    alert_queue: String,
    dlq: String,
}

impl ForwardHandler {
    /// 설정과 전송기로 핸들러를 생성합니다.
    pub fn new(config: &PipelineConfig, store: SharedStore, sender: Arc<dyn AlertSender>) -> Self {
        Self {
            sender,
            limiter: RateLimiter::new(store.clone(), &config.store.key_prefix, &config.limiter),
            breaker: CircuitBreaker::new(store, &config.store.key_prefix, &config.breaker),
            alert_queue: config.forwarder.alert_queue.clone(),
            dlq: config.forwarder.dlq.clone(),
        }
    }

    /// 백오프 후 재시도 횟수를 올려 알림 큐에 되돌립니다.
    ///
    /// 백오프 대기는 종료 신호로 끊을 수 있으며, 끊겨도 재큐잉은
    /// 수행해 메시지가 처분 없이 남지 않게 합니다.
    async fn requeue_with_backoff(
        &self,
        ctx: &WorkerContext,
        envelope: &EventEnvelope,
    ) -> Result<Disposition, RelayPipelineError> {
        let delay = backoff_delay(
            ctx.config.forwarder_backoff_base(),
            ctx.config.forwarder_backoff_cap(),
            envelope.retry_count,
        );
        tokio::select! {
            _ = ctx.shutdown.cancelled() => {}
            _ = tokio::time::sleep(delay) => {}
        }

        let mut requeued = envelope.clone();
        requeued.increment_retry();
        let payload = requeued.to_json()?;
        ctx.store.push(&self.alert_queue, &payload).await?;

        metrics::counter!(m::FORWARDER_REQUEUED_TOTAL).increment(1);
        tracing::info!(
            correlation_id = requeued.correlation_id.as_deref().unwrap_or("none"),
            retry_count = requeued.retry_count,
            delay_secs = delay.as_secs(),
            "alert requeued after backoff"
        );
        Ok(Disposition::Requeued)
    }
}

#[async_trait]
impl MessageHandler for ForwardHandler {
    fn role(&self) -> &'static str {
        "forwarder"
    }

    fn dlq(&self) -> &str {
        &self.dlq
    }

    async fn handle(
        &self,
        ctx: &WorkerContext,
        envelope: EventEnvelope,
        raw: &str,
    ) -> Result<Disposition, RelayPipelineError> {
        let correlation_id = envelope.correlation_id.as_deref().unwrap_or("none");

        if !self.limiter.is_allowed().await {
            metrics::counter!(m::FORWARDER_RATE_LIMITED_TOTAL).increment(1);
            tracing::warn!(
                correlation_id,
                hostname = %envelope.hostname,
                "rate limit exceeded, discarding alert"
            );
            return Ok(Disposition::Discarded);
        }

        if self.breaker.state().await?.is_open() {
            metrics::counter!(m::FORWARDER_BREAKER_OPEN_TOTAL).increment(1);
            tracing::warn!(
                correlation_id,
                "circuit breaker open, requeueing without downstream call"
            );
            return self.requeue_with_backoff(ctx, &envelope).await;
        }

        match self.sender.send(&envelope).await {
            SendOutcome::Delivered => {
                self.breaker.record_success().await?;
                metrics::counter!(m::FORWARDER_SENT_TOTAL).increment(1);
                tracing::info!(
                    correlation_id,
                    hostname = %envelope.hostname,
                    team = envelope.team.as_deref().unwrap_or("none"),
                    "alert delivered"
                );
                Ok(Disposition::Handled)
            }
            SendOutcome::Retryable(reason) => {
                let state = self.breaker.record_failure().await?;
                metrics::counter!(
                    m::FORWARDER_FAILURES_TOTAL,
                    m::LABEL_REASON => reason.clone()
                )
                .increment(1);
                tracing::warn!(
                    correlation_id,
                    reason = %reason,
                    breaker_state = state.as_str(),
                    "retryable send failure"
                );
                self.requeue_with_backoff(ctx, &envelope).await
            }
            SendOutcome::Terminal(reason) => {
                // DLQ에는 원본 바이트를 그대로 보존합니다
                ctx.store.push(&self.dlq, raw).await?;
                metrics::counter!(
                    m::DLQ_MESSAGES_TOTAL,
                    m::LABEL_QUEUE => self.dlq.clone(),
                    m::LABEL_REASON => "terminal"
                )
                .increment(1);
                tracing::warn!(
                    correlation_id,
                    reason = %reason,
                    "terminal send failure, dead-lettered"
                );
                Ok(Disposition::DeadLettered)
            }
        }
    }
}
