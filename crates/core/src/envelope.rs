//! 이벤트 엔벨로프 — 모든 큐를 흐르는 메시지의 기본 단위
//!
//! 수집기가 입력 큐에 넣는 JSON 오브젝트를 표현합니다.
//! 필수 필드는 `hostname`, `timestamp`, `message` 세 가지이며,
//! 시스템 필드 `correlation_id`와 `retry_count`만 파이프라인이 변경합니다.
//! 그 외의 페이로드 필드는 `extra`에 그대로 보존되어 재직렬화 시 유실되지 않습니다.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::EnvelopeError;
use crate::types::Severity;

/// 직렬화된 엔벨로프의 최대 허용 크기 (1 MiB)
///
/// 초과하는 입력은 파싱 없이 즉시 폐기됩니다.
pub const MAX_ENVELOPE_BYTES: usize = 1024 * 1024;

/// 큐에 저장되는 이벤트 엔벨로프
///
/// syslog/SNMP 수집기가 만든 JSON과 1:1로 대응합니다.
/// 라우터가 규칙 매칭 결과(`rule_id`, `team`, `handling`)를 채워
/// 알림 큐로 넘기면 포워더가 그대로 webhook 페이로드를 구성합니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// 이벤트를 발생시킨 호스트명
    pub hostname: String,
    /// 수집기가 기록한 발생 시각 (원본 문자열 그대로 보존)
    pub timestamp: String,
    /// 이벤트 본문
    pub message: String,
    /// 소스 심각도 표기 (예: "error", "crit") — 수집기마다 표기가 다릅니다
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    /// SNMP trap OID — 존재하면 trap 계열 이벤트로 취급합니다
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trap_oid: Option<String>,
    /// 분산 추적 ID — 없으면 라우터가 UUID v4를 부여합니다
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    /// 재처리 횟수 — 단조 증가하며 재큐잉 시 리셋되지 않습니다
    #[serde(default)]
    pub retry_count: u32,
    /// 매칭된 규칙 ID (라우터가 기록)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    /// 담당 팀 (라우터가 기록)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team: Option<String>,
    /// 처리 방식 (예: "page_and_ticket", 라우터가 기록)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handling: Option<String>,
    /// 그 외 페이로드 필드 — 파이프라인은 읽지도 쓰지도 않습니다
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EventEnvelope {
    /// 필수 필드만으로 엔벨로프를 생성합니다.
    pub fn new(
        hostname: impl Into<String>,
        timestamp: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            timestamp: timestamp.into(),
            message: message.into(),
            severity: None,
            trap_oid: None,
            correlation_id: None,
            retry_count: 0,
            rule_id: None,
            team: None,
            handling: None,
            extra: Map::new(),
        }
    }

    /// JSON 문자열에서 엔벨로프를 파싱합니다.
    ///
    /// 크기 상한 초과 또는 필수 필드 누락 시 에러를 반환하며,
    /// 이 에러는 재시도 없이 폐기 경로로 이어집니다.
    pub fn from_json(raw: &str) -> Result<Self, EnvelopeError> {
        if raw.len() > MAX_ENVELOPE_BYTES {
            return Err(EnvelopeError::TooLarge {
                size: raw.len(),
                max: MAX_ENVELOPE_BYTES,
            });
        }
        let envelope: Self =
            serde_json::from_str(raw).map_err(|e| EnvelopeError::Json(e.to_string()))?;
        envelope.validate()?;
        Ok(envelope)
    }

    /// 엔벨로프를 JSON 문자열로 직렬화합니다.
    pub fn to_json(&self) -> Result<String, EnvelopeError> {
        serde_json::to_string(self).map_err(|e| EnvelopeError::Json(e.to_string()))
    }

    /// 필수 필드가 비어 있지 않은지 확인합니다.
    pub fn validate(&self) -> Result<(), EnvelopeError> {
        for (field, value) in [
            ("hostname", &self.hostname),
            ("timestamp", &self.timestamp),
            ("message", &self.message),
        ] {
            if value.trim().is_empty() {
                return Err(EnvelopeError::MissingField {
                    field: field.to_owned(),
                });
            }
        }
        Ok(())
    }

    /// correlation_id가 없으면 UUID v4를 부여하고, 확정된 ID를 반환합니다.
    pub fn ensure_correlation_id(&mut self) -> &str {
        if self.correlation_id.is_none() {
            self.correlation_id = Some(uuid::Uuid::new_v4().to_string());
        }
        self.correlation_id
            .as_deref()
            .unwrap_or_default()
    }

    /// 재처리 횟수를 1 증가시킵니다. 오버플로 시 상한에서 멈춥니다.
    pub fn increment_retry(&mut self) {
        self.retry_count = self.retry_count.saturating_add(1);
    }

    /// trap 계열 이벤트인지 확인합니다.
    pub fn is_trap(&self) -> bool {
        self.trap_oid.is_some()
    }

    /// 소스 심각도 문자열을 정규화된 [`Severity`]로 파싱합니다.
    ///
    /// 표기가 없거나 해석 불가능하면 `None`을 반환합니다.
    pub fn severity_parsed(&self) -> Option<Severity> {
        self.severity.as_deref().and_then(Severity::from_str_loose)
    }
}

impl fmt::Display for EventEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let corr = self.correlation_id.as_deref().unwrap_or("none");
        write!(
            f,
            "Envelope[{}] host={} retries={}",
            &corr[..8.min(corr.len())],
            self.hostname,
            self.retry_count,
        )
    }
}
