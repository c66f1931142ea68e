//! 파이프라인 에러 타입 -- 워커 루프의 에러 분류 기준
//!
//! 에러의 성격이 메시지 단위 처리 결과를 결정하므로 변형별 의미가 중요합니다.
//! 스토어 연결 계열([`RelayPipelineError::is_store_loss`])은 프로세스 수준
//! 재접속으로 이어지고, 나머지는 해당 메시지의 폐기/재큐잉/DLQ 여부를 정합니다.

use thiserror::Error;

use relaypost_core::error::{EnvelopeError, PipelineError, RelaypostError, StoreError};

/// 이벤트 파이프라인 에러
#[derive(Debug, Error)]
pub enum RelayPipelineError {
    /// 엔벨로프 파싱/직렬화 실패 (폐기 경로)
    #[error("envelope error: {0}")]
    Envelope(#[from] EnvelopeError),

    /// 공유 큐 스토어 에러
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// 규칙 파일 로드 실패
    #[error("rule load error: {path}: {reason}")]
    RuleLoad {
        /// 문제가 된 파일 경로
        path: String,
        /// 실패 사유
        reason: String,
    },

    /// 규칙 유효성 검증 실패
    #[error("rule validation error: rule '{rule_id}': {reason}")]
    RuleValidation {
        /// 문제가 된 규칙 ID
        rule_id: String,
        /// 실패 사유
        reason: String,
    },

    /// 파이프라인 설정 오류
    #[error("pipeline config error: {field}: {reason}")]
    Config {
        /// 문제가 된 설정 필드
        field: String,
        /// 실패 사유
        reason: String,
    },

    /// 감사 싱크 기록 실패 (메시지 전체가 재시도 경로로 감)
    #[error("audit sink error: {0}")]
    Audit(String),

    /// webhook 클라이언트 구성 실패
    #[error("webhook client error: {0}")]
    Webhook(String),

    /// 재접속 한도 소진, 워커 루프 종료
    #[error("store connection lost after {attempts} reconnect attempts")]
    StoreLost {
        /// 시도한 재접속 횟수
        attempts: u32,
    },

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RelayPipelineError {
    /// 스토어 연결 상실 계열인지 확인합니다.
    ///
    /// 이 경우 메시지는 ack 없이 처리 목록에 남겨 두고
    /// 워커 루프가 재접속을 시도합니다.
    pub fn is_store_loss(&self) -> bool {
        matches!(
            self,
            Self::Store(StoreError::Connection(_)) | Self::Store(StoreError::Timeout(_))
        )
    }
}

impl From<RelayPipelineError> for RelaypostError {
    fn from(err: RelayPipelineError) -> Self {
        RelaypostError::Pipeline(PipelineError::InitFailed(err.to_string()))
    }
}
