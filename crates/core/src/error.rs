//! 에러 타입 — 도메인별 에러 정의

/// Relaypost 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum RelaypostError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 파이프라인 처리 에러
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// 이벤트 엔벨로프 에러
    #[error("envelope error: {0}")]
    Envelope(#[from] EnvelopeError),

    /// 큐 스토어 에러
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// 플러그인 에러
    #[error("plugin error: {0}")]
    Plugin(#[from] PluginError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 파이프라인 처리 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 채널 전송 실패
    #[error("channel send failed: {0}")]
    ChannelSend(String),

    /// 채널 수신 실패
    #[error("channel receive failed: {0}")]
    ChannelRecv(String),

    /// 파이프라인 초기화 실패
    #[error("pipeline init failed: {0}")]
    InitFailed(String),

    /// 이미 실행 중인 파이프라인을 다시 시작하려 함
    #[error("pipeline already running")]
    AlreadyRunning,

    /// 실행 중이 아닌 파이프라인을 중지하려 함
    #[error("pipeline not running")]
    NotRunning,

    /// 종료 처리 실패
    #[error("pipeline shutdown failed: {0}")]
    ShutdownFailed(String),
}

/// 이벤트 엔벨로프 에러
///
/// 큐에서 꺼낸 직렬화 문자열이 엔벨로프 계약을 위반할 때 발생합니다.
/// 이 에러로 분류된 메시지는 재시도 없이 폐기됩니다.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    /// JSON 역직렬화 실패
    #[error("invalid envelope json: {0}")]
    Json(String),

    /// 필수 필드 누락 또는 빈 값
    #[error("envelope field '{field}' is missing or empty")]
    MissingField { field: String },

    /// 입력 데이터 초과
    #[error("envelope too large: {size} bytes (max: {max})")]
    TooLarge { size: usize, max: usize },
}

/// 큐 스토어 에러
///
/// 메시지 단위가 아닌 스토어 연결 수준의 에러입니다.
/// 워커 루프는 이 에러를 받으면 메시지를 ack하지 않고
/// 재연결 백오프 경로로 진입합니다.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// 연결 실패
    #[error("store connection failed: {0}")]
    Connection(String),

    /// 작업 시간 초과
    #[error("store operation timed out: {0}")]
    Timeout(String),

    /// 키가 기대한 타입이 아님
    #[error("store key '{key}' holds the wrong type: {reason}")]
    WrongType { key: String, reason: String },
}

/// 플러그인 에러
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// 동일 이름 플러그인 중복 등록
    #[error("plugin already registered: {name}")]
    AlreadyRegistered { name: String },

    /// 플러그인을 찾을 수 없음
    #[error("plugin not found: {name}")]
    NotFound { name: String },

    /// 잘못된 생명주기 상태에서 호출됨
    #[error("plugin '{name}' in invalid state: current={current}, expected={expected}")]
    InvalidState {
        name: String,
        current: String,
        expected: String,
    },

    /// 정지 실패 (수집된 에러 목록)
    #[error("plugin stop failed: {0}")]
    StopFailed(String),
}
