#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`rule`]: YAML 기반 라우팅 규칙 엔진 (로더, 스냅샷 컴파일, 매칭)
//! - [`router`]: 입력 큐 소비, 규칙 매칭, 알림 큐 게시 및 미처리 집계
//! - [`forwarder`]: webhook 전달, 레이트 리미팅, 서킷 브레이커, 재시도
//! - [`worker`]: 클레임-처리-확인 워커 루프 (역할 공통)
//! - [`janitor`]: 죽은 워커의 처리 목록 복구
//! - [`heartbeat`]: 워커 생존 신호 갱신 태스크
//! - [`limiter`] / [`breaker`] / [`dedup`]: 스토어 기반 공유 장치들
//! - [`pipeline`]: 전체 파이프라인 오케스트레이션 (Pipeline trait 구현)
//! - [`config`]: 파이프라인 설정 (core 설정 확장)
//! - [`error`]: 도메인 에러 타입
//!
//! # 아키텍처
//!
//! ```text
//! input queue -> Router -> alert queue -> Forwarder -> incident webhook
//!                  |                         |
//!             rules + dedup        limiter + breaker + backoff
//!                  |                         |
//!                  +----- shared store ------+---- DLQ
//! ```

pub mod backoff;
pub mod config;
pub mod context;
pub mod error;
pub mod pipeline;
pub mod worker;

pub mod forwarder;
pub mod router;
pub mod rule;

pub mod breaker;
pub mod dedup;
pub mod heartbeat;
pub mod janitor;
pub mod limiter;

// --- 주요 타입 re-export ---

// 파이프라인
pub use pipeline::{RelayPipeline, RelayPipelineBuilder};

// 설정
pub use config::{PipelineConfig, PipelineConfigBuilder};

// 에러
pub use error::RelayPipelineError;

// 규칙 엔진
pub use rule::{MatchType, RouteRule, RuleCache, RuleLoader, RuleSnapshot, match_event};

// 워커 루프
pub use context::{WorkerContext, WorkerIdentity};
pub use worker::{Disposition, MessageHandler, WorkerLoop};

// 라우터
pub use router::{AuditSink, LogAuditSink, META_ALERT_RULE_ID, RouterHandler};

// 포워더
pub use forwarder::{AlertSender, ForwardHandler, Forwarder, SendOutcome};

// 공유 장치
pub use breaker::CircuitBreaker;
pub use dedup::{UnhandledDeduper, content_signature};
pub use janitor::{Janitor, JanitorReport};
pub use limiter::RateLimiter;

// 유지 보수 태스크
pub use backoff::backoff_delay;
pub use heartbeat::spawn_heartbeat;
