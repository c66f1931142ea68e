#![doc = include_str!("../README.md")]

pub mod config;
pub mod envelope;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod plugin;
pub mod types;

// --- 주요 타입 re-export ---
// 각 모듈의 핵심 타입을 크레이트 루트에서 바로 사용할 수 있도록 합니다.

// 에러
pub use error::{
    ConfigError, EnvelopeError, PipelineError, PluginError, RelaypostError, StoreError,
};

// 설정
pub use config::RelaypostConfig;

// 엔벨로프
pub use envelope::{EventEnvelope, MAX_ENVELOPE_BYTES};

// 파이프라인 trait
pub use pipeline::{BoxFuture, DynPipeline, HealthStatus, Pipeline};

// 플러그인
pub use plugin::{DynPlugin, Plugin, PluginInfo, PluginRegistry, PluginState, PluginType};

// 도메인 타입
pub use types::Severity;
