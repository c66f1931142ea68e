//! 파이프라인 trait — 모듈 생명주기와 건강 상태 정의
//!
//! 라우터/포워더 파이프라인은 이 trait을 구현하여 데몬이 일관된 방식으로
//! 시작/정지/상태 조회를 수행할 수 있게 합니다.

use std::future::Future;
use std::pin::Pin;

use serde::Serialize;

use crate::error::RelaypostError;

/// dyn-compatible boxed future 타입 별칭
///
/// RPITIT trait을 trait object로 다룰 때 사용합니다.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// 파이프라인 건강 상태
///
/// 데몬 health 집계에서 worst-of 규칙으로 합산됩니다
/// (`Unhealthy` > `Degraded` > `Healthy`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum HealthStatus {
    /// 정상 동작 중
    Healthy,
    /// 동작 중이나 주의 필요 (사유 포함)
    Degraded(String),
    /// 동작 불가 (사유 포함)
    Unhealthy(String),
}

impl HealthStatus {
    /// 정상 상태인지 확인합니다.
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// 동작 불가 상태인지 확인합니다.
    pub fn is_unhealthy(&self) -> bool {
        matches!(self, Self::Unhealthy(_))
    }
}

/// 모든 파이프라인이 구현하는 생명주기 trait
///
/// # 상태 전이
/// ```text
/// Initialized → start() → Running → stop() → Stopped
/// ```
///
/// `start`는 백그라운드 태스크를 스폰한 뒤 즉시 반환하고,
/// `stop`은 진행 중인 메시지 처리를 마친 뒤 반환해야 합니다.
pub trait Pipeline: Send + Sync {
    /// 파이프라인을 시작합니다.
    ///
    /// 이미 실행 중이면 [`PipelineError::AlreadyRunning`](crate::error::PipelineError::AlreadyRunning)을
    /// 반환합니다.
    fn start(&mut self) -> impl Future<Output = Result<(), RelaypostError>> + Send;

    /// 파이프라인을 정지합니다.
    ///
    /// Graceful shutdown을 수행합니다. 실행 중이 아니면
    /// [`PipelineError::NotRunning`](crate::error::PipelineError::NotRunning)을 반환합니다.
    fn stop(&mut self) -> impl Future<Output = Result<(), RelaypostError>> + Send;

    /// 파이프라인의 건강 상태를 확인합니다.
    fn health_check(&self) -> impl Future<Output = HealthStatus> + Send;
}

/// dyn-compatible 파이프라인 trait
///
/// `Pipeline` trait은 RPITIT를 사용하므로 `dyn Pipeline`이 불가합니다.
/// `DynPipeline`은 `BoxFuture`를 반환하여 `Box<dyn DynPipeline>`으로
/// 모듈을 동적 관리할 수 있게 합니다.
pub trait DynPipeline: Send + Sync {
    /// 파이프라인을 시작합니다.
    fn start(&mut self) -> BoxFuture<'_, Result<(), RelaypostError>>;

    /// 파이프라인을 정지합니다.
    fn stop(&mut self) -> BoxFuture<'_, Result<(), RelaypostError>>;

    /// 파이프라인의 건강 상태를 확인합니다.
    fn health_check(&self) -> BoxFuture<'_, HealthStatus>;
}

/// Pipeline을 구현한 타입은 자동으로 DynPipeline도 구현됩니다.
impl<T: Pipeline> DynPipeline for T {
    fn start(&mut self) -> BoxFuture<'_, Result<(), RelaypostError>> {
        Box::pin(Pipeline::start(self))
    }

    fn stop(&mut self) -> BoxFuture<'_, Result<(), RelaypostError>> {
        Box::pin(Pipeline::stop(self))
    }

    fn health_check(&self) -> BoxFuture<'_, HealthStatus> {
        Box::pin(Pipeline::health_check(self))
    }
}
