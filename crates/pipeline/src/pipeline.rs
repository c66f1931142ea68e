//! 파이프라인 오케스트레이션 -- Janitor, 규칙 로드, 워커 태스크의 생명주기 관리
//!
//! [`RelayPipeline`]은 core의 [`Pipeline`](relaypost_core::pipeline::Pipeline) trait을
//! 구현하여 `relaypost-daemon`에서 다른 모듈과 동일한 생명주기로 관리됩니다.
//!
//! # 시작 순서
//! ```text
//! Janitor 청소 -> 규칙 로드 -> 역할별 워커 + 하트비트 스폰
//! ```
//!
//! Janitor가 먼저 도는 이유: 이전 세대 워커가 남긴 처리 목록을 새 워커들이
//! 클레임을 시작하기 전에 큐로 되돌려, 복구된 메시지가 이번 세대에서 바로
//! 처리되게 합니다.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use relaypost_core::error::{PipelineError, RelaypostError};
use relaypost_core::metrics as m;
use relaypost_core::pipeline::{HealthStatus, Pipeline};
use relaypost_store::{MemoryStore, QueueStore, SharedStore};

use crate::config::PipelineConfig;
use crate::context::{WorkerContext, WorkerIdentity};
use crate::error::RelayPipelineError;
use crate::forwarder::{AlertSender, ForwardHandler, Forwarder};
use crate::heartbeat::spawn_heartbeat;
use crate::janitor::Janitor;
use crate::router::{AuditSink, LogAuditSink, RouterHandler};
use crate::rule::RuleCache;
use crate::worker::{MessageHandler, WorkerLoop};

/// stop()이 태스크 하나의 종료를 기다리는 최대 시간
///
/// 워커는 클레임 대기와 백오프 대기를 모두 종료 신호와 select하므로
/// 정상적으로는 현재 메시지 처리 시간 안에 끝납니다. 이 한도를 넘기면
/// 태스크를 중단시키고 메시지 회수는 Janitor에 맡깁니다.
const STOP_TIMEOUT: Duration = Duration::from_secs(30);

/// health check가 Degraded를 보고하는 큐 적체 임계값
const BACKLOG_DEGRADED_THRESHOLD: usize = 10_000;

/// 파이프라인 실행 상태
#[derive(Debug, Clone, PartialEq, Eq)]
enum PipelineState {
    /// 초기화됨, 아직 시작하지 않음
    Initialized,
    /// 실행 중
    Running,
    /// 정지됨
    Stopped,
}

/// 이벤트 라우팅 파이프라인 -- 라우터/포워더 워커의 전체 흐름을 관리합니다.
///
/// core의 `Pipeline` trait을 구현하여 `relaypost-daemon`에서
/// 다른 모듈과 동일한 생명주기(start/stop/health_check)로 관리됩니다.
///
/// # 사용 예시
/// ```ignore
/// use relaypost_pipeline::{RelayPipeline, RelayPipelineBuilder};
///
/// let mut pipeline = RelayPipelineBuilder::new()
///     .config(config)
///     .store(store)
///     .build()?;
///
/// // Pipeline trait으로 시작
/// pipeline.start().await?;
/// ```
pub struct RelayPipeline {
    /// 파이프라인 설정
    config: Arc<PipelineConfig>,
    /// 공유 큐 스토어
    store: SharedStore,
    /// 규칙 캐시 (start 시 규칙 디렉토리에서 채워짐)
    rules: RuleCache,
    /// 감사 기록 싱크
    audit: Arc<dyn AuditSink>,
    /// 현재 상태
    state: PipelineState,
    /// 워커들에게 전파되는 종료 신호
    shutdown: CancellationToken,
    /// 백그라운드 태스크 핸들 (워커 루프 + 하트비트)
    tasks: Vec<JoinHandle<()>>,
}

impl RelayPipeline {
    /// 현재 상태를 반환합니다.
    pub fn state_name(&self) -> &str {
        match self.state {
            PipelineState::Initialized => "initialized",
            PipelineState::Running => "running",
            PipelineState::Stopped => "stopped",
        }
    }

    /// 실행 중인 백그라운드 태스크 수를 반환합니다.
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// 규칙 캐시 핸들을 반환합니다.
    ///
    /// 데몬의 규칙 리로드 경로가 이 핸들로 스냅샷을 교체합니다.
    pub fn rule_cache(&self) -> &RuleCache {
        &self.rules
    }

    /// 공유 스토어 핸들을 반환합니다.
    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// 워커 태스크 하나를 스폰합니다.
    fn spawn_worker<H>(&mut self, ctx: WorkerContext, handler: H, max_retries: u32)
    where
        H: MessageHandler + 'static,
    {
        self.tasks.push(spawn_heartbeat(ctx.clone()));
        self.tasks.push(tokio::spawn(async move {
            let worker = WorkerLoop::new(ctx, handler, max_retries);
            if let Err(e) = worker.run().await {
                tracing::error!(error = %e, "worker loop terminated abnormally");
            }
        }));
    }

    /// 라우터 워커들을 스폰합니다.
    fn spawn_router_workers(&mut self) {
        for _ in 0..self.config.workers_per_role {
            let identity = WorkerIdentity::new(
                &self.config.store.key_prefix,
                "router",
                &self.config.router.input_queue,
            );
            let ctx = WorkerContext::new(
                self.store.clone(),
                self.config.clone(),
                identity,
                self.shutdown.clone(),
            );
            let handler = RouterHandler::new(
                &self.config,
                self.store.clone(),
                self.rules.clone(),
                self.audit.clone(),
            );
            self.spawn_worker(ctx, handler, self.config.router.max_retries);
        }
    }

    /// 포워더 워커들을 스폰합니다.
    ///
    /// HTTP 클라이언트(연결 풀)는 하나를 만들어 모든 워커가 공유합니다.
    fn spawn_forwarder_workers(&mut self) -> Result<(), RelayPipelineError> {
        let sender: Arc<dyn AlertSender> = Arc::new(Forwarder::new(&self.config)?);
        for _ in 0..self.config.workers_per_role {
            let identity = WorkerIdentity::new(
                &self.config.store.key_prefix,
                "forwarder",
                &self.config.forwarder.alert_queue,
            );
            let ctx = WorkerContext::new(
                self.store.clone(),
                self.config.clone(),
                identity,
                self.shutdown.clone(),
            );
            let handler = ForwardHandler::new(&self.config, self.store.clone(), sender.clone());
            self.spawn_worker(ctx, handler, self.config.forwarder.max_retries);
        }
        Ok(())
    }

    /// 활성화된 큐들의 깊이를 점검하고 게이지를 갱신합니다.
    async fn queue_health(&self) -> HealthStatus {
        let mut queues = Vec::new();
        let mut dlqs = Vec::new();
        if self.config.router.enabled {
            queues.push(&self.config.router.input_queue);
            dlqs.push(&self.config.router.dlq);
        }
        if self.config.forwarder.enabled {
            queues.push(&self.config.forwarder.alert_queue);
            dlqs.push(&self.config.forwarder.dlq);
        }

        let mut reasons = Vec::new();
        for queue in queues {
            match self.store.list_len(queue).await {
                Ok(depth) => {
                    metrics::gauge!(m::QUEUE_DEPTH, m::LABEL_QUEUE => queue.clone())
                        .set(depth as f64);
                    if depth > BACKLOG_DEGRADED_THRESHOLD {
                        reasons.push(format!("queue {queue} backlog: {depth}"));
                    }
                }
                Err(e) => {
                    // 워커가 자체 재접속하므로 스토어 장애는 복구 가능 상태입니다
                    reasons.push(format!("store unreachable: {e}"));
                    break;
                }
            }
        }
        for dlq in dlqs {
            if let Ok(depth) = self.store.list_len(dlq).await {
                metrics::gauge!(m::DLQ_DEPTH, m::LABEL_QUEUE => dlq.clone()).set(depth as f64);
            }
        }

        if reasons.is_empty() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded(reasons.join("; "))
        }
    }
}

impl Pipeline for RelayPipeline {
    async fn start(&mut self) -> Result<(), RelaypostError> {
        if self.state == PipelineState::Running {
            return Err(PipelineError::AlreadyRunning.into());
        }

        tracing::info!("starting relay pipeline");

        // 재시작을 지원하도록 세대마다 새 토큰을 씁니다
        self.shutdown = CancellationToken::new();

        // 1. 이전 세대가 남긴 고아 메시지를 큐로 되돌립니다
        let janitor = Janitor::new(self.store.clone(), &self.config);
        let report = janitor.run().await?;
        if report.recovered_messages > 0 {
            tracing::info!(
                recovered = report.recovered_messages,
                workers = report.reclaimed_workers,
                "janitor recovered orphaned messages before startup"
            );
        }

        // 2. 규칙 로드
        if self.config.router.enabled {
            let count = self
                .rules
                .reload_from_dir(
                    &self.config.router.rule_dir,
                    self.config.dev_hosts.clone(),
                    self.config.host_team_map.clone(),
                )
                .await?;
            tracing::info!(rules = count, dir = %self.config.router.rule_dir, "loaded routing rules");
        }

        // 3. 역할별 워커 + 하트비트 스폰
        if self.config.router.enabled {
            self.spawn_router_workers();
        }
        if self.config.forwarder.enabled {
            self.spawn_forwarder_workers()?;
        }

        self.state = PipelineState::Running;
        tracing::info!(tasks = self.tasks.len(), "relay pipeline started");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), RelaypostError> {
        if self.state != PipelineState::Running {
            return Err(PipelineError::NotRunning.into());
        }

        tracing::info!("stopping relay pipeline");
        self.shutdown.cancel();

        // 워커는 현재 메시지를 끝까지 처리하고 자기 처리 목록을 드레인한 뒤
        // 끝납니다. 한도를 넘긴 태스크만 중단시킵니다.
        for task in self.tasks.drain(..) {
            let abort = task.abort_handle();
            match tokio::time::timeout(STOP_TIMEOUT, task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) if e.is_panic() => {
                    tracing::error!("worker task panicked during shutdown");
                }
                Ok(Err(_)) => {}
                Err(_) => {
                    tracing::warn!("task exceeded stop timeout, aborting");
                    abort.abort();
                }
            }
        }

        self.state = PipelineState::Stopped;
        tracing::info!("relay pipeline stopped");
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            PipelineState::Running => self.queue_health().await,
            PipelineState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            PipelineState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

/// 파이프라인 빌더
///
/// 스토어, 규칙 캐시, 감사 싱크를 주입하고 설정을 검증한 뒤
/// 파이프라인을 생성합니다.
pub struct RelayPipelineBuilder {
    config: PipelineConfig,
    store: Option<SharedStore>,
    rules: Option<RuleCache>,
    audit: Option<Arc<dyn AuditSink>>,
}

impl RelayPipelineBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
            store: None,
            rules: None,
            audit: None,
        }
    }

    /// 파이프라인 설정을 지정합니다.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// 공유 큐 스토어를 지정합니다. 지정하지 않으면 인메모리 스토어를 씁니다.
    pub fn store(mut self, store: SharedStore) -> Self {
        self.store = Some(store);
        self
    }

    /// 규칙 캐시를 지정합니다.
    ///
    /// 데몬처럼 파이프라인 밖에서도 리로드해야 하는 경우 외부에서 만든
    /// 핸들을 주입합니다. 지정하지 않으면 빈 캐시로 시작합니다.
    pub fn rule_cache(mut self, rules: RuleCache) -> Self {
        self.rules = Some(rules);
        self
    }

    /// 감사 기록 싱크를 지정합니다. 기본값은 로그 싱크입니다.
    pub fn audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// 설정을 검증하고 파이프라인을 생성합니다.
    pub fn build(self) -> Result<RelayPipeline, RelayPipelineError> {
        self.config.validate()?;

        Ok(RelayPipeline {
            config: Arc::new(self.config),
            store: self.store.unwrap_or_else(MemoryStore::shared),
            rules: self.rules.unwrap_or_default(),
            audit: self.audit.unwrap_or_else(|| Arc::new(LogAuditSink)),
            state: PipelineState::Initialized,
            shutdown: CancellationToken::new(),
            tasks: Vec::new(),
        })
    }
}

impl Default for RelayPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
