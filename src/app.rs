use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::broadcast;
use tracing::info;

use cluster_core::traits::{
    CoordinationClient, JobHistory, LockService, PreferencesService, QueueService,
};
use cluster_core::AppConfig;
use cluster_coordination::{
    ClusterMembership, DistributedLockManager, DistributedQueue, JobHistoryStore,
    MemoryCoordination, MemoryCoordinationClient, NodeStateRegistry, ReplicatedPreferences,
};
use cluster_dispatcher::{JobScheduleManager, SchedulerEngine};
use cluster_worker::{NoopProvider, ShellProvider, WorkerService};

/// 应用运行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    /// 仅运行调度引擎
    Dispatcher,
    /// 仅运行Worker
    Worker,
    /// 运行所有组件
    All,
}

/// 主应用程序：嵌入式单进程部署的组合根
///
/// 嵌入式模式下进程内置一个内存协调服务；多进程部署时把客户端指向
/// 外部协调服务即可，其余组件不变。
pub struct Application {
    config: AppConfig,
    mode: AppMode,
    node_id: String,
    client: Arc<MemoryCoordinationClient>,
    membership: Arc<ClusterMembership>,
    node_state: Arc<NodeStateRegistry>,
    manager: Arc<JobScheduleManager>,
    engine: Arc<SchedulerEngine>,
    worker: Arc<WorkerService>,
}

impl Application {
    pub async fn new(config: AppConfig, mode: AppMode) -> Result<Self> {
        let node_id = config.effective_node_id();
        info!(node_id = %node_id, mode = ?mode, "初始化应用程序");

        // 嵌入式协调服务与客户端
        let coordination = MemoryCoordination::new();
        let client = MemoryCoordinationClient::new(coordination, config.coordination.clone());
        client.connect().await.context("连接协调服务失败")?;
        let client_dyn: Arc<dyn CoordinationClient> = client.clone();

        // 协调层组件
        let membership = ClusterMembership::new(client_dyn.clone(), node_id.clone());
        let node_state = NodeStateRegistry::new(client_dyn.clone(), node_id.clone());
        let locks: Arc<dyn LockService> = Arc::new(DistributedLockManager::new(client_dyn.clone()));
        let queue: Arc<dyn QueueService> = Arc::new(DistributedQueue::new(client_dyn.clone()));
        let prefs: Arc<dyn PreferencesService> =
            Arc::new(ReplicatedPreferences::new(client_dyn.clone()));
        let history: Arc<dyn JobHistory> = Arc::new(JobHistoryStore::new(client_dyn.clone()));

        // 调度层
        let manager = Arc::new(JobScheduleManager::new(
            prefs.clone(),
            history.clone(),
            queue.clone(),
            config.dispatcher.trigger_queue.clone(),
        ));
        let engine = Arc::new(SchedulerEngine::new(
            manager.clone(),
            locks,
            queue.clone(),
            prefs,
            config.dispatcher.clone(),
        ));

        // Worker层
        let worker = WorkerService::builder(
            node_id.clone(),
            queue,
            history,
            config.worker.trigger_queue.clone(),
        )
        .max_concurrent_jobs(config.worker.max_concurrent_jobs)
        .heartbeat_interval_seconds(config.worker.heartbeat_interval_seconds)
        .state_publisher(node_state.clone())
        .register_provider(Arc::new(NoopProvider))
        .register_provider(Arc::new(ShellProvider))
        .build();

        Ok(Self {
            config,
            mode,
            node_id,
            client,
            membership,
            node_state,
            manager,
            engine,
            worker,
        })
    }

    pub fn manager(&self) -> Arc<JobScheduleManager> {
        Arc::clone(&self.manager)
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// 运行应用程序直至shutdown信号
    pub async fn run(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!(mode = ?self.mode, "启动应用程序");

        self.membership.start(shutdown_rx.resubscribe()).await?;
        self.node_state.start(shutdown_rx.resubscribe());

        let run_dispatcher =
            matches!(self.mode, AppMode::Dispatcher | AppMode::All) && self.config.dispatcher.enabled;
        let run_worker =
            matches!(self.mode, AppMode::Worker | AppMode::All) && self.config.worker.enabled;

        let mut engine_handle = None;
        if run_dispatcher {
            let engine = Arc::clone(&self.engine);
            let engine_shutdown = shutdown_rx.resubscribe();
            engine_handle = Some(tokio::spawn(async move {
                engine.run(engine_shutdown).await;
            }));
        }
        if run_worker {
            self.worker.start().await?;
        }

        // 等待关闭信号
        let mut shutdown_rx = shutdown_rx;
        let _ = shutdown_rx.recv().await;
        info!("收到关闭信号，开始停止组件");

        if run_worker {
            self.worker.stop().await?;
        }
        if let Some(handle) = engine_handle {
            let _ = handle.await;
        }
        self.client.close().await?;
        info!("应用程序已退出");
        Ok(())
    }
}
