//! Worker引擎
//!
//! 每个节点一个有界Worker池，每个Worker循环：从触发队列阻塞取出 ->
//! 解析任务类型提供者 -> 构造执行上下文 -> 执行 -> 记录历史。单个任务
//! 的失败记为FAILED历史，绝不影响池内其他Worker；执行中崩溃不留历史，
//! 从Worker视角为至多一次执行。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, RwLock};
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use cluster_core::models::{JobHistoryEntry, JobOutcome, QueueItem, TriggerMessage};
use cluster_core::traits::{JobContext, JobHistory, JobProvider, QueueService, StatePublisher};
use cluster_core::{ClusterError, ClusterResult};

/// Worker服务构建器
pub struct WorkerServiceBuilder {
    node_id: String,
    queue: Arc<dyn QueueService>,
    history: Arc<dyn JobHistory>,
    providers: HashMap<String, Arc<dyn JobProvider>>,
    max_concurrent_jobs: usize,
    trigger_queue: String,
    heartbeat_interval_seconds: u64,
    state_publisher: Option<Arc<dyn StatePublisher>>,
}

impl WorkerServiceBuilder {
    pub fn new(
        node_id: impl Into<String>,
        queue: Arc<dyn QueueService>,
        history: Arc<dyn JobHistory>,
        trigger_queue: impl Into<String>,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            queue,
            history,
            providers: HashMap::new(),
            max_concurrent_jobs: 4,
            trigger_queue: trigger_queue.into(),
            heartbeat_interval_seconds: 30,
            state_publisher: None,
        }
    }

    pub fn max_concurrent_jobs(mut self, max_concurrent_jobs: usize) -> Self {
        self.max_concurrent_jobs = max_concurrent_jobs.max(1);
        self
    }

    pub fn heartbeat_interval_seconds(mut self, seconds: u64) -> Self {
        self.heartbeat_interval_seconds = seconds;
        self
    }

    /// 通过节点状态注册表发布Worker心跳
    pub fn state_publisher(mut self, publisher: Arc<dyn StatePublisher>) -> Self {
        self.state_publisher = Some(publisher);
        self
    }

    /// 注册任务类型提供者
    pub fn register_provider(mut self, provider: Arc<dyn JobProvider>) -> Self {
        let name = provider.name().to_string();
        info!(job_type = %name, "注册任务提供者");
        self.providers.insert(name, provider);
        self
    }

    pub fn build(self) -> Arc<WorkerService> {
        Arc::new(WorkerService {
            node_id: self.node_id,
            queue: self.queue,
            history: self.history,
            providers: Arc::new(self.providers),
            max_concurrent_jobs: self.max_concurrent_jobs,
            trigger_queue: self.trigger_queue,
            heartbeat_interval_seconds: self.heartbeat_interval_seconds,
            state_publisher: self.state_publisher,
            running: Arc::new(RwLock::new(HashMap::new())),
            shutdown_tx: RwLock::new(None),
        })
    }
}

/// Worker服务实现
pub struct WorkerService {
    node_id: String,
    queue: Arc<dyn QueueService>,
    history: Arc<dyn JobHistory>,
    providers: Arc<HashMap<String, Arc<dyn JobProvider>>>,
    max_concurrent_jobs: usize,
    trigger_queue: String,
    heartbeat_interval_seconds: u64,
    state_publisher: Option<Arc<dyn StatePublisher>>,
    /// 正在执行的任务: run_id -> 执行上下文
    running: Arc<RwLock<HashMap<String, JobContext>>>,
    shutdown_tx: RwLock<Option<broadcast::Sender<()>>>,
}

impl WorkerService {
    pub fn builder(
        node_id: impl Into<String>,
        queue: Arc<dyn QueueService>,
        history: Arc<dyn JobHistory>,
        trigger_queue: impl Into<String>,
    ) -> WorkerServiceBuilder {
        WorkerServiceBuilder::new(node_id, queue, history, trigger_queue)
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn supported_job_types(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }

    /// 启动Worker池和心跳
    pub async fn start(self: &Arc<Self>) -> ClusterResult<()> {
        let mut shutdown_guard = self.shutdown_tx.write().await;
        if shutdown_guard.is_some() {
            return Ok(());
        }
        let (shutdown_tx, _) = broadcast::channel(16);
        *shutdown_guard = Some(shutdown_tx.clone());
        drop(shutdown_guard);

        for worker_index in 0..self.max_concurrent_jobs {
            let this = Arc::clone(self);
            let shutdown_rx = shutdown_tx.subscribe();
            tokio::spawn(async move {
                this.worker_loop(worker_index, shutdown_rx).await;
            });
        }

        if self.state_publisher.is_some() {
            let this = Arc::clone(self);
            let shutdown_rx = shutdown_tx.subscribe();
            tokio::spawn(async move {
                this.heartbeat_loop(shutdown_rx).await;
            });
        }

        info!(
            node_id = %self.node_id,
            workers = self.max_concurrent_jobs,
            queue = %self.trigger_queue,
            "Worker服务已启动"
        );
        Ok(())
    }

    /// 停止Worker池，等待执行中的任务收尾
    pub async fn stop(&self) -> ClusterResult<()> {
        let shutdown_tx = self.shutdown_tx.write().await.take();
        let Some(tx) = shutdown_tx else {
            return Ok(());
        };
        let _ = tx.send(());

        // 有界等待执行中任务结束
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        while !self.running.read().await.is_empty() {
            if tokio::time::Instant::now() >= deadline {
                warn!("等待执行中任务超时，强制停止Worker服务");
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        info!(node_id = %self.node_id, "Worker服务已停止");
        Ok(())
    }

    pub async fn running_jobs(&self) -> Vec<String> {
        self.running.read().await.keys().cloned().collect()
    }

    pub async fn is_job_running(&self, run_id: &str) -> bool {
        self.running.read().await.contains_key(run_id)
    }

    /// 协作式取消：设置取消标志，由提供者自行检查
    ///
    /// 返回是否找到了对应的执行实例。
    pub async fn cancel(&self, run_id: &str) -> bool {
        if let Some(context) = self.running.read().await.get(run_id) {
            info!(run_id = %run_id, "请求取消任务执行");
            context.cancel();
            true
        } else {
            false
        }
    }

    async fn worker_loop(&self, worker_index: usize, mut shutdown: broadcast::Receiver<()>) {
        debug!(worker = worker_index, "Worker循环已启动");
        loop {
            // 外层持久接收器兜底：任务执行期间到达的关闭信号不会因take
            // 内部的临时订阅而丢失
            let take_rx = shutdown.resubscribe();
            tokio::select! {
                result = self.queue.take(&self.trigger_queue, take_rx) => match result {
                    Ok(item) => self.handle_trigger(item).await,
                    Err(ClusterError::Shutdown) => {
                        debug!(worker = worker_index, "Worker循环已退出");
                        return;
                    }
                    // 会话重建期间取队列会短暂失败，稍候重试
                    Err(ClusterError::SessionExpired) => {
                        tokio::time::sleep(Duration::from_millis(200)).await;
                    }
                    Err(e) => {
                        warn!(worker = worker_index, "取触发消息失败: {e}");
                        tokio::time::sleep(Duration::from_millis(500)).await;
                    }
                },
                _ = shutdown.recv() => {
                    debug!(worker = worker_index, "Worker循环已退出");
                    return;
                }
            }
        }
    }

    /// 处理一条触发消息并记录历史
    async fn handle_trigger(&self, item: QueueItem) {
        let message = match TriggerMessage::deserialize_bytes(&item.payload) {
            Ok(message) => message,
            Err(e) => {
                // 损坏的触发消息只能丢弃
                error!(sequence = item.sequence, "触发消息解析失败: {e}");
                return;
            }
        };

        let started_at = Utc::now();
        let Some(provider) = self.providers.get(&message.job_type) else {
            error!(job_type = %message.job_type, "未找到任务类型提供者");
            self.append_history(JobHistoryEntry {
                job_id: message.job_id.clone(),
                run_id: message.run_id.clone(),
                worker_id: self.node_id.clone(),
                started_at,
                finished_at: Utc::now(),
                outcome: JobOutcome::Failed,
                message: Some(format!("不支持的任务类型: {}", message.job_type)),
            })
            .await;
            return;
        };
        let provider = Arc::clone(provider);

        let context = JobContext::new(
            message.run_id.clone(),
            message.job_id.clone(),
            message.job_type.clone(),
            message.parameters.clone(),
            self.node_id.clone(),
        );
        self.running
            .write()
            .await
            .insert(message.run_id.clone(), context.clone());

        info!(
            run_id = %message.run_id,
            job_type = %message.job_type,
            "开始执行任务"
        );
        let result = provider.execute(&context).await;
        let finished_at = Utc::now();

        let (outcome, outcome_message) = if context.is_cancelled() {
            (JobOutcome::Cancelled, Some("执行已取消".to_string()))
        } else {
            match result {
                Ok(job_result) if job_result.success => (JobOutcome::Succeeded, job_result.message),
                Ok(job_result) => (JobOutcome::Failed, job_result.message),
                Err(e) => (JobOutcome::Failed, Some(e.to_string())),
            }
        };

        self.append_history(JobHistoryEntry {
            job_id: message.job_id.clone(),
            run_id: message.run_id.clone(),
            worker_id: self.node_id.clone(),
            started_at,
            finished_at,
            outcome,
            message: outcome_message,
        })
        .await;

        self.running.write().await.remove(&message.run_id);
        info!(run_id = %message.run_id, outcome = ?outcome, "任务执行结束");
    }

    /// 历史写入失败只告警，不得拖垮Worker池
    async fn append_history(&self, entry: JobHistoryEntry) {
        if let Err(e) = self.history.append(&entry).await {
            error!(run_id = %entry.run_id, "记录任务历史失败: {e}");
        }
    }

    async fn heartbeat_loop(&self, mut shutdown: broadcast::Receiver<()>) {
        let Some(publisher) = self.state_publisher.clone() else {
            return;
        };
        let mut ticker = interval(Duration::from_secs(self.heartbeat_interval_seconds.max(1)));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let mut properties = HashMap::new();
                    properties.insert(
                        "running_jobs".to_string(),
                        self.running.read().await.len().to_string(),
                    );
                    properties.insert(
                        "capacity".to_string(),
                        self.max_concurrent_jobs.to_string(),
                    );
                    let mut job_types = self.supported_job_types();
                    job_types.sort();
                    properties.insert("job_types".to_string(), job_types.join(","));
                    if let Err(e) = publisher.publish("worker", properties).await {
                        warn!("发布Worker心跳失败: {e}");
                    }
                }
                _ = shutdown.recv() => return,
            }
        }
    }
}
