use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::errors::ClusterResult;
use crate::models::{JobHistoryEntry, LockMode, PreferenceNode, QueueItem};

/// 已授予的分布式锁
///
/// 锁的所有权绑定在协调会话上：会话过期时临时请求节点消失，锁隐式释放。
/// 任何挂起（重连、长时间停顿）之后、执行受保护副作用之前，调用方必须用
/// `is_held` 重新确认所有权，不得假设锁仍然有效。
#[async_trait]
pub trait DistributedLock: Send + Sync {
    fn name(&self) -> &str;

    fn mode(&self) -> LockMode;

    /// 确认锁仍然被当前会话持有
    async fn is_held(&self) -> bool;

    /// 释放锁，删除请求节点；节点已消失时静默成功
    async fn release(self: Box<Self>) -> ClusterResult<()>;
}

/// 分布式互斥服务
#[async_trait]
pub trait LockService: Send + Sync {
    /// 在超时时间内尝试获取名为 `name` 的锁
    ///
    /// 等待者严格按到达（序号）顺序获得授予；超时返回 `LockTimeout`，
    /// 且不留下排队节点。
    async fn try_acquire(
        &self,
        name: &str,
        mode: LockMode,
        timeout: Duration,
    ) -> ClusterResult<Box<dyn DistributedLock>>;
}

/// 分布式竞争消费队列
#[async_trait]
pub trait QueueService: Send + Sync {
    /// 入队，返回协调服务分配的序列号
    async fn enqueue(&self, queue: &str, payload: &[u8]) -> ClusterResult<u64>;

    /// 阻塞取出序号最小的一项
    ///
    /// 同一项不会被两个消费者同时取得；队列为空时等待直至有新项或
    /// `shutdown` 信号到达（返回 `Shutdown` 错误，不留下任何副作用）。
    async fn take(
        &self,
        queue: &str,
        shutdown: broadcast::Receiver<()>,
    ) -> ClusterResult<QueueItem>;

    /// 当前队列长度
    async fn size(&self, queue: &str) -> ClusterResult<usize>;

    /// 清空队列
    async fn purge(&self, queue: &str) -> ClusterResult<()>;
}

/// 集群复制的层级偏好存储
#[async_trait]
pub trait PreferencesService: Send + Sync {
    /// 读取路径下的属性和版本号；路径不存在时返回版本0的空节点
    async fn read(&self, path: &str) -> ClusterResult<PreferenceNode>;

    /// 乐观并发写入
    ///
    /// 存储版本与 `expected_version` 不一致时返回 `ModificationConflict`，
    /// 调用方需重新读取后重试；成功返回新版本号。
    async fn write(
        &self,
        path: &str,
        properties: HashMap<String, String>,
        expected_version: u64,
    ) -> ClusterResult<u64>;

    /// 列出直接子节点名
    async fn children(&self, path: &str) -> ClusterResult<Vec<String>>;

    /// 删除路径（及本地缓存）
    async fn remove(&self, path: &str) -> ClusterResult<()>;

    /// 丢弃本地缓存并同步读穿，保证下一次读取观察到协调服务的最新状态
    async fn flush(&self, path: &str) -> ClusterResult<()>;
}

/// 节点状态发布接口
///
/// Worker心跳等组件通过它发布自身状态，不需要感知注册表全貌。
#[async_trait]
pub trait StatePublisher: Send + Sync {
    async fn publish(
        &self,
        service_key: &str,
        properties: HashMap<String, String>,
    ) -> ClusterResult<()>;
}

/// 追加式任务历史
#[async_trait]
pub trait JobHistory: Send + Sync {
    /// 追加一条历史，追加后不可变
    async fn append(&self, entry: &JobHistoryEntry) -> ClusterResult<()>;

    /// 按发生顺序（最旧在前）列出某任务的历史
    async fn list(&self, job_id: &str) -> ClusterResult<Vec<JobHistoryEntry>>;

    /// 仅保留最近 `keep_last` 条，删除更早的
    async fn prune(&self, job_id: &str, keep_last: usize) -> ClusterResult<usize>;
}
