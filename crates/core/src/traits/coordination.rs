use async_trait::async_trait;
use tokio::sync::{broadcast, oneshot};

use crate::errors::ClusterResult;
use crate::models::{SessionEvent, WatchEvent};

/// 外部仲裁式协调服务的瘦抽象
///
/// 协调服务本身（多数派仲裁、会话、层级命名空间）是外部协作者，这里只
/// 定义本系统消费的原语：临时节点、顺序节点、一次性watch、CAS写入。
///
/// 会话丢失会使该会话创建的所有临时节点失效，客户端以 `SessionEvent`
/// 广播通知所有依赖方，由依赖方自行重新注册。
#[async_trait]
pub trait CoordinationClient: Send + Sync {
    /// 建立会话；超时返回 `Connection` 错误
    async fn connect(&self) -> ClusterResult<()>;

    /// 结束会话并释放其下全部临时节点
    async fn close(&self) -> ClusterResult<()>;

    /// 当前会话标识，未连接时为None；每次重连都会变化
    async fn session_id(&self) -> Option<String>;

    /// 创建临时节点，会话结束时自动删除
    async fn create_ephemeral(&self, path: &str, data: &[u8]) -> ClusterResult<()>;

    /// 创建顺序节点，返回带单调序号的完整路径
    ///
    /// `ephemeral` 决定节点是否随会话一起消失：锁请求用临时顺序节点，
    /// 队列项与历史条目用持久顺序节点。
    async fn create_sequential(
        &self,
        path_prefix: &str,
        data: &[u8],
        ephemeral: bool,
    ) -> ClusterResult<String>;

    /// 删除节点；不存在时返回 `NoNode`（竞争删除以此裁决先后）
    async fn delete(&self, path: &str) -> ClusterResult<()>;

    /// 读取节点数据和版本号
    async fn read(&self, path: &str) -> ClusterResult<(Vec<u8>, u64)>;

    /// 列出直接子节点名，按名称排序
    async fn get_children(&self, path: &str) -> ClusterResult<Vec<String>>;

    /// 比较并交换写入
    ///
    /// `expected_version` 为 `None` 表示创建新节点（已存在返回 `NodeExists`）；
    /// 为 `Some(v)` 时存储版本必须等于v，否则返回 `VersionConflict`。
    /// 成功后版本号严格加一，返回新版本号。
    async fn cas_write(
        &self,
        path: &str,
        data: &[u8],
        expected_version: Option<u64>,
    ) -> ClusterResult<u64>;

    /// 注册对节点本身的一次性watch（创建/删除/数据变更）
    ///
    /// 触发一次后失效，需要重新注册才能继续观察。
    async fn watch(&self, path: &str) -> ClusterResult<oneshot::Receiver<WatchEvent>>;

    /// 注册对子节点集合的一次性watch
    async fn watch_children(&self, path: &str) -> ClusterResult<oneshot::Receiver<WatchEvent>>;

    /// 订阅会话生命周期事件
    fn session_events(&self) -> broadcast::Receiver<SessionEvent>;
}
