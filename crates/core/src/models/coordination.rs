use serde::{Deserialize, Serialize};

/// 观察到的节点变更类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum WatchKind {
    /// 节点被创建
    Created,
    /// 节点被删除
    Deleted,
    /// 节点数据变更
    DataChanged,
    /// 子节点集合变更
    ChildrenChanged,
}

/// 一次性watch触发时投递的事件
///
/// watch触发后即失效，需要重新注册才能继续观察。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchEvent {
    pub path: String,
    pub kind: WatchKind,
}

/// 协调会话生命周期事件
///
/// 会话过期是全局失效信号：该会话下创建的所有临时节点（锁、成员注册、
/// 节点状态）全部失效，依赖方收到 `Expired` 后不得假设仍持有任何所有权，
/// 收到 `Reconnected` 后需要重新注册。
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// 会话已过期，临时状态全部失效
    Expired,
    /// 已重建会话，携带新的会话标识
    Reconnected { session_id: String },
}
