use thiserror::Error;

/// 集群协调与任务调度的统一错误类型
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("无法建立协调服务连接: {0}")]
    Connection(String),
    #[error("协调会话已过期")]
    SessionExpired,
    #[error("协调服务节点不存在: {path}")]
    NoNode { path: String },
    #[error("协调服务节点已存在: {path}")]
    NodeExists { path: String },
    #[error("版本冲突: {path} (期望版本 {expected}, 当前版本 {actual})")]
    VersionConflict {
        path: String,
        expected: u64,
        actual: u64,
    },
    #[error("配置修改冲突: {path}，请重新读取后重试")]
    ModificationConflict { path: String },
    #[error("获取分布式锁超时: {name}")]
    LockTimeout { name: String },
    #[error("无效的CRON表达式: {expr} - {message}")]
    InvalidCron { expr: String, message: String },
    #[error("任务未找到: {id}")]
    JobNotFound { id: String },
    #[error("调度计划未找到: {id}")]
    ScheduleNotFound { id: String },
    #[error("调度条目未找到: {id}")]
    ScheduleEntryNotFound { id: String },
    #[error("不支持的任务类型: {0}")]
    UnsupportedJobType(String),
    #[error("任务执行错误: {0}")]
    JobExecution(String),
    #[error("序列化错误: {0}")]
    Serialization(String),
    #[error("配置错误: {0}")]
    Configuration(String),
    #[error("系统正在关闭")]
    Shutdown,
    #[error("内部错误: {0}")]
    Internal(String),
}

pub type ClusterResult<T> = Result<T, ClusterError>;

impl ClusterError {
    pub fn connection<S: Into<String>>(msg: S) -> Self {
        Self::Connection(msg.into())
    }
    pub fn no_node<S: Into<String>>(path: S) -> Self {
        Self::NoNode { path: path.into() }
    }
    pub fn node_exists<S: Into<String>>(path: S) -> Self {
        Self::NodeExists { path: path.into() }
    }
    pub fn lock_timeout<S: Into<String>>(name: S) -> Self {
        Self::LockTimeout { name: name.into() }
    }
    pub fn job_not_found<S: Into<String>>(id: S) -> Self {
        Self::JobNotFound { id: id.into() }
    }
    pub fn schedule_not_found<S: Into<String>>(id: S) -> Self {
        Self::ScheduleNotFound { id: id.into() }
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// 是否为调用方可重试的错误
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClusterError::Connection(_)
                | ClusterError::SessionExpired
                | ClusterError::LockTimeout { .. }
                | ClusterError::VersionConflict { .. }
                | ClusterError::ModificationConflict { .. }
        )
    }

    /// 是否为不可恢复的致命错误
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ClusterError::Internal(_) | ClusterError::Configuration(_)
        )
    }
}

impl From<serde_json::Error> for ClusterError {
    fn from(err: serde_json::Error) -> Self {
        ClusterError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for ClusterError {
    fn from(err: anyhow::Error) -> Self {
        ClusterError::Internal(err.to_string())
    }
}
