//! # 数据模型
//!
//! 定义集群协调层与任务调度引擎共享的核心数据结构。
//!
//! 所有时间字段使用 `DateTime<Utc>` 确保时区一致性；状态字段使用枚举类型，
//! 避免无效状态；模型均实现序列化，支持协调服务存储和节点间传输。

pub mod coordination;
pub mod job;
pub mod lock;
pub mod node;
pub mod preference;
pub mod queue;

pub use coordination::{SessionEvent, WatchEvent, WatchKind};
pub use job::{
    JobDefinition, JobHistoryEntry, JobOutcome, JobResult, ScheduleDefinition, ScheduleEntry,
    TriggerMessage, TriggerSource,
};
pub use lock::LockMode;
pub use node::{ClusterNode, NodeDescriptor, NodeStateEntry, NodeStatus};
pub use preference::PreferenceNode;
pub use queue::QueueItem;
