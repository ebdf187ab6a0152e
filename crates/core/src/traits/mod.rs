//! # 能力接口
//!
//! 按职责切分的窄接口。上层组件（任务与调度管理、调度引擎、Worker）只依赖
//! 这些接口，不依赖具体实现，协调层的各实现通过 `Arc<dyn Trait>` 注入。

pub mod cluster;
pub mod coordination;
pub mod job;

pub use cluster::{
    DistributedLock, JobHistory, LockService, PreferencesService, QueueService, StatePublisher,
};
pub use coordination::CoordinationClient;
pub use job::{JobContext, JobProvider};
