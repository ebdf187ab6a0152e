//! # 集群协调层
//!
//! 基于外部仲裁式协调服务原语（临时节点、顺序节点、一次性watch、CAS）
//! 构建的协调组件：成员管理、节点状态、分布式锁、分布式队列、复制偏好
//! 存储、任务历史。`memory` 模块提供嵌入式部署与测试用的内存协调服务。

pub mod history;
pub mod lock;
pub mod membership;
pub mod memory;
pub mod node_state;
pub mod preferences;
pub mod queue;

pub use history::JobHistoryStore;
pub use lock::DistributedLockManager;
pub use membership::{ClusterMembership, MembershipEvent};
pub use memory::{MemoryCoordination, MemoryCoordinationClient};
pub use node_state::NodeStateRegistry;
pub use preferences::ReplicatedPreferences;
pub use queue::DistributedQueue;

/// 协调服务命名空间中的固定路径
pub mod paths {
    pub const ROOT: &str = "/cluster";
    pub const MEMBERS: &str = "/cluster/members";
    pub const STATE: &str = "/cluster/state";
    pub const LOCKS: &str = "/cluster/locks";
    pub const QUEUES: &str = "/cluster/queues";
    pub const PREFS: &str = "/cluster/prefs";
    pub const HISTORY: &str = "/cluster/history";
}
