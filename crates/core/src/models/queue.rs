use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 分布式队列中的一项
///
/// 序列号由协调服务在入队时分配，队列内单调递增；消费确认后即被移除。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub queue: String,
    pub sequence: u64,
    pub payload: Vec<u8>,
    pub enqueued_at: DateTime<Utc>,
}
