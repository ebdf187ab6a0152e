//! 分布式竞争消费队列
//!
//! 队列项是 `queues/<name>/` 下的持久顺序节点，按序号构成FIFO。消费者
//! 认领时先读后删，删除成功者胜出；竞争失败方静默转向下一项。不提供
//! 重投递：认领后崩溃的项按设计丢失，恢复依赖上层幂等（历史去重），
//! 不是队列本身。

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, trace};

use cluster_core::models::QueueItem;
use cluster_core::traits::{CoordinationClient, QueueService};
use cluster_core::{ClusterError, ClusterResult};

use crate::paths;

/// 队列项在协调服务中的存储格式
#[derive(Debug, Serialize, Deserialize)]
struct QueueRecord {
    enqueued_at: DateTime<Utc>,
    payload: Vec<u8>,
}

pub struct DistributedQueue {
    client: Arc<dyn CoordinationClient>,
}

impl DistributedQueue {
    pub fn new(client: Arc<dyn CoordinationClient>) -> Self {
        Self { client }
    }

    fn queue_dir(queue: &str) -> String {
        format!("{}/{}", paths::QUEUES, queue)
    }

    fn item_sequence(name: &str) -> Option<u64> {
        name.strip_prefix("item-")?.parse().ok()
    }
}

#[async_trait]
impl QueueService for DistributedQueue {
    async fn enqueue(&self, queue: &str, payload: &[u8]) -> ClusterResult<u64> {
        let record = QueueRecord {
            enqueued_at: Utc::now(),
            payload: payload.to_vec(),
        };
        let data = serde_json::to_vec(&record)?;
        let prefix = format!("{}/item-", Self::queue_dir(queue));
        let path = self.client.create_sequential(&prefix, &data, false).await?;
        let name = path.rsplit('/').next().unwrap_or_default();
        let sequence = Self::item_sequence(name)
            .ok_or_else(|| ClusterError::internal(format!("非法的队列项路径: {path}")))?;
        debug!(queue, sequence, "消息已入队");
        Ok(sequence)
    }

    async fn take(
        &self,
        queue: &str,
        mut shutdown: broadcast::Receiver<()>,
    ) -> ClusterResult<QueueItem> {
        let dir = Self::queue_dir(queue);
        loop {
            // 先注册watch再列举，两步之间入队的项不会被错过
            let watch_rx = self.client.watch_children(&dir).await?;
            let children = self.client.get_children(&dir).await?;

            let mut items: Vec<(u64, String)> = children
                .into_iter()
                .filter_map(|name| Self::item_sequence(&name).map(|seq| (seq, name)))
                .collect();
            items.sort();

            for (sequence, name) in items {
                let path = format!("{dir}/{name}");
                let (data, _version) = match self.client.read(&path).await {
                    Ok(value) => value,
                    // 已被其他消费者取走
                    Err(ClusterError::NoNode { .. }) => continue,
                    Err(e) => return Err(e),
                };
                match self.client.delete(&path).await {
                    Ok(()) => {
                        let record: QueueRecord = serde_json::from_slice(&data)?;
                        debug!(queue, sequence, "已认领队列项");
                        return Ok(QueueItem {
                            queue: queue.to_string(),
                            sequence,
                            payload: record.payload,
                            enqueued_at: record.enqueued_at,
                        });
                    }
                    // 竞争失败，继续尝试下一项
                    Err(ClusterError::NoNode { .. }) => {
                        trace!(queue, sequence, "认领竞争失败");
                        continue;
                    }
                    Err(e) => return Err(e),
                }
            }

            tokio::select! {
                _ = watch_rx => {}
                _ = shutdown.recv() => return Err(ClusterError::Shutdown),
            }
        }
    }

    async fn size(&self, queue: &str) -> ClusterResult<usize> {
        let children = self.client.get_children(&Self::queue_dir(queue)).await?;
        Ok(children
            .iter()
            .filter(|name| Self::item_sequence(name).is_some())
            .count())
    }

    async fn purge(&self, queue: &str) -> ClusterResult<()> {
        let dir = Self::queue_dir(queue);
        let children = self.client.get_children(&dir).await?;
        for name in children {
            if Self::item_sequence(&name).is_none() {
                continue;
            }
            match self.client.delete(&format!("{dir}/{name}")).await {
                Ok(()) | Err(ClusterError::NoNode { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        debug!(queue, "队列已清空");
        Ok(())
    }
}
