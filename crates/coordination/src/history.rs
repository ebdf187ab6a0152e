//! 追加式任务历史存储
//!
//! 每条历史是 `history/<job_id>/` 下的持久顺序节点，序号即发生顺序，
//! 天然给出"最旧在前"的读取顺序；条目一经追加不可变。

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use cluster_core::models::JobHistoryEntry;
use cluster_core::traits::{CoordinationClient, JobHistory};
use cluster_core::{ClusterError, ClusterResult};

use crate::paths;

pub struct JobHistoryStore {
    client: Arc<dyn CoordinationClient>,
}

impl JobHistoryStore {
    pub fn new(client: Arc<dyn CoordinationClient>) -> Self {
        Self { client }
    }

    fn job_dir(job_id: &str) -> String {
        format!("{}/{}", paths::HISTORY, job_id)
    }
}

#[async_trait]
impl JobHistory for JobHistoryStore {
    async fn append(&self, entry: &JobHistoryEntry) -> ClusterResult<()> {
        let data = serde_json::to_vec(entry)?;
        let prefix = format!("{}/entry-", Self::job_dir(&entry.job_id));
        self.client.create_sequential(&prefix, &data, false).await?;
        debug!(job_id = %entry.job_id, run_id = %entry.run_id, outcome = ?entry.outcome, "任务历史已记录");
        Ok(())
    }

    async fn list(&self, job_id: &str) -> ClusterResult<Vec<JobHistoryEntry>> {
        let dir = Self::job_dir(job_id);
        // 子节点按名称有序，零填充序号保证了名称序即追加序
        let names = self.client.get_children(&dir).await?;
        let mut entries = Vec::with_capacity(names.len());
        for name in names {
            match self.client.read(&format!("{dir}/{name}")).await {
                Ok((data, _)) => entries.push(serde_json::from_slice(&data)?),
                Err(ClusterError::NoNode { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(entries)
    }

    async fn prune(&self, job_id: &str, keep_last: usize) -> ClusterResult<usize> {
        let dir = Self::job_dir(job_id);
        let names = self.client.get_children(&dir).await?;
        if names.len() <= keep_last {
            return Ok(0);
        }
        let excess = names.len() - keep_last;
        let mut removed = 0;
        for name in names.into_iter().take(excess) {
            match self.client.delete(&format!("{dir}/{name}")).await {
                Ok(()) => removed += 1,
                Err(ClusterError::NoNode { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        debug!(job_id, removed, "历史已修剪");
        Ok(removed)
    }
}
