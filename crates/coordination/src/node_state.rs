//! 节点状态注册表
//!
//! 节点以 `(service_key -> 属性集合)` 的形式发布自身状态，存储为
//! `state/<node_id>/<service_key>` 下的临时节点，集群内可查询。状态不
//! 跨会话持久：重连后由注册表自动重新发布。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use cluster_core::models::{NodeStateEntry, SessionEvent};
use cluster_core::traits::{CoordinationClient, StatePublisher};
use cluster_core::{ClusterError, ClusterResult};

use crate::paths;

pub struct NodeStateRegistry {
    client: Arc<dyn CoordinationClient>,
    node_id: String,
    /// 本节点已发布的状态，重连后据此重建
    published: Arc<RwLock<HashMap<String, HashMap<String, String>>>>,
}

impl NodeStateRegistry {
    pub fn new(client: Arc<dyn CoordinationClient>, node_id: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            client,
            node_id: node_id.into(),
            published: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// 启动会话监听，重连后自动重新发布全部状态
    pub fn start(self: &Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut events = this.client.session_events();
            loop {
                tokio::select! {
                    event = events.recv() => match event {
                        Ok(SessionEvent::Reconnected { .. }) => {
                            info!(node_id = %this.node_id, "会话重建，重新发布节点状态");
                            this.republish().await;
                        }
                        Ok(SessionEvent::Expired) => {}
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => return,
                    },
                    _ = shutdown.recv() => return,
                }
            }
        });
    }

    async fn write_entry(
        &self,
        service_key: &str,
        properties: &HashMap<String, String>,
    ) -> ClusterResult<()> {
        let path = format!("{}/{}/{}", paths::STATE, self.node_id, service_key);
        let data = serde_json::to_vec(properties)?;
        match self.client.create_ephemeral(&path, &data).await {
            Ok(()) => Ok(()),
            // 刷新已有状态：删掉旧节点重建
            Err(ClusterError::NodeExists { .. }) => {
                let _ = self.client.delete(&path).await;
                self.client.create_ephemeral(&path, &data).await
            }
            Err(e) => Err(e),
        }
    }

    async fn republish(&self) {
        let snapshot = self.published.read().await.clone();
        for (service_key, properties) in snapshot {
            if let Err(e) = self.write_entry(&service_key, &properties).await {
                warn!(service_key = %service_key, "重新发布节点状态失败: {e}");
            }
        }
    }

    /// 查询当前存活的状态条目，按节点和服务键过滤
    ///
    /// 不存在的节点或服务键得到空结果，而不是错误。
    pub async fn query(
        &self,
        node_id: Option<&str>,
        service_key: Option<&str>,
    ) -> ClusterResult<Vec<NodeStateEntry>> {
        let node_ids: Vec<String> = match node_id {
            Some(id) => vec![id.to_string()],
            None => self.client.get_children(paths::STATE).await?,
        };

        let mut entries = Vec::new();
        for id in node_ids {
            let node_dir = format!("{}/{}", paths::STATE, id);
            let keys = self.client.get_children(&node_dir).await?;
            for key in keys {
                if let Some(wanted) = service_key {
                    if key != wanted {
                        continue;
                    }
                }
                let path = format!("{node_dir}/{key}");
                match self.client.read(&path).await {
                    Ok((data, _)) => {
                        let properties: HashMap<String, String> = if data.is_empty() {
                            HashMap::new()
                        } else {
                            serde_json::from_slice(&data)?
                        };
                        entries.push(NodeStateEntry {
                            node_id: id.clone(),
                            service_key: key,
                            properties,
                        });
                    }
                    // 查询期间节点下线
                    Err(ClusterError::NoNode { .. }) => continue,
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(entries)
    }
}

#[async_trait]
impl StatePublisher for NodeStateRegistry {
    async fn publish(
        &self,
        service_key: &str,
        properties: HashMap<String, String>,
    ) -> ClusterResult<()> {
        self.write_entry(service_key, &properties).await?;
        self.published
            .write()
            .await
            .insert(service_key.to_string(), properties);
        debug!(node_id = %self.node_id, service_key, "节点状态已发布");
        Ok(())
    }
}
