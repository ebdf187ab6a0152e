//! 集群成员管理
//!
//! 节点连接后在成员目录下创建临时自描述节点；所有节点watch成员目录，
//! 子节点增删时重算在线集合并广播上线/下线事件。成员视图与真实存活
//! 最终一致，误差受协调服务会话超时约束；同一节点可能收到重复的
//! 上线/下线事件，消费方需要容忍。

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use cluster_core::models::{ClusterNode, NodeDescriptor, SessionEvent};
use cluster_core::traits::CoordinationClient;
use cluster_core::{ClusterError, ClusterResult};

use crate::paths;

/// 成员变更事件
#[derive(Debug, Clone)]
pub enum MembershipEvent {
    NodeOnline(ClusterNode),
    NodeOffline(String),
}

pub struct ClusterMembership {
    client: Arc<dyn CoordinationClient>,
    node_id: String,
    hostname: String,
    members: Arc<RwLock<HashMap<String, ClusterNode>>>,
    events_tx: broadcast::Sender<MembershipEvent>,
}

impl ClusterMembership {
    pub fn new(client: Arc<dyn CoordinationClient>, node_id: impl Into<String>) -> Arc<Self> {
        let (events_tx, _) = broadcast::channel(64);
        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        Arc::new(Self {
            client,
            node_id: node_id.into(),
            hostname,
            members: Arc::new(RwLock::new(HashMap::new())),
            events_tx,
        })
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MembershipEvent> {
        self.events_tx.subscribe()
    }

    /// 最近一次计算得到的在线成员视图
    pub async fn current_members(&self) -> Vec<ClusterNode> {
        self.members.read().await.values().cloned().collect()
    }

    /// 注册自身并启动观察任务
    pub async fn start(
        self: &Arc<Self>,
        shutdown: broadcast::Receiver<()>,
    ) -> ClusterResult<()> {
        self.register().await?;
        self.refresh().await?;

        let this = Arc::clone(self);
        let watch_shutdown = shutdown.resubscribe();
        tokio::spawn(async move {
            this.watch_loop(watch_shutdown).await;
        });

        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.session_loop(shutdown).await;
        });

        info!(node_id = %self.node_id, "集群成员注册完成");
        Ok(())
    }

    /// 在成员目录下创建临时自描述节点
    async fn register(&self) -> ClusterResult<()> {
        let session_id = self
            .client
            .session_id()
            .await
            .ok_or(ClusterError::SessionExpired)?;
        let descriptor = NodeDescriptor {
            node_id: self.node_id.clone(),
            hostname: self.hostname.clone(),
            session_id,
            registered_at: Utc::now(),
        };
        let data = serde_json::to_vec(&descriptor)?;
        let path = format!("{}/{}", paths::MEMBERS, self.node_id);

        match self.client.create_ephemeral(&path, &data).await {
            Ok(()) => Ok(()),
            // 旧会话留下的陈旧注册，先清除再重建
            Err(ClusterError::NodeExists { .. }) => {
                let _ = self.client.delete(&path).await;
                self.client.create_ephemeral(&path, &data).await
            }
            Err(e) => Err(e),
        }
    }

    /// 重算在线集合并广播差异
    async fn refresh(&self) -> ClusterResult<()> {
        let names = self.client.get_children(paths::MEMBERS).await?;
        let mut fresh = HashMap::new();
        for name in names {
            let path = format!("{}/{}", paths::MEMBERS, name);
            match self.client.read(&path).await {
                Ok((data, _)) => match serde_json::from_slice::<NodeDescriptor>(&data) {
                    Ok(descriptor) => {
                        fresh.insert(name.clone(), ClusterNode::online(descriptor));
                    }
                    Err(e) => warn!(node = %name, "成员描述信息损坏: {e}"),
                },
                // 列举与读取之间下线
                Err(ClusterError::NoNode { .. }) => continue,
                Err(e) => return Err(e),
            }
        }

        let mut members = self.members.write().await;
        for (id, node) in &fresh {
            if !members.contains_key(id) {
                debug!(node = %id, "节点上线");
                let _ = self.events_tx.send(MembershipEvent::NodeOnline(node.clone()));
            }
        }
        for id in members.keys() {
            if !fresh.contains_key(id) {
                debug!(node = %id, "节点下线");
                let _ = self.events_tx.send(MembershipEvent::NodeOffline(id.clone()));
            }
        }
        *members = fresh;
        Ok(())
    }

    async fn watch_loop(&self, mut shutdown: broadcast::Receiver<()>) {
        loop {
            let watch_rx = match self.client.watch_children(paths::MEMBERS).await {
                Ok(rx) => rx,
                Err(ClusterError::SessionExpired) => {
                    // 等待重连后由session_loop恢复
                    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                    continue;
                }
                Err(e) => {
                    warn!("注册成员watch失败: {e}");
                    tokio::time::sleep(std::time::Duration::from_millis(500)).await;
                    continue;
                }
            };
            if let Err(e) = self.refresh().await {
                if !matches!(e, ClusterError::SessionExpired) {
                    warn!("刷新成员视图失败: {e}");
                }
            }
            tokio::select! {
                _ = watch_rx => {}
                _ = shutdown.recv() => return,
            }
        }
    }

    async fn session_loop(&self, mut shutdown: broadcast::Receiver<()>) {
        let mut events = self.client.session_events();
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(SessionEvent::Expired) => {
                        // 本会话的临时注册已失效，本地视图不再可信
                        let mut members = self.members.write().await;
                        for id in members.keys() {
                            let _ = self.events_tx.send(MembershipEvent::NodeOffline(id.clone()));
                        }
                        members.clear();
                    }
                    Ok(SessionEvent::Reconnected { .. }) => {
                        info!(node_id = %self.node_id, "会话重建，重新注册集群成员");
                        if let Err(e) = self.register().await {
                            warn!("重新注册成员失败: {e}");
                        }
                        if let Err(e) = self.refresh().await {
                            warn!("重连后刷新成员视图失败: {e}");
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return,
                },
                _ = shutdown.recv() => return,
            }
        }
    }
}
