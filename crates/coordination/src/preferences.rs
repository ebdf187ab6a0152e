//! 集群复制的层级偏好存储
//!
//! 每个偏好路径对应协调服务中的一个版本化节点，属性集合以JSON存储。
//! 写入走CAS：携带读取时的版本号，落后即拒绝，由调用方重读重试（乐观
//! 并发，无内建合并）。本地读缓存由一次性watch失效；读己之写只在执行
//! 写入的节点上成立，其余节点按watch投递最终可见。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, trace};

use cluster_core::models::PreferenceNode;
use cluster_core::traits::{CoordinationClient, PreferencesService};
use cluster_core::{ClusterError, ClusterResult};

use crate::paths;

pub struct ReplicatedPreferences {
    client: Arc<dyn CoordinationClient>,
    cache: Arc<RwLock<HashMap<String, PreferenceNode>>>,
}

impl ReplicatedPreferences {
    pub fn new(client: Arc<dyn CoordinationClient>) -> Self {
        Self {
            client,
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// 逻辑路径到协调服务节点路径的映射
    fn node_path(path: &str) -> ClusterResult<String> {
        let trimmed = path.trim_matches('/');
        if trimmed.is_empty() {
            return Ok(paths::PREFS.to_string());
        }
        if trimmed.contains("//") {
            return Err(ClusterError::internal(format!("非法的偏好路径: {path}")));
        }
        Ok(format!("{}/{}", paths::PREFS, trimmed))
    }

    fn canonical(path: &str) -> String {
        let trimmed = path.trim_matches('/');
        format!("/{trimmed}")
    }

    /// 消费一次性watch，远端变更时失效对应缓存条目
    ///
    /// watch必须在读取之前注册，否则读取与注册之间的写入会留下观察
    /// 不到失效的陈旧缓存。
    fn spawn_invalidation(
        &self,
        logical: String,
        rx: tokio::sync::oneshot::Receiver<cluster_core::models::WatchEvent>,
    ) {
        let cache = Arc::clone(&self.cache);
        tokio::spawn(async move {
            if rx.await.is_ok() {
                trace!(path = %logical, "偏好缓存失效");
                cache.write().await.remove(&logical);
            }
        });
    }
}

#[async_trait]
impl PreferencesService for ReplicatedPreferences {
    async fn read(&self, path: &str) -> ClusterResult<PreferenceNode> {
        let logical = Self::canonical(path);
        if let Some(node) = self.cache.read().await.get(&logical) {
            return Ok(node.clone());
        }

        let node_path = Self::node_path(path)?;
        let watch_rx = self.client.watch(&node_path).await?;
        match self.client.read(&node_path).await {
            Ok((data, version)) => {
                let properties: HashMap<String, String> = if data.is_empty() {
                    HashMap::new()
                } else {
                    serde_json::from_slice(&data)?
                };
                let node = PreferenceNode {
                    path: logical.clone(),
                    properties,
                    version,
                };
                self.cache
                    .write()
                    .await
                    .insert(logical.clone(), node.clone());
                self.spawn_invalidation(logical, watch_rx);
                Ok(node)
            }
            // 不存在的路径返回版本0的空节点，不进入缓存
            Err(ClusterError::NoNode { .. }) => Ok(PreferenceNode::empty(logical)),
            Err(e) => Err(e),
        }
    }

    async fn write(
        &self,
        path: &str,
        properties: HashMap<String, String>,
        expected_version: u64,
    ) -> ClusterResult<u64> {
        let logical = Self::canonical(path);
        let node_path = Self::node_path(path)?;
        let data = serde_json::to_vec(&properties)?;

        let expected = if expected_version == 0 {
            None
        } else {
            Some(expected_version)
        };
        let result = self.client.cas_write(&node_path, &data, expected).await;

        // 本地缓存失效；读己之写由协调服务本身保证
        self.cache.write().await.remove(&logical);

        match result {
            Ok(version) => {
                debug!(path = %logical, version, "偏好写入成功");
                Ok(version)
            }
            Err(ClusterError::VersionConflict { .. })
            | Err(ClusterError::NodeExists { .. })
            | Err(ClusterError::NoNode { .. }) => {
                Err(ClusterError::ModificationConflict { path: logical })
            }
            Err(e) => Err(e),
        }
    }

    async fn children(&self, path: &str) -> ClusterResult<Vec<String>> {
        let node_path = Self::node_path(path)?;
        self.client.get_children(&node_path).await
    }

    async fn remove(&self, path: &str) -> ClusterResult<()> {
        let logical = Self::canonical(path);
        let node_path = Self::node_path(path)?;
        self.cache.write().await.remove(&logical);
        self.client.delete(&node_path).await
    }

    async fn flush(&self, path: &str) -> ClusterResult<()> {
        let logical = Self::canonical(path);
        self.cache.write().await.remove(&logical);

        // 同步读穿，重新填充缓存
        let node_path = Self::node_path(path)?;
        let watch_rx = self.client.watch(&node_path).await?;
        match self.client.read(&node_path).await {
            Ok((data, version)) => {
                let properties: HashMap<String, String> = if data.is_empty() {
                    HashMap::new()
                } else {
                    serde_json::from_slice(&data)?
                };
                self.cache.write().await.insert(
                    logical.clone(),
                    PreferenceNode {
                        path: logical.clone(),
                        properties,
                        version,
                    },
                );
                self.spawn_invalidation(logical, watch_rx);
                Ok(())
            }
            Err(ClusterError::NoNode { .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
