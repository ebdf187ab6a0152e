//! 分布式锁管理器
//!
//! 基于临时顺序节点的锁配方：在 `locks/<name>/` 下创建临时顺序请求节点，
//! 序号最小者持锁；其余等待者watch比自己序号小的前一个节点，等它删除后
//! 重新判定。等待者因此严格按到达顺序获得授予（FIFO公平）。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, warn};

use cluster_core::models::LockMode;
use cluster_core::traits::{CoordinationClient, DistributedLock, LockService};
use cluster_core::{ClusterError, ClusterResult};

use crate::paths;

pub struct DistributedLockManager {
    client: Arc<dyn CoordinationClient>,
}

impl DistributedLockManager {
    pub fn new(client: Arc<dyn CoordinationClient>) -> Self {
        Self { client }
    }
}

/// 从请求节点名解析序号，如 `excl-0000000005` -> 5
fn parse_sequence(name: &str) -> Option<u64> {
    name.rsplit('-').next()?.parse().ok()
}

#[async_trait]
impl LockService for DistributedLockManager {
    async fn try_acquire(
        &self,
        name: &str,
        mode: LockMode,
        timeout: Duration,
    ) -> ClusterResult<Box<dyn DistributedLock>> {
        let deadline = Instant::now() + timeout;
        let dir = format!("{}/{}", paths::LOCKS, name);
        let prefix = format!("{dir}/{}-", mode.prefix());

        let session_id = self
            .client
            .session_id()
            .await
            .ok_or(ClusterError::SessionExpired)?;
        let our_path = self
            .client
            .create_sequential(&prefix, session_id.as_bytes(), true)
            .await?;
        let our_name = our_path.rsplit('/').next().unwrap_or_default().to_string();
        let our_seq = parse_sequence(&our_name)
            .ok_or_else(|| ClusterError::internal(format!("非法的锁请求节点: {our_path}")))?;

        loop {
            let children = match self.client.get_children(&dir).await {
                Ok(children) => children,
                Err(e) => {
                    let _ = self.client.delete(&our_path).await;
                    return Err(e);
                }
            };

            // 找出排在我们前面、且会阻塞我们的请求中序号最大的那个
            let mut blocking: Option<(u64, String)> = None;
            for child in &children {
                let Some(child_mode) = LockMode::from_node_name(child) else {
                    continue;
                };
                let Some(seq) = parse_sequence(child) else {
                    continue;
                };
                if seq >= our_seq {
                    continue;
                }
                let blocks = match mode {
                    // 独占请求被任何更早的请求阻塞
                    LockMode::Exclusive => true,
                    // 共享请求只被更早的独占请求阻塞
                    LockMode::Shared => child_mode == LockMode::Exclusive,
                };
                if blocks && blocking.as_ref().map_or(true, |(s, _)| seq > *s) {
                    blocking = Some((seq, child.clone()));
                }
            }

            let Some((_, prev_name)) = blocking else {
                debug!(lock = name, path = %our_path, "已获得分布式锁");
                return Ok(Box::new(LockGuard {
                    client: Arc::clone(&self.client),
                    name: name.to_string(),
                    mode,
                    path: our_path,
                    session_id,
                }));
            };

            // 先注册watch再确认节点仍在，避免错过它的删除
            let prev_path = format!("{dir}/{prev_name}");
            let watch_rx = match self.client.watch(&prev_path).await {
                Ok(rx) => rx,
                Err(e) => {
                    let _ = self.client.delete(&our_path).await;
                    return Err(e);
                }
            };
            match self.client.read(&prev_path).await {
                Err(ClusterError::NoNode { .. }) => continue,
                Err(e) => {
                    let _ = self.client.delete(&our_path).await;
                    return Err(e);
                }
                Ok(_) => {}
            }

            tokio::select! {
                _ = watch_rx => {}
                _ = sleep_until(deadline) => {
                    // 超时退出队列，不留下排队节点
                    if let Err(e) = self.client.delete(&our_path).await {
                        if !matches!(e, ClusterError::NoNode { .. }) {
                            warn!(lock = name, "清理锁请求节点失败: {e}");
                        }
                    }
                    debug!(lock = name, "获取分布式锁超时");
                    return Err(ClusterError::lock_timeout(name));
                }
            }
        }
    }
}

/// 已授予的锁，所有权绑定获取时的会话
struct LockGuard {
    client: Arc<dyn CoordinationClient>,
    name: String,
    mode: LockMode,
    path: String,
    session_id: String,
}

#[async_trait]
impl DistributedLock for LockGuard {
    fn name(&self) -> &str {
        &self.name
    }

    fn mode(&self) -> LockMode {
        self.mode
    }

    async fn is_held(&self) -> bool {
        match self.client.session_id().await {
            Some(current) if current == self.session_id => {}
            _ => return false,
        }
        self.client.read(&self.path).await.is_ok()
    }

    async fn release(self: Box<Self>) -> ClusterResult<()> {
        match self.client.delete(&self.path).await {
            Ok(()) => {
                debug!(lock = %self.name, "已释放分布式锁");
                Ok(())
            }
            // 会话过期时临时节点已经消失，视为已释放
            Err(ClusterError::NoNode { .. }) | Err(ClusterError::SessionExpired) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
