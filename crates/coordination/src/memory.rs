//! 内存协调服务实现
//!
//! 单进程内对外部仲裁式协调服务的替身，提供与真实服务一致的节点语义：
//! 临时节点、持久/临时顺序节点、版本化CAS写入、一次性watch、会话过期。
//! 适用于嵌入式部署和测试场景；多个客户端共享同一个 `MemoryCoordination`
//! 即构成一个"集群"。

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::{broadcast, oneshot, RwLock};
use tokio::time::sleep;
use tracing::{debug, info, warn};
use uuid::Uuid;

use cluster_core::config::CoordinationConfig;
use cluster_core::models::{SessionEvent, WatchEvent, WatchKind};
use cluster_core::traits::CoordinationClient;
use cluster_core::{ClusterError, ClusterResult};

/// 存储的命名空间节点
#[derive(Debug)]
struct StoredNode {
    data: Vec<u8>,
    version: u64,
    /// 临时节点的属主会话；持久节点为None
    ephemeral_owner: Option<String>,
}

#[derive(Default)]
struct CoordState {
    /// 层级命名空间，BTreeMap保证子节点按名称有序
    nodes: BTreeMap<String, StoredNode>,
    /// 顺序节点计数器，按父节点单调递增（同一目录下不同名称前缀共享
    /// 一个序号空间，保证序号全序）
    seq_counters: HashMap<String, u64>,
    /// 存活会话集合
    sessions: HashMap<String, Instant>,
    /// 节点watch：创建/删除/数据变更时触发一次
    node_watches: HashMap<String, Vec<oneshot::Sender<WatchEvent>>>,
    /// 子节点watch：子节点增删时触发一次
    child_watches: HashMap<String, Vec<oneshot::Sender<WatchEvent>>>,
    /// 测试钩子：接下来N次建会话请求直接失败
    connect_failures: u32,
}

impl CoordState {
    fn fire_node(&mut self, path: &str, kind: WatchKind) {
        if let Some(senders) = self.node_watches.remove(path) {
            for sender in senders {
                let _ = sender.send(WatchEvent {
                    path: path.to_string(),
                    kind,
                });
            }
        }
    }

    fn fire_children(&mut self, parent: &str) {
        if let Some(senders) = self.child_watches.remove(parent) {
            for sender in senders {
                let _ = sender.send(WatchEvent {
                    path: parent.to_string(),
                    kind: WatchKind::ChildrenChanged,
                });
            }
        }
    }

    /// 自底向上补齐缺失的持久父节点
    fn ensure_parents(&mut self, path: &str) {
        let mut missing = Vec::new();
        let mut current = parent_of(path);
        while let Some(parent) = current {
            if parent == "/" || self.nodes.contains_key(&parent) {
                break;
            }
            missing.push(parent.clone());
            current = parent_of(&parent);
        }
        for parent in missing.into_iter().rev() {
            self.nodes.insert(
                parent.clone(),
                StoredNode {
                    data: Vec::new(),
                    version: 1,
                    ephemeral_owner: None,
                },
            );
            self.fire_node(&parent, WatchKind::Created);
            if let Some(grand) = parent_of(&parent) {
                self.fire_children(&grand);
            }
        }
    }

    fn insert_node(&mut self, path: &str, data: Vec<u8>, ephemeral_owner: Option<String>) {
        self.ensure_parents(path);
        self.nodes.insert(
            path.to_string(),
            StoredNode {
                data,
                version: 1,
                ephemeral_owner,
            },
        );
        self.fire_node(path, WatchKind::Created);
        if let Some(parent) = parent_of(path) {
            self.fire_children(&parent);
        }
    }

    fn remove_node(&mut self, path: &str) -> bool {
        if self.nodes.remove(path).is_none() {
            return false;
        }
        self.fire_node(path, WatchKind::Deleted);
        if let Some(parent) = parent_of(path) {
            self.fire_children(&parent);
        }
        true
    }

    fn check_session(&self, session_id: &str) -> ClusterResult<()> {
        if self.sessions.contains_key(session_id) {
            Ok(())
        } else {
            Err(ClusterError::SessionExpired)
        }
    }
}

fn parent_of(path: &str) -> Option<String> {
    let idx = path.rfind('/')?;
    if idx == 0 {
        if path.len() > 1 {
            Some("/".to_string())
        } else {
            None
        }
    } else {
        Some(path[..idx].to_string())
    }
}

fn validate_path(path: &str) -> ClusterResult<()> {
    if !path.starts_with('/') || (path.len() > 1 && path.ends_with('/')) {
        return Err(ClusterError::internal(format!("非法的节点路径: {path}")));
    }
    Ok(())
}

/// 内存协调服务（"服务端"）
///
/// 持有整个命名空间与会话表；测试钩子允许注入连接失败和强制会话过期。
#[derive(Default)]
pub struct MemoryCoordination {
    state: Mutex<CoordState>,
}

impl MemoryCoordination {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// 测试钩子：接下来 `count` 次建会话请求返回连接错误
    pub fn inject_connect_failures(&self, count: u32) {
        self.state.lock().unwrap().connect_failures = count;
    }

    /// 强制指定会话过期，删除其全部临时节点并触发相应watch
    ///
    /// 模拟真实协调服务中会话超时的服务端行为。
    pub fn expire_session(&self, session_id: &str) {
        let mut state = self.state.lock().unwrap();
        if state.sessions.remove(session_id).is_none() {
            return;
        }
        let owned: Vec<String> = state
            .nodes
            .iter()
            .filter(|(_, node)| node.ephemeral_owner.as_deref() == Some(session_id))
            .map(|(path, _)| path.clone())
            .collect();
        for path in owned {
            state.remove_node(&path);
        }
        debug!(session_id, "会话已过期，临时节点已清除");
    }

    pub fn session_count(&self) -> usize {
        self.state.lock().unwrap().sessions.len()
    }

    fn create_session(&self) -> ClusterResult<String> {
        let mut state = self.state.lock().unwrap();
        if state.connect_failures > 0 {
            state.connect_failures -= 1;
            return Err(ClusterError::connection("协调服务暂时不可达"));
        }
        let session_id = Uuid::new_v4().to_string();
        state.sessions.insert(session_id.clone(), Instant::now());
        Ok(session_id)
    }

    fn create(
        &self,
        session_id: &str,
        path: &str,
        data: &[u8],
        ephemeral: bool,
    ) -> ClusterResult<()> {
        validate_path(path)?;
        let mut state = self.state.lock().unwrap();
        state.check_session(session_id)?;
        if state.nodes.contains_key(path) {
            return Err(ClusterError::node_exists(path));
        }
        let owner = ephemeral.then(|| session_id.to_string());
        state.insert_node(path, data.to_vec(), owner);
        Ok(())
    }

    fn create_sequential(
        &self,
        session_id: &str,
        prefix: &str,
        data: &[u8],
        ephemeral: bool,
    ) -> ClusterResult<String> {
        let dir = prefix
            .rsplit_once('/')
            .map(|(dir, _)| dir.to_string())
            .ok_or_else(|| ClusterError::internal(format!("非法的顺序节点前缀: {prefix}")))?;
        let mut state = self.state.lock().unwrap();
        state.check_session(session_id)?;
        let counter = state.seq_counters.entry(dir).or_insert(0);
        let seq = *counter;
        *counter += 1;
        let path = format!("{prefix}{seq:010}");
        let owner = ephemeral.then(|| session_id.to_string());
        state.insert_node(&path, data.to_vec(), owner);
        Ok(path)
    }

    fn delete(&self, session_id: &str, path: &str) -> ClusterResult<()> {
        validate_path(path)?;
        let mut state = self.state.lock().unwrap();
        state.check_session(session_id)?;
        if state.remove_node(path) {
            Ok(())
        } else {
            Err(ClusterError::no_node(path))
        }
    }

    fn read(&self, session_id: &str, path: &str) -> ClusterResult<(Vec<u8>, u64)> {
        validate_path(path)?;
        let state = self.state.lock().unwrap();
        state.check_session(session_id)?;
        state
            .nodes
            .get(path)
            .map(|node| (node.data.clone(), node.version))
            .ok_or_else(|| ClusterError::no_node(path))
    }

    fn get_children(&self, session_id: &str, path: &str) -> ClusterResult<Vec<String>> {
        validate_path(path)?;
        let state = self.state.lock().unwrap();
        state.check_session(session_id)?;
        let prefix = if path == "/" {
            "/".to_string()
        } else {
            format!("{path}/")
        };
        let mut children = Vec::new();
        for key in state
            .nodes
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .map(|(key, _)| key)
        {
            let rest = &key[prefix.len()..];
            if !rest.is_empty() && !rest.contains('/') {
                children.push(rest.to_string());
            }
        }
        Ok(children)
    }

    fn cas_write(
        &self,
        session_id: &str,
        path: &str,
        data: &[u8],
        expected_version: Option<u64>,
    ) -> ClusterResult<u64> {
        validate_path(path)?;
        let mut state = self.state.lock().unwrap();
        state.check_session(session_id)?;
        match expected_version {
            None => {
                if state.nodes.contains_key(path) {
                    return Err(ClusterError::node_exists(path));
                }
                state.insert_node(path, data.to_vec(), None);
                Ok(1)
            }
            Some(expected) => {
                let node = state
                    .nodes
                    .get_mut(path)
                    .ok_or_else(|| ClusterError::no_node(path))?;
                if node.version != expected {
                    let actual = node.version;
                    return Err(ClusterError::VersionConflict {
                        path: path.to_string(),
                        expected,
                        actual,
                    });
                }
                node.data = data.to_vec();
                node.version += 1;
                let new_version = node.version;
                state.fire_node(path, WatchKind::DataChanged);
                Ok(new_version)
            }
        }
    }

    fn watch(
        &self,
        session_id: &str,
        path: &str,
    ) -> ClusterResult<oneshot::Receiver<WatchEvent>> {
        validate_path(path)?;
        let mut state = self.state.lock().unwrap();
        state.check_session(session_id)?;
        let (tx, rx) = oneshot::channel();
        state.node_watches.entry(path.to_string()).or_default().push(tx);
        Ok(rx)
    }

    fn watch_children(
        &self,
        session_id: &str,
        path: &str,
    ) -> ClusterResult<oneshot::Receiver<WatchEvent>> {
        validate_path(path)?;
        let mut state = self.state.lock().unwrap();
        state.check_session(session_id)?;
        let (tx, rx) = oneshot::channel();
        state
            .child_watches
            .entry(path.to_string())
            .or_default()
            .push(tx);
        Ok(rx)
    }
}

/// 内存协调服务的客户端，一个实例对应一个会话
pub struct MemoryCoordinationClient {
    service: Arc<MemoryCoordination>,
    config: CoordinationConfig,
    session: RwLock<Option<String>>,
    session_tx: broadcast::Sender<SessionEvent>,
}

impl MemoryCoordinationClient {
    pub fn new(service: Arc<MemoryCoordination>, config: CoordinationConfig) -> Arc<Self> {
        let (session_tx, _) = broadcast::channel(16);
        Arc::new(Self {
            service,
            config,
            session: RwLock::new(None),
            session_tx,
        })
    }

    /// 带退避的建会话循环，总时长受 `connect_timeout_ms` 约束
    async fn connect_with_backoff(&self) -> ClusterResult<String> {
        let deadline = Instant::now() + Duration::from_millis(self.config.connect_timeout_ms);
        let mut delay = Duration::from_millis(self.config.reconnect_backoff_ms.max(1));
        let max_delay = Duration::from_millis(self.config.reconnect_backoff_max_ms.max(1));

        loop {
            match self.service.create_session() {
                Ok(session_id) => return Ok(session_id),
                Err(e) => {
                    if Instant::now() + delay >= deadline {
                        warn!("建立协调会话失败: {e}");
                        return Err(ClusterError::connection(format!(
                            "连接超时 ({}ms)",
                            self.config.connect_timeout_ms
                        )));
                    }
                    let jitter_ms = {
                        let quarter = (delay.as_millis() as u64 / 4).max(1);
                        rand::rng().random_range(0..quarter)
                    };
                    debug!("连接失败，{}ms后重试: {e}", delay.as_millis() + jitter_ms as u128);
                    sleep(delay + Duration::from_millis(jitter_ms)).await;
                    delay = (delay * 2).min(max_delay);
                }
            }
        }
    }

    async fn current_session(&self) -> ClusterResult<String> {
        self.session
            .read()
            .await
            .clone()
            .ok_or(ClusterError::SessionExpired)
    }

    /// 强制当前会话过期并自动重连
    ///
    /// 先广播 `Expired`（依赖方据此放弃全部临时状态的所有权），随后以退避
    /// 重建会话并广播 `Reconnected`。也用于测试中模拟会话丢失。
    pub async fn expire_session(&self) -> ClusterResult<()> {
        let old = {
            let mut session = self.session.write().await;
            session.take()
        };
        if let Some(old_session) = old {
            self.service.expire_session(&old_session);
            info!("协调会话已过期: {old_session}");
        }
        let _ = self.session_tx.send(SessionEvent::Expired);

        let new_session = self.connect_with_backoff().await?;
        *self.session.write().await = Some(new_session.clone());
        info!("协调会话已重建: {new_session}");
        let _ = self
            .session_tx
            .send(SessionEvent::Reconnected {
                session_id: new_session,
            });
        Ok(())
    }
}

#[async_trait]
impl CoordinationClient for MemoryCoordinationClient {
    async fn connect(&self) -> ClusterResult<()> {
        {
            let session = self.session.read().await;
            if session.is_some() {
                return Ok(());
            }
        }
        let session_id = self.connect_with_backoff().await?;
        info!("协调会话已建立: {session_id}");
        *self.session.write().await = Some(session_id);
        Ok(())
    }

    async fn close(&self) -> ClusterResult<()> {
        if let Some(session_id) = self.session.write().await.take() {
            self.service.expire_session(&session_id);
            debug!("协调会话已关闭: {session_id}");
        }
        Ok(())
    }

    async fn session_id(&self) -> Option<String> {
        self.session.read().await.clone()
    }

    async fn create_ephemeral(&self, path: &str, data: &[u8]) -> ClusterResult<()> {
        let session = self.current_session().await?;
        self.service.create(&session, path, data, true)
    }

    async fn create_sequential(
        &self,
        path_prefix: &str,
        data: &[u8],
        ephemeral: bool,
    ) -> ClusterResult<String> {
        let session = self.current_session().await?;
        self.service
            .create_sequential(&session, path_prefix, data, ephemeral)
    }

    async fn delete(&self, path: &str) -> ClusterResult<()> {
        let session = self.current_session().await?;
        self.service.delete(&session, path)
    }

    async fn read(&self, path: &str) -> ClusterResult<(Vec<u8>, u64)> {
        let session = self.current_session().await?;
        self.service.read(&session, path)
    }

    async fn get_children(&self, path: &str) -> ClusterResult<Vec<String>> {
        let session = self.current_session().await?;
        self.service.get_children(&session, path)
    }

    async fn cas_write(
        &self,
        path: &str,
        data: &[u8],
        expected_version: Option<u64>,
    ) -> ClusterResult<u64> {
        let session = self.current_session().await?;
        self.service.cas_write(&session, path, data, expected_version)
    }

    async fn watch(&self, path: &str) -> ClusterResult<oneshot::Receiver<WatchEvent>> {
        let session = self.current_session().await?;
        self.service.watch(&session, path)
    }

    async fn watch_children(&self, path: &str) -> ClusterResult<oneshot::Receiver<WatchEvent>> {
        let session = self.current_session().await?;
        self.service.watch_children(&session, path)
    }

    fn session_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.session_tx.subscribe()
    }
}
