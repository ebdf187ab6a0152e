//! 测试辅助工具

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use cluster_core::config::CoordinationConfig;
use cluster_core::traits::CoordinationClient;
use cluster_coordination::{MemoryCoordination, MemoryCoordinationClient};

/// 短超时的协调配置，保证失败用例快速返回
pub fn test_coordination_config() -> CoordinationConfig {
    CoordinationConfig {
        session_timeout_ms: 2_000,
        connect_timeout_ms: 2_000,
        reconnect_backoff_ms: 1,
        reconnect_backoff_max_ms: 20,
    }
}

/// 连接到指定内存协调服务的客户端
pub async fn connected_client(
    service: &Arc<MemoryCoordination>,
) -> Arc<MemoryCoordinationClient> {
    let client = MemoryCoordinationClient::new(Arc::clone(service), test_coordination_config());
    client.connect().await.expect("建立测试协调会话失败");
    client
}

/// 一个内存协调服务加 `clients` 个已连接客户端，构成测试"集群"
pub async fn test_cluster(
    clients: usize,
) -> (Arc<MemoryCoordination>, Vec<Arc<MemoryCoordinationClient>>) {
    let service = MemoryCoordination::new();
    let mut connected = Vec::with_capacity(clients);
    for _ in 0..clients {
        connected.push(connected_client(&service).await);
    }
    (service, connected)
}

/// 测试用shutdown信号
pub fn shutdown_channel() -> (broadcast::Sender<()>, broadcast::Receiver<()>) {
    broadcast::channel(4)
}

/// 轮询等待异步条件成立，超时返回false
pub async fn eventually<F, Fut>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
