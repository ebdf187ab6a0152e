use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 集群节点状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum NodeStatus {
    #[serde(rename = "CONNECTING")]
    Connecting,
    #[serde(rename = "ONLINE")]
    Online,
    #[serde(rename = "OFFLINE")]
    Offline,
    #[serde(rename = "DISCONNECTED")]
    Disconnected,
}

/// 节点注册到成员目录下的自描述信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDescriptor {
    /// 节点唯一标识，重启后保持不变
    pub node_id: String,
    pub hostname: String,
    /// 当前协调会话标识，每次重连都会变化
    pub session_id: String,
    pub registered_at: DateTime<Utc>,
}

/// 集群成员视图中的一个节点
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterNode {
    pub descriptor: NodeDescriptor,
    pub status: NodeStatus,
}

impl ClusterNode {
    pub fn online(descriptor: NodeDescriptor) -> Self {
        Self {
            descriptor,
            status: NodeStatus::Online,
        }
    }

    pub fn is_online(&self) -> bool {
        matches!(self.status, NodeStatus::Online)
    }
}

/// 节点发布的命名状态条目
///
/// 由发布节点独占写入，集群内所有节点可见；节点下线后随会话一起消失。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeStateEntry {
    pub node_id: String,
    pub service_key: String,
    pub properties: HashMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_node_online() {
        let node = ClusterNode::online(NodeDescriptor {
            node_id: "node-1".to_string(),
            hostname: "host-a".to_string(),
            session_id: "s-1".to_string(),
            registered_at: Utc::now(),
        });
        assert!(node.is_online());
        assert_eq!(node.descriptor.node_id, "node-1");
    }
}
