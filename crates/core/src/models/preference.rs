use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// 复制偏好树中的一个节点
///
/// 每次成功写入版本号严格加一；写入必须携带读取时的版本号，否则被拒绝。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreferenceNode {
    pub path: String,
    pub properties: HashMap<String, String>,
    pub version: u64,
}

impl PreferenceNode {
    /// 尚不存在的路径对应的空节点，版本号为0
    pub fn empty(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            properties: HashMap::new(),
            version: 0,
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(|v| v.as_str())
    }
}
