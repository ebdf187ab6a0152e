use serde::{Deserialize, Serialize};

/// 分布式锁模式
///
/// 同一名称下任一时刻至多一个 `Exclusive` 持有者；`Shared` 持有者可以共存，
/// 但不能与更早排队的 `Exclusive` 请求同时持有。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LockMode {
    #[serde(rename = "EXCLUSIVE")]
    Exclusive,
    #[serde(rename = "SHARED")]
    Shared,
}

impl LockMode {
    /// 请求节点名中编码模式用的前缀
    pub fn prefix(&self) -> &'static str {
        match self {
            LockMode::Exclusive => "excl",
            LockMode::Shared => "shared",
        }
    }

    /// 从请求节点名还原模式
    pub fn from_node_name(name: &str) -> Option<Self> {
        if name.starts_with("excl-") {
            Some(LockMode::Exclusive)
        } else if name.starts_with("shared-") {
            Some(LockMode::Shared)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_round_trip() {
        assert_eq!(
            LockMode::from_node_name("excl-0000000003"),
            Some(LockMode::Exclusive)
        );
        assert_eq!(
            LockMode::from_node_name("shared-0000000010"),
            Some(LockMode::Shared)
        );
        assert_eq!(LockMode::from_node_name("other-1"), None);
    }
}
