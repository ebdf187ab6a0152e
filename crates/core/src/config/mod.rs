//! # 应用配置
//!
//! 配置优先级：命令行指定的TOML文件 > 默认路径下的TOML文件 > 内置默认值，
//! 环境变量（`CLUSTER_` 前缀）最后覆盖。

use std::path::Path;

use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::errors::{ClusterError, ClusterResult};

/// 协调服务连接配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinationConfig {
    /// 会话超时（毫秒），超过此时间未续约的会话被判定过期
    pub session_timeout_ms: u64,
    /// 建立连接的总超时（毫秒）
    pub connect_timeout_ms: u64,
    /// 重连退避初始间隔（毫秒）
    pub reconnect_backoff_ms: u64,
    /// 重连退避上限（毫秒）
    pub reconnect_backoff_max_ms: u64,
}

impl Default for CoordinationConfig {
    fn default() -> Self {
        Self {
            session_timeout_ms: 30_000,
            connect_timeout_ms: 10_000,
            reconnect_backoff_ms: 100,
            reconnect_backoff_max_ms: 5_000,
        }
    }
}

/// 调度引擎配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    pub enabled: bool,
    /// 调度扫描间隔（秒）
    pub tick_interval_seconds: u64,
    /// 触发前抢锁的等待上限（毫秒）；抢不到即跳过本轮
    pub lock_wait_ms: u64,
    /// 触发消息投递的队列名
    pub trigger_queue: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_interval_seconds: 10,
            lock_wait_ms: 2_000,
            trigger_queue: "job-triggers".to_string(),
        }
    }
}

/// Worker配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub enabled: bool,
    /// 节点标识，缺省时由主机名派生
    pub node_id: String,
    /// 并发执行上限（Worker池大小）
    pub max_concurrent_jobs: usize,
    /// 消费触发消息的队列名
    pub trigger_queue: String,
    /// 心跳（节点状态发布）间隔（秒）
    pub heartbeat_interval_seconds: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            node_id: String::new(),
            max_concurrent_jobs: 4,
            trigger_queue: "job-triggers".to_string(),
            heartbeat_interval_seconds: 30,
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// `pretty` 或 `json`
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// 应用配置根
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub coordination: CoordinationConfig,
    pub dispatcher: DispatcherConfig,
    pub worker: WorkerConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// 从TOML文件和环境变量加载配置
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else {
            let default_paths = [
                "config/cluster.toml",
                "cluster.toml",
                "/etc/cluster-scheduler/config.toml",
            ];
            for path in &default_paths {
                if Path::new(path).exists() {
                    builder = builder.add_source(File::new(path, FileFormat::Toml));
                    break;
                }
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("CLUSTER")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    /// 校验配置取值
    pub fn validate(&self) -> ClusterResult<()> {
        if self.coordination.session_timeout_ms == 0 {
            return Err(ClusterError::config_error(
                "coordination.session_timeout_ms 必须大于0",
            ));
        }
        if self.coordination.reconnect_backoff_ms > self.coordination.reconnect_backoff_max_ms {
            return Err(ClusterError::config_error(
                "coordination.reconnect_backoff_ms 不能超过退避上限",
            ));
        }
        if self.dispatcher.tick_interval_seconds == 0 {
            return Err(ClusterError::config_error(
                "dispatcher.tick_interval_seconds 必须大于0",
            ));
        }
        if self.dispatcher.trigger_queue.is_empty() {
            return Err(ClusterError::config_error("dispatcher.trigger_queue 不能为空"));
        }
        if self.worker.max_concurrent_jobs == 0 {
            return Err(ClusterError::config_error(
                "worker.max_concurrent_jobs 必须大于0",
            ));
        }
        if self.worker.trigger_queue.is_empty() {
            return Err(ClusterError::config_error("worker.trigger_queue 不能为空"));
        }
        match self.logging.format.as_str() {
            "pretty" | "json" => {}
            other => {
                return Err(ClusterError::config_error(format!(
                    "不支持的日志格式: {other}"
                )))
            }
        }
        Ok(())
    }

    /// 返回配置的节点标识，缺省时由主机名派生
    pub fn effective_node_id(&self) -> String {
        if !self.worker.node_id.is_empty() {
            return self.worker.node_id.clone();
        }
        let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "node".to_string());
        format!("{host}-{}", std::process::id())
    }
}
