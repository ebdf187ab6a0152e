use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 任务定义
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDefinition {
    /// 上下文内唯一标识
    pub id: String,
    /// 任务类型，由Worker侧的任务提供者按名称解析
    pub job_type: String,
    /// 任务参数
    pub parameters: serde_json::Value,
    pub enabled: bool,
}

impl JobDefinition {
    pub fn new(id: impl Into<String>, job_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            job_type: job_type.into(),
            parameters: serde_json::json!({}),
            enabled: true,
        }
    }
}

/// 调度计划中的一个条目：CRON表达式 + 任务类型 + 参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub entry_id: String,
    pub cron_expression: String,
    pub job_type: String,
    pub parameters: serde_json::Value,
    pub enabled: bool,
}

/// 调度计划定义
///
/// 修改通过工作副本进行，显式保存后才对集群可见。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleDefinition {
    pub id: String,
    /// IANA时区名，CRON表达式在该时区下求值
    pub timezone: String,
    pub enabled: bool,
    pub entries: Vec<ScheduleEntry>,
}

impl ScheduleDefinition {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            timezone: "UTC".to_string(),
            enabled: true,
            entries: Vec::new(),
        }
    }

    pub fn entry(&self, entry_id: &str) -> Option<&ScheduleEntry> {
        self.entries.iter().find(|e| e.entry_id == entry_id)
    }

    pub fn entry_mut(&mut self, entry_id: &str) -> Option<&mut ScheduleEntry> {
        self.entries.iter_mut().find(|e| e.entry_id == entry_id)
    }
}

/// 任务执行结果
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobOutcome {
    #[serde(rename = "SUCCEEDED")]
    Succeeded,
    #[serde(rename = "FAILED")]
    Failed,
    #[serde(rename = "CANCELLED")]
    Cancelled,
}

/// 任务提供者返回的执行结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    pub success: bool,
    pub message: Option<String>,
}

impl JobResult {
    pub fn success() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    pub fn success_with(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

/// 任务历史条目，追加后不可变
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobHistoryEntry {
    pub job_id: String,
    pub run_id: String,
    pub worker_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: JobOutcome,
    pub message: Option<String>,
}

/// 触发来源
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TriggerSource {
    /// 调度引擎按CRON表达式触发
    Cron,
    /// 管理接口手动触发
    Manual,
}

/// 触发消息：调度引擎产生、Worker消费的队列载荷
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerMessage {
    /// 运行标识，由调度标识与触发时间派生，支持消费侧去重
    pub run_id: String,
    pub job_id: String,
    pub job_type: String,
    pub parameters: serde_json::Value,
    pub source: TriggerSource,
    pub fired_at: DateTime<Utc>,
}

impl TriggerMessage {
    /// CRON触发消息，run_id = `<schedule>:<entry>:<触发分钟>`
    pub fn cron(
        schedule_id: &str,
        entry: &ScheduleEntry,
        fire_minute: DateTime<Utc>,
    ) -> Self {
        Self {
            run_id: format!(
                "{}:{}:{}",
                schedule_id,
                entry.entry_id,
                fire_minute.format("%Y-%m-%dT%H:%MZ")
            ),
            job_id: entry.entry_id.clone(),
            job_type: entry.job_type.clone(),
            parameters: entry.parameters.clone(),
            source: TriggerSource::Cron,
            fired_at: fire_minute,
        }
    }

    /// 手动触发消息，run_id = `manual:<job>:<uuid>`
    pub fn manual(job: &JobDefinition) -> Self {
        Self {
            run_id: format!("manual:{}:{}", job.id, Uuid::new_v4()),
            job_id: job.id.clone(),
            job_type: job.job_type.clone(),
            parameters: job.parameters.clone(),
            source: TriggerSource::Manual,
            fired_at: Utc::now(),
        }
    }

    pub fn serialize_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn deserialize_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
