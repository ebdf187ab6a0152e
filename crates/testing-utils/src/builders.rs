//! 测试数据构建器
//!
//! 以合理默认值创建测试实体，按需覆盖字段。

use chrono::{DateTime, Utc};
use cluster_core::models::{
    JobDefinition, JobHistoryEntry, JobOutcome, ScheduleDefinition, ScheduleEntry,
};

pub struct JobDefinitionBuilder {
    definition: JobDefinition,
}

impl JobDefinitionBuilder {
    pub fn new() -> Self {
        Self {
            definition: JobDefinition {
                id: "test_job".to_string(),
                job_type: "noop".to_string(),
                parameters: serde_json::json!({}),
                enabled: true,
            },
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.definition.id = id.to_string();
        self
    }

    pub fn with_job_type(mut self, job_type: &str) -> Self {
        self.definition.job_type = job_type.to_string();
        self
    }

    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.definition.parameters = parameters;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.definition.enabled = false;
        self
    }

    pub fn build(self) -> JobDefinition {
        self.definition
    }
}

impl Default for JobDefinitionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ScheduleEntryBuilder {
    entry: ScheduleEntry,
}

impl ScheduleEntryBuilder {
    pub fn new() -> Self {
        Self {
            entry: ScheduleEntry {
                entry_id: "test_entry".to_string(),
                cron_expression: "0 * * * * *".to_string(),
                job_type: "noop".to_string(),
                parameters: serde_json::json!({}),
                enabled: true,
            },
        }
    }

    pub fn with_entry_id(mut self, entry_id: &str) -> Self {
        self.entry.entry_id = entry_id.to_string();
        self
    }

    pub fn with_cron(mut self, cron_expression: &str) -> Self {
        self.entry.cron_expression = cron_expression.to_string();
        self
    }

    pub fn with_job_type(mut self, job_type: &str) -> Self {
        self.entry.job_type = job_type.to_string();
        self
    }

    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.entry.parameters = parameters;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.entry.enabled = false;
        self
    }

    pub fn build(self) -> ScheduleEntry {
        self.entry
    }
}

impl Default for ScheduleEntryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub struct ScheduleDefinitionBuilder {
    definition: ScheduleDefinition,
}

impl ScheduleDefinitionBuilder {
    pub fn new() -> Self {
        Self {
            definition: ScheduleDefinition {
                id: "test_schedule".to_string(),
                timezone: "UTC".to_string(),
                enabled: true,
                entries: Vec::new(),
            },
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.definition.id = id.to_string();
        self
    }

    pub fn with_timezone(mut self, timezone: &str) -> Self {
        self.definition.timezone = timezone.to_string();
        self
    }

    pub fn with_entry(mut self, entry: ScheduleEntry) -> Self {
        self.definition.entries.push(entry);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.definition.enabled = false;
        self
    }

    pub fn build(self) -> ScheduleDefinition {
        self.definition
    }
}

impl Default for ScheduleDefinitionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub struct JobHistoryEntryBuilder {
    entry: JobHistoryEntry,
}

impl JobHistoryEntryBuilder {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            entry: JobHistoryEntry {
                job_id: "test_job".to_string(),
                run_id: "run-1".to_string(),
                worker_id: "worker-1".to_string(),
                started_at: now,
                finished_at: now,
                outcome: JobOutcome::Succeeded,
                message: None,
            },
        }
    }

    pub fn with_job_id(mut self, job_id: &str) -> Self {
        self.entry.job_id = job_id.to_string();
        self
    }

    pub fn with_run_id(mut self, run_id: &str) -> Self {
        self.entry.run_id = run_id.to_string();
        self
    }

    pub fn with_outcome(mut self, outcome: JobOutcome) -> Self {
        self.entry.outcome = outcome;
        self
    }

    pub fn with_times(mut self, started_at: DateTime<Utc>, finished_at: DateTime<Utc>) -> Self {
        self.entry.started_at = started_at;
        self.entry.finished_at = finished_at;
        self
    }

    pub fn with_message(mut self, message: &str) -> Self {
        self.entry.message = Some(message.to_string());
        self
    }

    pub fn build(self) -> JobHistoryEntry {
        self.entry
    }
}

impl Default for JobHistoryEntryBuilder {
    fn default() -> Self {
        Self::new()
    }
}
