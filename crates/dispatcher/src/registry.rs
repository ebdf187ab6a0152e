//! 任务与调度计划管理
//!
//! 定义的CRUD以复制偏好存储为后端，编辑通过工作副本进行：
//! `working_copy` 快照当前版本，修改方法仅作用于内存，`save_*` 以快照
//! 版本做CAS写入；并发编辑表现为 `ModificationConflict`，由调用方重读
//! 重试。CRON表达式在设置时立即验证，无效表达式直接拒绝且条目保持不变。

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use cluster_core::models::{
    JobDefinition, JobHistoryEntry, ScheduleDefinition, ScheduleEntry, TriggerMessage,
};
use cluster_core::traits::{JobHistory, PreferencesService, QueueService};
use cluster_core::{ClusterError, ClusterResult};

use crate::cron_utils::CronScheduler;

const JOBS_PATH: &str = "/config/jobs";
const SCHEDULES_PATH: &str = "/config/schedules";
const DEFINITION_KEY: &str = "definition";

/// 任务定义的可变草稿
#[derive(Debug, Clone)]
pub struct JobWorkingCopy {
    definition: JobDefinition,
    base_version: u64,
}

impl JobWorkingCopy {
    pub fn definition(&self) -> &JobDefinition {
        &self.definition
    }

    pub fn base_version(&self) -> u64 {
        self.base_version
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.definition.enabled = enabled;
    }

    pub fn set_job_type(&mut self, job_type: impl Into<String>) {
        self.definition.job_type = job_type.into();
    }

    pub fn set_parameters(&mut self, parameters: serde_json::Value) {
        self.definition.parameters = parameters;
    }
}

/// 调度计划定义的可变草稿
#[derive(Debug, Clone)]
pub struct ScheduleWorkingCopy {
    definition: ScheduleDefinition,
    base_version: u64,
}

impl ScheduleWorkingCopy {
    pub fn definition(&self) -> &ScheduleDefinition {
        &self.definition
    }

    pub fn base_version(&self) -> u64 {
        self.base_version
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.definition.enabled = enabled;
    }

    /// 设置时区，未知时区立即拒绝
    pub fn set_timezone(&mut self, timezone: &str) -> ClusterResult<()> {
        CronScheduler::validate_timezone(timezone)?;
        self.definition.timezone = timezone.to_string();
        Ok(())
    }

    /// 添加条目，CRON表达式无效时拒绝且不添加
    pub fn add_entry(&mut self, entry: ScheduleEntry) -> ClusterResult<()> {
        CronScheduler::validate_expression(&entry.cron_expression)?;
        if self.definition.entry(&entry.entry_id).is_some() {
            return Err(ClusterError::internal(format!(
                "调度条目已存在: {}",
                entry.entry_id
            )));
        }
        self.definition.entries.push(entry);
        Ok(())
    }

    pub fn remove_entry(&mut self, entry_id: &str) -> ClusterResult<()> {
        let before = self.definition.entries.len();
        self.definition.entries.retain(|e| e.entry_id != entry_id);
        if self.definition.entries.len() == before {
            return Err(ClusterError::ScheduleEntryNotFound {
                id: entry_id.to_string(),
            });
        }
        Ok(())
    }

    /// 修改条目的CRON表达式
    ///
    /// 表达式无效时立即返回 `InvalidCron`，条目保持原值不变。
    pub fn set_cron_expression(&mut self, entry_id: &str, cron_expr: &str) -> ClusterResult<()> {
        CronScheduler::validate_expression(cron_expr)?;
        let entry = self
            .definition
            .entry_mut(entry_id)
            .ok_or_else(|| ClusterError::ScheduleEntryNotFound {
                id: entry_id.to_string(),
            })?;
        entry.cron_expression = cron_expr.to_string();
        Ok(())
    }

    pub fn set_entry_enabled(&mut self, entry_id: &str, enabled: bool) -> ClusterResult<()> {
        let entry = self
            .definition
            .entry_mut(entry_id)
            .ok_or_else(|| ClusterError::ScheduleEntryNotFound {
                id: entry_id.to_string(),
            })?;
        entry.enabled = enabled;
        Ok(())
    }

    pub fn set_entry_parameters(
        &mut self,
        entry_id: &str,
        parameters: serde_json::Value,
    ) -> ClusterResult<()> {
        let entry = self
            .definition
            .entry_mut(entry_id)
            .ok_or_else(|| ClusterError::ScheduleEntryNotFound {
                id: entry_id.to_string(),
            })?;
        entry.parameters = parameters;
        Ok(())
    }
}

/// 任务与调度计划管理器
pub struct JobScheduleManager {
    prefs: Arc<dyn PreferencesService>,
    history: Arc<dyn JobHistory>,
    queue: Arc<dyn QueueService>,
    trigger_queue: String,
}

impl JobScheduleManager {
    pub fn new(
        prefs: Arc<dyn PreferencesService>,
        history: Arc<dyn JobHistory>,
        queue: Arc<dyn QueueService>,
        trigger_queue: impl Into<String>,
    ) -> Self {
        Self {
            prefs,
            history,
            queue,
            trigger_queue: trigger_queue.into(),
        }
    }

    fn job_path(id: &str) -> String {
        format!("{JOBS_PATH}/{id}")
    }

    fn schedule_path(id: &str) -> String {
        format!("{SCHEDULES_PATH}/{id}")
    }

    fn definition_props<T: serde::Serialize>(definition: &T) -> ClusterResult<HashMap<String, String>> {
        let mut props = HashMap::new();
        props.insert(
            DEFINITION_KEY.to_string(),
            serde_json::to_string(definition)?,
        );
        Ok(props)
    }

    // ---- 任务定义 ----

    /// 创建任务定义；同名任务已存在时拒绝
    pub async fn create_job(&self, definition: &JobDefinition) -> ClusterResult<()> {
        let path = Self::job_path(&definition.id);
        let props = Self::definition_props(definition)?;
        self.prefs
            .write(&path, props, 0)
            .await
            .map_err(|e| match e {
                ClusterError::ModificationConflict { .. } => ClusterError::node_exists(path),
                other => other,
            })?;
        info!(job_id = %definition.id, "任务定义已创建");
        Ok(())
    }

    pub async fn get_job(&self, id: &str) -> ClusterResult<JobDefinition> {
        let node = self.prefs.read(&Self::job_path(id)).await?;
        if node.version == 0 {
            return Err(ClusterError::job_not_found(id));
        }
        let raw = node
            .get(DEFINITION_KEY)
            .ok_or_else(|| ClusterError::internal(format!("任务定义缺失: {id}")))?;
        Ok(serde_json::from_str(raw)?)
    }

    pub async fn list_jobs(&self) -> ClusterResult<Vec<String>> {
        self.prefs.children(JOBS_PATH).await
    }

    pub async fn delete_job(&self, id: &str) -> ClusterResult<()> {
        self.prefs
            .remove(&Self::job_path(id))
            .await
            .map_err(|e| match e {
                ClusterError::NoNode { .. } => ClusterError::job_not_found(id),
                other => other,
            })?;
        info!(job_id = %id, "任务定义已删除");
        Ok(())
    }

    /// 基于当前版本创建任务定义的工作副本
    pub async fn job_working_copy(&self, id: &str) -> ClusterResult<JobWorkingCopy> {
        let node = self.prefs.read(&Self::job_path(id)).await?;
        if node.version == 0 {
            return Err(ClusterError::job_not_found(id));
        }
        let raw = node
            .get(DEFINITION_KEY)
            .ok_or_else(|| ClusterError::internal(format!("任务定义缺失: {id}")))?;
        Ok(JobWorkingCopy {
            definition: serde_json::from_str(raw)?,
            base_version: node.version,
        })
    }

    /// 保存工作副本；快照版本落后时返回 `ModificationConflict`
    pub async fn save_job(&self, copy: &JobWorkingCopy) -> ClusterResult<u64> {
        let path = Self::job_path(&copy.definition.id);
        let props = Self::definition_props(&copy.definition)?;
        let version = self.prefs.write(&path, props, copy.base_version).await?;
        debug!(job_id = %copy.definition.id, version, "任务定义已保存");
        Ok(version)
    }

    // ---- 调度计划定义 ----

    /// 创建调度计划，条目的CRON表达式逐一验证
    pub async fn create_schedule(&self, definition: &ScheduleDefinition) -> ClusterResult<()> {
        CronScheduler::validate_timezone(&definition.timezone)?;
        for entry in &definition.entries {
            CronScheduler::validate_expression(&entry.cron_expression)?;
        }
        let path = Self::schedule_path(&definition.id);
        let props = Self::definition_props(definition)?;
        self.prefs
            .write(&path, props, 0)
            .await
            .map_err(|e| match e {
                ClusterError::ModificationConflict { .. } => ClusterError::node_exists(path),
                other => other,
            })?;
        info!(schedule_id = %definition.id, "调度计划已创建");
        Ok(())
    }

    pub async fn get_schedule(&self, id: &str) -> ClusterResult<ScheduleDefinition> {
        let node = self.prefs.read(&Self::schedule_path(id)).await?;
        if node.version == 0 {
            return Err(ClusterError::schedule_not_found(id));
        }
        let raw = node
            .get(DEFINITION_KEY)
            .ok_or_else(|| ClusterError::internal(format!("调度计划定义缺失: {id}")))?;
        Ok(serde_json::from_str(raw)?)
    }

    pub async fn list_schedules(&self) -> ClusterResult<Vec<String>> {
        self.prefs.children(SCHEDULES_PATH).await
    }

    pub async fn delete_schedule(&self, id: &str) -> ClusterResult<()> {
        self.prefs
            .remove(&Self::schedule_path(id))
            .await
            .map_err(|e| match e {
                ClusterError::NoNode { .. } => ClusterError::schedule_not_found(id),
                other => other,
            })?;
        info!(schedule_id = %id, "调度计划已删除");
        Ok(())
    }

    /// 基于当前版本创建调度计划的工作副本
    pub async fn schedule_working_copy(&self, id: &str) -> ClusterResult<ScheduleWorkingCopy> {
        let node = self.prefs.read(&Self::schedule_path(id)).await?;
        if node.version == 0 {
            return Err(ClusterError::schedule_not_found(id));
        }
        let raw = node
            .get(DEFINITION_KEY)
            .ok_or_else(|| ClusterError::internal(format!("调度计划定义缺失: {id}")))?;
        Ok(ScheduleWorkingCopy {
            definition: serde_json::from_str(raw)?,
            base_version: node.version,
        })
    }

    /// 保存工作副本；快照版本落后时返回 `ModificationConflict`
    pub async fn save_schedule(&self, copy: &ScheduleWorkingCopy) -> ClusterResult<u64> {
        let path = Self::schedule_path(&copy.definition.id);
        let props = Self::definition_props(&copy.definition)?;
        let version = self.prefs.write(&path, props, copy.base_version).await?;
        debug!(schedule_id = %copy.definition.id, version, "调度计划已保存");
        Ok(version)
    }

    // ---- 历史与手动触发 ----

    /// 按发生顺序（最旧在前）读取任务历史
    pub async fn history(&self, job_id: &str) -> ClusterResult<Vec<JobHistoryEntry>> {
        self.history.list(job_id).await
    }

    /// 仅保留最近 `keep_last` 条历史
    pub async fn prune_history(&self, job_id: &str, keep_last: usize) -> ClusterResult<usize> {
        self.history.prune(job_id, keep_last).await
    }

    /// 手动触发任务：绕过CRON，但仍经由触发队列分发
    pub async fn trigger_now(&self, job_id: &str) -> ClusterResult<String> {
        let job = self.get_job(job_id).await?;
        if !job.enabled {
            return Err(ClusterError::JobExecution(format!("任务已禁用: {job_id}")));
        }
        let message = TriggerMessage::manual(&job);
        let payload = message.serialize_bytes()?;
        self.queue.enqueue(&self.trigger_queue, &payload).await?;
        info!(job_id = %job_id, run_id = %message.run_id, "任务已手动触发");
        Ok(message.run_id)
    }
}
