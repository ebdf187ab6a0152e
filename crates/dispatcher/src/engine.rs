//! 调度引擎
//!
//! 周期性扫描启用的调度计划，对当前分钟内到期的条目先抢该条目的独占
//! 分布式锁，抢到后检查触发标记、投递触发消息、写回标记、立即释放锁；
//! 抢不到（其他节点正在触发）或超时就跳过本轮，同一分钟内不重试。
//! "每个到期分钟至多一次触发"由锁竞争加CAS触发标记共同裁决，与各节点
//! 时钟精度无关。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, info, warn};

use cluster_core::config::DispatcherConfig;
use cluster_core::models::{LockMode, ScheduleDefinition, ScheduleEntry, TriggerMessage};
use cluster_core::traits::{DistributedLock, LockService, PreferencesService, QueueService};
use cluster_core::{ClusterError, ClusterResult};

use crate::cron_utils::{minute_floor, CronScheduler};
use crate::registry::JobScheduleManager;

const SCHEDULE_STATE_PATH: &str = "/schedule-state";
const LAST_FIRE_KEY: &str = "last_fire";

/// 引擎状态机
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Evaluating,
    Triggering,
}

pub struct SchedulerEngine {
    manager: Arc<JobScheduleManager>,
    locks: Arc<dyn LockService>,
    queue: Arc<dyn QueueService>,
    prefs: Arc<dyn PreferencesService>,
    config: DispatcherConfig,
    state: RwLock<EngineState>,
    /// 本地去重：条目 -> 最近处理过的分钟
    fired: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl SchedulerEngine {
    pub fn new(
        manager: Arc<JobScheduleManager>,
        locks: Arc<dyn LockService>,
        queue: Arc<dyn QueueService>,
        prefs: Arc<dyn PreferencesService>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            manager,
            locks,
            queue,
            prefs,
            config,
            state: RwLock::new(EngineState::Idle),
            fired: Mutex::new(HashMap::new()),
        }
    }

    pub async fn state(&self) -> EngineState {
        *self.state.read().await
    }

    /// 周期性tick循环，直至shutdown信号
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.tick_interval_seconds));
        info!(
            interval = self.config.tick_interval_seconds,
            "调度引擎已启动"
        );
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick(Utc::now()).await {
                        warn!("调度扫描失败: {e}");
                    }
                }
                _ = shutdown.recv() => {
                    info!("调度引擎已停止");
                    return;
                }
            }
        }
    }

    /// 单轮扫描，返回本轮投递的触发数
    ///
    /// `now` 显式传入，便于测试注入时间。
    pub async fn tick(&self, now: DateTime<Utc>) -> ClusterResult<usize> {
        *self.state.write().await = EngineState::Evaluating;
        let minute = minute_floor(now);
        let mut triggered = 0;

        let schedule_ids = self.manager.list_schedules().await?;
        for schedule_id in schedule_ids {
            let schedule = match self.manager.get_schedule(&schedule_id).await {
                Ok(schedule) => schedule,
                // 扫描期间被删除
                Err(ClusterError::ScheduleNotFound { .. }) => continue,
                Err(e) => {
                    warn!(schedule_id = %schedule_id, "读取调度计划失败: {e}");
                    continue;
                }
            };
            if !schedule.enabled {
                continue;
            }
            for entry in &schedule.entries {
                if !entry.enabled {
                    continue;
                }
                if self.fired_locally(&entry.entry_id, minute).await {
                    continue;
                }
                let cron = match CronScheduler::with_timezone(
                    &entry.cron_expression,
                    &schedule.timezone,
                ) {
                    Ok(cron) => cron,
                    Err(e) => {
                        warn!(entry_id = %entry.entry_id, "调度条目无效，跳过: {e}");
                        continue;
                    }
                };
                if !cron.fires_in_minute(minute) {
                    continue;
                }

                match self.trigger_entry(&schedule, entry, minute).await {
                    Ok(fired) => {
                        if fired {
                            triggered += 1;
                        }
                        self.mark_fired_locally(&entry.entry_id, minute).await;
                    }
                    // 其他节点正在触发，本轮跳过，同一分钟不重试
                    Err(ClusterError::LockTimeout { .. }) => {
                        debug!(entry_id = %entry.entry_id, "触发锁被占用，跳过本轮");
                        self.mark_fired_locally(&entry.entry_id, minute).await;
                    }
                    Err(e) => {
                        warn!(entry_id = %entry.entry_id, "触发调度条目失败: {e}");
                    }
                }
            }
        }

        *self.state.write().await = EngineState::Idle;
        Ok(triggered)
    }

    async fn fired_locally(&self, entry_id: &str, minute: DateTime<Utc>) -> bool {
        self.fired.lock().await.get(entry_id) == Some(&minute)
    }

    async fn mark_fired_locally(&self, entry_id: &str, minute: DateTime<Utc>) {
        self.fired.lock().await.insert(entry_id.to_string(), minute);
    }

    /// 持锁触发单个条目；返回是否真正投递了触发消息
    async fn trigger_entry(
        &self,
        schedule: &ScheduleDefinition,
        entry: &ScheduleEntry,
        minute: DateTime<Utc>,
    ) -> ClusterResult<bool> {
        *self.state.write().await = EngineState::Triggering;
        let lock_name = format!("schedule-entry:{}", entry.entry_id);
        let lock = self
            .locks
            .try_acquire(
                &lock_name,
                LockMode::Exclusive,
                Duration::from_millis(self.config.lock_wait_ms),
            )
            .await?;

        let result = self
            .trigger_under_lock(schedule, entry, minute, lock.as_ref())
            .await;
        if let Err(e) = lock.release().await {
            warn!(entry_id = %entry.entry_id, "释放触发锁失败: {e}");
        }
        result
    }

    /// 以CAS写入触发标记认领该分钟；已被认领时返回false
    ///
    /// 先写标记再投递：两步之间崩溃表现为该分钟触发丢失，而不是重复。
    async fn claim_minute(
        &self,
        entry: &ScheduleEntry,
        marker_path: &str,
        minute_key: &str,
    ) -> ClusterResult<bool> {
        for attempt in 0..2 {
            let marker = self.prefs.read(marker_path).await?;
            if marker.get(LAST_FIRE_KEY) == Some(minute_key) {
                debug!(entry_id = %entry.entry_id, minute = %minute_key, "该分钟已触发过");
                return Ok(false);
            }
            let mut props = marker.properties.clone();
            props.insert(LAST_FIRE_KEY.to_string(), minute_key.to_string());
            match self.prefs.write(marker_path, props, marker.version).await {
                Ok(_) => return Ok(true),
                // 本地缓存可能陈旧，读穿一次后重判
                Err(ClusterError::ModificationConflict { .. }) if attempt == 0 => {
                    self.prefs.flush(marker_path).await?;
                }
                Err(ClusterError::ModificationConflict { .. }) => {
                    warn!(entry_id = %entry.entry_id, "触发标记竞争，本分钟已由其他节点处理");
                    return Ok(false);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(false)
    }

    async fn trigger_under_lock(
        &self,
        schedule: &ScheduleDefinition,
        entry: &ScheduleEntry,
        minute: DateTime<Utc>,
        lock: &dyn DistributedLock,
    ) -> ClusterResult<bool> {
        // 获取和使用之间可能经历了挂起或会话丢失，副作用前必须确认所有权
        if !lock.is_held().await {
            return Err(ClusterError::SessionExpired);
        }

        let marker_path = format!("{SCHEDULE_STATE_PATH}/{}", entry.entry_id);
        let minute_key = minute.format("%Y-%m-%dT%H:%MZ").to_string();
        if !self.claim_minute(entry, &marker_path, &minute_key).await? {
            return Ok(false);
        }

        let message = TriggerMessage::cron(&schedule.id, entry, minute);
        let payload = message.serialize_bytes()?;
        self.queue
            .enqueue(&self.config.trigger_queue, &payload)
            .await?;
        info!(
            entry_id = %entry.entry_id,
            run_id = %message.run_id,
            "调度条目已触发"
        );
        Ok(true)
    }
}
