//! # 调度层
//!
//! 任务/调度计划定义的管理（工作副本语义）与调度引擎（CRON求值、
//! 持锁触发、触发消息投递）。

pub mod cron_utils;
pub mod engine;
pub mod registry;

pub use cron_utils::{minute_floor, CronScheduler};
pub use engine::{EngineState, SchedulerEngine};
pub use registry::{JobScheduleManager, JobWorkingCopy, ScheduleWorkingCopy};
