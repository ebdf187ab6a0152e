use std::str::FromStr;

use chrono::{DateTime, Duration, Timelike, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use tracing::debug;

use cluster_core::{ClusterError, ClusterResult};

/// CRON表达式解析和触发判定工具
///
/// 表达式在调度计划声明的时区下求值，对外统一使用UTC时间交互。
pub struct CronScheduler {
    schedule: Schedule,
    timezone: Tz,
}

impl CronScheduler {
    /// 创建UTC时区的CRON调度器
    pub fn new(cron_expr: &str) -> ClusterResult<Self> {
        Self::with_timezone(cron_expr, "UTC")
    }

    /// 创建指定时区的CRON调度器
    pub fn with_timezone(cron_expr: &str, timezone: &str) -> ClusterResult<Self> {
        let schedule = Schedule::from_str(cron_expr).map_err(|e| ClusterError::InvalidCron {
            expr: cron_expr.to_string(),
            message: e.to_string(),
        })?;
        let timezone = Tz::from_str(timezone).map_err(|_| {
            ClusterError::config_error(format!("未知时区: {timezone}"))
        })?;
        Ok(Self { schedule, timezone })
    }

    /// 验证CRON表达式是否有效
    pub fn validate_expression(cron_expr: &str) -> ClusterResult<()> {
        Schedule::from_str(cron_expr).map_err(|e| ClusterError::InvalidCron {
            expr: cron_expr.to_string(),
            message: e.to_string(),
        })?;
        Ok(())
    }

    /// 验证时区名是否有效
    pub fn validate_timezone(timezone: &str) -> ClusterResult<()> {
        Tz::from_str(timezone)
            .map(|_| ())
            .map_err(|_| ClusterError::config_error(format!("未知时区: {timezone}")))
    }

    /// 获取下一次执行时间
    pub fn next_execution_time(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.schedule
            .after(&from.with_timezone(&self.timezone))
            .next()
            .map(|t| t.with_timezone(&Utc))
    }

    /// 获取从指定时间开始的多个执行时间
    pub fn upcoming_times(&self, from: DateTime<Utc>, count: usize) -> Vec<DateTime<Utc>> {
        self.schedule
            .after(&from.with_timezone(&self.timezone))
            .take(count)
            .map(|t| t.with_timezone(&Utc))
            .collect()
    }

    /// 判断表达式是否在给定分钟内到期
    ///
    /// `minute_start` 必须是整分钟（秒和纳秒为0）。集群内各节点对同一
    /// 分钟得到相同的判定结果，时钟漂移由锁竞争而非时间精度兜底。
    pub fn fires_in_minute(&self, minute_start: DateTime<Utc>) -> bool {
        let probe = minute_start - Duration::seconds(1);
        match self.next_execution_time(probe) {
            Some(next) => {
                let fires = next >= minute_start && next < minute_start + Duration::minutes(1);
                if fires {
                    debug!(
                        "CRON在分钟 {} 内到期，触发点 {}",
                        minute_start.format("%Y-%m-%d %H:%M UTC"),
                        next.format("%H:%M:%S")
                    );
                }
                fires
            }
            None => false,
        }
    }

    /// 计算下次执行距离现在的时长
    pub fn time_until_next(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.next_execution_time(now).map(|next| next - now)
    }

    /// 检查是否已过期（上次触发后，预期执行时间已过去超过宽限期）
    pub fn is_overdue(
        &self,
        last_fire: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
        grace_period_minutes: i64,
    ) -> bool {
        let check_from = match last_fire {
            Some(last) => last,
            None => now - Duration::hours(24),
        };
        match self.next_execution_time(check_from) {
            Some(expected) => {
                expected < now && now > expected + Duration::minutes(grace_period_minutes)
            }
            None => false,
        }
    }
}

/// 截断到整分钟
pub fn minute_floor(t: DateTime<Utc>) -> DateTime<Utc> {
    t.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(t)
}
