use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::ClusterResult;
use crate::models::JobResult;

/// 一次任务执行的上下文
///
/// 取消是协作式的：Worker侧设置取消标志，任务提供者在执行过程中自行检查。
#[derive(Debug, Clone)]
pub struct JobContext {
    pub run_id: String,
    pub job_id: String,
    pub job_type: String,
    pub parameters: serde_json::Value,
    pub worker_id: String,
    cancelled: Arc<AtomicBool>,
}

impl JobContext {
    pub fn new(
        run_id: impl Into<String>,
        job_id: impl Into<String>,
        job_type: impl Into<String>,
        parameters: serde_json::Value,
        worker_id: impl Into<String>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            job_id: job_id.into(),
            job_type: job_type.into(),
            parameters,
            worker_id: worker_id.into(),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 请求取消本次执行
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// 任务提供者在执行中轮询此标志
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// 任务类型提供者（外部协作者），按名称注册
///
/// Worker同步调用 `execute`，对其内部实现保持无感；执行失败通过返回值
/// 表达，不得令Worker池崩溃。
#[async_trait]
pub trait JobProvider: Send + Sync {
    /// 提供者名称，即其负责的任务类型
    fn name(&self) -> &str;

    async fn execute(&self, context: &JobContext) -> ClusterResult<JobResult>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_flag_is_shared_between_clones() {
        let context = JobContext::new("r-1", "j-1", "noop", serde_json::json!({}), "w-1");
        let cloned = context.clone();
        assert!(!cloned.is_cancelled());
        context.cancel();
        assert!(cloned.is_cancelled());
    }
}
