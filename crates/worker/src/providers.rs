//! 内置任务类型提供者

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{info, warn};

use cluster_core::models::JobResult;
use cluster_core::traits::{JobContext, JobProvider};
use cluster_core::{ClusterError, ClusterResult};

/// 空操作提供者，主要用于调度链路验证和测试
///
/// 参数：`sleep_ms`（可选）模拟执行耗时，期间响应协作式取消。
pub struct NoopProvider;

#[async_trait]
impl JobProvider for NoopProvider {
    fn name(&self) -> &str {
        "noop"
    }

    async fn execute(&self, context: &JobContext) -> ClusterResult<JobResult> {
        let sleep_ms = context
            .parameters
            .get("sleep_ms")
            .and_then(|v| v.as_u64())
            .unwrap_or(0);

        let mut remaining = sleep_ms;
        while remaining > 0 {
            if context.is_cancelled() {
                return Ok(JobResult::failure("执行已取消"));
            }
            let step = remaining.min(20);
            tokio::time::sleep(Duration::from_millis(step)).await;
            remaining -= step;
        }
        Ok(JobResult::success())
    }
}

/// Shell任务参数
#[derive(Debug, Serialize, Deserialize)]
struct ShellJobParams {
    command: String,
    #[serde(default)]
    args: Vec<String>,
    working_dir: Option<String>,
    #[serde(default)]
    env: std::collections::HashMap<String, String>,
}

/// Shell任务提供者
pub struct ShellProvider;

#[async_trait]
impl JobProvider for ShellProvider {
    fn name(&self) -> &str {
        "shell"
    }

    async fn execute(&self, context: &JobContext) -> ClusterResult<JobResult> {
        let params: ShellJobParams = serde_json::from_value(context.parameters.clone())
            .map_err(|e| ClusterError::JobExecution(format!("解析Shell任务参数失败: {e}")))?;

        info!(
            run_id = %context.run_id,
            command = %params.command,
            "执行Shell任务"
        );

        let mut cmd = Command::new(&params.command);
        cmd.args(&params.args);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        if let Some(dir) = &params.working_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &params.env {
            cmd.env(key, value);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| ClusterError::JobExecution(format!("启动Shell命令失败: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ClusterError::JobExecution("无法获取stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ClusterError::JobExecution("无法获取stderr".to_string()))?;

        let stdout_task = tokio::spawn(read_lines(BufReader::new(stdout)));
        let stderr_task = tokio::spawn(read_lines(BufReader::new(stderr)));

        // 等待结束，期间轮询协作式取消；kill放在select之外，避免与
        // wait的可变借用冲突
        let mut cancel_check = tokio::time::interval(Duration::from_millis(100));
        let exit_status = loop {
            tokio::select! {
                status = child.wait() => {
                    break status.map_err(|e| {
                        ClusterError::JobExecution(format!("等待进程结束失败: {e}"))
                    })?;
                }
                _ = cancel_check.tick() => {}
            }
            if context.is_cancelled() {
                warn!(run_id = %context.run_id, "Shell任务被取消，终止进程");
                let _ = child.kill().await;
            }
        };

        let stdout_lines = stdout_task.await.unwrap_or_default();
        let stderr_lines = stderr_task.await.unwrap_or_default();

        if context.is_cancelled() {
            return Ok(JobResult::failure("执行已取消"));
        }

        if exit_status.success() {
            Ok(JobResult {
                success: true,
                message: (!stdout_lines.is_empty()).then(|| stdout_lines.join("\n")),
            })
        } else {
            let message = if !stderr_lines.is_empty() {
                stderr_lines.join("\n")
            } else {
                format!("命令执行失败，退出码: {:?}", exit_status.code())
            };
            Ok(JobResult::failure(message))
        }
    }
}

async fn read_lines<R>(mut reader: BufReader<R>) -> Vec<String>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut lines = Vec::new();
    let mut line = String::new();
    while reader.read_line(&mut line).await.unwrap_or(0) > 0 {
        lines.push(line.trim_end().to_string());
        line.clear();
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_provider_succeeds() {
        let provider = NoopProvider;
        let context = JobContext::new("r-1", "j-1", "noop", serde_json::json!({}), "w-1");
        let result = provider.execute(&context).await.unwrap();
        assert!(result.success);
    }

    #[tokio::test]
    async fn test_noop_provider_observes_cancellation() {
        let provider = NoopProvider;
        let context = JobContext::new(
            "r-2",
            "j-1",
            "noop",
            serde_json::json!({"sleep_ms": 5_000}),
            "w-1",
        );
        let cancel_handle = context.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            cancel_handle.cancel();
        });
        let result = provider.execute(&context).await.unwrap();
        assert!(!result.success);
        assert!(context.is_cancelled());
    }

    #[tokio::test]
    async fn test_shell_provider_captures_output() {
        let provider = ShellProvider;
        let context = JobContext::new(
            "r-3",
            "j-2",
            "shell",
            serde_json::json!({"command": "echo", "args": ["hello"]}),
            "w-1",
        );
        let result = provider.execute(&context).await.unwrap();
        assert!(result.success);
        assert_eq!(result.message.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn test_shell_provider_reports_failure() {
        let provider = ShellProvider;
        let context = JobContext::new(
            "r-4",
            "j-2",
            "shell",
            serde_json::json!({"command": "sh", "args": ["-c", "exit 3"]}),
            "w-1",
        );
        let result = provider.execute(&context).await.unwrap();
        assert!(!result.success);
        assert!(result.message.unwrap().contains("3"));
    }

    #[tokio::test]
    async fn test_shell_provider_rejects_bad_params() {
        let provider = ShellProvider;
        let context = JobContext::new("r-5", "j-2", "shell", serde_json::json!({}), "w-1");
        assert!(provider.execute(&context).await.is_err());
    }
}
