#[cfg(test)]
mod engine_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::{DateTime, TimeZone, Utc};
    use futures::future::join_all;

    use cluster_core::config::DispatcherConfig;
    use cluster_core::models::{LockMode, TriggerMessage};
    use cluster_core::traits::{JobHistory, LockService, PreferencesService, QueueService};
    use cluster_coordination::{
        DistributedLockManager, DistributedQueue, JobHistoryStore, MemoryCoordination,
        MemoryCoordinationClient, ReplicatedPreferences,
    };
    use cluster_dispatcher::{JobScheduleManager, SchedulerEngine};
    use cluster_testing_utils::{
        connected_client, ScheduleDefinitionBuilder, ScheduleEntryBuilder,
    };

    const TRIGGER_QUEUE: &str = "job-triggers";

    fn engine_config() -> DispatcherConfig {
        DispatcherConfig {
            enabled: true,
            tick_interval_seconds: 1,
            lock_wait_ms: 300,
            trigger_queue: TRIGGER_QUEUE.to_string(),
        }
    }

    /// 一个"节点"：共享协调服务上的全套调度组件
    struct Node {
        client: Arc<MemoryCoordinationClient>,
        manager: Arc<JobScheduleManager>,
        engine: SchedulerEngine,
        queue: Arc<dyn QueueService>,
        locks: Arc<dyn LockService>,
    }

    async fn node(service: &Arc<MemoryCoordination>) -> Node {
        let client = connected_client(service).await;
        let prefs: Arc<dyn PreferencesService> =
            Arc::new(ReplicatedPreferences::new(client.clone()));
        let history: Arc<dyn JobHistory> = Arc::new(JobHistoryStore::new(client.clone()));
        let queue: Arc<dyn QueueService> = Arc::new(DistributedQueue::new(client.clone()));
        let locks: Arc<dyn LockService> =
            Arc::new(DistributedLockManager::new(client.clone()));
        let manager = Arc::new(JobScheduleManager::new(
            Arc::clone(&prefs),
            history,
            Arc::clone(&queue),
            TRIGGER_QUEUE,
        ));
        let engine = SchedulerEngine::new(
            Arc::clone(&manager),
            Arc::clone(&locks),
            Arc::clone(&queue),
            prefs,
            engine_config(),
        );
        Node {
            client,
            manager,
            engine,
            queue,
            locks,
        }
    }

    fn minute(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 6, 1, h, m, 0).unwrap()
    }

    async fn every_minute_schedule(node: &Node, schedule_id: &str, entry_id: &str) {
        let schedule = ScheduleDefinitionBuilder::new()
            .with_id(schedule_id)
            .with_entry(
                ScheduleEntryBuilder::new()
                    .with_entry_id(entry_id)
                    .with_cron("0 * * * * *")
                    .with_job_type("noop")
                    .build(),
            )
            .build();
        node.manager.create_schedule(&schedule).await.unwrap();
    }

    #[tokio::test]
    async fn test_due_entry_triggers_exactly_once_per_minute() {
        let service = MemoryCoordination::new();
        let n = node(&service).await;
        every_minute_schedule(&n, "nightly", "e1").await;

        let first_minute = minute(10, 0);
        assert_eq!(n.engine.tick(first_minute).await.unwrap(), 1);
        assert_eq!(n.queue.size(TRIGGER_QUEUE).await.unwrap(), 1);

        // 同一分钟内的后续tick不再触发
        assert_eq!(n.engine.tick(first_minute).await.unwrap(), 0);
        assert_eq!(n.queue.size(TRIGGER_QUEUE).await.unwrap(), 1);

        // 下一分钟再次触发，run_id携带触发分钟
        assert_eq!(n.engine.tick(minute(10, 1)).await.unwrap(), 1);
        assert_eq!(n.queue.size(TRIGGER_QUEUE).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_racing_engines_enqueue_single_trigger() {
        let service = MemoryCoordination::new();
        let n1 = node(&service).await;
        every_minute_schedule(&n1, "raced", "e1").await;

        let n2 = node(&service).await;
        let n3 = node(&service).await;
        let n4 = node(&service).await;
        let nodes = [&n1, &n2, &n3, &n4];

        let due = minute(11, 0);
        let results = join_all(nodes.iter().map(|n| n.engine.tick(due))).await;

        // N个引擎同时竞争，同一到期分钟集群范围内恰好一次入队
        let total: usize = results.into_iter().map(|r| r.unwrap()).sum();
        assert_eq!(total, 1);
        assert_eq!(n1.queue.size(TRIGGER_QUEUE).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_trigger_message_contents() {
        let service = MemoryCoordination::new();
        let n = node(&service).await;

        let schedule = ScheduleDefinitionBuilder::new()
            .with_id("payload")
            .with_entry(
                ScheduleEntryBuilder::new()
                    .with_entry_id("backup")
                    .with_cron("0 * * * * *")
                    .with_job_type("shell")
                    .with_parameters(serde_json::json!({"command": "true"}))
                    .build(),
            )
            .build();
        n.manager.create_schedule(&schedule).await.unwrap();

        let due = minute(12, 30);
        n.engine.tick(due).await.unwrap();

        let (tx, _) = tokio::sync::broadcast::channel(1);
        let item = n.queue.take(TRIGGER_QUEUE, tx.subscribe()).await.unwrap();
        let message = TriggerMessage::deserialize_bytes(&item.payload).unwrap();
        assert_eq!(message.run_id, "payload:backup:2030-06-01T12:30Z");
        assert_eq!(message.job_type, "shell");
        assert_eq!(message.parameters["command"], "true");
    }

    #[tokio::test]
    async fn test_disabled_schedule_and_entry_skipped() {
        let service = MemoryCoordination::new();
        let n = node(&service).await;

        let disabled_schedule = ScheduleDefinitionBuilder::new()
            .with_id("paused")
            .with_entry(ScheduleEntryBuilder::new().with_entry_id("e1").build())
            .disabled()
            .build();
        n.manager.create_schedule(&disabled_schedule).await.unwrap();

        let with_disabled_entry = ScheduleDefinitionBuilder::new()
            .with_id("partial")
            .with_entry(
                ScheduleEntryBuilder::new()
                    .with_entry_id("off")
                    .disabled()
                    .build(),
            )
            .build();
        n.manager.create_schedule(&with_disabled_entry).await.unwrap();

        assert_eq!(n.engine.tick(minute(13, 0)).await.unwrap(), 0);
        assert_eq!(n.queue.size(TRIGGER_QUEUE).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_lock_contention_skips_tick_without_retry() {
        let service = MemoryCoordination::new();
        let holder = node(&service).await;
        let n = node(&service).await;
        every_minute_schedule(&n, "contended", "e1").await;

        // 其他节点正持有该条目的触发锁
        let guard = holder
            .locks
            .try_acquire(
                "schedule-entry:e1",
                LockMode::Exclusive,
                Duration::from_secs(1),
            )
            .await
            .unwrap();

        let due = minute(14, 0);
        assert_eq!(n.engine.tick(due).await.unwrap(), 0);
        assert_eq!(n.queue.size(TRIGGER_QUEUE).await.unwrap(), 0);

        // 同一分钟内不重试，即使锁已释放
        guard.release().await.unwrap();
        assert_eq!(n.engine.tick(due).await.unwrap(), 0);

        // 下一分钟正常触发
        assert_eq!(n.engine.tick(minute(14, 1)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_session_expiry_between_lock_and_enqueue_yields_one_trigger() {
        let service = MemoryCoordination::new();
        let node_a = node(&service).await;
        every_minute_schedule(&node_a, "resilient", "e1").await;
        let node_b = node(&service).await;

        let due = minute(15, 0);

        // 节点A走到"已获取触发锁"一步
        let guard = node_a
            .locks
            .try_acquire(
                "schedule-entry:e1",
                LockMode::Exclusive,
                Duration::from_secs(1),
            )
            .await
            .unwrap();
        assert!(guard.is_held().await);

        // 投递之前会话过期：A在副作用前的所有权确认必须失败
        node_a.client.expire_session().await.unwrap();
        assert!(!guard.is_held().await);

        // 节点B接管，该分钟恰好出现一条触发消息（无丢失）
        assert_eq!(node_b.engine.tick(due).await.unwrap(), 1);
        assert_eq!(node_b.queue.size(TRIGGER_QUEUE).await.unwrap(), 1);

        // A重连后同一分钟再tick，不产生重复
        assert_eq!(node_a.engine.tick(due).await.unwrap(), 0);
        assert_eq!(node_b.queue.size(TRIGGER_QUEUE).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_invalid_stored_cron_does_not_poison_tick() {
        let service = MemoryCoordination::new();
        let n = node(&service).await;
        every_minute_schedule(&n, "healthy", "good").await;

        // 绕过验证直接写入坏定义，模拟损坏的存储内容
        let client = connected_client(&service).await;
        let prefs = ReplicatedPreferences::new(client);
        let broken = ScheduleDefinitionBuilder::new()
            .with_id("broken")
            .with_entry(ScheduleEntryBuilder::new().with_entry_id("bad").build())
            .build();
        let mut raw = serde_json::to_value(&broken).unwrap();
        raw["entries"][0]["cron_expression"] = serde_json::Value::String("garbage".to_string());
        let mut props = std::collections::HashMap::new();
        props.insert("definition".to_string(), raw.to_string());
        prefs
            .write("/config/schedules/broken", props, 0)
            .await
            .unwrap();

        // 坏条目被跳过，健康条目正常触发
        assert_eq!(n.engine.tick(minute(16, 0)).await.unwrap(), 1);
    }
}
