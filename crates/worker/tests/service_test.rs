#[cfg(test)]
mod worker_service_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;

    use cluster_core::models::{JobDefinition, JobOutcome, JobResult, TriggerMessage};
    use cluster_core::traits::{
        JobContext, JobHistory, JobProvider, QueueService, StatePublisher,
    };
    use cluster_core::{ClusterError, ClusterResult};
    use cluster_coordination::{
        DistributedQueue, JobHistoryStore, MemoryCoordination, NodeStateRegistry,
    };
    use cluster_testing_utils::{connected_client, eventually};
    use cluster_worker::{NoopProvider, WorkerService};

    const TRIGGER_QUEUE: &str = "job-triggers";

    /// 始终失败的提供者，验证单任务失败不影响池
    struct FailingProvider;

    #[async_trait]
    impl JobProvider for FailingProvider {
        fn name(&self) -> &str {
            "failing"
        }

        async fn execute(&self, _context: &JobContext) -> ClusterResult<JobResult> {
            Err(ClusterError::JobExecution("注定失败".to_string()))
        }
    }

    struct Fixture {
        queue: Arc<dyn QueueService>,
        history: Arc<dyn JobHistory>,
        worker: Arc<WorkerService>,
    }

    async fn fixture(service: &Arc<MemoryCoordination>) -> Fixture {
        let client = connected_client(service).await;
        let queue: Arc<dyn QueueService> = Arc::new(DistributedQueue::new(client.clone()));
        let history: Arc<dyn JobHistory> = Arc::new(JobHistoryStore::new(client.clone()));
        let worker = WorkerService::builder(
            "worker-node",
            Arc::clone(&queue),
            Arc::clone(&history),
            TRIGGER_QUEUE,
        )
        .max_concurrent_jobs(2)
        .register_provider(Arc::new(NoopProvider))
        .register_provider(Arc::new(FailingProvider))
        .build();
        Fixture {
            queue,
            history,
            worker,
        }
    }

    async fn enqueue_manual(
        queue: &Arc<dyn QueueService>,
        job_id: &str,
        job_type: &str,
        parameters: serde_json::Value,
    ) -> String {
        let job = JobDefinition {
            id: job_id.to_string(),
            job_type: job_type.to_string(),
            parameters,
            enabled: true,
        };
        let message = TriggerMessage::manual(&job);
        queue
            .enqueue(TRIGGER_QUEUE, &message.serialize_bytes().unwrap())
            .await
            .unwrap();
        message.run_id
    }

    #[tokio::test]
    async fn test_trigger_executed_and_history_recorded() {
        let service = MemoryCoordination::new();
        let f = fixture(&service).await;
        f.worker.start().await.unwrap();

        enqueue_manual(&f.queue, "greet", "noop", serde_json::json!({})).await;

        assert!(
            eventually(Duration::from_secs(3), || async {
                matches!(
                    f.history.list("greet").await.unwrap().first(),
                    Some(entry) if entry.outcome == JobOutcome::Succeeded
                )
            })
            .await
        );
        let entries = f.history.list("greet").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].worker_id, "worker-node");
        assert!(entries[0].finished_at >= entries[0].started_at);

        f.worker.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_job_type_records_failure_and_pool_survives() {
        let service = MemoryCoordination::new();
        let f = fixture(&service).await;
        f.worker.start().await.unwrap();

        enqueue_manual(&f.queue, "mystery", "unregistered", serde_json::json!({})).await;

        assert!(
            eventually(Duration::from_secs(3), || async {
                matches!(
                    f.history.list("mystery").await.unwrap().first(),
                    Some(entry) if entry.outcome == JobOutcome::Failed
                )
            })
            .await
        );
        let entries = f.history.list("mystery").await.unwrap();
        assert!(entries[0].message.as_ref().unwrap().contains("unregistered"));

        // 池仍然存活，后续任务正常执行
        enqueue_manual(&f.queue, "after", "noop", serde_json::json!({})).await;
        assert!(
            eventually(Duration::from_secs(3), || async {
                !f.history.list("after").await.unwrap().is_empty()
            })
            .await
        );

        f.worker.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_provider_error_recorded_as_failed() {
        let service = MemoryCoordination::new();
        let f = fixture(&service).await;
        f.worker.start().await.unwrap();

        enqueue_manual(&f.queue, "doomed", "failing", serde_json::json!({})).await;

        assert!(
            eventually(Duration::from_secs(3), || async {
                matches!(
                    f.history.list("doomed").await.unwrap().first(),
                    Some(entry) if entry.outcome == JobOutcome::Failed
                )
            })
            .await
        );
        let entries = f.history.list("doomed").await.unwrap();
        assert!(entries[0].message.as_ref().unwrap().contains("注定失败"));

        // 失败只影响该任务自身
        enqueue_manual(&f.queue, "next", "noop", serde_json::json!({})).await;
        assert!(
            eventually(Duration::from_secs(3), || async {
                !f.history.list("next").await.unwrap().is_empty()
            })
            .await
        );

        f.worker.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_cooperative_cancellation() {
        let service = MemoryCoordination::new();
        let f = fixture(&service).await;
        f.worker.start().await.unwrap();

        let run_id = enqueue_manual(
            &f.queue,
            "slow",
            "noop",
            serde_json::json!({"sleep_ms": 30_000}),
        )
        .await;

        // 等任务进入执行
        assert!(
            eventually(Duration::from_secs(3), || async {
                f.worker.is_job_running(&run_id).await
            })
            .await
        );
        assert!(f.worker.cancel(&run_id).await);

        assert!(
            eventually(Duration::from_secs(3), || async {
                matches!(
                    f.history.list("slow").await.unwrap().first(),
                    Some(entry) if entry.outcome == JobOutcome::Cancelled
                )
            })
            .await
        );
        assert!(!f.worker.is_job_running(&run_id).await);

        // 未知run_id的取消请求返回false
        assert!(!f.worker.cancel("missing").await);

        f.worker.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_heartbeat_publishes_node_state() {
        let service = MemoryCoordination::new();
        let client = connected_client(&service).await;
        let queue: Arc<dyn QueueService> = Arc::new(DistributedQueue::new(client.clone()));
        let history: Arc<dyn JobHistory> = Arc::new(JobHistoryStore::new(client.clone()));
        let registry = NodeStateRegistry::new(client.clone(), "hb-node");
        let publisher: Arc<dyn StatePublisher> = registry.clone();

        let worker = WorkerService::builder("hb-node", queue, history, TRIGGER_QUEUE)
            .max_concurrent_jobs(3)
            .heartbeat_interval_seconds(1)
            .state_publisher(publisher)
            .register_provider(Arc::new(NoopProvider))
            .build();
        worker.start().await.unwrap();

        assert!(
            eventually(Duration::from_secs(3), || async {
                !registry
                    .query(Some("hb-node"), Some("worker"))
                    .await
                    .unwrap()
                    .is_empty()
            })
            .await
        );
        let entries = registry.query(Some("hb-node"), Some("worker")).await.unwrap();
        let properties = &entries[0].properties;
        assert_eq!(properties.get("capacity").unwrap(), "3");
        assert_eq!(properties.get("job_types").unwrap(), "noop");

        worker.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_builder_defaults() {
        let service = MemoryCoordination::new();
        let f = fixture(&service).await;
        let mut types = f.worker.supported_job_types();
        types.sort();
        assert_eq!(types, vec!["failing", "noop"]);
        assert_eq!(f.worker.node_id(), "worker-node");
        assert!(f.worker.running_jobs().await.is_empty());
    }
}
