#[cfg(test)]
mod history_tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};

    use cluster_core::config::CoordinationConfig;
    use cluster_core::models::{JobHistoryEntry, JobOutcome};
    use cluster_core::traits::{CoordinationClient, JobHistory};
    use cluster_coordination::{JobHistoryStore, MemoryCoordination, MemoryCoordinationClient};

    fn fast_config() -> CoordinationConfig {
        CoordinationConfig {
            session_timeout_ms: 1_000,
            connect_timeout_ms: 1_000,
            reconnect_backoff_ms: 1,
            reconnect_backoff_max_ms: 10,
        }
    }

    async fn store(service: &Arc<MemoryCoordination>) -> JobHistoryStore {
        let client = MemoryCoordinationClient::new(Arc::clone(service), fast_config());
        client.connect().await.unwrap();
        JobHistoryStore::new(client)
    }

    fn entry(job_id: &str, run_id: &str, outcome: JobOutcome) -> JobHistoryEntry {
        let started = Utc::now();
        JobHistoryEntry {
            job_id: job_id.to_string(),
            run_id: run_id.to_string(),
            worker_id: "worker-1".to_string(),
            started_at: started,
            finished_at: started + Duration::milliseconds(5),
            outcome,
            message: None,
        }
    }

    #[tokio::test]
    async fn test_entries_listed_in_append_order() {
        let service = MemoryCoordination::new();
        let history = store(&service).await;

        history
            .append(&entry("job-1", "run-1", JobOutcome::Succeeded))
            .await
            .unwrap();
        history
            .append(&entry("job-1", "run-2", JobOutcome::Failed))
            .await
            .unwrap();
        history
            .append(&entry("job-1", "run-3", JobOutcome::Cancelled))
            .await
            .unwrap();

        let entries = history.list("job-1").await.unwrap();
        let run_ids: Vec<&str> = entries.iter().map(|e| e.run_id.as_str()).collect();
        assert_eq!(run_ids, vec!["run-1", "run-2", "run-3"]);
        assert_eq!(entries[1].outcome, JobOutcome::Failed);
    }

    #[tokio::test]
    async fn test_histories_are_isolated_per_job() {
        let service = MemoryCoordination::new();
        let history = store(&service).await;

        history
            .append(&entry("job-a", "run-1", JobOutcome::Succeeded))
            .await
            .unwrap();
        history
            .append(&entry("job-b", "run-2", JobOutcome::Succeeded))
            .await
            .unwrap();

        assert_eq!(history.list("job-a").await.unwrap().len(), 1);
        assert_eq!(history.list("job-b").await.unwrap().len(), 1);
        assert!(history.list("job-c").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_prune_keeps_most_recent_entries() {
        let service = MemoryCoordination::new();
        let history = store(&service).await;

        for i in 0..5 {
            history
                .append(&entry("job-1", &format!("run-{i}"), JobOutcome::Succeeded))
                .await
                .unwrap();
        }

        let removed = history.prune("job-1", 2).await.unwrap();
        assert_eq!(removed, 3);

        let remaining = history.list("job-1").await.unwrap();
        let run_ids: Vec<&str> = remaining.iter().map(|e| e.run_id.as_str()).collect();
        assert_eq!(run_ids, vec!["run-3", "run-4"]);

        // 数量不足时不删除
        assert_eq!(history.prune("job-1", 10).await.unwrap(), 0);
    }
}
