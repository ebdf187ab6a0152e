#[cfg(test)]
mod membership_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::broadcast;

    use cluster_core::config::CoordinationConfig;
    use cluster_core::traits::CoordinationClient;
    use cluster_coordination::{
        ClusterMembership, MembershipEvent, MemoryCoordination, MemoryCoordinationClient,
    };

    fn fast_config() -> CoordinationConfig {
        CoordinationConfig {
            session_timeout_ms: 1_000,
            connect_timeout_ms: 1_000,
            reconnect_backoff_ms: 1,
            reconnect_backoff_max_ms: 10,
        }
    }

    async fn member(
        service: &Arc<MemoryCoordination>,
        node_id: &str,
        shutdown: &broadcast::Sender<()>,
    ) -> (Arc<MemoryCoordinationClient>, Arc<ClusterMembership>) {
        let client = MemoryCoordinationClient::new(Arc::clone(service), fast_config());
        client.connect().await.unwrap();
        let membership = ClusterMembership::new(client.clone(), node_id);
        membership.start(shutdown.subscribe()).await.unwrap();
        (client, membership)
    }

    async fn wait_for<F, Fut>(what: &str, mut condition: F)
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
        loop {
            if condition().await {
                return;
            }
            assert!(tokio::time::Instant::now() < deadline, "等待超时: {what}");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    #[tokio::test]
    async fn test_nodes_discover_each_other() {
        let service = MemoryCoordination::new();
        let (shutdown_tx, _) = broadcast::channel(4);

        let (_ca, member_a) = member(&service, "node-a", &shutdown_tx).await;
        let (_cb, member_b) = member(&service, "node-b", &shutdown_tx).await;

        wait_for("a看到双方", || async {
            let ids: Vec<String> = member_a
                .current_members()
                .await
                .into_iter()
                .map(|n| n.descriptor.node_id)
                .collect();
            ids.contains(&"node-a".to_string()) && ids.contains(&"node-b".to_string())
        })
        .await;
        wait_for("b看到双方", || async {
            member_b.current_members().await.len() == 2
        })
        .await;

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_offline_transition_emitted_when_node_leaves() {
        let service = MemoryCoordination::new();
        let (shutdown_tx, _) = broadcast::channel(4);

        let (_ca, member_a) = member(&service, "node-a", &shutdown_tx).await;
        let (client_b, _member_b) = member(&service, "node-b", &shutdown_tx).await;

        wait_for("a看到b", || async {
            member_a
                .current_members()
                .await
                .iter()
                .any(|n| n.descriptor.node_id == "node-b")
        })
        .await;

        let mut events = member_a.subscribe();
        client_b.close().await.unwrap();

        wait_for("a的视图中b下线", || async {
            !member_a
                .current_members()
                .await
                .iter()
                .any(|n| n.descriptor.node_id == "node-b")
        })
        .await;

        // 事件流中出现b的下线事件（允许重复）
        let mut saw_offline = false;
        while let Ok(event) = events.try_recv() {
            if let MembershipEvent::NodeOffline(id) = event {
                if id == "node-b" {
                    saw_offline = true;
                }
            }
        }
        assert!(saw_offline);

        let _ = shutdown_tx.send(());
    }

    #[tokio::test]
    async fn test_reregisters_after_session_expiry() {
        let service = MemoryCoordination::new();
        let (shutdown_tx, _) = broadcast::channel(4);

        let (client_a, _member_a) = member(&service, "node-a", &shutdown_tx).await;
        let (_cb, member_b) = member(&service, "node-b", &shutdown_tx).await;

        wait_for("b看到a", || async {
            member_b
                .current_members()
                .await
                .iter()
                .any(|n| n.descriptor.node_id == "node-a")
        })
        .await;

        let old_session = client_a.session_id().await.unwrap();
        client_a.expire_session().await.unwrap();

        // 重连后自动重新注册，且携带新会话标识
        wait_for("a重新注册", || async {
            member_b
                .current_members()
                .await
                .iter()
                .any(|n| n.descriptor.node_id == "node-a" && n.descriptor.session_id != old_session)
        })
        .await;

        let _ = shutdown_tx.send(());
    }
}
