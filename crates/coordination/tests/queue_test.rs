#[cfg(test)]
mod queue_tests {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::{broadcast, Mutex};

    use cluster_core::config::CoordinationConfig;
    use cluster_core::traits::{CoordinationClient, QueueService};
    use cluster_core::ClusterError;
    use cluster_coordination::{DistributedQueue, MemoryCoordination, MemoryCoordinationClient};

    fn fast_config() -> CoordinationConfig {
        CoordinationConfig {
            session_timeout_ms: 1_000,
            connect_timeout_ms: 1_000,
            reconnect_backoff_ms: 1,
            reconnect_backoff_max_ms: 10,
        }
    }

    async fn queue_on(service: &Arc<MemoryCoordination>) -> DistributedQueue {
        let client = MemoryCoordinationClient::new(Arc::clone(service), fast_config());
        client.connect().await.unwrap();
        DistributedQueue::new(client)
    }

    fn shutdown() -> broadcast::Sender<()> {
        broadcast::channel(4).0
    }

    #[tokio::test]
    async fn test_items_delivered_in_enqueue_order() {
        let service = MemoryCoordination::new();
        let queue = queue_on(&service).await;
        let tx = shutdown();

        for i in 0..5u8 {
            queue.enqueue("orders", &[i]).await.unwrap();
        }
        for expected in 0..5u8 {
            let item = queue.take("orders", tx.subscribe()).await.unwrap();
            assert_eq!(item.payload, vec![expected]);
            assert_eq!(item.sequence, expected as u64);
        }
    }

    #[tokio::test]
    async fn test_competing_consumers_never_share_an_item() {
        let service = MemoryCoordination::new();
        let producer = queue_on(&service).await;
        let tx = shutdown();

        const TOTAL: usize = 20;
        for i in 0..TOTAL as u8 {
            producer.enqueue("work", &[i]).await.unwrap();
        }

        let received: Arc<Mutex<Vec<u64>>> = Arc::new(Mutex::new(Vec::new()));
        let mut consumers = Vec::new();
        for _ in 0..2 {
            let consumer = queue_on(&service).await;
            let received = Arc::clone(&received);
            let shutdown_rx = tx.subscribe();
            consumers.push(tokio::spawn(async move {
                loop {
                    match consumer.take("work", shutdown_rx.resubscribe()).await {
                        Ok(item) => received.lock().await.push(item.sequence),
                        Err(ClusterError::Shutdown) => return,
                        Err(e) => panic!("消费失败: {e}"),
                    }
                }
            }));
        }

        // 等两个消费者分完所有项
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            if received.lock().await.len() >= TOTAL {
                break;
            }
            assert!(tokio::time::Instant::now() < deadline, "消费超时");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let _ = tx.send(());
        for consumer in consumers {
            consumer.await.unwrap();
        }

        // 每一项恰好被一个消费者取得
        let sequences = received.lock().await.clone();
        let unique: HashSet<u64> = sequences.iter().copied().collect();
        assert_eq!(sequences.len(), TOTAL);
        assert_eq!(unique.len(), TOTAL);
    }

    #[tokio::test]
    async fn test_take_blocks_until_item_arrives() {
        let service = MemoryCoordination::new();
        let consumer = queue_on(&service).await;
        let producer = queue_on(&service).await;
        let tx = shutdown();

        let shutdown_rx = tx.subscribe();
        let taker = tokio::spawn(async move {
            consumer.take("lazy", shutdown_rx).await
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!taker.is_finished());

        producer.enqueue("lazy", b"late").await.unwrap();
        let item = taker.await.unwrap().unwrap();
        assert_eq!(item.payload, b"late");
    }

    #[tokio::test]
    async fn test_take_unblocks_on_shutdown() {
        let service = MemoryCoordination::new();
        let consumer = queue_on(&service).await;
        let tx = shutdown();

        let shutdown_rx = tx.subscribe();
        let taker = tokio::spawn(async move { consumer.take("empty", shutdown_rx).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        let _ = tx.send(());
        let result = tokio::time::timeout(Duration::from_secs(1), taker)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(ClusterError::Shutdown)));
    }

    #[tokio::test]
    async fn test_size_and_purge() {
        let service = MemoryCoordination::new();
        let queue = queue_on(&service).await;

        assert_eq!(queue.size("bulk").await.unwrap(), 0);
        for i in 0..3u8 {
            queue.enqueue("bulk", &[i]).await.unwrap();
        }
        assert_eq!(queue.size("bulk").await.unwrap(), 3);

        queue.purge("bulk").await.unwrap();
        assert_eq!(queue.size("bulk").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sequence_survives_consumption() {
        let service = MemoryCoordination::new();
        let queue = queue_on(&service).await;
        let tx = shutdown();

        queue.enqueue("seq", b"a").await.unwrap();
        let first = queue.take("seq", tx.subscribe()).await.unwrap();

        // 序号队列内单调，不因消费而复用
        let second_seq = queue.enqueue("seq", b"b").await.unwrap();
        assert!(second_seq > first.sequence);
    }
}
