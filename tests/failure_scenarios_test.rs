mod common;

use catalog_notify::broker::{InMemoryBroker, StaticDirectory};
use catalog_notify::catalog::{Database, Partition};
use catalog_notify::notification::{EntitySnapshot, EventKind, Payload};
use catalog_notify::publish::{ConnectionManager, MessageSender};
use catalog_notify::{Delivery, Error, NotificationListener};
use common::{get_test_config, table_with_topic, Harness};
use std::sync::Arc;
use std::time::Duration;

fn database_payload() -> Payload {
    Payload::Snapshot(EntitySnapshot::Database(Database::new("sales")))
}

#[tokio::test]
async fn test_broker_down_at_publish_time() {
    tracing_subscriber::fmt()
        .with_env_filter("catalog_notify=debug")
        .try_init()
        .ok();

    let harness = Harness::new();
    harness.broker.set_unreachable(true);
    harness
        .catalog
        .put_table(table_with_topic("sales", "q1", "sales.q1"));

    // No error escapes; the catalog change stands.
    let delivery = harness
        .listener
        .on_add_partition(&harness.catalog, true, Partition::new("sales", "q1", vec![]))
        .await
        .unwrap();
    assert_eq!(delivery, Delivery::Failed);
    assert!(harness.broker.delivered().is_empty());
    assert!(harness.catalog.table("sales", "q1").is_some());
}

#[tokio::test]
async fn test_recovers_lazily_once_broker_returns() {
    let harness = Harness::new();
    harness.broker.set_unreachable(true);

    assert!(!harness.listener.start().await);
    let delivery = harness
        .listener
        .on_create_database(&harness.catalog, true, Database::new("sales"))
        .await
        .unwrap();
    assert_eq!(delivery, Delivery::Failed);

    harness.broker.set_unreachable(false);
    let delivery = harness
        .listener
        .on_create_database(&harness.catalog, true, Database::new("sales"))
        .await
        .unwrap();
    assert_eq!(delivery, Delivery::Delivered);
    assert_eq!(harness.broker.connections_opened(), 1);
}

#[tokio::test]
async fn test_unbound_connection_factory() {
    let broker = InMemoryBroker::new();
    let mut config = get_test_config();
    config.directory.connection_factory = "jms/Missing".to_string();
    let directory = StaticDirectory::new().bind("ConnectionFactory", Arc::new(broker.clone()));
    let listener = NotificationListener::new(Arc::new(directory), &config);
    let catalog = catalog_notify::catalog::InMemoryCatalog::new();

    assert!(!listener.start().await);
    let delivery = listener
        .on_drop_database(&catalog, true, Database::new("sales"))
        .await
        .unwrap();

    assert_eq!(delivery, Delivery::Failed);
    assert_eq!(broker.connections_opened(), 0);
}

#[tokio::test]
async fn test_stale_session_retried_once() {
    let harness = Harness::new();
    assert!(harness.listener.start().await);
    harness.broker.signal_stale_sessions(1);

    let delivery = harness
        .listener
        .sender()
        .send(&database_payload(), "hcat", EventKind::AddDatabase)
        .await;

    assert_eq!(delivery, Delivery::Delivered);
    assert_eq!(harness.broker.connections_opened(), 2);
    assert_eq!(harness.broker.sessions_closed(), 1);
    assert_eq!(harness.broker.delivered_to("hcat").len(), 1);
}

#[tokio::test]
async fn test_second_stale_signal_aborts_send() {
    let harness = Harness::new();
    assert!(harness.listener.start().await);
    harness.broker.signal_stale_sessions(2);

    let delivery = harness
        .listener
        .sender()
        .send(&database_payload(), "hcat", EventKind::AddDatabase)
        .await;

    // One reconnect, no third attempt.
    assert_eq!(delivery, Delivery::Failed);
    assert_eq!(harness.broker.connections_opened(), 2);
    assert!(harness.broker.delivered().is_empty());

    // A session reported stale twice is dropped; the next publish opens a
    // fresh one.
    let delivery = harness
        .listener
        .sender()
        .send(&database_payload(), "hcat", EventKind::AddDatabase)
        .await;
    assert_eq!(delivery, Delivery::Delivered);
    assert_eq!(harness.broker.connections_opened(), 3);
    assert_eq!(harness.broker.sessions_closed(), 2);
}

#[tokio::test]
async fn test_invalidated_session_is_replaced() {
    let harness = Harness::new();
    assert!(harness.listener.start().await);
    harness.broker.invalidate_sessions();

    let delivery = harness
        .listener
        .on_create_database(&harness.catalog, true, Database::new("sales"))
        .await
        .unwrap();

    assert_eq!(delivery, Delivery::Delivered);
    assert_eq!(harness.broker.sessions_opened(), 2);
}

#[tokio::test]
async fn test_reconnect_failure_after_stale_session() {
    let harness = Harness::new();
    assert!(harness.listener.start().await);
    harness.broker.invalidate_sessions();
    harness.broker.set_unreachable(true);

    let delivery = harness
        .listener
        .sender()
        .send(&database_payload(), "hcat", EventKind::DropDatabase)
        .await;

    assert_eq!(delivery, Delivery::Failed);
    assert_eq!(harness.broker.connections_opened(), 1);
}

#[tokio::test]
async fn test_send_failure_rolls_back_without_retry() {
    let harness = Harness::new();
    harness.broker.fail_next_sends(1);

    let delivery = harness
        .listener
        .sender()
        .send(&database_payload(), "hcat", EventKind::AddDatabase)
        .await;

    assert_eq!(delivery, Delivery::Failed);
    assert_eq!(harness.broker.rollbacks(), 1);
    assert_eq!(harness.broker.connections_opened(), 1);
    assert!(harness.broker.delivered().is_empty());
}

#[tokio::test]
async fn test_commit_failure_discards_message() {
    let harness = Harness::new();
    harness.broker.fail_next_commits(1);

    let first = harness
        .listener
        .sender()
        .send(&database_payload(), "hcat", EventKind::AddDatabase)
        .await;
    let second = harness
        .listener
        .sender()
        .send(&database_payload(), "hcat", EventKind::DropDatabase)
        .await;

    assert_eq!(first, Delivery::Failed);
    assert_eq!(second, Delivery::Delivered);
    let delivered = harness.broker.delivered();
    assert_eq!(delivered.len(), 1);
    assert_eq!(
        delivered[0]
            .message
            .string_property(catalog_notify::notification::EVENT_PROPERTY),
        Some("HCAT_DROP_DATABASE")
    );
}

#[tokio::test]
async fn test_hung_broker_bounded_by_send_timeout() {
    let broker = InMemoryBroker::new();
    let directory = StaticDirectory::new().bind("ConnectionFactory", Arc::new(broker.clone()));
    let connections = Arc::new(ConnectionManager::new(
        Arc::new(directory),
        "ConnectionFactory",
        Duration::from_secs(1),
    ));
    let sender = MessageSender::new(connections, Duration::from_millis(50));
    broker.set_latency(Some(Duration::from_secs(5)));

    let started = tokio::time::Instant::now();
    let delivery = sender
        .send(&database_payload(), "hcat", EventKind::AddDatabase)
        .await;

    assert_eq!(delivery, Delivery::Failed);
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(broker.delivered().is_empty());

    // The cut-off transaction is not reused by the next publish.
    broker.set_latency(None);
    let delivery = sender
        .send(&database_payload(), "hcat", EventKind::DropDatabase)
        .await;
    assert_eq!(delivery, Delivery::Delivered);
    assert_eq!(broker.overlapping_transactions(), 0);
    assert_eq!(broker.sessions_opened(), 2);
}

#[tokio::test]
async fn test_broker_errors_reach_observer_without_failing_publishes() {
    let harness = Harness::new();
    assert!(harness.listener.start().await);

    harness.broker.emit_error(Error::Connection("link dropped".to_string()));

    let delivery = harness
        .listener
        .on_create_database(&harness.catalog, true, Database::new("sales"))
        .await
        .unwrap();
    assert_eq!(delivery, Delivery::Delivered);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_publishes_do_not_interleave() {
    let harness = Arc::new(Harness::new());
    harness.broker.set_latency(Some(Duration::from_millis(2)));

    let mut handles = Vec::new();
    for i in 0..16 {
        let harness = harness.clone();
        handles.push(tokio::spawn(async move {
            harness
                .listener
                .on_create_database(&harness.catalog, true, Database::new(format!("db{}", i)))
                .await
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), Delivery::Delivered);
    }

    assert_eq!(harness.broker.delivered_to("hcat").len(), 16);
    assert_eq!(harness.broker.overlapping_transactions(), 0);
    assert_eq!(harness.broker.connections_opened(), 1);
}

#[tokio::test]
async fn test_shutdown_closes_session_and_connection() {
    let harness = Harness::new();
    harness
        .listener
        .on_create_database(&harness.catalog, true, Database::new("sales"))
        .await
        .unwrap();

    let broker = harness.broker.clone();
    harness.listener.shutdown().await;

    assert_eq!(broker.sessions_closed(), 1);
    assert_eq!(broker.connections_closed(), 1);
}

#[tokio::test]
async fn test_shutdown_without_connection() {
    let harness = Harness::new();
    harness.broker.set_unreachable(true);
    let broker = harness.broker.clone();

    harness.listener.shutdown().await;

    assert_eq!(broker.connections_closed(), 0);
}
