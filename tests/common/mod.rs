#![allow(dead_code)]

use async_trait::async_trait;
use catalog_notify::broker::{InMemoryBroker, StaticDirectory};
use catalog_notify::catalog::{Catalog, InMemoryCatalog, Table};
use catalog_notify::config::{BrokerConfig, Config, DirectoryConfig, HostConfig};
use catalog_notify::listener::TOPIC_NAME_PROPERTY;
use catalog_notify::{CatalogError, NotificationListener};
use std::env;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Get test configuration from environment variables
pub fn get_test_config() -> Config {
    let broker = BrokerConfig {
        brokers: env::var("TEST_KAFKA_BROKERS")
            .unwrap_or_else(|_| "localhost:9092".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .collect(),
        transactional_id: format!("catalog-notify-test-{}", std::process::id()),
        compression: "none".to_string(), // No compression for tests
        acks: "all".to_string(),
        message_timeout_ms: 5_000,
        topic_partitions: 1,
        topic_replication_factor: 1,
        connect_timeout_ms: 2_000,
        send_timeout_ms: 500,
    };

    Config {
        broker,
        directory: DirectoryConfig::default(),
        host: HostConfig::default(),
    }
}

/// Listener wired to an in-memory broker and catalog.
pub struct Harness {
    pub broker: InMemoryBroker,
    pub catalog: InMemoryCatalog,
    pub listener: NotificationListener,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_catalog(InMemoryCatalog::new())
    }

    pub fn with_prefix(prefix: &str) -> Self {
        Self::with_catalog(
            InMemoryCatalog::new().with_setting("hcat.msgbus.topic.prefix", prefix),
        )
    }

    pub fn with_catalog(catalog: InMemoryCatalog) -> Self {
        let broker = InMemoryBroker::new();
        let config = get_test_config();
        let directory = StaticDirectory::new().bind(
            config.directory.connection_factory.clone(),
            Arc::new(broker.clone()),
        );
        let listener = NotificationListener::new(Arc::new(directory), &config);

        Self {
            broker,
            catalog,
            listener,
        }
    }
}

/// A table whose partitions publish on `topic`.
pub fn table_with_topic(db_name: &str, table_name: &str, topic: &str) -> Table {
    let mut table = Table::new(db_name, table_name);
    table
        .parameters
        .insert(TOPIC_NAME_PROPERTY.to_string(), topic.to_string());
    table
}

/// Catalog whose `alter_table` fails a configurable number of times.
pub struct FailingCatalog {
    pub inner: InMemoryCatalog,
    alter_failures: AtomicU32,
}

impl FailingCatalog {
    pub fn new(inner: InMemoryCatalog) -> Self {
        Self {
            inner,
            alter_failures: AtomicU32::new(0),
        }
    }

    pub fn fail_next_alters(&self, count: u32) {
        self.alter_failures.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl Catalog for FailingCatalog {
    fn config_value(&self, key: &str) -> Option<String> {
        self.inner.config_value(key)
    }

    async fn get_table(&self, db_name: &str, table_name: &str) -> Result<Table, CatalogError> {
        self.inner.get_table(db_name, table_name).await
    }

    async fn alter_table(
        &self,
        db_name: &str,
        table_name: &str,
        new_table: Table,
    ) -> Result<(), CatalogError> {
        let remaining = self.alter_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.alter_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(CatalogError::InvalidOperation(format!(
                "alter of {}.{} rejected",
                db_name, table_name
            )));
        }
        self.inner.alter_table(db_name, table_name, new_table).await
    }
}
