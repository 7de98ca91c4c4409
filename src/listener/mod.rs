//! Catalog event listener that republishes lifecycle events on the message
//! bus.
//!
//! Subscribers follow a table's partitions on the topic stored in the
//! table's `hcat.msgbus.topic.name` property, and follow databases and
//! tables on the prefix-derived topics. Every message carries the
//! `HCAT_EVENT` property, so subscribers can select by event kind.
//!
//! Failed catalog operations and alter events are never published. Broker
//! failures are logged and reported as [`Delivery::Failed`]; only catalog
//! inconsistencies surface as errors.

pub mod sanitize;
pub mod topic;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use crate::broker::{Directory, StaticDirectory};
use crate::catalog::{Catalog, CatalogEvent, CatalogEventKind, Database, Partition, Table};
use crate::notification::{EntitySnapshot, EventKind, Payload};
use crate::publish::{ConnectionManager, Delivery, MessageSender};
use crate::{Config, Result};

pub use sanitize::{sanitize_storage, Sanitize};
pub use topic::{
    resolve, table_event_topic, table_topic_name, topic_prefix, TopicSource,
    DEFAULT_TOPIC_PREFIX, TOPIC_NAME_PROPERTY, TOPIC_PREFIX_PROPERTY,
};

/// Receives catalog lifecycle events.
#[async_trait]
pub trait CatalogListener: Send + Sync {
    /// Handles one event. Errors mean the catalog is inconsistent, never
    /// that publishing failed.
    async fn on_event(&self, catalog: &dyn Catalog, event: CatalogEvent) -> Result<Delivery>;
}

pub struct NotificationListener {
    connections: Arc<ConnectionManager>,
    sender: MessageSender,
}

impl NotificationListener {
    pub fn new(directory: Arc<dyn Directory>, config: &Config) -> Self {
        let connections = Arc::new(ConnectionManager::new(
            directory,
            config.directory.connection_factory.clone(),
            config.broker.connect_timeout(),
        ));
        let sender = MessageSender::new(connections.clone(), config.broker.send_timeout());
        Self {
            connections,
            sender,
        }
    }

    /// Listener publishing to the Kafka cluster in `config`.
    pub fn from_config(config: &Config) -> Self {
        Self::new(Arc::new(StaticDirectory::from_config(config)), config)
    }

    /// Connects to the message bus ahead of the first event. A failure is
    /// logged and retried on the next publish.
    pub async fn start(&self) -> bool {
        self.connections.connect().await
    }

    /// Closes the broker session and connection.
    pub async fn shutdown(self) {
        self.connections.close().await;
        info!("Notification listener stopped");
    }

    pub fn sender(&self) -> &MessageSender {
        &self.sender
    }

    pub async fn on_add_partition(
        &self,
        catalog: &dyn Catalog,
        status: bool,
        partition: Partition,
    ) -> Result<Delivery> {
        if !status {
            return Ok(Delivery::Ignored);
        }
        self.publish_partition(catalog, partition, EventKind::AddPartition)
            .await
    }

    pub async fn on_drop_partition(
        &self,
        catalog: &dyn Catalog,
        status: bool,
        mut partition: Partition,
    ) -> Result<Delivery> {
        if !status {
            return Ok(Delivery::Ignored);
        }
        partition.sanitize();
        self.publish_partition(catalog, partition, EventKind::DropPartition)
            .await
    }

    pub async fn on_create_database(
        &self,
        catalog: &dyn Catalog,
        status: bool,
        database: Database,
    ) -> Result<Delivery> {
        if !status {
            return Ok(Delivery::Ignored);
        }
        self.publish_database(catalog, database, EventKind::AddDatabase)
            .await
    }

    pub async fn on_drop_database(
        &self,
        catalog: &dyn Catalog,
        status: bool,
        database: Database,
    ) -> Result<Delivery> {
        if !status {
            return Ok(Delivery::Ignored);
        }
        self.publish_database(catalog, database, EventKind::DropDatabase)
            .await
    }

    /// Persists the table's own topic name in its properties, then announces
    /// the table on the database topic. Nothing is published if the catalog
    /// rejects the update.
    pub async fn on_create_table(
        &self,
        catalog: &dyn Catalog,
        status: bool,
        table: Table,
    ) -> Result<Delivery> {
        if !status {
            return Ok(Delivery::Ignored);
        }

        let mut updated = catalog.get_table(&table.db_name, &table.table_name).await?;
        let topic_name = table_topic_name(catalog, &updated.db_name, &updated.table_name);
        updated
            .parameters
            .insert(TOPIC_NAME_PROPERTY.to_string(), topic_name.clone());
        catalog
            .alter_table(&updated.db_name, &updated.table_name, updated.clone())
            .await?;
        debug!(table = %updated.qualified_name(), topic = %topic_name, "Stored table topic");

        let topic = table_event_topic(catalog, &updated.db_name);
        let payload = Payload::Snapshot(EntitySnapshot::Table(updated));
        Ok(self.sender.send(&payload, &topic, EventKind::AddTable).await)
    }

    pub async fn on_drop_table(
        &self,
        catalog: &dyn Catalog,
        status: bool,
        mut table: Table,
    ) -> Result<Delivery> {
        if !status {
            return Ok(Delivery::Ignored);
        }
        table.sanitize();

        let topic = table_event_topic(catalog, &table.db_name);
        let payload = Payload::Snapshot(EntitySnapshot::Table(table));
        Ok(self.sender.send(&payload, &topic, EventKind::DropTable).await)
    }

    /// Announces that all data of `partition_name` has been loaded. The
    /// topic is taken from `table` as carried by the event.
    pub async fn on_load_partition_done(
        &self,
        catalog: &dyn Catalog,
        status: bool,
        table: &Table,
        partition_name: String,
    ) -> Result<Delivery> {
        if !status {
            return Ok(Delivery::Ignored);
        }
        let Some(topic) = resolve(catalog, TopicSource::StoredOn(table)).await? else {
            suppressed(&table.qualified_name());
            return Ok(Delivery::Suppressed);
        };
        let payload = Payload::Snapshot(EntitySnapshot::PartitionName(partition_name));
        Ok(self
            .sender
            .send(&payload, &topic, EventKind::PartitionDone)
            .await)
    }

    /// Alter events are not published.
    pub async fn on_alter_partition(
        &self,
        _catalog: &dyn Catalog,
        _old_partition: &Partition,
        _new_partition: &Partition,
    ) -> Result<Delivery> {
        Ok(Delivery::Ignored)
    }

    /// Alter events are not published.
    pub async fn on_alter_table(
        &self,
        _catalog: &dyn Catalog,
        _old_table: &Table,
        _new_table: &Table,
    ) -> Result<Delivery> {
        Ok(Delivery::Ignored)
    }

    async fn publish_partition(
        &self,
        catalog: &dyn Catalog,
        partition: Partition,
        kind: EventKind,
    ) -> Result<Delivery> {
        let source = TopicSource::OwningTable {
            db_name: &partition.db_name,
            table_name: &partition.table_name,
        };
        let Some(topic) = resolve(catalog, source).await? else {
            suppressed(&partition.qualified_table_name());
            return Ok(Delivery::Suppressed);
        };
        let payload = Payload::Snapshot(EntitySnapshot::Partition(partition));
        Ok(self.sender.send(&payload, &topic, kind).await)
    }

    async fn publish_database(
        &self,
        catalog: &dyn Catalog,
        database: Database,
        kind: EventKind,
    ) -> Result<Delivery> {
        let Some(topic) = resolve(catalog, TopicSource::Prefix).await? else {
            info!(
                database = %database.name,
                "Topic prefix is empty. Suppressing notification for database event. \
                 To enable database notifications, set {} in the host configuration",
                TOPIC_PREFIX_PROPERTY
            );
            return Ok(Delivery::Suppressed);
        };
        let payload = Payload::Snapshot(EntitySnapshot::Database(database));
        Ok(self.sender.send(&payload, &topic, kind).await)
    }
}

fn suppressed(table: &str) {
    info!(
        table = %table,
        "Topic name not found in catalog. Suppressing notification. To enable \
         notifications for this table, set the table property {}=<dbname>.<tablename> \
         or any other topic name",
        TOPIC_NAME_PROPERTY
    );
}

#[async_trait]
impl CatalogListener for NotificationListener {
    async fn on_event(&self, catalog: &dyn Catalog, event: CatalogEvent) -> Result<Delivery> {
        let status = event.status;
        debug!(event = event.kind.name(), status, "Catalog event received");

        match event.kind {
            CatalogEventKind::PartitionAdded { partition } => {
                self.on_add_partition(catalog, status, partition).await
            }
            CatalogEventKind::PartitionDropped { partition } => {
                self.on_drop_partition(catalog, status, partition).await
            }
            CatalogEventKind::DatabaseCreated { database } => {
                self.on_create_database(catalog, status, database).await
            }
            CatalogEventKind::DatabaseDropped { database } => {
                self.on_drop_database(catalog, status, database).await
            }
            CatalogEventKind::TableCreated { table } => {
                self.on_create_table(catalog, status, table).await
            }
            CatalogEventKind::TableDropped { table } => {
                self.on_drop_table(catalog, status, table).await
            }
            CatalogEventKind::PartitionLoadCompleted {
                table,
                partition_name,
            } => {
                self.on_load_partition_done(catalog, status, &table, partition_name)
                    .await
            }
            CatalogEventKind::PartitionAltered {
                old_partition,
                new_partition,
            } => {
                self.on_alter_partition(catalog, &old_partition, &new_partition)
                    .await
            }
            CatalogEventKind::TableAltered {
                old_table,
                new_table,
            } => self.on_alter_table(catalog, &old_table, &new_table).await,
        }
    }
}
