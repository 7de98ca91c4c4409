//! The catalog service as seen by the notification listener.
//!
//! The listener never owns catalog state. It reads host configuration and
//! tables through [`Catalog`], and mutates catalog metadata only to persist
//! the topic name computed for a newly created table.

pub mod events;
pub mod memory;
pub mod model;

use async_trait::async_trait;

use crate::error::CatalogError;

pub use events::{CatalogEvent, CatalogEventKind};
pub use memory::{CatalogSnapshot, InMemoryCatalog};
pub use model::{Database, FieldSchema, Order, Partition, SerDeInfo, StorageDescriptor, Table};

/// Handle back to the catalog service that raised an event.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Reads a host configuration property. Called on every use, never
    /// cached, so operators can change it at runtime.
    fn config_value(&self, key: &str) -> Option<String>;

    /// Returns the current definition of `db_name.table_name`.
    async fn get_table(&self, db_name: &str, table_name: &str) -> Result<Table, CatalogError>;

    /// Replaces the definition of `db_name.table_name` with `new_table`.
    async fn alter_table(
        &self,
        db_name: &str,
        table_name: &str,
        new_table: Table,
    ) -> Result<(), CatalogError>;
}
