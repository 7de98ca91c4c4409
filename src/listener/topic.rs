//! Topic names for catalog events.
//!
//! Entity-scoped events (partitions, load-done) go to the topic stored on
//! the owning table under [`TOPIC_NAME_PROPERTY`]. Coarse events go to a
//! topic derived from the configured prefix: database events to the prefix
//! itself, table events to `prefix.db`.

use crate::catalog::{Catalog, Table};
use crate::Result;

/// Table property holding the table's notification topic.
pub const TOPIC_NAME_PROPERTY: &str = "hcat.msgbus.topic.name";

/// Host configuration key of the topic prefix.
pub const TOPIC_PREFIX_PROPERTY: &str = "hcat.msgbus.topic.prefix";

pub const DEFAULT_TOPIC_PREFIX: &str = "hcat";

/// Where the topic of an event comes from.
#[derive(Debug, Clone, Copy)]
pub enum TopicSource<'a> {
    /// The current definition of `db.table`, read back from the catalog.
    OwningTable { db_name: &'a str, table_name: &'a str },
    /// A table definition carried by the event itself.
    StoredOn(&'a Table),
    /// The configured prefix alone.
    Prefix,
}

/// Resolves the topic of an event. `Ok(None)` means no topic is configured
/// and nothing should be published.
///
/// Fails only when the owning table cannot be read back from the catalog.
pub async fn resolve(catalog: &dyn Catalog, source: TopicSource<'_>) -> Result<Option<String>> {
    let name = match source {
        TopicSource::OwningTable {
            db_name,
            table_name,
        } => {
            let table = catalog.get_table(db_name, table_name).await?;
            stored_topic(&table)
        }
        TopicSource::StoredOn(table) => stored_topic(table),
        TopicSource::Prefix => Some(topic_prefix(catalog)),
    };
    Ok(name.filter(|name| !name.is_empty()))
}

/// Reads the prefix on every call; operators may change it at runtime.
pub fn topic_prefix(catalog: &dyn Catalog) -> String {
    catalog
        .config_value(TOPIC_PREFIX_PROPERTY)
        .unwrap_or_else(|| DEFAULT_TOPIC_PREFIX.to_string())
}

/// Topic of table events in `db_name`. Never empty, so table events are
/// always published.
pub fn table_event_topic(catalog: &dyn Catalog, db_name: &str) -> String {
    format!("{}.{}", topic_prefix(catalog), db_name.to_lowercase())
}

/// Topic persisted on a newly created table.
pub fn table_topic_name(catalog: &dyn Catalog, db_name: &str, table_name: &str) -> String {
    format!(
        "{}.{}.{}",
        topic_prefix(catalog),
        db_name.to_lowercase(),
        table_name.to_lowercase()
    )
}

fn stored_topic(table: &Table) -> Option<String> {
    table.parameters.get(TOPIC_NAME_PROPERTY).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;
    use crate::error::CatalogError;
    use crate::Error;

    fn table_with_topic(topic: &str) -> Table {
        let mut table = Table::new("sales", "q1");
        table
            .parameters
            .insert(TOPIC_NAME_PROPERTY.to_string(), topic.to_string());
        table
    }

    #[tokio::test]
    async fn test_default_prefix() {
        let catalog = InMemoryCatalog::new();

        assert_eq!(topic_prefix(&catalog), "hcat");
        assert_eq!(
            resolve(&catalog, TopicSource::Prefix).await.unwrap(),
            Some("hcat".to_string())
        );
    }

    #[tokio::test]
    async fn test_prefix_read_on_every_call() {
        let catalog = InMemoryCatalog::new().with_setting(TOPIC_PREFIX_PROPERTY, "CATALOG");
        assert_eq!(table_event_topic(&catalog, "Sales"), "CATALOG.sales");

        catalog.set_setting(TOPIC_PREFIX_PROPERTY, "other");
        assert_eq!(table_event_topic(&catalog, "Sales"), "other.sales");
    }

    #[test]
    fn test_table_topic_lowercases_names_only() {
        let catalog = InMemoryCatalog::new().with_setting(TOPIC_PREFIX_PROPERTY, "CATALOG");

        assert_eq!(table_topic_name(&catalog, "Sales", "Q1"), "CATALOG.sales.q1");
    }

    #[tokio::test]
    async fn test_owning_table_topic_is_read_from_catalog() {
        let catalog = InMemoryCatalog::new();
        catalog.put_table(table_with_topic("sales.q1"));

        let topic = resolve(
            &catalog,
            TopicSource::OwningTable {
                db_name: "sales",
                table_name: "q1",
            },
        )
        .await
        .unwrap();
        assert_eq!(topic, Some("sales.q1".to_string()));
    }

    #[tokio::test]
    async fn test_missing_owning_table_is_an_error() {
        let catalog = InMemoryCatalog::new();

        let err = resolve(
            &catalog,
            TopicSource::OwningTable {
                db_name: "sales",
                table_name: "q1",
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Catalog(CatalogError::NoSuchObject(_))));
    }

    #[tokio::test]
    async fn test_empty_or_absent_topic_resolves_to_none() {
        let catalog = InMemoryCatalog::new();

        let absent = Table::new("sales", "q1");
        assert_eq!(resolve(&catalog, TopicSource::StoredOn(&absent)).await.unwrap(), None);

        let empty = table_with_topic("");
        assert_eq!(resolve(&catalog, TopicSource::StoredOn(&empty)).await.unwrap(), None);

        catalog.set_setting(TOPIC_PREFIX_PROPERTY, "");
        assert_eq!(resolve(&catalog, TopicSource::Prefix).await.unwrap(), None);
    }
}
