//! In-memory catalog.
//!
//! Backs the replay binary and the test suites. Table keys are
//! case-insensitive, as catalog identifiers are.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::model::{Database, Table};
use super::Catalog;
use crate::error::CatalogError;

/// Serialized form of an [`InMemoryCatalog`], as loaded by the replay binary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    #[serde(default)]
    pub settings: HashMap<String, String>,
    #[serde(default)]
    pub databases: Vec<Database>,
    #[serde(default)]
    pub tables: Vec<Table>,
}

#[derive(Debug, Default)]
struct CatalogState {
    settings: HashMap<String, String>,
    databases: BTreeMap<String, Database>,
    tables: BTreeMap<(String, String), Table>,
}

#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    state: RwLock<CatalogState>,
}

fn poison_err<T>(_: PoisonError<T>) -> CatalogError {
    CatalogError::Unavailable("catalog lock poisoned".to_string())
}

fn table_key(db_name: &str, table_name: &str) -> (String, String) {
    (db_name.to_lowercase(), table_name.to_lowercase())
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: CatalogSnapshot) -> Self {
        let catalog = Self::new();
        {
            let mut state = catalog.state.write().unwrap_or_else(PoisonError::into_inner);
            state.settings = snapshot.settings;
            for database in snapshot.databases {
                state.databases.insert(database.name.to_lowercase(), database);
            }
            for table in snapshot.tables {
                state
                    .tables
                    .insert(table_key(&table.db_name, &table.table_name), table);
            }
        }
        catalog
    }

    pub fn with_setting(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_setting(key, value);
        self
    }

    pub fn set_setting(&self, key: impl Into<String>, value: impl Into<String>) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.settings.insert(key.into(), value.into());
    }

    pub fn put_database(&self, database: Database) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.databases.insert(database.name.to_lowercase(), database);
    }

    pub fn put_table(&self, table: Table) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state
            .tables
            .insert(table_key(&table.db_name, &table.table_name), table);
    }

    pub fn remove_table(&self, db_name: &str, table_name: &str) -> Option<Table> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.tables.remove(&table_key(db_name, table_name))
    }

    pub fn table(&self, db_name: &str, table_name: &str) -> Option<Table> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.tables.get(&table_key(db_name, table_name)).cloned()
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    fn config_value(&self, key: &str) -> Option<String> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        state.settings.get(key).cloned()
    }

    async fn get_table(&self, db_name: &str, table_name: &str) -> Result<Table, CatalogError> {
        let state = self.state.read().map_err(poison_err)?;
        state
            .tables
            .get(&table_key(db_name, table_name))
            .cloned()
            .ok_or_else(|| CatalogError::NoSuchObject(format!("{}.{}", db_name, table_name)))
    }

    async fn alter_table(
        &self,
        db_name: &str,
        table_name: &str,
        new_table: Table,
    ) -> Result<(), CatalogError> {
        let mut state = self.state.write().map_err(poison_err)?;
        let key = table_key(db_name, table_name);
        if !state.tables.contains_key(&key) {
            return Err(CatalogError::InvalidOperation(format!(
                "alter table failed: {}.{} does not exist",
                db_name, table_name
            )));
        }

        let new_key = table_key(&new_table.db_name, &new_table.table_name);
        if new_key != key {
            state.tables.remove(&key);
        }
        debug!("Altered table {}.{}", db_name, table_name);
        state.tables.insert(new_key, new_table);
        Ok(())
    }
}
