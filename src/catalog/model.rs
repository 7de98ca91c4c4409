use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Database {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location_uri: Option<String>,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Table {
    pub table_name: String,
    pub db_name: String,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub create_time: i64,
    #[serde(default)]
    pub table_type: Option<String>,
    #[serde(default)]
    pub storage: StorageDescriptor,
    #[serde(default)]
    pub partition_keys: Vec<FieldSchema>,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Partition {
    pub values: Vec<String>,
    pub db_name: String,
    pub table_name: String,
    #[serde(default)]
    pub create_time: i64,
    #[serde(default)]
    pub storage: StorageDescriptor,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

/// Physical layout of a table or partition.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StorageDescriptor {
    #[serde(default)]
    pub columns: Vec<FieldSchema>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub input_format: Option<String>,
    #[serde(default)]
    pub output_format: Option<String>,
    #[serde(default)]
    pub compressed: bool,
    #[serde(default)]
    pub num_buckets: i32,
    #[serde(default)]
    pub serde_info: SerDeInfo,
    #[serde(default)]
    pub bucket_cols: Vec<String>,
    #[serde(default)]
    pub sort_cols: Vec<Order>,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SerDeInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub serialization_lib: Option<String>,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub comment: Option<String>,
}

/// Sort order of a bucketed column; `order` is 1 for ascending, 0 for
/// descending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub col: String,
    pub order: i32,
}

impl Table {
    pub fn new(db_name: impl Into<String>, table_name: impl Into<String>) -> Self {
        Self {
            db_name: db_name.into(),
            table_name: table_name.into(),
            ..Default::default()
        }
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.db_name, self.table_name)
    }
}

impl Partition {
    pub fn new(
        db_name: impl Into<String>,
        table_name: impl Into<String>,
        values: Vec<String>,
    ) -> Self {
        Self {
            db_name: db_name.into(),
            table_name: table_name.into(),
            values,
            ..Default::default()
        }
    }

    pub fn qualified_table_name(&self) -> String {
        format!("{}.{}", self.db_name, self.table_name)
    }
}

impl Database {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}
