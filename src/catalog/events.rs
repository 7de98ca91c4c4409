use serde::{Deserialize, Serialize};

use super::model::{Database, Partition, Table};

/// One lifecycle transition reported by the catalog service.
///
/// `status` is false when the underlying catalog operation failed; such
/// events are never published.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEvent {
    #[serde(default = "default_status")]
    pub status: bool,
    #[serde(flatten)]
    pub kind: CatalogEventKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CatalogEventKind {
    PartitionAdded {
        partition: Partition,
    },
    PartitionDropped {
        partition: Partition,
    },
    DatabaseCreated {
        database: Database,
    },
    DatabaseDropped {
        database: Database,
    },
    TableCreated {
        table: Table,
    },
    TableDropped {
        table: Table,
    },
    PartitionLoadCompleted {
        table: Table,
        partition_name: String,
    },
    PartitionAltered {
        old_partition: Partition,
        new_partition: Partition,
    },
    TableAltered {
        old_table: Table,
        new_table: Table,
    },
}

impl CatalogEvent {
    pub fn succeeded(kind: CatalogEventKind) -> Self {
        Self { status: true, kind }
    }

    pub fn failed(kind: CatalogEventKind) -> Self {
        Self {
            status: false,
            kind,
        }
    }
}

impl CatalogEventKind {
    pub fn name(&self) -> &'static str {
        match self {
            CatalogEventKind::PartitionAdded { .. } => "partition_added",
            CatalogEventKind::PartitionDropped { .. } => "partition_dropped",
            CatalogEventKind::DatabaseCreated { .. } => "database_created",
            CatalogEventKind::DatabaseDropped { .. } => "database_dropped",
            CatalogEventKind::TableCreated { .. } => "table_created",
            CatalogEventKind::TableDropped { .. } => "table_dropped",
            CatalogEventKind::PartitionLoadCompleted { .. } => "partition_load_completed",
            CatalogEventKind::PartitionAltered { .. } => "partition_altered",
            CatalogEventKind::TableAltered { .. } => "table_altered",
        }
    }
}

fn default_status() -> bool {
    true
}
