//! Subscriber-visible vocabulary: event tags and message payloads.
//!
//! Every published message carries exactly one [`EVENT_PROPERTY`] whose
//! value is an [`EventKind`] tag, so subscribers can filter with a selector
//! on that property without decoding the body.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::catalog::{Database, Partition, Table};

/// Name of the message property that carries the event tag.
pub const EVENT_PROPERTY: &str = "HCAT_EVENT";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    AddPartition,
    DropPartition,
    AddDatabase,
    DropDatabase,
    AddTable,
    DropTable,
    PartitionDone,
}

impl EventKind {
    pub const ALL: [EventKind; 7] = [
        EventKind::AddPartition,
        EventKind::DropPartition,
        EventKind::AddDatabase,
        EventKind::DropDatabase,
        EventKind::AddTable,
        EventKind::DropTable,
        EventKind::PartitionDone,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::AddPartition => "HCAT_ADD_PARTITION",
            EventKind::DropPartition => "HCAT_DROP_PARTITION",
            EventKind::AddDatabase => "HCAT_ADD_DATABASE",
            EventKind::DropDatabase => "HCAT_DROP_DATABASE",
            EventKind::AddTable => "HCAT_ADD_TABLE",
            EventKind::DropTable => "HCAT_DROP_TABLE",
            EventKind::PartitionDone => "HCAT_PARTITION_DONE",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of a notification, chosen by the caller.
///
/// `Fields` becomes a structured map message; `Snapshot` becomes an opaque
/// object message holding the serialized entity.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Fields(BTreeMap<String, String>),
    Snapshot(EntitySnapshot),
}

/// Catalog entity as it looked when the event fired.
///
/// Serializes as the bare entity, so subscribers decode the body straight
/// into the entity type announced by the event tag.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EntitySnapshot {
    Database(Database),
    Table(Table),
    Partition(Partition),
    PartitionName(String),
}
