//! Replays recorded catalog events through a listener.
//!
//! Input is JSON lines, one [`CatalogEvent`] per line. Before each event
//! reaches the listener, the in-memory catalog is brought to the state the
//! catalog service would have after the operation, so lookups made by the
//! listener see the created table.

use std::path::Path;
use std::sync::Arc;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};

use crate::catalog::{CatalogEvent, CatalogEventKind, InMemoryCatalog};
use crate::listener::CatalogListener;
use crate::publish::Delivery;
use crate::Result;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub delivered: usize,
    pub ignored: usize,
    pub suppressed: usize,
    pub failed: usize,
    /// Events rejected as malformed or because the catalog was inconsistent.
    pub errors: usize,
}

impl ReplaySummary {
    pub fn total(&self) -> usize {
        self.delivered + self.ignored + self.suppressed + self.failed + self.errors
    }

    fn record(&mut self, delivery: Delivery) {
        match delivery {
            Delivery::Delivered => self.delivered += 1,
            Delivery::Ignored => self.ignored += 1,
            Delivery::Suppressed => self.suppressed += 1,
            Delivery::Failed => self.failed += 1,
        }
    }
}

pub struct Replayer<L> {
    listener: L,
    catalog: Arc<InMemoryCatalog>,
}

impl<L: CatalogListener> Replayer<L> {
    pub fn new(listener: L, catalog: Arc<InMemoryCatalog>) -> Self {
        Self { listener, catalog }
    }

    pub fn catalog(&self) -> &InMemoryCatalog {
        &self.catalog
    }

    pub fn into_listener(self) -> L {
        self.listener
    }

    pub async fn replay_file<P: AsRef<Path>>(&self, path: P) -> Result<ReplaySummary> {
        let file = tokio::fs::File::open(path.as_ref()).await?;
        info!(path = %path.as_ref().display(), "Replaying catalog events");
        self.replay(BufReader::new(file)).await
    }

    /// Replays every line of `reader`. A malformed line or a catalog
    /// inconsistency is logged and counted, and the replay continues.
    pub async fn replay<R: AsyncBufRead + Unpin>(&self, reader: R) -> Result<ReplaySummary> {
        let mut summary = ReplaySummary::default();
        let mut lines = reader.lines();
        let mut line_number = 0usize;

        while let Some(line) = lines.next_line().await? {
            line_number += 1;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let event: CatalogEvent = match serde_json::from_str(line) {
                Ok(event) => event,
                Err(e) => {
                    warn!(line = line_number, error = %e, "Skipping malformed event");
                    summary.errors += 1;
                    continue;
                }
            };

            let name = event.kind.name();
            match self.apply(event).await {
                Ok(delivery) => {
                    debug!(line = line_number, event = name, ?delivery, "Event replayed");
                    summary.record(delivery);
                }
                Err(e) => {
                    error!(line = line_number, event = name, error = %e, "Catalog event failed");
                    summary.errors += 1;
                }
            }
        }

        info!(
            delivered = summary.delivered,
            ignored = summary.ignored,
            suppressed = summary.suppressed,
            failed = summary.failed,
            errors = summary.errors,
            "Replay finished"
        );
        Ok(summary)
    }

    /// Applies the catalog side of `event`, then hands it to the listener.
    pub async fn apply(&self, event: CatalogEvent) -> Result<Delivery> {
        if event.status {
            self.mutate_catalog(&event.kind);
        }
        self.listener.on_event(self.catalog.as_ref(), event).await
    }

    fn mutate_catalog(&self, kind: &CatalogEventKind) {
        match kind {
            CatalogEventKind::DatabaseCreated { database } => {
                self.catalog.put_database(database.clone())
            }
            CatalogEventKind::TableCreated { table } => self.catalog.put_table(table.clone()),
            CatalogEventKind::TableAltered { new_table, .. } => {
                self.catalog.put_table(new_table.clone())
            }
            CatalogEventKind::TableDropped { table } => {
                self.catalog.remove_table(&table.db_name, &table.table_name);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, Table};
    use crate::listener::TOPIC_NAME_PROPERTY;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records events and reports them all delivered.
    #[derive(Default)]
    struct RecordingListener {
        seen: Mutex<Vec<&'static str>>,
    }

    #[async_trait]
    impl CatalogListener for RecordingListener {
        async fn on_event(&self, catalog: &dyn Catalog, event: CatalogEvent) -> Result<Delivery> {
            if let CatalogEventKind::PartitionAdded { partition } = &event.kind {
                catalog
                    .get_table(&partition.db_name, &partition.table_name)
                    .await?;
            }
            self.seen.lock().unwrap().push(event.kind.name());
            Ok(Delivery::Delivered)
        }
    }

    #[tokio::test]
    async fn test_replay_applies_catalog_changes_first() {
        let replayer = Replayer::new(RecordingListener::default(), Arc::new(InMemoryCatalog::new()));
        let input = concat!(
            r#"{"event":"table_created","table":{"db_name":"sales","table_name":"q1"}}"#,
            "\n",
            r#"{"event":"partition_added","partition":{"db_name":"sales","table_name":"q1","values":["eu"]}}"#,
            "\n",
        );

        let summary = replayer.replay(input.as_bytes()).await.unwrap();

        assert_eq!(summary.delivered, 2);
        assert_eq!(summary.errors, 0);
        assert!(replayer.catalog().table("sales", "q1").is_some());
    }

    #[tokio::test]
    async fn test_replay_continues_after_bad_lines() {
        let replayer = Replayer::new(RecordingListener::default(), Arc::new(InMemoryCatalog::new()));
        let input = concat!(
            "not json\n",
            "\n",
            r#"{"event":"partition_added","partition":{"db_name":"sales","table_name":"gone","values":[]}}"#,
            "\n",
            r#"{"event":"database_created","database":{"name":"sales"}}"#,
            "\n",
        );

        let summary = replayer.replay(input.as_bytes()).await.unwrap();

        assert_eq!(summary.errors, 2);
        assert_eq!(summary.delivered, 1);
        assert_eq!(summary.total(), 3);
        let listener = replayer.into_listener();
        assert_eq!(*listener.seen.lock().unwrap(), vec!["database_created"]);
    }

    #[tokio::test]
    async fn test_failed_events_leave_catalog_untouched() {
        let replayer = Replayer::new(RecordingListener::default(), Arc::new(InMemoryCatalog::new()));
        let mut table = Table::new("sales", "q1");
        table
            .parameters
            .insert(TOPIC_NAME_PROPERTY.to_string(), "sales.q1".to_string());

        replayer
            .apply(CatalogEvent::failed(CatalogEventKind::TableCreated { table }))
            .await
            .unwrap();

        assert!(replayer.catalog().table("sales", "q1").is_none());
    }
}
