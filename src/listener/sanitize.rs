use crate::catalog::{Partition, StorageDescriptor, Table};

/// Clears storage metadata that is not published with destructive events.
pub trait Sanitize {
    fn sanitize(&mut self);
}

/// Empties bucketing columns, sort order, storage parameters and SerDe
/// parameters.
pub fn sanitize_storage(storage: &mut StorageDescriptor) {
    storage.bucket_cols.clear();
    storage.sort_cols.clear();
    storage.parameters.clear();
    storage.serde_info.parameters.clear();
}

impl Sanitize for Table {
    fn sanitize(&mut self) {
        sanitize_storage(&mut self.storage);
    }
}

impl Sanitize for Partition {
    fn sanitize(&mut self) {
        sanitize_storage(&mut self.storage);
    }
}
