//! Minimal table registry: maps table ids to their heap files.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use crate::common::{DbError, Result, TableId};
use crate::storage::heap::HeapFile;
use crate::tuple::Schema;

pub struct Catalog {
    page_size: usize,
    tables: RwLock<HashMap<TableId, Arc<HeapFile>>>,
    next_table_id: AtomicU32,
}

impl Catalog {
    /// Creates an empty catalog whose tables all use `page_size`.
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            tables: RwLock::new(HashMap::new()),
            next_table_id: AtomicU32::new(1),
        }
    }

    /// Opens (or creates) the heap file at `path` and registers it under a
    /// fresh table id.
    pub fn add_table<P: AsRef<Path>>(&self, path: P, schema: Arc<Schema>) -> Result<Arc<HeapFile>> {
        let table_id = TableId::new(self.next_table_id.fetch_add(1, Ordering::Relaxed));
        let file = Arc::new(HeapFile::open(path, table_id, schema, self.page_size)?);

        info!(%table_id, schema = %file.schema(), "registered table");
        self.tables.write().insert(table_id, Arc::clone(&file));
        Ok(file)
    }

    /// Returns the heap file of `table_id`.
    pub fn table(&self, table_id: TableId) -> Result<Arc<HeapFile>> {
        self.tables
            .read()
            .get(&table_id)
            .cloned()
            .ok_or(DbError::TableNotFound(table_id))
    }

    /// Returns every registered table id in ascending order.
    pub fn table_ids(&self) -> Vec<TableId> {
        let mut ids: Vec<_> = self.tables.read().keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuple::DataType;
    use tempfile::tempdir;

    #[test]
    fn test_add_and_lookup_tables() {
        let dir = tempdir().unwrap();
        let catalog = Catalog::new(256);
        let schema = Schema::builder().column("id", DataType::Integer).build_arc();

        let a = catalog.add_table(dir.path().join("a.dat"), schema.clone()).unwrap();
        let b = catalog.add_table(dir.path().join("b.dat"), schema).unwrap();

        assert_ne!(a.table_id(), b.table_id());
        assert_eq!(catalog.table_ids(), vec![a.table_id(), b.table_id()]);
        assert_eq!(catalog.table(b.table_id()).unwrap().path(), b.path());
        assert_eq!(a.page_size(), 256);
        assert!(matches!(
            catalog.table(TableId::new(99)),
            Err(DbError::TableNotFound(_))
        ));
    }
}
