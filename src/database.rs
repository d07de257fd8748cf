use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::buffer::BufferPool;
use crate::catalog::Catalog;
use crate::common::{DbConfig, Result};
use crate::concurrency::{LockManager, Transaction};
use crate::storage::heap::HeapFile;
use crate::tuple::Schema;

/// One storage kernel instance: catalog, lock manager and buffer pool wired
/// together from a [`DbConfig`].
///
/// Independent `Database` values share nothing, so tests can run many in
/// one process.
pub struct Database {
    config: DbConfig,
    catalog: Arc<Catalog>,
    lock_manager: Arc<LockManager>,
    buffer_pool: Arc<BufferPool>,
}

impl Database {
    pub fn new(config: DbConfig) -> Self {
        let catalog = Arc::new(Catalog::new(config.page_size));
        let lock_manager = Arc::new(LockManager::new(config.lock_timeout));
        let buffer_pool = Arc::new(BufferPool::new(
            config.buffer_pool_pages,
            config.lru_k,
            Arc::clone(&catalog),
            Arc::clone(&lock_manager),
        ));

        Self {
            config,
            catalog,
            lock_manager,
            buffer_pool,
        }
    }

    /// Opens or creates a heap file at `path` and registers it as a table.
    pub fn create_table<P: AsRef<Path>>(&self, path: P, schema: Arc<Schema>) -> Result<Arc<HeapFile>> {
        self.catalog.add_table(path, schema)
    }

    /// Starts a new transaction.
    pub fn begin(&self) -> Transaction {
        let txn = Transaction::new(Arc::clone(&self.buffer_pool));
        debug!(tid = %txn.id(), "transaction started");
        txn
    }

    /// Runs `body` in a fresh transaction and commits it, retrying from
    /// scratch up to `max_attempts` times while it fails with a retryable
    /// error (a lock wait timeout). Any other error aborts and is returned.
    pub fn run_transaction<T, F>(&self, max_attempts: usize, mut body: F) -> Result<T>
    where
        F: FnMut(&Transaction) -> Result<T>,
    {
        let mut attempt = 1;
        loop {
            let txn = self.begin();
            let result = body(&txn);

            let err = match result {
                Ok(value) => match txn.commit() {
                    Ok(()) => return Ok(value),
                    Err(e) => e,
                },
                Err(e) => {
                    txn.abort()?;
                    e
                }
            };

            if !err.is_retryable() || attempt >= max_attempts {
                return Err(err);
            }
            debug!(attempt, error = %err, "retrying transaction");
            attempt += 1;
        }
    }

    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn lock_manager(&self) -> &Arc<LockManager> {
        &self.lock_manager
    }

    pub fn buffer_pool(&self) -> &Arc<BufferPool> {
        &self.buffer_pool
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new(DbConfig::default())
    }
}
