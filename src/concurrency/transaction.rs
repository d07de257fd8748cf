use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use tracing::warn;

use crate::buffer::{BufferPool, PageGuard};
use crate::common::{PageId, Permissions, Result, TableId, TransactionId};
use crate::storage::heap::{HeapFile, HeapFileIter};
use crate::tuple::Tuple;

/// RAII transaction handle. If dropped without calling `commit()` or
/// `abort()`, the transaction is aborted: its dirty pages are discarded and
/// its locks released.
pub struct Transaction {
    id: TransactionId,
    pool: Arc<BufferPool>,
    completed: bool,
}

impl Transaction {
    pub(crate) fn new(pool: Arc<BufferPool>) -> Self {
        Self {
            id: TransactionId::next(),
            pool,
            completed: false,
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Fetches a page under this transaction. The returned page borrows the
    /// transaction, so it must be dropped before `commit()` or `abort()`.
    pub fn get_page(&self, page_id: PageId, perm: Permissions) -> Result<TransactionPage<'_>> {
        let guard = self.pool.get_page(self.id, page_id, perm)?;
        Ok(TransactionPage {
            guard,
            _txn: PhantomData,
        })
    }

    /// Inserts `tuple` into `table_id`; sets its record id on success.
    pub fn insert_tuple(&self, table_id: TableId, tuple: &mut Tuple) -> Result<Vec<PageId>> {
        self.pool.insert_tuple(self.id, table_id, tuple)
    }

    pub fn delete_tuple(&self, tuple: &Tuple) -> Result<Vec<PageId>> {
        self.pool.delete_tuple(self.id, tuple)
    }

    pub fn update_tuple(&self, tuple: &Tuple) -> Result<Vec<PageId>> {
        self.pool.update_tuple(self.id, tuple)
    }

    /// Scans every tuple of `file` under shared page locks.
    pub fn scan<'a>(&'a self, file: &'a HeapFile) -> HeapFileIter<'a> {
        file.iter(&self.pool, self.id)
    }

    /// Writes this transaction's changes to disk and releases its locks.
    pub fn commit(mut self) -> Result<()> {
        self.completed = true;
        self.pool.transaction_complete(self.id, true)
    }

    /// Discards this transaction's changes and releases its locks.
    pub fn abort(mut self) -> Result<()> {
        self.completed = true;
        self.pool.transaction_complete(self.id, false)
    }
}

/// A page fetched through [`Transaction::get_page`].
///
/// ```compile_fail
/// # fn main() -> heapdb::Result<()> {
/// # let db = heapdb::Database::default();
/// # let pid = heapdb::PageId::new(heapdb::TableId::new(1), 0);
/// let txn = db.begin();
/// let page = txn.get_page(pid, heapdb::Permissions::ReadOnly)?;
/// txn.commit()?;
/// drop(page);
/// # Ok(())
/// # }
/// ```
pub struct TransactionPage<'txn> {
    guard: PageGuard,
    _txn: PhantomData<&'txn Transaction>,
}

impl Deref for TransactionPage<'_> {
    type Target = PageGuard;

    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

impl DerefMut for TransactionPage<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.guard
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.completed {
            warn!(tid = %self.id, "transaction dropped without commit or abort, aborting");
            let _ = self.pool.transaction_complete(self.id, false);
        }
    }
}
