use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use crate::catalog::Catalog;
use crate::common::{DbError, LockMode, PageId, Permissions, Result, TableId, TransactionId};
use crate::concurrency::LockManager;
use crate::tuple::Tuple;

use super::page_guard::ReleaseCallback;
use super::{Frame, LruKReplacer, PageGuard, ReadPageGuard, WritePageGuard};

/// Internal state shared with page guard release callbacks
struct PoolState {
    /// Cached pages
    frames: Mutex<HashMap<PageId, Arc<Frame>>>,
    /// LRU-K replacer over the cached pages that may be evicted
    replacer: LruKReplacer,
}

/// BufferPool caches up to `capacity` pages in memory and is the only way
/// transactions reach page contents.
///
/// Every fetch first takes the page lock implied by the permission from the
/// [`LockManager`], so the pool enforces strict two-phase locking. Pages are
/// managed NO-STEAL / FORCE:
///
/// - a page dirtied by a running transaction is never evicted or written
///   back (pinned pages are not evicted either);
/// - at commit every page the transaction dirtied is written to its heap file;
/// - at abort those pages are dropped from the cache, so the next fetch
///   rereads the committed bytes.
pub struct BufferPool {
    capacity: usize,
    catalog: Arc<Catalog>,
    lock_manager: Arc<LockManager>,
    state: Arc<PoolState>,
}

impl BufferPool {
    /// Creates a pool holding at most `capacity` pages, evicting with LRU-`k`.
    pub fn new(capacity: usize, k: usize, catalog: Arc<Catalog>, lock_manager: Arc<LockManager>) -> Self {
        Self {
            capacity,
            catalog,
            lock_manager,
            state: Arc::new(PoolState {
                frames: Mutex::new(HashMap::new()),
                replacer: LruKReplacer::new(k),
            }),
        }
    }

    /// Fetches `page_id` for `tid` with the requested permission.
    ///
    /// Takes a shared lock for [`Permissions::ReadOnly`] and an exclusive lock
    /// for [`Permissions::ReadWrite`], blocking until granted or failing with
    /// [`DbError::TransactionAborted`]. On a cache miss with the pool full, a
    /// clean unpinned page is evicted; if there is none the fetch fails with
    /// [`DbError::NoEvictablePage`].
    ///
    /// The page latch behind the returned guard is waited for with a deadline
    /// drawn like a lock wait's. A guard still alive on the page (one the same
    /// transaction holds, or one kept past its transaction's end) makes the
    /// fetch fail with [`DbError::TransactionAborted`] rather than block.
    pub fn get_page(&self, tid: TransactionId, page_id: PageId, perm: Permissions) -> Result<PageGuard> {
        Ok(match perm {
            Permissions::ReadOnly => PageGuard::Read(self.fetch_read(tid, page_id)?),
            Permissions::ReadWrite => PageGuard::Write(self.fetch_write(tid, page_id)?),
        })
    }

    /// Fetches a page with read-only permission.
    pub fn fetch_read(&self, tid: TransactionId, page_id: PageId) -> Result<ReadPageGuard> {
        let frame = self.fetch_frame(tid, page_id, LockMode::Shared)?;
        match frame.read_owned_until(self.lock_manager.deadline()) {
            Some(page) => Ok(ReadPageGuard::new(frame, page, self.release_callback())),
            None => Err(self.latch_timed_out(tid, &frame)),
        }
    }

    /// Fetches a page with read-write permission.
    pub fn fetch_write(&self, tid: TransactionId, page_id: PageId) -> Result<WritePageGuard> {
        let frame = self.fetch_frame(tid, page_id, LockMode::Exclusive)?;
        match frame.write_owned_until(self.lock_manager.deadline()) {
            Some(page) => Ok(WritePageGuard::new(frame, page, tid, self.release_callback())),
            None => Err(self.latch_timed_out(tid, &frame)),
        }
    }

    /// Inserts `tuple` into table `table_id` on behalf of `tid`.
    /// Returns the pages modified.
    pub fn insert_tuple(&self, tid: TransactionId, table_id: TableId, tuple: &mut Tuple) -> Result<Vec<PageId>> {
        let table = self.catalog.table(table_id)?;
        table.insert_tuple(self, tid, tuple)
    }

    /// Deletes `tuple` from the table its record id points into.
    pub fn delete_tuple(&self, tid: TransactionId, tuple: &Tuple) -> Result<Vec<PageId>> {
        let record_id = tuple.record_id().ok_or(DbError::MissingRecordId)?;
        let table = self.catalog.table(record_id.page_id.table_id)?;
        table.delete_tuple(self, tid, tuple)
    }

    /// Overwrites the stored tuple at `tuple`'s record id.
    pub fn update_tuple(&self, tid: TransactionId, tuple: &Tuple) -> Result<Vec<PageId>> {
        let record_id = tuple.record_id().ok_or(DbError::MissingRecordId)?;
        let table = self.catalog.table(record_id.page_id.table_id)?;
        table.update_tuple(self, tid, tuple)
    }

    /// Ends `tid`: on commit writes every page it dirtied to disk, on abort
    /// drops those pages from the cache. Releases all of its locks either way.
    ///
    /// If a commit write fails, the pages not yet written are discarded and
    /// the error is returned; locks are still released.
    pub fn transaction_complete(&self, tid: TransactionId, commit: bool) -> Result<()> {
        let result = if commit { self.flush_pages(tid) } else { Ok(()) };

        match &result {
            Ok(()) if commit => info!(%tid, "transaction committed"),
            Ok(()) => {
                self.discard_pages(tid);
                info!(%tid, "transaction aborted");
            }
            Err(e) => {
                self.discard_pages(tid);
                warn!(%tid, error = %e, "commit failed, discarded unwritten pages");
            }
        }

        self.lock_manager.release_all(tid);
        result
    }

    /// Releases `tid`'s lock on `page_id` before the transaction ends.
    ///
    /// Breaks two-phase locking; only safe for a page the transaction read
    /// but whose contents did not influence anything it wrote.
    pub fn unsafe_release_page(&self, tid: TransactionId, page_id: PageId) {
        trace!(%tid, %page_id, "early page lock release");
        self.lock_manager.release(tid, page_id);
    }

    /// Returns true if `tid` holds any lock on `page_id`.
    pub fn holds_lock(&self, tid: TransactionId, page_id: PageId) -> bool {
        self.lock_manager.holds_any(tid, page_id)
    }

    /// Writes `page_id` to disk if it is cached and dirty, and marks it clean.
    /// Returns false if the page is not cached.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        let frame = self.state.frames.lock().get(&page_id).cloned();
        match frame {
            Some(frame) => {
                self.write_back(&frame)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Writes every page dirtied by `tid` to disk.
    pub fn flush_pages(&self, tid: TransactionId) -> Result<()> {
        for frame in self.frames_dirtied_by(tid) {
            self.write_back(&frame)?;
        }
        Ok(())
    }

    /// Writes every dirty cached page to disk.
    ///
    /// This writes uncommitted changes of running transactions too, so it
    /// breaks NO-STEAL; use it only when no transaction is active.
    pub fn flush_all_pages(&self) -> Result<()> {
        let frames: Vec<_> = self.state.frames.lock().values().cloned().collect();
        for frame in frames.iter().filter(|f| f.is_dirty()) {
            self.write_back(frame)?;
        }
        Ok(())
    }

    /// Drops `page_id` from the cache without writing it.
    pub fn discard_page(&self, page_id: PageId) {
        let mut frames = self.state.frames.lock();
        if let Some(frame) = frames.remove(&page_id) {
            self.state.replacer.remove(page_id);
            if frame.pin_count() > 0 {
                warn!(%page_id, pins = frame.pin_count(), "discarded a pinned page");
            }
            debug!(%page_id, "discarded page");
        }
    }

    /// Drops every page dirtied by `tid` from the cache.
    pub fn discard_pages(&self, tid: TransactionId) {
        for frame in self.frames_dirtied_by(tid) {
            self.discard_page(frame.page_id());
        }
    }

    /// Returns the number of cached pages.
    pub fn len(&self) -> usize {
        self.state.frames.lock().len()
    }

    /// Returns true if no page is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the maximum number of cached pages.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns true if `page_id` is cached.
    pub fn contains(&self, page_id: PageId) -> bool {
        self.state.frames.lock().contains_key(&page_id)
    }

    /// Returns the pin count of a cached page.
    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        self.state.frames.lock().get(&page_id).map(|f| f.pin_count())
    }

    /// Returns the transaction whose uncommitted changes a cached page holds.
    pub fn dirtied_by(&self, page_id: PageId) -> Option<TransactionId> {
        self.state.frames.lock().get(&page_id).and_then(|f| f.dirtied_by())
    }

    pub fn lock_manager(&self) -> &Arc<LockManager> {
        &self.lock_manager
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Locks, then pins, the frame for `page_id`, reading it from its heap
    /// file on a miss.
    fn fetch_frame(&self, tid: TransactionId, page_id: PageId, mode: LockMode) -> Result<Arc<Frame>> {
        // Never wait for a page lock while holding the pool mutex
        self.lock_manager.acquire(tid, page_id, mode)?;

        let mut frames = self.state.frames.lock();
        if let Some(frame) = frames.get(&page_id) {
            frame.pin();
            self.state.replacer.record_access(page_id);
            self.state.replacer.set_evictable(page_id, false);
            return Ok(Arc::clone(frame));
        }

        if frames.len() >= self.capacity {
            let victim = self
                .state
                .replacer
                .evict()
                .ok_or(DbError::NoEvictablePage { capacity: self.capacity })?;
            frames.remove(&victim);
            debug!(%victim, %page_id, "evicted clean page");
        }

        let page = self.catalog.table(page_id.table_id)?.read_page(page_id)?;
        let frame = Arc::new(Frame::new(page));
        frame.pin();
        frames.insert(page_id, Arc::clone(&frame));
        self.state.replacer.record_access(page_id);
        trace!(%page_id, %tid, "cached page");

        Ok(frame)
    }

    /// Unpins a frame whose latch was not granted in time.
    fn latch_timed_out(&self, tid: TransactionId, frame: &Arc<Frame>) -> DbError {
        debug!(%tid, page_id = %frame.page_id(), "page latch wait timed out, aborting");
        (self.release_callback())(frame, None);
        DbError::TransactionAborted(tid)
    }

    fn release_callback(&self) -> ReleaseCallback {
        let state = Arc::clone(&self.state);
        Box::new(move |frame: &Arc<Frame>, dirtied_by: Option<TransactionId>| {
            let frames = state.frames.lock();
            if let Some(tid) = dirtied_by {
                frame.set_dirtied_by(Some(tid));
            }

            let unpinned = frame.unpin() == Some(0);
            // The frame may have been discarded while the guard was alive
            let cached = frames
                .get(&frame.page_id())
                .is_some_and(|cached| Arc::ptr_eq(cached, frame));
            if unpinned && cached && !frame.is_dirty() {
                state.replacer.set_evictable(frame.page_id(), true);
            }
        })
    }

    /// Writes the frame's page to its heap file and marks it clean.
    fn write_back(&self, frame: &Arc<Frame>) -> Result<()> {
        let page_id = frame.page_id();
        let table = self.catalog.table(page_id.table_id)?;
        {
            let mut page = frame.write();
            if !page.is_dirty() && !frame.is_dirty() {
                return Ok(());
            }
            table.write_page(&page)?;
            page.mark_dirty(None);
        }

        let frames = self.state.frames.lock();
        frame.set_dirtied_by(None);
        let cached = frames.get(&page_id).is_some_and(|cached| Arc::ptr_eq(cached, frame));
        if cached && frame.pin_count() == 0 {
            self.state.replacer.set_evictable(page_id, true);
        }
        debug!(%page_id, "flushed page");
        Ok(())
    }

    fn frames_dirtied_by(&self, tid: TransactionId) -> Vec<Arc<Frame>> {
        self.state
            .frames
            .lock()
            .values()
            .filter(|frame| frame.dirtied_by() == Some(tid))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::LockTimeout;
    use crate::tuple::{DataType, Schema, TupleBuilder};
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        pool: BufferPool,
        table_id: TableId,
        schema: Arc<Schema>,
    }

    fn fixture(capacity: usize) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Arc::new(Catalog::new(64));
        let schema = Schema::builder().column("id", DataType::Integer).build_arc();
        let table = catalog.add_table(dir.path().join("t.dat"), schema.clone()).unwrap();
        for _ in 0..4 {
            table.allocate_page().unwrap();
        }
        let lock_manager = Arc::new(LockManager::new(LockTimeout::new(
            Duration::from_millis(20),
            Duration::from_millis(40),
        )));
        Fixture {
            _dir: dir,
            pool: BufferPool::new(capacity, 2, catalog, lock_manager),
            table_id: table.table_id(),
            schema,
        }
    }

    impl Fixture {
        fn pid(&self, n: u32) -> PageId {
            PageId::new(self.table_id, n)
        }

        fn row(&self, id: i32) -> Tuple {
            TupleBuilder::new(self.schema.clone()).value(id).build()
        }
    }

    #[test]
    fn test_fetch_pins_and_locks() {
        let f = fixture(4);
        let tid = TransactionId::next();

        let guard = f.pool.fetch_read(tid, f.pid(0)).unwrap();
        assert_eq!(f.pool.pin_count(f.pid(0)), Some(1));
        assert!(f.pool.lock_manager().holds_read(tid, f.pid(0)));
        drop(guard);
        assert_eq!(f.pool.pin_count(f.pid(0)), Some(0));
        // Locks outlive guards
        assert!(f.pool.holds_lock(tid, f.pid(0)));
    }

    #[test]
    fn test_clean_pages_are_evicted() {
        let f = fixture(2);
        let tid = TransactionId::next();

        for n in 0..4 {
            drop(f.pool.fetch_read(tid, f.pid(n)).unwrap());
            assert!(f.pool.len() <= 2);
        }
        assert!(f.pool.contains(f.pid(3)));
    }

    #[test]
    fn test_pinned_page_is_not_evicted() {
        let f = fixture(1);
        let tid = TransactionId::next();

        let _held = f.pool.fetch_read(tid, f.pid(0)).unwrap();
        assert!(matches!(
            f.pool.fetch_read(tid, f.pid(1)),
            Err(DbError::NoEvictablePage { capacity: 1 })
        ));
    }

    #[test]
    fn test_write_guard_marks_dirtier() {
        let f = fixture(4);
        let tid = TransactionId::next();

        let mut tuple = f.row(1);
        let pages = f.pool.insert_tuple(tid, f.table_id, &mut tuple).unwrap();
        assert_eq!(pages, vec![f.pid(0)]);
        assert_eq!(f.pool.dirtied_by(f.pid(0)), Some(tid));

        f.pool.transaction_complete(tid, true).unwrap();
        assert_eq!(f.pool.dirtied_by(f.pid(0)), None);
        assert!(!f.pool.holds_lock(tid, f.pid(0)));
    }

    #[test]
    fn test_abort_discards_dirty_pages() {
        let f = fixture(4);
        let tid = TransactionId::next();

        let mut tuple = f.row(1);
        f.pool.insert_tuple(tid, f.table_id, &mut tuple).unwrap();
        f.pool.transaction_complete(tid, false).unwrap();
        assert!(!f.pool.contains(f.pid(0)));

        let reader = TransactionId::next();
        let guard = f.pool.fetch_read(reader, f.pid(0)).unwrap();
        assert_eq!(guard.iter().count(), 0);
    }

    #[test]
    fn test_guard_kept_past_commit_aborts_next_writer() {
        let f = fixture(4);
        let stale = TransactionId::next();
        let guard = f.pool.fetch_read(stale, f.pid(0)).unwrap();
        f.pool.transaction_complete(stale, true).unwrap();

        let writer = TransactionId::next();
        let start = std::time::Instant::now();
        let result = f.pool.fetch_write(writer, f.pid(0));
        assert!(matches!(result, Err(DbError::TransactionAborted(t)) if t == writer));
        assert!(start.elapsed() < Duration::from_secs(1));
        // The failed fetch left no pin behind
        assert_eq!(f.pool.pin_count(f.pid(0)), Some(1));

        drop(guard);
        f.pool.transaction_complete(writer, false).unwrap();
        let retry = TransactionId::next();
        assert!(f.pool.fetch_write(retry, f.pid(0)).is_ok());
    }

    #[test]
    fn test_flush_page_not_cached() {
        let f = fixture(4);
        assert!(!f.pool.flush_page(f.pid(0)).unwrap());
    }
}
