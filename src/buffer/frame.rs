use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{
    ArcRwLockReadGuard, ArcRwLockWriteGuard, RawRwLock, RwLock, RwLockReadGuard, RwLockWriteGuard,
};

use crate::common::{PageId, TransactionId};
use crate::storage::page::HeapPage;

/// A cached page together with its buffer pool bookkeeping.
pub struct Frame {
    /// The page ID cached in this frame
    page_id: PageId,
    /// Number of live page guards on this frame
    pin_count: AtomicU32,
    /// Raw id of the transaction whose changes are not yet on disk; 0 when clean
    dirtied_by: AtomicU64,
    /// The decoded page
    page: Arc<RwLock<HeapPage>>,
}

impl Frame {
    /// Wraps a page freshly read from disk. The frame starts unpinned and clean.
    pub fn new(page: HeapPage) -> Self {
        Self {
            page_id: page.page_id(),
            pin_count: AtomicU32::new(0),
            dirtied_by: AtomicU64::new(0),
            page: Arc::new(RwLock::new(page)),
        }
    }

    /// Returns the page ID cached in this frame.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Returns the current pin count.
    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Acquire)
    }

    /// Increments the pin count and returns the new value.
    pub fn pin(&self) -> u32 {
        self.pin_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Decrements the pin count and returns the new value.
    /// Returns None if the pin count was already 0.
    pub fn unpin(&self) -> Option<u32> {
        self.pin_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| current.checked_sub(1))
            .ok()
            .map(|previous| previous - 1)
    }

    /// Returns whether the cached page holds changes not yet written to disk.
    pub fn is_dirty(&self) -> bool {
        self.dirtied_by.load(Ordering::Acquire) != 0
    }

    /// Returns the transaction whose changes the cached page holds, if any.
    pub fn dirtied_by(&self) -> Option<TransactionId> {
        TransactionId::from_raw(self.dirtied_by.load(Ordering::Acquire))
    }

    /// Records `tid` as the page's dirtier, or marks the frame clean on `None`.
    pub fn set_dirtied_by(&self, tid: Option<TransactionId>) {
        let raw = tid.map_or(0, |t| t.as_u64());
        self.dirtied_by.store(raw, Ordering::Release);
    }

    /// Locks the page for reading.
    pub fn read(&self) -> RwLockReadGuard<'_, HeapPage> {
        self.page.read()
    }

    /// Locks the page for writing.
    pub fn write(&self) -> RwLockWriteGuard<'_, HeapPage> {
        self.page.write()
    }

    /// Latches the page for a read guard, giving up at `deadline`.
    pub(crate) fn read_owned_until(&self, deadline: Instant) -> Option<ArcRwLockReadGuard<RawRwLock, HeapPage>> {
        self.page.try_read_arc_until(deadline)
    }

    /// Latches the page for a write guard, giving up at `deadline`.
    pub(crate) fn write_owned_until(&self, deadline: Instant) -> Option<ArcRwLockWriteGuard<RawRwLock, HeapPage>> {
        self.page.try_write_arc_until(deadline)
    }
}
