use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use parking_lot::{ArcRwLockReadGuard, ArcRwLockWriteGuard, RawRwLock};

use crate::common::{PageId, TransactionId};
use crate::storage::page::HeapPage;

use super::Frame;

/// Called once when a guard is dropped, with the transaction that left the
/// page dirty (if the guard modified it).
pub(crate) type ReleaseCallback = Box<dyn FnOnce(&Arc<Frame>, Option<TransactionId>) + Send + Sync>;

/// Base page guard that manages the common functionality
struct PageGuardBase {
    /// Reference to the frame (kept alive for the guard's lifetime)
    frame: Arc<Frame>,
    /// Callback to release the guard
    release_callback: Option<ReleaseCallback>,
}

impl PageGuardBase {
    fn new(frame: Arc<Frame>, release_callback: ReleaseCallback) -> Self {
        Self {
            frame,
            release_callback: Some(release_callback),
        }
    }

    fn release(&mut self, dirtied_by: Option<TransactionId>) {
        if let Some(callback) = self.release_callback.take() {
            callback(&self.frame, dirtied_by);
        }
    }
}

/// RAII guard for read-only access to a cached page.
/// Keeps the frame pinned until dropped.
pub struct ReadPageGuard {
    page: ArcRwLockReadGuard<RawRwLock, HeapPage>,
    base: PageGuardBase,
}

impl ReadPageGuard {
    pub(crate) fn new(
        frame: Arc<Frame>,
        page: ArcRwLockReadGuard<RawRwLock, HeapPage>,
        release_callback: ReleaseCallback,
    ) -> Self {
        Self {
            page,
            base: PageGuardBase::new(frame, release_callback),
        }
    }

    /// Returns the page ID.
    pub fn page_id(&self) -> PageId {
        self.base.frame.page_id()
    }

    /// Returns the cached page.
    pub fn page(&self) -> &HeapPage {
        &self.page
    }
}

impl Deref for ReadPageGuard {
    type Target = HeapPage;

    fn deref(&self) -> &Self::Target {
        self.page()
    }
}

impl Drop for ReadPageGuard {
    fn drop(&mut self) {
        self.base.release(None);
    }
}

/// RAII guard for read-write access to a cached page.
///
/// If the page is dirty when the guard drops, the guard's transaction is
/// recorded as its dirtier, which keeps the frame out of eviction until the
/// transaction completes.
pub struct WritePageGuard {
    page: ArcRwLockWriteGuard<RawRwLock, HeapPage>,
    tid: TransactionId,
    base: PageGuardBase,
}

impl WritePageGuard {
    pub(crate) fn new(
        frame: Arc<Frame>,
        page: ArcRwLockWriteGuard<RawRwLock, HeapPage>,
        tid: TransactionId,
        release_callback: ReleaseCallback,
    ) -> Self {
        Self {
            page,
            tid,
            base: PageGuardBase::new(frame, release_callback),
        }
    }

    /// Returns the page ID.
    pub fn page_id(&self) -> PageId {
        self.base.frame.page_id()
    }

    /// Returns the transaction the page was fetched for.
    pub fn transaction_id(&self) -> TransactionId {
        self.tid
    }

    /// Returns the cached page.
    pub fn page(&self) -> &HeapPage {
        &self.page
    }

    /// Returns the cached page for modification.
    pub fn page_mut(&mut self) -> &mut HeapPage {
        &mut self.page
    }
}

impl Deref for WritePageGuard {
    type Target = HeapPage;

    fn deref(&self) -> &Self::Target {
        self.page()
    }
}

impl DerefMut for WritePageGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.page_mut()
    }
}

impl Drop for WritePageGuard {
    fn drop(&mut self) {
        if self.page.is_dirty() {
            self.page.mark_dirty(Some(self.tid));
        }
        let dirtied_by = self.page.dirtied_by();
        self.base.release(dirtied_by);
    }
}

/// A page fetched with either permission, as returned by
/// [`BufferPool::get_page`](super::BufferPool::get_page).
pub enum PageGuard {
    Read(ReadPageGuard),
    Write(WritePageGuard),
}

impl PageGuard {
    pub fn page_id(&self) -> PageId {
        match self {
            PageGuard::Read(guard) => guard.page_id(),
            PageGuard::Write(guard) => guard.page_id(),
        }
    }

    pub fn page(&self) -> &HeapPage {
        match self {
            PageGuard::Read(guard) => guard.page(),
            PageGuard::Write(guard) => guard.page(),
        }
    }

    /// Returns the page for modification, or None if it was fetched read-only.
    pub fn page_mut(&mut self) -> Option<&mut HeapPage> {
        match self {
            PageGuard::Read(_) => None,
            PageGuard::Write(guard) => Some(guard.page_mut()),
        }
    }

    pub fn into_write(self) -> Option<WritePageGuard> {
        match self {
            PageGuard::Read(_) => None,
            PageGuard::Write(guard) => Some(guard),
        }
    }
}

impl Deref for PageGuard {
    type Target = HeapPage;

    fn deref(&self) -> &Self::Target {
        self.page()
    }
}
