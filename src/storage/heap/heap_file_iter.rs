use std::collections::VecDeque;

use crate::buffer::BufferPool;
use crate::common::{PageId, Result, TransactionId};
use crate::tuple::Tuple;

use super::HeapFile;

/// Iterator over every tuple of a [`HeapFile`], page by page.
///
/// Each page is fetched through the buffer pool with read-only permission,
/// its tuples are copied out, and the page guard is dropped before any tuple
/// is yielded. The shared lock stays held by the transaction.
///
/// A closed iterator yields nothing. `rewind` starts over from page 0. The
/// first error is yielded once and closes the iterator.
pub struct HeapFileIter<'a> {
    file: &'a HeapFile,
    pool: &'a BufferPool,
    tid: TransactionId,
    next_page: u32,
    buffered: VecDeque<Tuple>,
    open: bool,
}

impl<'a> HeapFileIter<'a> {
    pub(crate) fn new(file: &'a HeapFile, pool: &'a BufferPool, tid: TransactionId) -> Self {
        Self {
            file,
            pool,
            tid,
            next_page: 0,
            buffered: VecDeque::new(),
            open: false,
        }
    }

    /// Opens the iterator, positioned before the first tuple.
    pub fn open(&mut self) {
        self.next_page = 0;
        self.buffered.clear();
        self.open = true;
    }

    /// Closes the iterator. Locks taken so far are kept until the
    /// transaction completes.
    pub fn close(&mut self) {
        self.buffered.clear();
        self.open = false;
    }

    /// Restarts the scan at page 0.
    pub fn rewind(&mut self) {
        self.close();
        self.open();
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    fn load_next_page(&mut self) -> Result<bool> {
        if self.next_page >= self.file.num_pages()? {
            return Ok(false);
        }

        let page_id = PageId::new(self.file.table_id(), self.next_page);
        let guard = self.pool.fetch_read(self.tid, page_id)?;
        self.buffered.extend(guard.page().iter().cloned());
        self.next_page += 1;
        Ok(true)
    }
}

impl Iterator for HeapFileIter<'_> {
    type Item = Result<Tuple>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.open {
            return None;
        }

        loop {
            if let Some(tuple) = self.buffered.pop_front() {
                return Some(Ok(tuple));
            }

            match self.load_next_page() {
                Ok(true) => continue,
                Ok(false) => return None,
                Err(e) => {
                    self.close();
                    return Some(Err(e));
                }
            }
        }
    }
}
