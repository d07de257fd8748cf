use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::buffer::BufferPool;
use crate::common::{DbError, PageId, RecordId, Result, TableId, TransactionId};
use crate::storage::page::HeapPage;
use crate::tuple::{Schema, Tuple};

use super::HeapFileIter;

/// HeapFile stores the tuples of one table as an unordered sequence of
/// fixed-size [`HeapPage`]s in a single file. Page `n` lives at byte offset
/// `n * page_size`.
///
/// `read_page` and `write_page` go straight to the file. Tuple-level
/// operations and scans go through a [`BufferPool`] so they are covered by
/// page locks.
pub struct HeapFile {
    table_id: TableId,
    schema: Arc<Schema>,
    page_size: usize,
    /// The backing file
    file: Mutex<File>,
    path: PathBuf,
    /// Number of page reads performed
    num_reads: AtomicU32,
    /// Number of page writes performed
    num_writes: AtomicU32,
}

impl HeapFile {
    /// Opens the heap file at `path`, creating an empty one if it doesn't exist.
    ///
    /// Fails with [`DbError::UnsupportedPageLayout`] if a page of `page_size`
    /// bytes holds no tuple of `schema`, or more than [`HeapPage::MAX_SLOTS`].
    pub fn open<P: AsRef<Path>>(
        path: P,
        table_id: TableId,
        schema: Arc<Schema>,
        page_size: usize,
    ) -> Result<Self> {
        HeapPage::check_layout(page_size, schema.tuple_size())?;
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        debug!(%table_id, path = %path.display(), page_size, "opened heap file");

        Ok(Self {
            table_id,
            schema,
            page_size,
            file: Mutex::new(file),
            path,
            num_reads: AtomicU32::new(0),
            num_writes: AtomicU32::new(0),
        })
    }

    /// Reads and decodes one page straight from the file.
    ///
    /// Fails with [`DbError::InvalidPage`] if the page belongs to another
    /// table, lies past the end of the file, or cannot be read in full.
    pub fn read_page(&self, page_id: PageId) -> Result<HeapPage> {
        if page_id.table_id != self.table_id {
            return Err(DbError::invalid_page(page_id, format!("not a page of {}", self.table_id)));
        }

        let mut data = vec![0u8; self.page_size];
        {
            let mut file = self.file.lock();
            let num_pages = self.page_count(&file)?;
            if page_id.page_number >= num_pages {
                return Err(DbError::invalid_page(
                    page_id,
                    format!("out of range, file has {} pages", num_pages),
                ));
            }

            file.seek(SeekFrom::Start(page_id.offset(self.page_size)))?;
            match file.read_exact(&mut data) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                    return Err(DbError::invalid_page(page_id, "truncated page"));
                }
                Err(e) => return Err(e.into()),
            }
        }

        self.num_reads.fetch_add(1, Ordering::Relaxed);
        trace!(%page_id, "read page");
        HeapPage::new(page_id, Arc::clone(&self.schema), &data)
    }

    /// Overwrites the page's region of the file with its encoded bytes.
    ///
    /// The page number may be at most the current page count; writing at the
    /// page count appends.
    pub fn write_page(&self, page: &HeapPage) -> Result<()> {
        let page_id = page.page_id();
        if page_id.table_id != self.table_id {
            return Err(DbError::invalid_page(page_id, format!("not a page of {}", self.table_id)));
        }

        let data = page.to_bytes();
        if data.len() != self.page_size {
            return Err(DbError::invalid_page(
                page_id,
                format!("encoded to {} bytes, expected {}", data.len(), self.page_size),
            ));
        }

        let mut file = self.file.lock();
        let num_pages = self.page_count(&file)?;
        if page_id.page_number > num_pages {
            return Err(DbError::invalid_page(
                page_id,
                format!("beyond end of file with {} pages", num_pages),
            ));
        }

        file.seek(SeekFrom::Start(page_id.offset(self.page_size)))?;
        file.write_all(&data)?;
        file.flush()?;

        self.num_writes.fetch_add(1, Ordering::Relaxed);
        trace!(%page_id, "wrote page");
        Ok(())
    }

    /// Returns `file length / page size`, rounded down.
    pub fn num_pages(&self) -> Result<u32> {
        let file = self.file.lock();
        self.page_count(&file)
    }

    /// Appends a zeroed page to the file and returns its id.
    pub fn allocate_page(&self) -> Result<PageId> {
        let mut file = self.file.lock();
        let page_id = PageId::new(self.table_id, self.page_count(&file)?);

        file.seek(SeekFrom::Start(page_id.offset(self.page_size)))?;
        file.write_all(&HeapPage::create_empty_page_data(self.page_size))?;
        file.flush()?;

        self.num_writes.fetch_add(1, Ordering::Relaxed);
        debug!(%page_id, "appended empty page");
        Ok(page_id)
    }

    /// Inserts `tuple` into the first page with a free slot, appending a new
    /// page if every page is full. Sets the tuple's record id and returns the
    /// pages modified (always exactly one).
    ///
    /// Each page is fetched through `pool` with write permission. Full pages
    /// whose lock was taken only to look for room are released right away.
    ///
    /// A tuple that does not follow the table's schema is rejected up front
    /// with [`DbError::SchemaMismatch`], not [`DbError::PageFull`]; no amount
    /// of free space would let it in, so it never reaches the page scan.
    pub fn insert_tuple(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        tuple: &mut Tuple,
    ) -> Result<Vec<PageId>> {
        if !tuple.conforms_to(&self.schema) {
            return Err(DbError::SchemaMismatch(self.table_id));
        }

        let mut next = 0;
        loop {
            let num_pages = self.num_pages()?;
            for page_number in next..num_pages {
                let page_id = PageId::new(self.table_id, page_number);
                let already_locked = pool.holds_lock(tid, page_id);

                let mut guard = pool.fetch_write(tid, page_id)?;
                if guard.page().num_empty_slots() == 0 {
                    drop(guard);
                    if !already_locked {
                        pool.unsafe_release_page(tid, page_id);
                    }
                    continue;
                }

                guard.page_mut().insert_tuple(tuple)?;
                return Ok(vec![page_id]);
            }

            next = num_pages;
            self.allocate_page()?;
        }
    }

    /// Deletes `tuple` from the page its record id points at.
    pub fn delete_tuple(&self, pool: &BufferPool, tid: TransactionId, tuple: &Tuple) -> Result<Vec<PageId>> {
        let record_id = self.record_id_of(tuple)?;

        let mut guard = pool.fetch_write(tid, record_id.page_id)?;
        guard.page_mut().delete_tuple(tuple)?;
        Ok(vec![record_id.page_id])
    }

    /// Replaces the stored tuple at `tuple`'s record id with `tuple`.
    pub fn update_tuple(&self, pool: &BufferPool, tid: TransactionId, tuple: &Tuple) -> Result<Vec<PageId>> {
        let record_id = self.record_id_of(tuple)?;

        let mut guard = pool.fetch_write(tid, record_id.page_id)?;
        guard.page_mut().update_tuple(tuple)?;
        Ok(vec![record_id.page_id])
    }

    /// Returns an open iterator over every tuple in the file, in page then
    /// slot order. Pages are read through `pool` with read-only permission.
    pub fn iter<'a>(&'a self, pool: &'a BufferPool, tid: TransactionId) -> HeapFileIter<'a> {
        let mut iter = HeapFileIter::new(self, pool, tid);
        iter.open();
        iter
    }

    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the number of page reads performed.
    pub fn num_reads(&self) -> u32 {
        self.num_reads.load(Ordering::Relaxed)
    }

    /// Returns the number of page writes performed, appends included.
    pub fn num_writes(&self) -> u32 {
        self.num_writes.load(Ordering::Relaxed)
    }

    /// Flushes OS buffers for the file to disk.
    pub fn sync(&self) -> Result<()> {
        self.file.lock().sync_all()?;
        Ok(())
    }

    fn page_count(&self, file: &File) -> Result<u32> {
        let len = file.metadata()?.len();
        Ok((len / self.page_size as u64) as u32)
    }

    fn record_id_of(&self, tuple: &Tuple) -> Result<RecordId> {
        let record_id = tuple.record_id().ok_or(DbError::MissingRecordId)?;
        if record_id.page_id.table_id != self.table_id {
            return Err(DbError::TupleNotOnPage {
                page_id: record_id.page_id,
                record_id,
            });
        }
        Ok(record_id)
    }
}

impl Drop for HeapFile {
    fn drop(&mut self) {
        let _ = self.file.get_mut().sync_all();
    }
}
