use thiserror::Error;

use super::types::{PageId, RecordId, TableId, TransactionId};

/// Database error types
#[derive(Error, Debug)]
pub enum DbError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid page {page_id}: {reason}")]
    InvalidPage { page_id: PageId, reason: String },

    #[error("Page {page_id} is corrupted: {reason}")]
    Corrupted { page_id: PageId, reason: String },

    #[error("Transaction {0} aborted while waiting for a lock")]
    TransactionAborted(TransactionId),

    #[error("Page {0} has no free slot")]
    PageFull(PageId),

    #[error("Tuple schema does not match the schema of table {0}")]
    SchemaMismatch(TableId),

    #[error("Tuple {record_id} is not stored on page {page_id}")]
    TupleNotOnPage { page_id: PageId, record_id: RecordId },

    #[error("Tuple has no record id")]
    MissingRecordId,

    #[error("Buffer pool of {capacity} pages has no evictable page")]
    NoEvictablePage { capacity: usize },

    #[error("Table {0} not found")]
    TableNotFound(TableId),

    #[error("{page_size}-byte pages of {tuple_size}-byte tuples hold {slots} slots, expected 1 to 65536")]
    UnsupportedPageLayout {
        page_size: usize,
        tuple_size: usize,
        slots: usize,
    },
}

impl DbError {
    /// Returns true for failures of the backing store: I/O errors, out-of-range
    /// or truncated pages, and undecodable page bytes.
    pub fn is_storage_error(&self) -> bool {
        matches!(
            self,
            DbError::Io(_) | DbError::InvalidPage { .. } | DbError::Corrupted { .. }
        )
    }

    /// Returns true when the whole transaction may be retried from scratch.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DbError::TransactionAborted(_))
    }

    pub(crate) fn invalid_page(page_id: PageId, reason: impl Into<String>) -> Self {
        DbError::InvalidPage {
            page_id,
            reason: reason.into(),
        }
    }

    pub(crate) fn corrupted(page_id: PageId, reason: impl Into<String>) -> Self {
        DbError::Corrupted {
            page_id,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let pid = PageId::new(TableId::new(1), 0);
        assert!(DbError::invalid_page(pid, "out of range").is_storage_error());
        assert!(DbError::from(std::io::Error::other("disk gone")).is_storage_error());
        assert!(!DbError::PageFull(pid).is_storage_error());

        let tid = TransactionId::next();
        assert!(DbError::TransactionAborted(tid).is_retryable());
        assert!(!DbError::NoEvictablePage { capacity: 1 }.is_retryable());
    }
}
