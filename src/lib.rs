//! heapdb - a single-node storage and concurrency kernel
//!
//! Tables are heap files of fixed-size slotted pages. Transactions reach
//! pages only through a bounded buffer pool that takes page-level locks and
//! keeps uncommitted changes in memory.
//!
//! # Architecture
//!
//! - **Storage** (`storage`): page layout and heap files
//!   - `HeapPage`: bitmap header plus fixed-width tuple slots
//!   - `HeapFile`: a table's pages in one file, with insert/delete and scans
//!
//! - **Concurrency** (`concurrency`): strict two-phase locking
//!   - `LockManager`: shared/exclusive page locks with randomized wait timeouts
//!   - `Transaction`: RAII handle that aborts when dropped uncompleted
//!
//! - **Buffer Pool** (`buffer`): NO-STEAL / FORCE page cache
//!   - `BufferPool`: fetches pages under locks, flushes on commit, discards on abort
//!   - `LruKReplacer`: LRU-K choice among clean, unpinned pages
//!   - `ReadPageGuard`/`WritePageGuard`: RAII guards that pin a cached page
//!
//! - **Catalog** (`catalog`): table id to heap file registry
//!
//! # Example
//!
//! ```rust,no_run
//! use heapdb::tuple::{DataType, Schema, TupleBuilder};
//! use heapdb::{Database, DbConfig};
//!
//! # fn main() -> heapdb::Result<()> {
//! let db = Database::new(DbConfig::default());
//! let schema = Schema::builder().column("id", DataType::Integer).build_arc();
//! let table = db.create_table("users.dat", schema.clone())?;
//!
//! let txn = db.begin();
//! let mut row = TupleBuilder::new(schema).value(1i32).build();
//! txn.insert_tuple(table.table_id(), &mut row)?;
//! txn.commit()?;
//!
//! let txn = db.begin();
//! for tuple in txn.scan(&table) {
//!     println!("{}", tuple?);
//! }
//! txn.commit()?;
//! # Ok(())
//! # }
//! ```

pub mod buffer;
pub mod catalog;
pub mod common;
pub mod concurrency;
mod database;
pub mod storage;
pub mod tuple;

// Re-export commonly used types at the crate root
pub use common::{
    DbConfig, DbError, LockMode, PageId, Permissions, RecordId, Result, SlotId, TableId,
    TransactionId,
};
pub use concurrency::Transaction;
pub use database::Database;
