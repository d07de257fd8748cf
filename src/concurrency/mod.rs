mod lock_manager;
mod transaction;

pub use lock_manager::{LockManager, LockState};
pub use transaction::{Transaction, TransactionPage};
