mod buffer_pool;
mod frame;
mod lru_k_replacer;
mod page_guard;

pub use buffer_pool::*;
pub use frame::*;
pub use lru_k_replacer::*;
pub use page_guard::{PageGuard, ReadPageGuard, WritePageGuard};
