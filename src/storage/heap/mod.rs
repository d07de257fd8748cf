mod heap_file;
mod heap_file_iter;

pub use heap_file::*;
pub use heap_file_iter::*;
