//! Storage layer.
//!
//! - **PageManager**: raw fixed-size page I/O on one file
//! - **HeapPage**: slot bitmap plus fixed-width tuple slots
//! - **HeapFile**: one table as a sequence of heap pages, addressed by `PageId`
//! - **BufferPool**: bounded, lock-aware cache of heap pages with LRU eviction
//!
//! Operators never touch heap files directly for page access; every page read
//! or write goes through the buffer pool so that it is locked for the
//! requesting transaction.

pub mod buffer;
pub mod disk;
pub mod heap_file;
pub mod page;

pub use buffer::{BufferPool, BufferPoolConfig, EvictionPolicy, PageGuard};
pub use disk::{PageManager, DEFAULT_PAGE_SIZE};
pub use heap_file::{HeapFile, HeapFileIterator};
pub use page::{HeapPage, PageId, Permissions};
