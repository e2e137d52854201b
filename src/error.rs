//! Error types shared by every layer of the storage core.

use crate::storage::page::PageId;
use crate::transaction::TransactionId;
use thiserror::Error;

/// Errors that can occur while accessing tables, pages and locks.
///
/// All variants are recoverable at the transaction boundary: the caller is
/// expected to abort the transaction and retry, not to terminate.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Tuple is not a member of this table: {0}")]
    NotMember(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transaction {0} aborted: deadlock detected")]
    Deadlock(TransactionId),

    #[error("Buffer pool is full: none of the {capacity} cached pages can be evicted")]
    BufferPoolFull { capacity: usize },

    #[error("Tuple schema mismatch: expected {expected}, got {found}")]
    TupleSchemaMismatch { expected: String, found: String },

    #[error("Page is full: {0}")]
    PageFull(PageId),

    #[error("Page {0} was not fetched with write permission")]
    ReadOnlyPage(PageId),

    #[error("Illegal iterator state: {0}")]
    IllegalState(&'static str),

    #[error("No more tuples")]
    NoSuchElement,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

impl DbError {
    /// True for errors after which the transaction must be rolled back.
    pub fn is_abort(&self) -> bool {
        matches!(self, DbError::Deadlock(_))
    }
}

/// Result type for storage core operations.
pub type Result<T> = std::result::Result<T, DbError>;
