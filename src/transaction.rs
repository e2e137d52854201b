//! Transaction identity and lifecycle.
//!
//! - `TransactionId` / `TransactionIdGenerator`: unique, monotonically
//!   increasing identifiers that own locks and dirty pages
//! - `TransactionState`: Active, Committed or Aborted
//! - `Transaction`: a handle that ends its transaction through the buffer
//!   pool and aborts it if dropped unfinished

pub mod handle;
pub mod id;
pub mod state;

pub use handle::Transaction;
pub use id::{TransactionId, TransactionIdGenerator};
pub use state::TransactionState;
