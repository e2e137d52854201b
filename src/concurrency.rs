//! Concurrency control.
//!
//! Page-level shared/exclusive locks held until transaction end, with lock
//! upgrade and waits-for deadlock detection.

pub mod lock;

pub use lock::{LockManager, LockMode};
