pub mod access;
pub mod catalog;
pub mod concurrency;
pub mod database;
pub mod error;
pub mod executor;
pub mod storage;
pub mod transaction;

pub use database::{Database, DatabaseConfig};
pub use error::{DbError, Result};
