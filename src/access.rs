//! Access layer for tuple-oriented operations.
//!
//! This module provides the logical record abstractions that sit on top of
//! raw heap pages:
//!
//! - **DataType / Value**: Fixed-width field types and their values
//! - **TupleDesc**: Ordered column schema; equality is by type sequence
//! - **Tuple**: Individual records with an optional `RecordId`

pub mod tuple;
pub mod tuple_desc;
pub mod value;

pub use tuple::{RecordId, Tuple};
pub use tuple_desc::{TdItem, TupleDesc};
pub use value::{DataType, Value, STRING_LEN};
