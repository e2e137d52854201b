//! Pull-based operators over the storage core.
//!
//! Every operator implements [`OpIterator`]: `open` it, then alternate
//! `has_next` and `next` until exhausted, `rewind` to start over, and `close`
//! when done. Using an operator that is not open fails with `IllegalState`.
//! Operators read and write tables only through the buffer pool, so every page
//! they touch is locked for their transaction.

use crate::access::{Tuple, TupleDesc};
use crate::error::{DbError, Result};

pub mod aggregate;
pub mod delete;
pub mod filter;
pub mod insert;
pub mod join;
pub mod seq_scan;

pub use aggregate::{Aggregate, AggregateOp, Aggregator};
pub use delete::Delete;
pub use filter::{CompareOp, Filter, Predicate};
pub use insert::Insert;
pub use join::{Join, JoinPredicate};
pub use seq_scan::SeqScan;

/// Trait for all operators.
pub trait OpIterator: Send {
    /// Prepares the operator (and its children) to produce tuples.
    fn open(&mut self) -> Result<()>;

    /// True if `next` will return a tuple.
    fn has_next(&mut self) -> Result<bool>;

    /// Returns the next tuple, or `NoSuchElement` when exhausted.
    fn next(&mut self) -> Result<Tuple>;

    /// Restarts the operator from its first tuple.
    fn rewind(&mut self) -> Result<()>;

    fn close(&mut self);

    /// Shape of the tuples this operator produces.
    fn tuple_desc(&self) -> &TupleDesc;
}

/// Open/closed guard shared by the operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OpState {
    #[default]
    Closed,
    Open,
}

impl OpState {
    pub fn ensure_open(&self) -> Result<()> {
        match self {
            OpState::Open => Ok(()),
            OpState::Closed => Err(DbError::IllegalState("operator is not open")),
        }
    }
}

/// Runs an open operator to exhaustion.
pub fn drain(op: &mut dyn OpIterator) -> Result<Vec<Tuple>> {
    let mut tuples = Vec::new();
    while op.has_next()? {
        tuples.push(op.next()?);
    }
    Ok(tuples)
}
