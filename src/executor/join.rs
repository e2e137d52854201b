//! Nested loop join.
//!
//! For each tuple of the left child the right child is scanned from the start,
//! and every pair satisfying the join predicate is emitted as one tuple holding
//! the left fields followed by the right fields.

use crate::access::{Tuple, TupleDesc, Value};
use crate::error::{DbError, Result};
use crate::executor::{CompareOp, OpIterator, OpState};
use std::fmt;
use std::sync::Arc;

/// `left.field1 <op> right.field2` over a pair of tuples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinPredicate {
    pub field1: usize,
    pub op: CompareOp,
    pub field2: usize,
}

impl JoinPredicate {
    pub fn new(field1: usize, op: CompareOp, field2: usize) -> Self {
        Self { field1, op, field2 }
    }

    /// Values of different types never match.
    pub fn matches(&self, left: &Tuple, right: &Tuple) -> Result<bool> {
        let ordering = left.value(self.field1)?.compare(right.value(self.field2)?);
        Ok(ordering.is_some_and(|ordering| self.op.holds(ordering)))
    }
}

impl fmt::Display for JoinPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "l.f{} {} r.f{}", self.field1, self.op, self.field2)
    }
}

pub struct Join {
    predicate: JoinPredicate,
    left: Box<dyn OpIterator>,
    right: Box<dyn OpIterator>,
    desc: Arc<TupleDesc>,
    current_left: Option<Tuple>,
    pending: Option<Tuple>,
    state: OpState,
}

impl Join {
    pub fn new(predicate: JoinPredicate, left: Box<dyn OpIterator>, right: Box<dyn OpIterator>) -> Self {
        let desc = Arc::new(TupleDesc::merge(left.tuple_desc(), right.tuple_desc()));
        Self {
            predicate,
            left,
            right,
            desc,
            current_left: None,
            pending: None,
            state: OpState::Closed,
        }
    }

    pub fn predicate(&self) -> &JoinPredicate {
        &self.predicate
    }

    /// Output name of the left join field.
    pub fn join_field1_name(&self) -> Option<&str> {
        self.left.tuple_desc().field_name(self.predicate.field1).ok().flatten()
    }

    /// Output name of the right join field.
    pub fn join_field2_name(&self) -> Option<&str> {
        self.right.tuple_desc().field_name(self.predicate.field2).ok().flatten()
    }

    fn combine(&self, left: &Tuple, right: &Tuple) -> Result<Tuple> {
        let values: Vec<Value> = left.values().iter().chain(right.values()).cloned().collect();
        Tuple::new(Arc::clone(&self.desc), values)
    }

    /// Walks the remaining pairs until one matches.
    fn advance(&mut self) -> Result<()> {
        while self.pending.is_none() {
            let left = match self.current_left.take() {
                Some(left) => left,
                None if self.left.has_next()? => self.left.next()?,
                None => return Ok(()),
            };

            while self.right.has_next()? {
                let right = self.right.next()?;
                if self.predicate.matches(&left, &right)? {
                    self.pending = Some(self.combine(&left, &right)?);
                    break;
                }
            }

            if self.pending.is_some() {
                self.current_left = Some(left);
            } else {
                self.right.rewind()?;
            }
        }
        Ok(())
    }
}

impl OpIterator for Join {
    fn open(&mut self) -> Result<()> {
        self.left.open()?;
        self.right.open()?;
        self.current_left = None;
        self.pending = None;
        self.state = OpState::Open;
        Ok(())
    }

    fn has_next(&mut self) -> Result<bool> {
        self.state.ensure_open()?;
        self.advance()?;
        Ok(self.pending.is_some())
    }

    fn next(&mut self) -> Result<Tuple> {
        self.state.ensure_open()?;
        self.advance()?;
        self.pending.take().ok_or(DbError::NoSuchElement)
    }

    fn rewind(&mut self) -> Result<()> {
        self.state.ensure_open()?;
        self.left.rewind()?;
        self.right.rewind()?;
        self.current_left = None;
        self.pending = None;
        Ok(())
    }

    fn close(&mut self) {
        self.left.close();
        self.right.close();
        self.current_left = None;
        self.pending = None;
        self.state = OpState::Closed;
    }

    fn tuple_desc(&self) -> &TupleDesc {
        &self.desc
    }
}
