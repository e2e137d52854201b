//! Filter operator.
//!
//! Passes through the child's tuples for which a predicate holds.

use crate::access::{Tuple, TupleDesc, Value};
use crate::error::{DbError, Result};
use crate::executor::{OpIterator, OpState};
use std::cmp::Ordering;
use std::fmt;

/// Comparison operators usable in a predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    /// True when `ordering` (left compared to right) satisfies the operator.
    pub fn holds(&self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::Ne => ordering != Ordering::Equal,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::Le => ordering != Ordering::Greater,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::Ge => ordering != Ordering::Less,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        };
        write!(f, "{}", s)
    }
}

/// `field <op> operand` over one tuple.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub field: usize,
    pub op: CompareOp,
    pub operand: Value,
}

impl Predicate {
    pub fn new(field: usize, op: CompareOp, operand: Value) -> Self {
        Self { field, op, operand }
    }

    /// Values of different types never match.
    pub fn matches(&self, tuple: &Tuple) -> Result<bool> {
        let value = tuple.value(self.field)?;
        Ok(value
            .compare(&self.operand)
            .is_some_and(|ordering| self.op.holds(ordering)))
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "f{} {} {}", self.field, self.op, self.operand)
    }
}

pub struct Filter {
    predicate: Predicate,
    child: Box<dyn OpIterator>,
    pending: Option<Tuple>,
    state: OpState,
}

impl Filter {
    pub fn new(predicate: Predicate, child: Box<dyn OpIterator>) -> Self {
        Self {
            predicate,
            child,
            pending: None,
            state: OpState::Closed,
        }
    }

    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    /// Pulls child tuples until one matches.
    fn advance(&mut self) -> Result<()> {
        while self.pending.is_none() && self.child.has_next()? {
            let tuple = self.child.next()?;
            if self.predicate.matches(&tuple)? {
                self.pending = Some(tuple);
            }
        }
        Ok(())
    }
}

impl OpIterator for Filter {
    fn open(&mut self) -> Result<()> {
        self.child.open()?;
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
        self.pending = None;
        self.child.rewind()
    }

    fn close(&mut self) {
        self.child.close();
        self.pending = None;
        self.state = OpState::Closed;
    }

    fn tuple_desc(&self) -> &TupleDesc {
        self.child.tuple_desc()
    }
}
