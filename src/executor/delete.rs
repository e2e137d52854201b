//! Delete operator.

use crate::access::{DataType, Tuple, TupleDesc, Value};
use crate::error::{DbError, Result};
use crate::executor::{OpIterator, OpState};
use crate::storage::buffer::BufferPool;
use crate::transaction::TransactionId;
use std::sync::Arc;

/// Deletes every tuple its child produces (located by record id), then yields
/// a single one-field tuple holding the number of deleted rows.
pub struct Delete {
    pool: BufferPool,
    tid: TransactionId,
    child: Box<dyn OpIterator>,
    desc: Arc<TupleDesc>,
    done: bool,
    state: OpState,
}

impl Delete {
    pub fn new(pool: &BufferPool, tid: TransactionId, child: Box<dyn OpIterator>) -> Self {
        Self {
            pool: pool.clone(),
            tid,
            child,
            desc: Arc::new(TupleDesc::with_names([(DataType::Int32, "count")])),
            done: false,
            state: OpState::Closed,
        }
    }
}

impl OpIterator for Delete {
    fn open(&mut self) -> Result<()> {
        self.child.open()?;
        self.done = false;
        self.state = OpState::Open;
        Ok(())
    }

    fn has_next(&mut self) -> Result<bool> {
        self.state.ensure_open()?;
        Ok(!self.done)
    }

    fn next(&mut self) -> Result<Tuple> {
        self.state.ensure_open()?;
        if self.done {
            return Err(DbError::NoSuchElement);
        }

        let mut count = 0;
        while self.child.has_next()? {
            let tuple = self.child.next()?;
            self.pool.delete_tuple(self.tid, &tuple)?;
            count += 1;
        }
        self.done = true;
        Tuple::new(Arc::clone(&self.desc), vec![Value::Int32(count)])
    }

    fn rewind(&mut self) -> Result<()> {
        self.state.ensure_open()?;
        self.child.rewind()?;
        self.done = false;
        Ok(())
    }

    fn close(&mut self) {
        self.child.close();
        self.state = OpState::Closed;
    }

    fn tuple_desc(&self) -> &TupleDesc {
        &self.desc
    }
}
