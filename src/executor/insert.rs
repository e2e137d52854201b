//! Insert operator.

use crate::access::{DataType, Tuple, TupleDesc, Value};
use crate::catalog::TableId;
use crate::error::{DbError, Result};
use crate::executor::{OpIterator, OpState};
use crate::storage::buffer::BufferPool;
use crate::transaction::TransactionId;
use std::sync::Arc;

/// Inserts every tuple of its child into a table, then yields a single
/// one-field tuple holding the number of inserted rows.
pub struct Insert {
    pool: BufferPool,
    tid: TransactionId,
    table_id: TableId,
    table_desc: Arc<TupleDesc>,
    child: Box<dyn OpIterator>,
    desc: Arc<TupleDesc>,
    done: bool,
    state: OpState,
}

impl Insert {
    /// Fails with `TupleSchemaMismatch` if the child's tuples do not have the
    /// table's field types.
    pub fn new(
        pool: &BufferPool,
        tid: TransactionId,
        child: Box<dyn OpIterator>,
        table_id: TableId,
    ) -> Result<Self> {
        let table_desc = pool.catalog().tuple_desc(table_id)?;
        if *child.tuple_desc() != *table_desc {
            return Err(DbError::TupleSchemaMismatch {
                expected: table_desc.to_string(),
                found: child.tuple_desc().to_string(),
            });
        }

        Ok(Self {
            pool: pool.clone(),
            tid,
            table_id,
            table_desc,
            child,
            desc: Arc::new(TupleDesc::with_names([(DataType::Int32, "count")])),
            done: false,
            state: OpState::Closed,
        })
    }
}

impl OpIterator for Insert {
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
            let source = self.child.next()?;
            let mut tuple = Tuple::new(Arc::clone(&self.table_desc), source.values().to_vec())?;
            self.pool.insert_tuple(self.tid, self.table_id, &mut tuple)?;
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
