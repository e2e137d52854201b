//! Sequential scan operator.

use crate::access::{TdItem, Tuple, TupleDesc};
use crate::catalog::TableId;
use crate::error::Result;
use crate::executor::OpIterator;
use crate::storage::buffer::BufferPool;
use crate::storage::heap_file::HeapFileIterator;
use crate::transaction::TransactionId;
use std::sync::Arc;

/// Reads every tuple of a table in storage order.
///
/// Output field names are prefixed with the table alias (`alias.field`);
/// unnamed fields become `alias.null`.
pub struct SeqScan {
    table_id: TableId,
    table_alias: String,
    desc: Arc<TupleDesc>,
    inner: HeapFileIterator,
}

impl SeqScan {
    pub fn new(pool: &BufferPool, tid: TransactionId, table_id: TableId, table_alias: &str) -> Result<Self> {
        let file = pool.catalog().file(table_id)?;
        let desc = Arc::new(alias_desc(file.desc(), table_alias));
        Ok(Self {
            table_id,
            table_alias: table_alias.to_string(),
            desc,
            inner: file.iterator(pool.clone(), tid),
        })
    }

    /// Scans a table under its own name.
    pub fn by_name(pool: &BufferPool, tid: TransactionId, table_name: &str) -> Result<Self> {
        let table_id = pool.catalog().table_id(table_name)?;
        Self::new(pool, tid, table_id, table_name)
    }

    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    pub fn table_alias(&self) -> &str {
        &self.table_alias
    }
}

fn alias_desc(desc: &TupleDesc, alias: &str) -> TupleDesc {
    TupleDesc::new(
        desc.iter()
            .map(|item| {
                let name = item.field_name.as_deref().unwrap_or("null");
                TdItem::new(item.field_type, Some(format!("{}.{}", alias, name)))
            })
            .collect(),
    )
}

impl OpIterator for SeqScan {
    fn open(&mut self) -> Result<()> {
        self.inner.open()
    }

    fn has_next(&mut self) -> Result<bool> {
        self.inner.has_next()
    }

    fn next(&mut self) -> Result<Tuple> {
        let mut tuple = self.inner.next()?;
        tuple.reset_desc(Arc::clone(&self.desc))?;
        Ok(tuple)
    }

    fn rewind(&mut self) -> Result<()> {
        self.inner.rewind()
    }

    fn close(&mut self) {
        self.inner.close();
    }

    fn tuple_desc(&self) -> &TupleDesc {
        &self.desc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::Value;
    use crate::error::DbError;
    use crate::executor::drain;
    use crate::executor::test_util::users_table;
    use anyhow::Result;

    #[test]
    fn test_scan_prefixes_field_names() -> Result<()> {
        let table = users_table(&[(1, "ann"), (2, "bob")])?;
        let mut scan = SeqScan::new(&table.pool, TransactionId::new(1), table.table_id, "u")?;

        assert_eq!(scan.tuple_desc().field_name(0)?, Some("u.id"));
        assert_eq!(scan.tuple_desc().field_name(1)?, Some("u.name"));

        scan.open()?;
        let rows = drain(&mut scan)?;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].value(1)?, &Value::String("bob".into()));
        assert_eq!(rows[0].desc().field_name(0)?, Some("u.id"));
        assert!(rows[0].record_id().is_some());
        Ok(())
    }

    #[test]
    fn test_scan_by_name_and_rewind() -> Result<()> {
        let table = users_table(&[(1, "ann"), (2, "bob"), (3, "cy")])?;
        let mut scan = SeqScan::by_name(&table.pool, TransactionId::new(1), "users")?;
        assert_eq!(scan.table_alias(), "users");

        scan.open()?;
        assert_eq!(drain(&mut scan)?.len(), 3);
        scan.rewind()?;
        assert_eq!(scan.next()?.value(0)?.as_i32()?, 1);
        scan.close();
        assert!(matches!(scan.next(), Err(DbError::IllegalState(_))));
        Ok(())
    }

    #[test]
    fn test_unknown_table() -> Result<()> {
        let table = users_table(&[])?;
        let result = SeqScan::by_name(&table.pool, TransactionId::new(1), "missing");
        assert!(matches!(result, Err(DbError::NotFound(_))));
        Ok(())
    }
}
