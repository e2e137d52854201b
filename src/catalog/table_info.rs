//! Table identity and registration record.

use crate::access::TupleDesc;
use crate::storage::heap_file::HeapFile;
use std::fmt;
use std::sync::Arc;

/// Identifier of a table, derived from the path of its heap file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableId(pub u32);

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A table registered in the catalog.
#[derive(Debug, Clone)]
pub struct TableInfo {
    pub table_id: TableId,
    pub table_name: String,
    pub file: Arc<HeapFile>,
    /// Name of the primary key field, if the table declares one.
    pub primary_key: Option<String>,
}

impl TableInfo {
    pub fn tuple_desc(&self) -> &Arc<TupleDesc> {
        self.file.desc()
    }
}
