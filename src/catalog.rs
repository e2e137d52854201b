//! Table registry.
//!
//! Maps table names to table ids and table ids to their heap file, schema and
//! primary key. The catalog knows nothing about pages; the buffer pool asks it
//! for the heap file that owns a page.

pub mod schema;
pub mod table_info;

pub use schema::{ColumnDef, TableSchema};
pub use table_info::{TableId, TableInfo};

use crate::access::TupleDesc;
use crate::error::{DbError, Result};
use crate::storage::heap_file::HeapFile;
use log::{info, warn};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Default)]
struct Tables {
    by_id: HashMap<TableId, TableInfo>,
    by_name: HashMap<String, TableId>,
}

#[derive(Debug, Default)]
pub struct Catalog {
    tables: RwLock<Tables>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `file` under `name` and returns the name it was registered as.
    ///
    /// Adding a file whose table id is already registered replaces that entry.
    /// If `name` belongs to another table, the new table is registered as
    /// `name#n` with the smallest free `n >= 1`.
    pub fn add_table(&self, file: Arc<HeapFile>, name: &str, primary_key: Option<&str>) -> String {
        let table_id = file.table_id();
        let mut tables = self.tables.write();

        if let Some(old) = tables.by_id.remove(&table_id) {
            tables.by_name.remove(&old.table_name);
        }

        let mut table_name = name.to_string();
        if tables.by_name.contains_key(&table_name) {
            let mut n = 1;
            while tables.by_name.contains_key(&format!("{}#{}", name, n)) {
                n += 1;
            }
            table_name = format!("{}#{}", name, n);
            warn!("Table name {} already taken, registering table {} as {}", name, table_id, table_name);
        }

        tables.by_name.insert(table_name.clone(), table_id);
        tables.by_id.insert(
            table_id,
            TableInfo {
                table_id,
                table_name: table_name.clone(),
                file,
                primary_key: primary_key.map(str::to_string),
            },
        );
        table_name
    }

    /// Registers a table under a generated unique name.
    pub fn add_table_anonymous(&self, file: Arc<HeapFile>) -> String {
        let name = uuid::Uuid::new_v4().to_string();
        self.add_table(file, &name, None)
    }

    /// Opens (or creates) `<base_dir>/<name>.dat` for every table of a parsed
    /// schema and registers it. Returns the ids in schema order.
    pub fn load_schema(
        &self,
        base_dir: &Path,
        schemas: &[TableSchema],
        page_size: usize,
    ) -> Result<Vec<TableId>> {
        let mut ids = Vec::with_capacity(schemas.len());
        for schema in schemas {
            let path = base_dir.join(format!("{}.dat", schema.name));
            let file = HeapFile::open(&path, Arc::new(schema.tuple_desc()), page_size)?;
            ids.push(file.table_id());
            self.add_table(Arc::new(file), &schema.name, schema.primary_key());
        }
        info!("Loaded {} tables from {}", ids.len(), base_dir.display());
        Ok(ids)
    }

    pub fn table_id(&self, name: &str) -> Result<TableId> {
        self.tables
            .read()
            .by_name
            .get(name)
            .copied()
            .ok_or_else(|| DbError::NotFound(format!("table {}", name)))
    }

    pub fn table_info(&self, table_id: TableId) -> Result<TableInfo> {
        self.tables
            .read()
            .by_id
            .get(&table_id)
            .cloned()
            .ok_or_else(|| DbError::NotFound(format!("table id {}", table_id)))
    }

    pub fn tuple_desc(&self, table_id: TableId) -> Result<Arc<TupleDesc>> {
        self.with_table(table_id, |info| Arc::clone(info.tuple_desc()))
    }

    /// The heap file backing a table.
    pub fn file(&self, table_id: TableId) -> Result<Arc<HeapFile>> {
        self.with_table(table_id, |info| Arc::clone(&info.file))
    }

    pub fn primary_key(&self, table_id: TableId) -> Result<Option<String>> {
        self.with_table(table_id, |info| info.primary_key.clone())
    }

    pub fn table_name(&self, table_id: TableId) -> Result<String> {
        self.with_table(table_id, |info| info.table_name.clone())
    }

    /// Registered table ids in ascending order.
    pub fn table_ids(&self) -> Vec<TableId> {
        let mut ids: Vec<TableId> = self.tables.read().by_id.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Removes every table.
    pub fn clear(&self) {
        let mut tables = self.tables.write();
        tables.by_id.clear();
        tables.by_name.clear();
    }

    fn with_table<T>(&self, table_id: TableId, f: impl FnOnce(&TableInfo) -> T) -> Result<T> {
        let tables = self.tables.read();
        let info = tables
            .by_id
            .get(&table_id)
            .ok_or_else(|| DbError::NotFound(format!("table id {}", table_id)))?;
        Ok(f(info))
    }
}
