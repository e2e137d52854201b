#![allow(dead_code)]

use heapdb::access::{DataType, Tuple, TupleDesc, Value};
use heapdb::catalog::TableId;
use heapdb::storage::{EvictionPolicy, HeapFile, HeapPage, PageId};
use heapdb::{Database, DatabaseConfig};
use std::sync::Arc;
use tempfile::TempDir;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub struct TestDb {
    pub dir: TempDir,
    pub db: Database,
    pub table_id: TableId,
    pub desc: Arc<TupleDesc>,
}

impl TestDb {
    pub fn file(&self) -> Arc<HeapFile> {
        self.db.catalog().file(self.table_id).expect("table is registered")
    }

    pub fn pid(&self, page_no: u32) -> PageId {
        PageId::new(self.table_id, page_no)
    }

    pub fn int_tuple(&self, v: i32) -> Tuple {
        Tuple::new(Arc::clone(&self.desc), vec![Value::Int32(v)]).expect("int tuple")
    }

    /// Tuples of one page as stored on disk, bypassing the cache.
    pub fn on_disk(&self, page_no: u32) -> anyhow::Result<Vec<i32>> {
        let page = self.file().read_page(self.pid(page_no))?;
        let mut values = Vec::new();
        for tuple in page.iter() {
            values.push(tuple?.value(0)?.as_i32()?);
        }
        Ok(values)
    }
}

/// A one-int-column table `t` whose page `n` holds the single value `n`.
pub fn int_table(pool_pages: usize, policy: EvictionPolicy, pages: u32) -> anyhow::Result<TestDb> {
    init_logger();
    let dir = tempfile::tempdir()?;
    let config = DatabaseConfig::default()
        .with_buffer_pool_pages(pool_pages)
        .with_eviction_policy(policy);
    let db = Database::open(dir.path(), config)?;
    let table_id = db.create_table("t", TupleDesc::with_names([(DataType::Int32, "v")]), None)?;
    let desc = db.catalog().tuple_desc(table_id)?;

    let file = db.catalog().file(table_id)?;
    for n in 0..pages {
        let mut page = HeapPage::empty(PageId::new(table_id, n), Arc::clone(&desc), file.page_size())?;
        page.insert_tuple(&mut Tuple::new(Arc::clone(&desc), vec![Value::Int32(n as i32)])?)?;
        file.write_page(&page)?;
    }

    Ok(TestDb {
        dir,
        db,
        table_id,
        desc,
    })
}
