use crate::access::{DataType, TupleDesc};
use crate::catalog::{Catalog, TableId, TableSchema};
use crate::error::{DbError, Result};
use crate::storage::buffer::{BufferPool, BufferPoolConfig, EvictionPolicy, DEFAULT_POOL_PAGES};
use crate::storage::disk::DEFAULT_PAGE_SIZE;
use crate::storage::heap_file::HeapFile;
use crate::storage::page::HeapPage;
use crate::transaction::{Transaction, TransactionIdGenerator};
use log::info;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Startup configuration of a database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub page_size: usize,
    pub buffer_pool_pages: usize,
    pub eviction_policy: EvictionPolicy,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            buffer_pool_pages: DEFAULT_POOL_PAGES,
            eviction_policy: EvictionPolicy::NoSteal,
        }
    }
}

impl DatabaseConfig {
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_buffer_pool_pages(mut self, pages: usize) -> Self {
        self.buffer_pool_pages = pages;
        self
    }

    pub fn with_eviction_policy(mut self, policy: EvictionPolicy) -> Self {
        self.eviction_policy = policy;
        self
    }

    /// Rejects an empty pool and pages too small for even one int column.
    pub fn validate(&self) -> Result<()> {
        if self.buffer_pool_pages == 0 {
            return Err(DbError::InvalidConfig(
                "buffer pool must hold at least one page".to_string(),
            ));
        }
        if HeapPage::slots_per_page(self.page_size, DataType::Int32.size()) == 0 {
            return Err(DbError::InvalidConfig(format!(
                "page size {} is too small to hold a tuple",
                self.page_size
            )));
        }
        Ok(())
    }
}

/// A database directory: one heap file per table plus the shared catalog,
/// buffer pool and transaction id source.
pub struct Database {
    dir: PathBuf,
    config: DatabaseConfig,
    catalog: Arc<Catalog>,
    buffer_pool: BufferPool,
    ids: TransactionIdGenerator,
}

impl Database {
    /// Opens the database stored in `dir`, creating the directory if needed.
    /// Tables must be registered with `create_table` or `load_schema`.
    pub fn open(dir: &Path, config: DatabaseConfig) -> Result<Self> {
        config.validate()?;
        std::fs::create_dir_all(dir)?;

        let catalog = Arc::new(Catalog::new());
        let buffer_pool = BufferPool::new(
            Arc::clone(&catalog),
            BufferPoolConfig {
                capacity: config.buffer_pool_pages,
                policy: config.eviction_policy,
            },
        )?;
        info!(
            "Opened database at {} ({} byte pages, {} cached, {:?})",
            dir.display(),
            config.page_size,
            config.buffer_pool_pages,
            config.eviction_policy
        );

        Ok(Self {
            dir: dir.to_path_buf(),
            config,
            catalog,
            buffer_pool,
            ids: TransactionIdGenerator::new(),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn buffer_pool(&self) -> &BufferPool {
        &self.buffer_pool
    }

    /// Creates an empty table stored in `<dir>/<name>.dat`, replacing any
    /// existing file of that name.
    ///
    /// The replaced table keeps the same id, so its cached pages are dropped
    /// before the file is truncated.
    pub fn create_table(&self, name: &str, desc: TupleDesc, primary_key: Option<&str>) -> Result<TableId> {
        let path = self.dir.join(format!("{}.dat", name));
        if path.exists() {
            self.buffer_pool.discard_table(HeapFile::table_id_of(&path)?);
        }
        let file = HeapFile::create(&path, Arc::new(desc), self.config.page_size)?;
        let table_id = file.table_id();
        self.catalog.add_table(Arc::new(file), name, primary_key);
        Ok(table_id)
    }

    /// Registers the tables of a parsed schema, reopening their existing files.
    pub fn load_schema(&self, schemas: &[TableSchema]) -> Result<Vec<TableId>> {
        self.catalog
            .load_schema(&self.dir, schemas, self.config.page_size)
    }

    /// Starts a transaction.
    pub fn begin(&self) -> Transaction {
        Transaction::new(self.ids.next(), self.buffer_pool.clone())
    }

    /// Writes every dirty cached page to disk, committed or not.
    pub fn flush_all_pages(&self) -> Result<()> {
        self.buffer_pool.flush_all_pages()
    }
}
