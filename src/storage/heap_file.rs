//! Unordered table storage: one file of fixed-size heap pages per table.

use crate::access::{Tuple, TupleDesc};
use crate::catalog::TableId;
use crate::error::{DbError, Result};
use crate::executor::{OpIterator, OpState};
use crate::storage::buffer::{BufferPool, PageGuard};
use crate::storage::disk::PageManager;
use crate::storage::page::{HeapPage, PageId, Permissions};
use crate::transaction::TransactionId;
use log::debug;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug)]
struct FileState {
    pages: PageManager,
    /// Pages handed out by `allocate_page` in this session. Pages below this
    /// mark that are not on disk yet read back empty.
    allocated: u32,
}

impl FileState {
    fn num_pages(&self) -> Result<u32> {
        Ok(self.pages.num_pages()?.max(self.allocated))
    }
}

/// A table stored as a sequence of heap pages in one file.
///
/// Page `n` lives at byte offset `n * page_size`. The table id is derived from
/// the canonical path of the file, so the same file always maps to the same id.
#[derive(Debug)]
pub struct HeapFile {
    path: PathBuf,
    table_id: TableId,
    desc: Arc<TupleDesc>,
    page_size: usize,
    state: Mutex<FileState>,
}

impl HeapFile {
    /// Creates an empty heap file, truncating any existing file at `path`.
    pub fn create(path: &Path, desc: Arc<TupleDesc>, page_size: usize) -> Result<Self> {
        let pages = PageManager::create(path, page_size)?;
        Self::with_pages(path, desc, pages)
    }

    /// Opens the heap file at `path`, creating an empty one if it is missing.
    pub fn open(path: &Path, desc: Arc<TupleDesc>, page_size: usize) -> Result<Self> {
        let pages = PageManager::open_or_create(path, page_size)?;
        Self::with_pages(path, desc, pages)
    }

    fn with_pages(path: &Path, desc: Arc<TupleDesc>, pages: PageManager) -> Result<Self> {
        let page_size = pages.page_size();
        if HeapPage::slots_per_page(page_size, desc.byte_size()) == 0 {
            return Err(DbError::InvalidConfig(format!(
                "page size {} cannot hold a tuple of {} bytes",
                page_size,
                desc.byte_size()
            )));
        }

        Ok(Self {
            path: path.to_path_buf(),
            table_id: Self::table_id_of(path)?,
            desc,
            page_size,
            state: Mutex::new(FileState { pages, allocated: 0 }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    pub fn desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Pages on disk plus pages allocated in this session and not yet written.
    pub fn num_pages(&self) -> Result<u32> {
        self.state.lock().num_pages()
    }

    /// Reads and decodes one page from disk.
    pub fn read_page(&self, page_id: PageId) -> Result<HeapPage> {
        self.check_owner(page_id)?;

        let mut state = self.state.lock();
        if page_id.page_no >= state.pages.num_pages()? {
            if page_id.page_no < state.allocated {
                return HeapPage::empty(page_id, Arc::clone(&self.desc), self.page_size);
            }
            return Err(DbError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("{} lies past the end of {}", page_id, self.path.display()),
            )));
        }

        let mut buf = vec![0u8; self.page_size];
        state.pages.read_page(page_id.page_no, &mut buf)?;
        HeapPage::from_bytes(page_id, Arc::clone(&self.desc), buf)
    }

    /// Writes a page at its offset, extending the file if needed.
    pub fn write_page(&self, page: &HeapPage) -> Result<()> {
        self.check_owner(page.page_id())?;
        self.state
            .lock()
            .pages
            .write_page(page.page_id().page_no, page.data())
    }

    /// Reserves the next page number past the end of the table.
    pub fn allocate_page(&self) -> Result<u32> {
        let mut state = self.state.lock();
        let page_no = state.num_pages()?;
        state.allocated = page_no + 1;
        debug!("Allocated page {} of table {}", page_no, self.table_id);
        Ok(page_no)
    }

    /// Inserts a tuple into the first page with a free slot, appending a page
    /// if every page is full. Returns the pages that were modified.
    ///
    /// The returned pages are not marked dirty; `BufferPool::insert_tuple`
    /// does that.
    pub fn insert_tuple(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        tuple: &mut Tuple,
    ) -> Result<Vec<PageGuard>> {
        if **tuple.desc() != *self.desc {
            return Err(DbError::TupleSchemaMismatch {
                expected: self.desc.to_string(),
                found: tuple.desc().to_string(),
            });
        }

        for page_no in 0..self.num_pages()? {
            let page_id = PageId::new(self.table_id, page_no);
            let already_locked = pool.holds_lock(tid, page_id);

            let has_room = {
                let guard = pool.get_page(tid, page_id, Permissions::ReadOnly)?;
                let page = guard.read();
                page.num_empty_slots() > 0
            };

            if has_room {
                // The shared lock kept the page unchanged until the upgrade
                let guard = pool.get_page(tid, page_id, Permissions::ReadWrite)?;
                guard.write()?.insert_tuple(tuple)?;
                return Ok(vec![guard]);
            } else if !already_locked {
                // Nothing was read from a full page
                pool.release_page(tid, page_id);
            }
        }

        let page_id = PageId::new(self.table_id, self.allocate_page()?);
        let guard = pool.get_page(tid, page_id, Permissions::ReadWrite)?;
        guard.write()?.insert_tuple(tuple)?;
        Ok(vec![guard])
    }

    /// Clears the slot named by the tuple's record id. Returns the modified page.
    pub fn delete_tuple(
        &self,
        pool: &BufferPool,
        tid: TransactionId,
        tuple: &Tuple,
    ) -> Result<PageGuard> {
        let record_id = tuple
            .record_id()
            .ok_or_else(|| DbError::NotMember("tuple has no record id".to_string()))?;
        if record_id.page_id.table_id != self.table_id || record_id.page_id.page_no >= self.num_pages()? {
            return Err(DbError::NotMember(format!(
                "{} is not a page of table {}",
                record_id.page_id, self.table_id
            )));
        }

        let guard = pool.get_page(tid, record_id.page_id, Permissions::ReadWrite)?;
        guard.write()?.delete_tuple(tuple)?;
        Ok(guard)
    }

    /// A lazy scan over every tuple of the table, read through `pool`.
    pub fn iterator(self: &Arc<Self>, pool: BufferPool, tid: TransactionId) -> HeapFileIterator {
        HeapFileIterator {
            file: Arc::clone(self),
            pool,
            tid,
            state: OpState::Closed,
            num_pages: 0,
            next_page: 0,
            buffered: VecDeque::new(),
        }
    }

    /// Id of the table stored in the existing file at `path`: the first four
    /// bytes of the SHA-256 of its canonical path.
    pub fn table_id_of(path: &Path) -> Result<TableId> {
        let canonical = std::fs::canonicalize(path)?;
        let digest = Sha256::digest(canonical.to_string_lossy().as_bytes());
        Ok(TableId(u32::from_be_bytes([
            digest[0], digest[1], digest[2], digest[3],
        ])))
    }

    fn check_owner(&self, page_id: PageId) -> Result<()> {
        if page_id.table_id != self.table_id {
            return Err(DbError::NotFound(format!(
                "{} does not belong to table {}",
                page_id, self.table_id
            )));
        }
        Ok(())
    }
}

/// Tuples of a heap file in page order, then slot order.
///
/// Pages are fetched read-only one at a time as the scan reaches them. The
/// page count is fixed when the iterator is opened.
pub struct HeapFileIterator {
    file: Arc<HeapFile>,
    pool: BufferPool,
    tid: TransactionId,
    state: OpState,
    num_pages: u32,
    next_page: u32,
    buffered: VecDeque<Tuple>,
}

impl HeapFileIterator {
    fn fill(&mut self) -> Result<()> {
        while self.buffered.is_empty() && self.next_page < self.num_pages {
            let page_id = PageId::new(self.file.table_id(), self.next_page);
            let guard = self.pool.get_page(self.tid, page_id, Permissions::ReadOnly)?;
            let page = guard.read();
            for tuple in page.iter() {
                self.buffered.push_back(tuple?);
            }
            self.next_page += 1;
        }
        Ok(())
    }
}

impl OpIterator for HeapFileIterator {
    fn open(&mut self) -> Result<()> {
        self.num_pages = self.file.num_pages()?;
        self.next_page = 0;
        self.buffered.clear();
        self.state = OpState::Open;
        Ok(())
    }

    fn has_next(&mut self) -> Result<bool> {
        self.state.ensure_open()?;
        self.fill()?;
        Ok(!self.buffered.is_empty())
    }

    fn next(&mut self) -> Result<Tuple> {
        self.state.ensure_open()?;
        self.fill()?;
        self.buffered.pop_front().ok_or(DbError::NoSuchElement)
    }

    fn rewind(&mut self) -> Result<()> {
        self.state.ensure_open()?;
        self.open()
    }

    fn close(&mut self) {
        self.buffered.clear();
        self.state = OpState::Closed;
    }

    fn tuple_desc(&self) -> &TupleDesc {
        self.file.desc()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{DataType, Value};
    use crate::catalog::Catalog;
    use crate::storage::buffer::BufferPoolConfig;
    use anyhow::Result;
    use tempfile::{tempdir, TempDir};

    struct Fixture {
        _dir: TempDir,
        file: Arc<HeapFile>,
        pool: BufferPool,
    }

    fn setup(page_size: usize) -> Result<Fixture> {
        let dir = tempdir()?;
        let desc = Arc::new(TupleDesc::with_names([(DataType::Int32, "a"), (DataType::Int32, "b")]));
        let file = Arc::new(HeapFile::create(&dir.path().join("t.dat"), desc, page_size)?);
        let catalog = Arc::new(Catalog::new());
        catalog.add_table(Arc::clone(&file), "t", None);
        let pool = BufferPool::new(catalog, BufferPoolConfig::default())?;
        Ok(Fixture { _dir: dir, file, pool })
    }

    fn row(file: &HeapFile, a: i32, b: i32) -> Result<Tuple> {
        Ok(Tuple::new(Arc::clone(file.desc()), vec![Value::Int32(a), Value::Int32(b)])?)
    }

    fn scan(fx: &Fixture, tid: TransactionId) -> Result<Vec<i32>> {
        let mut it = fx.file.iterator(fx.pool.clone(), tid);
        it.open()?;
        let mut out = Vec::new();
        while it.has_next()? {
            out.push(it.next()?.value(0)?.as_i32()?);
        }
        it.close();
        Ok(out)
    }

    #[test]
    fn test_table_id_is_stable() -> Result<()> {
        let dir = tempdir()?;
        let desc = Arc::new(TupleDesc::from_types(&[DataType::Int32]));
        let path = dir.path().join("x.dat");
        let a = HeapFile::create(&path, Arc::clone(&desc), 4096)?;
        let b = HeapFile::open(&path, desc.clone(), 4096)?;
        let c = HeapFile::create(&dir.path().join("y.dat"), desc, 4096)?;
        assert_eq!(a.table_id(), b.table_id());
        assert_eq!(HeapFile::table_id_of(&path)?, a.table_id());
        assert_ne!(a.table_id(), c.table_id());
        Ok(())
    }

    #[test]
    fn test_page_size_too_small() -> Result<()> {
        let dir = tempdir()?;
        let desc = Arc::new(TupleDesc::from_types(&[DataType::Varchar]));
        let result = HeapFile::create(&dir.path().join("x.dat"), desc, 64);
        assert!(matches!(result, Err(DbError::InvalidConfig(_))));
        Ok(())
    }

    #[test]
    fn test_read_write_page() -> Result<()> {
        let fx = setup(4096)?;
        let pid = PageId::new(fx.file.table_id(), 0);
        let mut page = HeapPage::empty(pid, Arc::clone(fx.file.desc()), 4096)?;
        page.insert_tuple(&mut row(&fx.file, 1, 2)?)?;
        fx.file.write_page(&page)?;

        assert_eq!(fx.file.num_pages()?, 1);
        let read = fx.file.read_page(pid)?;
        assert_eq!(read.data(), page.data());

        // past the end
        let result = fx.file.read_page(PageId::new(fx.file.table_id(), 1));
        assert!(matches!(result, Err(DbError::Io(_))));
        // foreign page
        let result = fx.file.read_page(PageId::new(TableId(fx.file.table_id().0 ^ 1), 0));
        assert!(matches!(result, Err(DbError::NotFound(_))));
        Ok(())
    }

    #[test]
    fn test_allocated_pages_count_before_flush() -> Result<()> {
        let fx = setup(4096)?;
        assert_eq!(fx.file.allocate_page()?, 0);
        assert_eq!(fx.file.allocate_page()?, 1);
        assert_eq!(fx.file.num_pages()?, 2);

        let page = fx.file.read_page(PageId::new(fx.file.table_id(), 1))?;
        assert_eq!(page.num_empty_slots(), page.num_slots());
        Ok(())
    }

    #[test]
    fn test_insert_scan_delete() -> Result<()> {
        let fx = setup(4096)?;
        let tid = TransactionId::new(1);
        let table_id = fx.file.table_id();

        for i in 0..10 {
            fx.pool.insert_tuple(tid, table_id, &mut row(&fx.file, i, i * 10)?)?;
        }
        assert_eq!(scan(&fx, tid)?, (0..10).collect::<Vec<_>>());

        let mut it = fx.file.iterator(fx.pool.clone(), tid);
        it.open()?;
        let mut victims = Vec::new();
        while it.has_next()? {
            let t = it.next()?;
            if t.value(0)?.as_i32()? % 2 == 0 {
                victims.push(t);
            }
        }
        it.close();
        for t in &victims {
            fx.pool.delete_tuple(tid, t)?;
        }
        assert_eq!(scan(&fx, tid)?, vec![1, 3, 5, 7, 9]);

        // second delete of the same tuple
        let result = fx.pool.delete_tuple(tid, &victims[0]);
        assert!(matches!(result, Err(DbError::NotMember(_))));
        Ok(())
    }

    #[test]
    fn test_insert_wrong_schema() -> Result<()> {
        let fx = setup(4096)?;
        let other = Arc::new(TupleDesc::from_types(&[DataType::Int32]));
        let mut tuple = Tuple::new(other, vec![Value::Int32(1)])?;
        let result = fx.pool.insert_tuple(TransactionId::new(1), fx.file.table_id(), &mut tuple);
        assert!(matches!(result, Err(DbError::TupleSchemaMismatch { .. })));
        assert_eq!(fx.file.num_pages()?, 0);
        Ok(())
    }

    #[test]
    fn test_insert_appends_page_when_full() -> Result<()> {
        // 64-byte pages hold 7 two-int tuples
        let fx = setup(64)?;
        let tid = TransactionId::new(1);
        let slots = HeapPage::slots_per_page(64, 8) as i32;
        assert_eq!(slots, 7);

        for i in 0..slots {
            fx.pool.insert_tuple(tid, fx.file.table_id(), &mut row(&fx.file, i, 0)?)?;
        }
        assert_eq!(fx.file.num_pages()?, 1);

        let mut extra = row(&fx.file, 99, 0)?;
        fx.pool.insert_tuple(tid, fx.file.table_id(), &mut extra)?;
        assert_eq!(fx.file.num_pages()?, 2);
        assert_eq!(extra.record_id().map(|r| r.page_id.page_no), Some(1));
        Ok(())
    }

    #[test]
    fn test_iterator_state() -> Result<()> {
        let fx = setup(4096)?;
        let tid = TransactionId::new(1);
        let mut it = fx.file.iterator(fx.pool.clone(), tid);
        assert!(matches!(it.has_next(), Err(DbError::IllegalState(_))));
        assert!(matches!(it.next(), Err(DbError::IllegalState(_))));

        it.open()?;
        assert!(!it.has_next()?);
        assert!(matches!(it.next(), Err(DbError::NoSuchElement)));
        it.close();
        assert!(matches!(it.rewind(), Err(DbError::IllegalState(_))));
        Ok(())
    }

    #[test]
    fn test_rewind_restarts() -> Result<()> {
        let fx = setup(4096)?;
        let tid = TransactionId::new(1);
        for i in 0..3 {
            fx.pool.insert_tuple(tid, fx.file.table_id(), &mut row(&fx.file, i, 0)?)?;
        }
        let mut it = fx.file.iterator(fx.pool.clone(), tid);
        it.open()?;
        it.next()?;
        it.next()?;
        it.rewind()?;
        assert_eq!(it.next()?.value(0)?.as_i32()?, 0);
        Ok(())
    }
}
