pub mod lru;
pub mod replacer;

use crate::access::Tuple;
use crate::catalog::{Catalog, TableId};
use crate::concurrency::lock::{LockManager, LockMode};
use crate::error::{DbError, Result};
use crate::storage::page::{HeapPage, PageId, Permissions};
use crate::transaction::TransactionId;
use log::{debug, info, warn};
use lru::LruReplacer;
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use replacer::{FrameId, Replacer};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Default number of cached pages.
pub const DEFAULT_POOL_PAGES: usize = 50;

/// Whether pages dirtied by an uncommitted transaction may be written out to
/// make room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvictionPolicy {
    /// Dirty pages stay cached until their transaction completes.
    #[default]
    NoSteal,
    /// Dirty pages may be flushed and evicted; their before-image is kept so
    /// an abort can restore the file.
    Steal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferPoolConfig {
    pub capacity: usize,
    pub policy: EvictionPolicy,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_POOL_PAGES,
            policy: EvictionPolicy::default(),
        }
    }
}

/// A cached page. The latch (`page`) guards the bytes; the pin count keeps
/// the frame from being evicted while a `PageGuard` refers to it.
#[derive(Debug)]
struct Frame {
    page_id: PageId,
    page: RwLock<HeapPage>,
    pin_count: AtomicU32,
}

impl Frame {
    fn new(page: HeapPage) -> Self {
        Self {
            page_id: page.page_id(),
            page: RwLock::new(page),
            pin_count: AtomicU32::new(0),
        }
    }

    fn pin(&self) {
        self.pin_count.fetch_add(1, Ordering::SeqCst);
    }

    fn is_pinned(&self) -> bool {
        self.pin_count.load(Ordering::SeqCst) > 0
    }
}

#[derive(Debug)]
struct PoolState {
    page_table: HashMap<PageId, FrameId>,
    frames: Vec<Option<Arc<Frame>>>,
    free_list: Vec<FrameId>,
    replacer: Box<dyn Replacer>,
    /// Before-images of pages written out while still dirty, per dirtying
    /// transaction. Only the first image per page is kept.
    stolen: HashMap<TransactionId, HashMap<PageId, Vec<u8>>>,
}

impl PoolState {
    fn frame(&self, page_id: &PageId) -> Option<Arc<Frame>> {
        self.page_table
            .get(page_id)
            .and_then(|&id| self.frames[id].clone())
    }

    fn resident(&self) -> Vec<Arc<Frame>> {
        self.frames.iter().flatten().cloned().collect()
    }

    fn remove(&mut self, page_id: &PageId) -> Option<Arc<Frame>> {
        let frame_id = self.page_table.remove(page_id)?;
        self.replacer.remove(frame_id);
        self.free_list.push(frame_id);
        self.frames[frame_id].take()
    }
}

/// Bounded page cache in front of the heap files registered in a catalog.
///
/// Every page access goes through [`BufferPool::get_page`], which first takes
/// the page lock for the transaction and then returns a pinned handle on the
/// cached page. Cloning the pool is cheap; clones share the same cache.
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<BufferPoolInner>,
}

struct BufferPoolInner {
    catalog: Arc<Catalog>,
    lock_manager: LockManager,
    state: Mutex<PoolState>,
    config: BufferPoolConfig,
}

impl BufferPool {
    pub fn new(catalog: Arc<Catalog>, config: BufferPoolConfig) -> Result<Self> {
        if config.capacity == 0 {
            return Err(DbError::InvalidConfig(
                "buffer pool capacity must be at least one page".to_string(),
            ));
        }

        let state = PoolState {
            page_table: HashMap::with_capacity(config.capacity),
            frames: vec![None; config.capacity],
            free_list: (0..config.capacity).rev().collect(),
            replacer: Box::new(LruReplacer::new(config.capacity)),
            stolen: HashMap::new(),
        };

        Ok(Self {
            inner: Arc::new(BufferPoolInner {
                catalog,
                lock_manager: LockManager::new(),
                state: Mutex::new(state),
                config,
            }),
        })
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.inner.catalog
    }

    pub fn lock_manager(&self) -> &LockManager {
        &self.inner.lock_manager
    }

    pub fn capacity(&self) -> usize {
        self.inner.config.capacity
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.inner.config.policy
    }

    /// Number of pages currently cached.
    pub fn cached_pages(&self) -> usize {
        self.inner.state.lock().page_table.len()
    }

    pub fn is_cached(&self, page_id: PageId) -> bool {
        self.inner.state.lock().page_table.contains_key(&page_id)
    }

    /// Locks `page_id` for `tid` and returns the cached page, loading it from
    /// its heap file on a miss.
    ///
    /// `ReadOnly` takes a shared lock, `ReadWrite` an exclusive one. Blocks
    /// while the lock is unavailable and fails with `Deadlock` if waiting would
    /// deadlock. A miss with a full cache evicts the least recently used page
    /// the eviction policy allows, or fails with `BufferPoolFull`.
    ///
    /// The returned guard must not be latched while calling back into the pool.
    pub fn get_page(
        &self,
        tid: TransactionId,
        page_id: PageId,
        permission: Permissions,
    ) -> Result<PageGuard> {
        let mode = match permission {
            Permissions::ReadOnly => LockMode::Shared,
            Permissions::ReadWrite => LockMode::Exclusive,
        };
        self.inner.lock_manager.acquire(tid, page_id, mode)?;

        let frame = self.fetch_frame(page_id)?;
        Ok(PageGuard { frame, permission })
    }

    fn fetch_frame(&self, page_id: PageId) -> Result<Arc<Frame>> {
        let mut state = self.inner.state.lock();

        let cached = state.page_table.get(&page_id).copied();
        if let Some(frame_id) = cached {
            if let Some(frame) = state.frames[frame_id].clone() {
                frame.pin();
                state.replacer.record_access(frame_id);
                return Ok(frame);
            }
        }

        let frame_id = self.allocate_frame(&mut state)?;
        let page = match self
            .inner
            .catalog
            .file(page_id.table_id)
            .and_then(|file| file.read_page(page_id))
        {
            Ok(page) => page,
            Err(e) => {
                state.free_list.push(frame_id);
                return Err(e);
            }
        };
        debug!("Loaded {} into frame {}", page_id, frame_id);

        let frame = Arc::new(Frame::new(page));
        frame.pin();
        state.frames[frame_id] = Some(Arc::clone(&frame));
        state.page_table.insert(page_id, frame_id);
        state.replacer.record_access(frame_id);
        Ok(frame)
    }

    /// A free frame, evicting a page if none is left.
    fn allocate_frame(&self, state: &mut PoolState) -> Result<FrameId> {
        if let Some(frame_id) = state.free_list.pop() {
            return Ok(frame_id);
        }

        let policy = self.inner.config.policy;
        let victim = {
            let PoolState {
                frames, replacer, ..
            } = &mut *state;
            replacer.evict(&|frame_id| {
                frames[frame_id].as_ref().is_some_and(|frame| {
                    !frame.is_pinned()
                        && (policy == EvictionPolicy::Steal || !frame.page.read().is_dirty())
                })
            })
        };

        let frame_id = victim.ok_or(DbError::BufferPoolFull {
            capacity: self.inner.config.capacity,
        })?;
        let Some(frame) = state.frames[frame_id].clone() else {
            return Ok(frame_id);
        };

        let dirtier = frame.page.read().dirtier();
        if let Err(e) = self.write_frame(state, &frame) {
            state.replacer.record_access(frame_id);
            return Err(e);
        }
        if let Some(tid) = dirtier {
            debug!("Stole {} dirtied by {}", frame.page_id, tid);
        }

        debug!("Evicted {} from frame {}", frame.page_id, frame_id);
        state.page_table.remove(&frame.page_id);
        state.frames[frame_id] = None;
        Ok(frame_id)
    }

    /// Writes a dirty frame to its heap file and marks it clean.
    ///
    /// The writer may still abort, so the page's before-image is kept under
    /// that transaction until it completes.
    fn write_frame(&self, state: &mut PoolState, frame: &Frame) -> Result<()> {
        let mut page = frame.page.write();
        let Some(tid) = page.dirtier() else {
            return Ok(());
        };
        let file = self.inner.catalog.file(frame.page_id.table_id)?;
        file.write_page(&page)?;
        state
            .stolen
            .entry(tid)
            .or_default()
            .entry(frame.page_id)
            .or_insert_with(|| page.before_image().to_vec());
        page.mark_dirty(None);
        debug!("Flushed {} dirtied by {}", frame.page_id, tid);
        Ok(())
    }

    /// Writes a cached page to disk if it is dirty. The page stays cached.
    pub fn flush_page(&self, page_id: PageId) -> Result<()> {
        let mut state = self.inner.state.lock();
        let frame = state.frame(&page_id);
        match frame {
            Some(frame) => self.write_frame(&mut state, &frame),
            None => Ok(()),
        }
    }

    /// Writes every dirty cached page to disk.
    ///
    /// Pages of running transactions are written too; aborting such a
    /// transaction later still restores them.
    pub fn flush_all_pages(&self) -> Result<()> {
        let mut state = self.inner.state.lock();
        let frames = state.resident();
        for frame in frames {
            self.write_frame(&mut state, &frame)?;
        }
        Ok(())
    }

    /// Writes the pages dirtied by `tid` to disk.
    pub fn flush_pages(&self, tid: TransactionId) -> Result<()> {
        let mut state = self.inner.state.lock();
        let frames = state.resident();
        for frame in frames {
            if frame.page.read().dirtier() == Some(tid) {
                self.write_frame(&mut state, &frame)?;
            }
        }
        Ok(())
    }

    /// Drops a page from the cache without writing it.
    pub fn discard_page(&self, page_id: PageId) {
        if self.inner.state.lock().remove(&page_id).is_some() {
            debug!("Discarded {}", page_id);
        }
    }

    /// Drops every cached page of a table without writing it, together with
    /// the before-images kept for them.
    pub fn discard_table(&self, table_id: TableId) {
        let mut state = self.inner.state.lock();
        let pages: Vec<PageId> = state
            .page_table
            .keys()
            .filter(|page_id| page_id.table_id == table_id)
            .copied()
            .collect();
        for page_id in &pages {
            state.remove(page_id);
        }
        for images in state.stolen.values_mut() {
            images.retain(|page_id, _| page_id.table_id != table_id);
        }
        debug!("Discarded {} cached pages of table {}", pages.len(), table_id);
    }

    /// Releases the lock `tid` holds on one page before the transaction ends.
    pub fn release_page(&self, tid: TransactionId, page_id: PageId) {
        self.inner.lock_manager.release(tid, page_id);
    }

    pub fn holds_lock(&self, tid: TransactionId, page_id: PageId) -> bool {
        self.inner.lock_manager.holds_lock(tid, page_id)
    }

    /// Ends a transaction.
    ///
    /// On commit the pages it dirtied are written to disk and become the new
    /// before-images. On abort its cached dirty pages are discarded and any of
    /// its pages written out early are restored on disk. Either way all of its
    /// locks are released.
    pub fn transaction_complete(&self, tid: TransactionId, commit: bool) -> Result<()> {
        let result = if commit {
            self.commit(tid)
        } else {
            self.abort(tid)
        };
        self.inner.lock_manager.release_all(tid);
        result
    }

    fn commit(&self, tid: TransactionId) -> Result<()> {
        self.flush_pages(tid)?;

        let mut state = self.inner.state.lock();
        for page_id in self.inner.lock_manager.held_pages(tid) {
            if let Some(frame) = state.frame(&page_id) {
                frame.page.write().set_before_image();
            }
        }
        state.stolen.remove(&tid);
        info!("{} committed", tid);
        Ok(())
    }

    fn abort(&self, tid: TransactionId) -> Result<()> {
        let mut state = self.inner.state.lock();

        let dirtied: Vec<PageId> = state
            .resident()
            .iter()
            .filter(|frame| frame.page.read().dirtier() == Some(tid))
            .map(|frame| frame.page_id)
            .collect();
        for page_id in &dirtied {
            state.remove(page_id);
        }

        let stolen = state.stolen.remove(&tid).unwrap_or_default();
        for (page_id, before_image) in stolen {
            state.remove(&page_id);
            let file = self.inner.catalog.file(page_id.table_id)?;
            let page = HeapPage::from_bytes(page_id, Arc::clone(file.desc()), before_image)?;
            file.write_page(&page)?;
            warn!("Restored stolen {} after abort of {}", page_id, tid);
        }

        info!("{} aborted", tid);
        Ok(())
    }

    /// Inserts a tuple into a table, marking every page it touched dirty.
    pub fn insert_tuple(&self, tid: TransactionId, table_id: TableId, tuple: &mut Tuple) -> Result<()> {
        let file = self.inner.catalog.file(table_id)?;
        for guard in file.insert_tuple(self, tid, tuple)? {
            guard.write()?.mark_dirty(Some(tid));
        }
        Ok(())
    }

    /// Deletes a tuple from the table its record id points into.
    pub fn delete_tuple(&self, tid: TransactionId, tuple: &Tuple) -> Result<()> {
        let record_id = tuple
            .record_id()
            .ok_or_else(|| DbError::NotMember("tuple has no record id".to_string()))?;
        let file = self.inner.catalog.file(record_id.page_id.table_id)?;
        let guard = file.delete_tuple(self, tid, tuple)?;
        guard.write()?.mark_dirty(Some(tid));
        Ok(())
    }
}

/// A pinned page handed out by [`BufferPool::get_page`]. The page cannot be
/// evicted while the guard is alive.
pub struct PageGuard {
    frame: Arc<Frame>,
    permission: Permissions,
}

impl PageGuard {
    pub fn page_id(&self) -> PageId {
        self.frame.page_id
    }

    pub fn permission(&self) -> Permissions {
        self.permission
    }

    /// Latches the page for reading.
    pub fn read(&self) -> RwLockReadGuard<'_, HeapPage> {
        self.frame.page.read()
    }

    /// Latches the page for writing; fails unless fetched with `ReadWrite`.
    pub fn write(&self) -> Result<RwLockWriteGuard<'_, HeapPage>> {
        if self.permission != Permissions::ReadWrite {
            return Err(DbError::ReadOnlyPage(self.frame.page_id));
        }
        Ok(self.frame.page.write())
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        self.frame.pin_count.fetch_sub(1, Ordering::SeqCst);
    }
}
