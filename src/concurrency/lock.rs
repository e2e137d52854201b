//! Page-level lock management.
//!
//! Every page carries a shared/exclusive lock owned by transactions. Shared
//! locks may be held by any number of transactions at once; an exclusive lock
//! excludes every other holder. A transaction that is the sole shared holder
//! upgrades in place. Blocked requests are queued in arrival order and a
//! waits-for graph is checked on every block: the request that would close a
//! cycle fails with `DbError::Deadlock` while its granted locks stay in place.

use crate::error::{DbError, Result};
use crate::storage::page::PageId;
use crate::transaction::TransactionId;
use log::{debug, warn};
use parking_lot::{Condvar, Mutex};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

/// Lock modes supported by the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    /// Shared lock for read operations.
    Shared,
    /// Exclusive lock for write operations.
    Exclusive,
}

impl LockMode {
    /// Checks if this lock mode is compatible with another.
    pub fn is_compatible_with(&self, other: &LockMode) -> bool {
        matches!((self, other), (LockMode::Shared, LockMode::Shared))
    }

    /// True when holding `self` already satisfies a request for `other`.
    pub fn covers(&self, other: &LockMode) -> bool {
        *self == LockMode::Exclusive || *other == LockMode::Shared
    }
}

/// A queued, not yet granted request.
#[derive(Debug, Clone)]
struct LockRequest {
    tid: TransactionId,
    mode: LockMode,
}

/// Lock state of one page.
#[derive(Debug)]
struct LockInfo {
    granted: HashMap<TransactionId, LockMode>,
    /// Waiting requests in arrival order; upgrades are queued at the front.
    waiting: VecDeque<LockRequest>,
    cv: Arc<Condvar>,
}

impl LockInfo {
    fn new() -> Self {
        Self {
            granted: HashMap::new(),
            waiting: VecDeque::new(),
            cv: Arc::new(Condvar::new()),
        }
    }

    fn is_idle(&self) -> bool {
        self.granted.is_empty() && self.waiting.is_empty()
    }

    /// Transactions that `tid` would have to wait for to get `mode`.
    fn blockers(&self, tid: TransactionId, mode: LockMode) -> HashSet<TransactionId> {
        let mut blockers: HashSet<TransactionId> = self
            .granted
            .iter()
            .filter(|(holder, held)| **holder != tid && !held.is_compatible_with(&mode))
            .map(|(holder, _)| *holder)
            .collect();

        // An upgrade only waits for the other holders
        if self.granted.contains_key(&tid) {
            return blockers;
        }

        // Requests queued ahead of ours keep their turn
        for request in &self.waiting {
            if request.tid == tid {
                break;
            }
            if !request.mode.is_compatible_with(&mode) {
                blockers.insert(request.tid);
            }
        }
        blockers
    }

    fn enqueue(&mut self, tid: TransactionId, mode: LockMode) {
        if self.waiting.iter().any(|r| r.tid == tid) {
            return;
        }
        let request = LockRequest { tid, mode };
        if self.granted.contains_key(&tid) {
            self.waiting.push_front(request);
        } else {
            self.waiting.push_back(request);
        }
    }

    fn dequeue(&mut self, tid: TransactionId) {
        self.waiting.retain(|r| r.tid != tid);
    }

    fn grant(&mut self, tid: TransactionId, mode: LockMode) {
        self.dequeue(tid);
        self.granted.insert(tid, mode);
        // Compatible waiters behind us may proceed too
        self.cv.notify_all();
    }
}

/// Deadlock detection information.
#[derive(Debug, Default)]
struct DeadlockDetector {
    /// Wait-for graph: tid -> set of tids it's waiting for.
    wait_for: HashMap<TransactionId, HashSet<TransactionId>>,
}

impl DeadlockDetector {
    /// Replaces the outgoing edges of a blocked transaction.
    fn set_waits(&mut self, waiter: TransactionId, holders: HashSet<TransactionId>) {
        self.wait_for.insert(waiter, holders);
    }

    fn remove_waiter(&mut self, tid: TransactionId) {
        self.wait_for.remove(&tid);
    }

    /// Removes all edges from and to a transaction.
    fn remove_transaction(&mut self, tid: TransactionId) {
        self.wait_for.remove(&tid);
        for wait_set in self.wait_for.values_mut() {
            wait_set.remove(&tid);
        }
    }

    /// Checks whether `start` can reach itself through the wait-for graph.
    fn has_cycle(&self, start: TransactionId) -> bool {
        let mut visited = HashSet::new();
        let mut queue: VecDeque<TransactionId> = self
            .wait_for
            .get(&start)
            .map(|next| next.iter().copied().collect())
            .unwrap_or_default();

        while let Some(current) = queue.pop_front() {
            if current == start {
                return true;
            }
            if visited.insert(current) {
                if let Some(waiting_for) = self.wait_for.get(&current) {
                    queue.extend(waiting_for.iter().copied());
                }
            }
        }

        false
    }
}

#[derive(Debug, Default)]
struct LockTable {
    locks: HashMap<PageId, LockInfo>,
    /// Pages on which each transaction holds a granted lock.
    held: HashMap<TransactionId, HashSet<PageId>>,
    detector: DeadlockDetector,
}

impl LockTable {
    fn release(&mut self, tid: TransactionId, page_id: PageId) {
        if let Some(pages) = self.held.get_mut(&tid) {
            pages.remove(&page_id);
            if pages.is_empty() {
                self.held.remove(&tid);
            }
        }

        if let Some(info) = self.locks.get_mut(&page_id) {
            info.granted.remove(&tid);
            info.dequeue(tid);
            info.cv.notify_all();
            if info.is_idle() {
                self.locks.remove(&page_id);
            }
        }
    }
}

/// Page lock manager shared by every transaction of a buffer pool.
#[derive(Debug, Default)]
pub struct LockManager {
    table: Mutex<LockTable>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires `mode` on `page_id` for `tid`, blocking until it is granted.
    ///
    /// Fails with `DbError::Deadlock` if waiting would close a cycle in the
    /// waits-for graph. Locks already held by `tid` are kept in that case.
    pub fn acquire(&self, tid: TransactionId, page_id: PageId, mode: LockMode) -> Result<()> {
        let mut guard = self.table.lock();
        loop {
            let table = &mut *guard;
            let info = table.locks.entry(page_id).or_insert_with(LockInfo::new);

            if let Some(held) = info.granted.get(&tid) {
                if held.covers(&mode) {
                    return Ok(());
                }
            }

            let blockers = info.blockers(tid, mode);
            if blockers.is_empty() {
                info.grant(tid, mode);
                table.held.entry(tid).or_default().insert(page_id);
                table.detector.remove_waiter(tid);
                return Ok(());
            }

            info.enqueue(tid, mode);
            table.detector.set_waits(tid, blockers);
            if table.detector.has_cycle(tid) {
                info.dequeue(tid);
                info.cv.notify_all();
                if info.is_idle() {
                    table.locks.remove(&page_id);
                }
                table.detector.remove_waiter(tid);
                warn!("{} chosen as deadlock victim waiting for {} ({:?})", tid, page_id, mode);
                return Err(DbError::Deadlock(tid));
            }

            debug!("{} waiting for {:?} lock on {}", tid, mode, page_id);
            let cv = Arc::clone(&info.cv);
            cv.wait(&mut guard);
        }
    }

    /// Releases the lock `tid` holds on one page.
    pub fn release(&self, tid: TransactionId, page_id: PageId) {
        self.table.lock().release(tid, page_id);
    }

    /// Releases every lock held by a transaction.
    pub fn release_all(&self, tid: TransactionId) {
        let mut table = self.table.lock();
        let pages = table.held.remove(&tid).unwrap_or_default();
        for page_id in pages {
            table.release(tid, page_id);
        }
        table.detector.remove_transaction(tid);
    }

    pub fn holds_lock(&self, tid: TransactionId, page_id: PageId) -> bool {
        self.lock_mode(tid, page_id).is_some()
    }

    /// The mode `tid` currently holds on `page_id`, if any.
    pub fn lock_mode(&self, tid: TransactionId, page_id: PageId) -> Option<LockMode> {
        let table = self.table.lock();
        table
            .locks
            .get(&page_id)
            .and_then(|info| info.granted.get(&tid).copied())
    }

    /// Pages on which `tid` holds a lock.
    pub fn held_pages(&self, tid: TransactionId) -> Vec<PageId> {
        let table = self.table.lock();
        table
            .held
            .get(&tid)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Granted holders of a page's lock.
    pub fn holders(&self, page_id: PageId) -> Vec<(TransactionId, LockMode)> {
        let table = self.table.lock();
        table
            .locks
            .get(&page_id)
            .map(|info| info.granted.iter().map(|(t, m)| (*t, *m)).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::TableId;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    fn page(n: u32) -> PageId {
        PageId::new(TableId(1), n)
    }

    fn tid(n: u64) -> TransactionId {
        TransactionId::new(n)
    }

    #[test]
    fn test_lock_compatibility() {
        assert!(LockMode::Shared.is_compatible_with(&LockMode::Shared));
        assert!(!LockMode::Shared.is_compatible_with(&LockMode::Exclusive));
        assert!(!LockMode::Exclusive.is_compatible_with(&LockMode::Shared));
        assert!(!LockMode::Exclusive.is_compatible_with(&LockMode::Exclusive));

        assert!(LockMode::Exclusive.covers(&LockMode::Shared));
        assert!(!LockMode::Shared.covers(&LockMode::Exclusive));
    }

    #[test]
    fn test_basic_lock_acquire_release() -> anyhow::Result<()> {
        let manager = LockManager::new();

        manager.acquire(tid(1), page(1), LockMode::Shared)?;
        assert_eq!(manager.lock_mode(tid(1), page(1)), Some(LockMode::Shared));

        manager.release(tid(1), page(1));
        assert!(!manager.holds_lock(tid(1), page(1)));
        assert!(manager.held_pages(tid(1)).is_empty());
        Ok(())
    }

    #[test]
    fn test_multiple_shared_locks() -> anyhow::Result<()> {
        let manager = LockManager::new();

        for t in 1..=3 {
            manager.acquire(tid(t), page(1), LockMode::Shared)?;
        }
        for t in 1..=3 {
            assert!(manager.holds_lock(tid(t), page(1)));
        }
        assert_eq!(manager.holders(page(1)).len(), 3);
        Ok(())
    }

    #[test]
    fn test_reacquire_is_noop() -> anyhow::Result<()> {
        let manager = LockManager::new();
        manager.acquire(tid(1), page(1), LockMode::Exclusive)?;
        manager.acquire(tid(1), page(1), LockMode::Shared)?;
        manager.acquire(tid(1), page(1), LockMode::Exclusive)?;
        assert_eq!(manager.lock_mode(tid(1), page(1)), Some(LockMode::Exclusive));
        Ok(())
    }

    #[test]
    fn test_upgrade_sole_holder() -> anyhow::Result<()> {
        let manager = LockManager::new();
        manager.acquire(tid(1), page(1), LockMode::Shared)?;
        manager.acquire(tid(1), page(1), LockMode::Exclusive)?;
        assert_eq!(manager.lock_mode(tid(1), page(1)), Some(LockMode::Exclusive));
        assert_eq!(manager.holders(page(1)).len(), 1);
        Ok(())
    }

    #[test]
    fn test_exclusive_lock_blocks_others() -> anyhow::Result<()> {
        let manager = Arc::new(LockManager::new());
        let barrier = Arc::new(Barrier::new(2));
        let acquired = Arc::new(AtomicBool::new(false));

        manager.acquire(tid(1), page(1), LockMode::Exclusive)?;

        let handle = {
            let manager = Arc::clone(&manager);
            let barrier = Arc::clone(&barrier);
            let acquired = Arc::clone(&acquired);
            thread::spawn(move || {
                barrier.wait();
                manager.acquire(tid(2), page(1), LockMode::Shared).unwrap();
                acquired.store(true, Ordering::SeqCst);
            })
        };

        barrier.wait();
        thread::sleep(Duration::from_millis(50));
        assert!(!acquired.load(Ordering::SeqCst));
        assert!(!manager.holds_lock(tid(2), page(1)));

        manager.release_all(tid(1));
        handle.join().unwrap();
        assert!(acquired.load(Ordering::SeqCst));
        assert_eq!(manager.lock_mode(tid(2), page(1)), Some(LockMode::Shared));
        Ok(())
    }

    #[test]
    fn test_upgrade_waits_for_other_readers() -> anyhow::Result<()> {
        let manager = Arc::new(LockManager::new());
        manager.acquire(tid(1), page(1), LockMode::Shared)?;
        manager.acquire(tid(2), page(1), LockMode::Shared)?;

        let handle = {
            let manager = Arc::clone(&manager);
            thread::spawn(move || manager.acquire(tid(1), page(1), LockMode::Exclusive))
        };

        thread::sleep(Duration::from_millis(50));
        assert_eq!(manager.lock_mode(tid(1), page(1)), Some(LockMode::Shared));

        manager.release_all(tid(2));
        handle.join().unwrap()?;
        assert_eq!(manager.lock_mode(tid(1), page(1)), Some(LockMode::Exclusive));
        Ok(())
    }

    #[test]
    fn test_waiters_granted_in_arrival_order() -> anyhow::Result<()> {
        let manager = Arc::new(LockManager::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        manager.acquire(tid(1), page(1), LockMode::Exclusive)?;

        // T2 queues for exclusive first, T3 for shared afterwards
        let h2 = {
            let manager = Arc::clone(&manager);
            let order = Arc::clone(&order);
            thread::spawn(move || {
                manager.acquire(tid(2), page(1), LockMode::Exclusive).unwrap();
                order.lock().push(2);
                thread::sleep(Duration::from_millis(30));
                manager.release_all(tid(2));
            })
        };
        thread::sleep(Duration::from_millis(30));
        let h3 = {
            let manager = Arc::clone(&manager);
            let order = Arc::clone(&order);
            thread::spawn(move || {
                manager.acquire(tid(3), page(1), LockMode::Shared).unwrap();
                order.lock().push(3);
                manager.release_all(tid(3));
            })
        };
        thread::sleep(Duration::from_millis(30));

        manager.release_all(tid(1));
        h2.join().unwrap();
        h3.join().unwrap();

        assert_eq!(*order.lock(), vec![2, 3]);
        Ok(())
    }

    #[test]
    fn test_release_all_locks() -> anyhow::Result<()> {
        let manager = LockManager::new();

        manager.acquire(tid(1), page(1), LockMode::Shared)?;
        manager.acquire(tid(1), page(2), LockMode::Exclusive)?;
        manager.acquire(tid(1), page(3), LockMode::Shared)?;
        assert_eq!(manager.held_pages(tid(1)).len(), 3);

        manager.release_all(tid(1));

        assert!(manager.held_pages(tid(1)).is_empty());
        for p in 1..=3 {
            assert!(!manager.holds_lock(tid(1), page(p)));
        }
        Ok(())
    }

    #[test]
    fn test_deadlock_detection() -> anyhow::Result<()> {
        let manager = Arc::new(LockManager::new());

        manager.acquire(tid(1), page(1), LockMode::Exclusive)?;
        manager.acquire(tid(2), page(2), LockMode::Exclusive)?;

        // T1 blocks on page 2
        let handle = {
            let manager = Arc::clone(&manager);
            thread::spawn(move || manager.acquire(tid(1), page(2), LockMode::Exclusive))
        };
        thread::sleep(Duration::from_millis(50));

        // T2 closes the cycle and is refused
        let result = manager.acquire(tid(2), page(1), LockMode::Exclusive);
        assert!(matches!(result, Err(DbError::Deadlock(t)) if t == tid(2)));
        // the victim keeps what it already had
        assert!(manager.holds_lock(tid(2), page(2)));

        manager.release_all(tid(2));
        handle.join().unwrap()?;
        assert_eq!(manager.lock_mode(tid(1), page(2)), Some(LockMode::Exclusive));
        Ok(())
    }

    #[test]
    fn test_upgrade_deadlock() -> anyhow::Result<()> {
        let manager = Arc::new(LockManager::new());
        manager.acquire(tid(1), page(1), LockMode::Shared)?;
        manager.acquire(tid(2), page(1), LockMode::Shared)?;

        let handle = {
            let manager = Arc::clone(&manager);
            thread::spawn(move || manager.acquire(tid(1), page(1), LockMode::Exclusive))
        };
        thread::sleep(Duration::from_millis(50));

        let result = manager.acquire(tid(2), page(1), LockMode::Exclusive);
        assert!(matches!(result, Err(DbError::Deadlock(_))));

        manager.release_all(tid(2));
        handle.join().unwrap()?;
        assert_eq!(manager.lock_mode(tid(1), page(1)), Some(LockMode::Exclusive));
        Ok(())
    }

    #[test]
    fn test_detector_cycle() {
        let mut detector = DeadlockDetector::default();
        detector.set_waits(tid(1), HashSet::from([tid(2)]));
        detector.set_waits(tid(2), HashSet::from([tid(3)]));
        assert!(!detector.has_cycle(tid(1)));

        detector.set_waits(tid(3), HashSet::from([tid(1)]));
        assert!(detector.has_cycle(tid(1)));
        assert!(detector.has_cycle(tid(3)));

        detector.remove_transaction(tid(2));
        assert!(!detector.has_cycle(tid(1)));
    }
}
