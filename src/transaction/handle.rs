use super::id::TransactionId;
use super::state::TransactionState;
use crate::error::Result;
use crate::storage::buffer::BufferPool;
use log::warn;

/// A running transaction bound to a buffer pool.
///
/// `commit` and `abort` consume the handle. A handle dropped while still
/// active is aborted so that its locks and dirty pages never leak.
pub struct Transaction {
    id: TransactionId,
    pool: BufferPool,
    state: TransactionState,
}

impl Transaction {
    pub fn new(id: TransactionId, pool: BufferPool) -> Self {
        Self {
            id,
            pool,
            state: TransactionState::Active,
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Flushes the pages this transaction dirtied and releases its locks.
    pub fn commit(mut self) -> Result<()> {
        self.finish(true)
    }

    /// Discards the changes of this transaction and releases its locks.
    pub fn abort(mut self) -> Result<()> {
        self.finish(false)
    }

    fn finish(&mut self, commit: bool) -> Result<()> {
        // Mark as handled first so a failed commit is not aborted again on drop
        self.state = if commit {
            TransactionState::Committed
        } else {
            TransactionState::Aborted
        };
        self.pool.transaction_complete(self.id, commit)
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.state.is_active() {
            if let Err(e) = self.finish(false) {
                warn!("Abort of dropped {} failed: {}", self.id, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Catalog, TableId};
    use crate::storage::buffer::BufferPoolConfig;
    use crate::storage::page::PageId;
    use std::sync::Arc;

    fn pool() -> anyhow::Result<BufferPool> {
        Ok(BufferPool::new(Arc::new(Catalog::new()), BufferPoolConfig::default())?)
    }

    #[test]
    fn test_dropped_handle_releases_locks() -> anyhow::Result<()> {
        let pool = pool()?;
        let pid = PageId::new(TableId(1), 0);
        {
            let txn = Transaction::new(TransactionId::new(1), pool.clone());
            pool.lock_manager()
                .acquire(txn.id(), pid, crate::concurrency::lock::LockMode::Exclusive)?;
            assert!(pool.holds_lock(txn.id(), pid));
        }
        assert!(!pool.holds_lock(TransactionId::new(1), pid));
        Ok(())
    }

    #[test]
    fn test_commit_releases_locks() -> anyhow::Result<()> {
        let pool = pool()?;
        let pid = PageId::new(TableId(1), 0);
        let txn = Transaction::new(TransactionId::new(2), pool.clone());
        assert_eq!(txn.state(), TransactionState::Active);
        pool.lock_manager()
            .acquire(txn.id(), pid, crate::concurrency::lock::LockMode::Shared)?;

        txn.commit()?;
        assert!(!pool.holds_lock(TransactionId::new(2), pid));
        Ok(())
    }
}
