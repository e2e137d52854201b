use std::fmt;

/// Lifecycle of a [`Transaction`](super::Transaction) handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Still reading and writing pages.
    Active,
    /// Dirty pages flushed, locks released.
    Committed,
    /// Dirty pages dropped, locks released.
    Aborted,
}

impl TransactionState {
    pub fn is_active(self) -> bool {
        self == TransactionState::Active
    }

    /// Committed or aborted; the transaction holds no locks anymore.
    pub fn is_finished(self) -> bool {
        !self.is_active()
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionState::Active => "active",
            TransactionState::Committed => "committed",
            TransactionState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}
