//! Transaction boundary
//!
//! One transaction per top-level invocation. A Conditional's children share
//! their parent's transaction. [`TransactionScope`] begins the transaction
//! lazily, on the first edit that needs it, so an invocation that selects
//! nothing never opens one.

mod errors;
mod memory;

use chrono::{DateTime, Utc};
use uuid::Uuid;

pub use errors::{TxnError, TxnResult};
pub use memory::{MemoryTransactionManager, TxnOutcome};

use crate::observability::{Event, Logger};

/// The durability unit
#[derive(Debug, PartialEq, Eq)]
pub struct Transaction {
    id: Uuid,
    started_at: DateTime<Utc>,
}

impl Transaction {
    /// A fresh transaction not tracked by any manager
    pub fn begin() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}

/// Transaction manager collaborator
pub trait TransactionManager: Send + Sync {
    fn begin(&self) -> TxnResult<Transaction>;

    fn commit(&self, txn: Transaction) -> TxnResult<()>;

    fn abort(&self, txn: Transaction);
}

/// Lazily-opened transaction for one top-level invocation.
///
/// Dropping an open scope aborts its transaction.
pub struct TransactionScope<'m> {
    manager: &'m dyn TransactionManager,
    txn: Option<Transaction>,
}

impl<'m> TransactionScope<'m> {
    pub fn new(manager: &'m dyn TransactionManager) -> Self {
        Self { manager, txn: None }
    }

    /// The scope's transaction, beginning it on first use
    pub fn transaction(&mut self) -> TxnResult<&Transaction> {
        if self.txn.is_none() {
            self.txn = Some(self.manager.begin()?);
        }
        self.txn.as_ref().ok_or(TxnError::Poisoned)
    }

    pub fn is_open(&self) -> bool {
        self.txn.is_some()
    }

    /// Commit if a transaction was opened; no-op otherwise
    pub fn commit(mut self) -> TxnResult<()> {
        match self.txn.take() {
            Some(txn) => {
                let id = txn.id().to_string();
                self.manager.commit(txn)?;
                Logger::trace(Event::TxnCommit.as_str(), &[("txn", &id)]);
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Abort if a transaction was opened; no-op otherwise
    pub fn abort(mut self) {
        self.abort_open();
    }

    fn abort_open(&mut self) {
        if let Some(txn) = self.txn.take() {
            let id = txn.id().to_string();
            self.manager.abort(txn);
            Logger::warn(Event::TxnAbort.as_str(), &[("txn", &id)]);
        }
    }
}

impl Drop for TransactionScope<'_> {
    fn drop(&mut self) {
        self.abort_open();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_without_use_opens_nothing() {
        let manager = MemoryTransactionManager::new();
        let scope = TransactionScope::new(&manager);
        assert!(!scope.is_open());
        scope.commit().unwrap();
        assert_eq!(manager.begun(), 0);
        assert_eq!(manager.committed(), 0);
    }

    #[test]
    fn test_scope_begins_once() {
        let manager = MemoryTransactionManager::new();
        let mut scope = TransactionScope::new(&manager);
        let first = scope.transaction().unwrap().id();
        let second = scope.transaction().unwrap().id();
        assert_eq!(first, second);
        scope.commit().unwrap();
        assert_eq!(manager.begun(), 1);
        assert_eq!(manager.committed(), 1);
    }

    #[test]
    fn test_dropped_scope_aborts() {
        let manager = MemoryTransactionManager::new();
        {
            let mut scope = TransactionScope::new(&manager);
            scope.transaction().unwrap();
        }
        assert_eq!(manager.aborted(), 1);
        assert_eq!(manager.committed(), 0);
    }
}
