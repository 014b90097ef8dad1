//! Counting in-memory transaction manager

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use uuid::Uuid;

use super::{Transaction, TransactionManager, TxnError, TxnResult};

/// How a transaction ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnOutcome {
    Committed,
    Aborted,
}

/// Tracks active transactions and counts outcomes
#[derive(Debug, Default)]
pub struct MemoryTransactionManager {
    active: Mutex<HashSet<Uuid>>,
    history: Mutex<Vec<(Uuid, TxnOutcome)>>,
    begun: AtomicU64,
    committed: AtomicU64,
    aborted: AtomicU64,
}

impl MemoryTransactionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begun(&self) -> u64 {
        self.begun.load(Ordering::Relaxed)
    }

    pub fn committed(&self) -> u64 {
        self.committed.load(Ordering::Relaxed)
    }

    pub fn aborted(&self) -> u64 {
        self.aborted.load(Ordering::Relaxed)
    }

    /// Finished transactions in completion order
    pub fn history(&self) -> Vec<(Uuid, TxnOutcome)> {
        self.history
            .lock()
            .map(|h| h.clone())
            .unwrap_or_default()
    }

    fn finish(&self, id: Uuid, outcome: TxnOutcome) -> TxnResult<()> {
        let was_active = self.active.lock().map_err(|_| TxnError::Poisoned)?.remove(&id);
        if !was_active {
            return Err(TxnError::NotActive(id));
        }
        self.history
            .lock()
            .map_err(|_| TxnError::Poisoned)?
            .push((id, outcome));
        Ok(())
    }
}

impl TransactionManager for MemoryTransactionManager {
    fn begin(&self) -> TxnResult<Transaction> {
        let txn = Transaction::begin();
        self.active
            .lock()
            .map_err(|_| TxnError::Poisoned)?
            .insert(txn.id());
        self.begun.fetch_add(1, Ordering::Relaxed);
        Ok(txn)
    }

    fn commit(&self, txn: Transaction) -> TxnResult<()> {
        self.finish(txn.id(), TxnOutcome::Committed)?;
        self.committed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn abort(&self, txn: Transaction) {
        if self.finish(txn.id(), TxnOutcome::Aborted).is_ok() {
            self.aborted.fetch_add(1, Ordering::Relaxed);
        }
    }
}
