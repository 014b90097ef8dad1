//! Per-document write locks

use std::collections::HashMap;
use std::sync::{Condvar, Mutex};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use super::errors::{LockError, LockResult};
use crate::dom::DocumentId;

/// Exclusive write locks keyed by document, owned by the acquiring thread.
/// Waiters block on a condition variable until the holder unlocks.
#[derive(Debug, Default)]
pub struct DocumentLockTable {
    held: Mutex<HashMap<DocumentId, ThreadId>>,
    released: Condvar,
}

impl DocumentLockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until `doc` is free, then take it. `timeout` bounds the wait.
    pub fn lock_write(&self, doc: DocumentId, timeout: Option<Duration>) -> LockResult<()> {
        let me = thread::current().id();
        let started = Instant::now();
        let mut held = self.held.lock().map_err(|_| LockError::Poisoned)?;

        loop {
            match held.get(&doc) {
                None => {
                    held.insert(doc, me);
                    return Ok(());
                }
                Some(owner) if *owner == me => return Err(LockError::AlreadyHeld(doc)),
                Some(_) => {}
            }

            held = match timeout {
                None => self.released.wait(held).map_err(|_| LockError::Poisoned)?,
                Some(limit) => {
                    let waited = started.elapsed();
                    if waited >= limit {
                        return Err(LockError::Timeout {
                            document: doc,
                            waited,
                        });
                    }
                    let (guard, _) = self
                        .released
                        .wait_timeout(held, limit - waited)
                        .map_err(|_| LockError::Poisoned)?;
                    guard
                }
            };
        }
    }

    /// Release `doc`. Unlocking a document not held is a no-op.
    pub fn unlock(&self, doc: DocumentId) {
        let mut held = self
            .held
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if held.remove(&doc).is_some() {
            self.released.notify_all();
        }
    }

    pub fn is_locked(&self, doc: DocumentId) -> bool {
        self.held
            .lock()
            .map(|held| held.contains_key(&doc))
            .unwrap_or(true)
    }

    pub fn held_count(&self) -> usize {
        self.held.lock().map(|held| held.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::sync::Arc;

    #[test]
    fn test_lock_and_unlock() {
        let table = DocumentLockTable::new();
        table.lock_write(DocumentId(1), None).unwrap();
        assert!(table.is_locked(DocumentId(1)));
        assert!(!table.is_locked(DocumentId(2)));
        table.unlock(DocumentId(1));
        assert_eq!(table.held_count(), 0);
        table.unlock(DocumentId(1));
    }

    #[test]
    fn test_reentry_is_rejected() {
        let table = DocumentLockTable::new();
        table.lock_write(DocumentId(1), None).unwrap();
        assert_eq!(
            table.lock_write(DocumentId(1), None),
            Err(LockError::AlreadyHeld(DocumentId(1)))
        );
    }

    #[test]
    fn test_timeout_when_held_elsewhere() {
        let table = Arc::new(DocumentLockTable::new());
        table.lock_write(DocumentId(7), None).unwrap();

        let other = Arc::clone(&table);
        let result = thread::spawn(move || {
            other.lock_write(DocumentId(7), Some(Duration::from_millis(30)))
        })
        .join()
        .unwrap();

        assert!(matches!(result, Err(LockError::Timeout { document, .. }) if document == DocumentId(7)));
    }

    #[test]
    fn test_waiter_proceeds_after_unlock() {
        let table = Arc::new(DocumentLockTable::new());
        table.lock_write(DocumentId(3), None).unwrap();

        let (tx, rx) = mpsc::channel();
        let other = Arc::clone(&table);
        let waiter = thread::spawn(move || {
            other.lock_write(DocumentId(3), None).unwrap();
            tx.send(()).unwrap();
            other.unlock(DocumentId(3));
        });

        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
        table.unlock(DocumentId(3));
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        waiter.join().unwrap();
    }
}
