//! Two-phase locking for update invocations
//!
//! Phase one: the [`GlobalUpdateLock`] is held while the select expression
//! is evaluated, then dropped. Phase two: a [`DocumentLockBundle`] takes
//! write locks on every document owning a selected node and holds them for
//! the whole mutation phase.
//!
//! Bundles lock in ascending document id order, so two invocations that
//! share documents queue on the first shared one instead of deadlocking.

mod bundle;
mod errors;
mod global;
mod table;

use std::time::Duration;

pub use bundle::DocumentLockBundle;
pub use errors::{BundleError, LockError, LockResult};
pub use global::{GlobalUpdateLock, SelectionGuard};
pub use table::DocumentLockTable;

use crate::dom::{DocumentId, NodeHandle};
use crate::trigger::{HookLedger, TriggerService};
use crate::txn::Transaction;

/// Shared lock state for every invocation running on one engine
#[derive(Debug, Default)]
pub struct LockCoordinator {
    global: GlobalUpdateLock,
    documents: DocumentLockTable,
    timeout: Option<Duration>,
}

impl LockCoordinator {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            global: GlobalUpdateLock::new(),
            documents: DocumentLockTable::new(),
            timeout,
        }
    }

    /// Enter the selection phase
    pub fn select_guard(&self) -> LockResult<SelectionGuard<'_>> {
        self.global.acquire()
    }

    /// Lock every document owning a node in `nodes`
    pub fn lock_for<'a>(
        &'a self,
        nodes: &[NodeHandle],
        triggers: &dyn TriggerService,
        hooks: &'a HookLedger,
        txn: &'a Transaction,
    ) -> Result<DocumentLockBundle<'a>, BundleError> {
        let documents = nodes.iter().map(|node| node.document);
        DocumentLockBundle::acquire(&self.documents, triggers, hooks, txn, documents, self.timeout)
    }

    pub fn is_locked(&self, doc: DocumentId) -> bool {
        self.documents.is_locked(doc)
    }

    pub fn is_selecting(&self) -> bool {
        self.global.is_held()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}
