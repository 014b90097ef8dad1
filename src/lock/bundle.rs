//! Per-invocation document lock bundle
//!
//! The bundle owns everything scoped to one invocation's mutation phase:
//! the write locks, the triggers activated for the locked documents, and
//! the set of documents actually modified. All of it is dropped together,
//! so a trigger map or modified set can never leak into the next call.
//!
//! Hooks are recorded in the invocation's [`HookLedger`]: a before-hook the
//! ledger has already seen is skipped, and while the ledger is deferring,
//! after-hooks are handed to it instead of fired.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use super::errors::BundleError;
use super::table::DocumentLockTable;
use crate::dom::DocumentId;
use crate::observability::{log_event_with_fields, Event};
use crate::trigger::{DocumentTrigger, HookLedger, TriggerError, TriggerResult, TriggerService};
use crate::txn::Transaction;

/// Write locks on a set of documents, taken and released as one unit
pub struct DocumentLockBundle<'a> {
    table: &'a DocumentLockTable,
    ledger: &'a HookLedger,
    txn: &'a Transaction,
    /// Locked documents, in acquisition (ascending id) order
    locked: Vec<DocumentId>,
    triggers: BTreeMap<DocumentId, Arc<dyn DocumentTrigger>>,
    modified: BTreeSet<DocumentId>,
    released: bool,
}

impl<'a> DocumentLockBundle<'a> {
    /// Lock every document in `documents` in ascending id order, firing
    /// each document's before-update hook right after its lock is taken
    /// unless `ledger` shows it already fired in this invocation.
    ///
    /// If any lock or hook fails, every lock already taken is released
    /// before the error is returned. Hooks that already fired are not
    /// undone.
    pub fn acquire(
        table: &'a DocumentLockTable,
        service: &dyn TriggerService,
        ledger: &'a HookLedger,
        txn: &'a Transaction,
        documents: impl IntoIterator<Item = DocumentId>,
        timeout: Option<Duration>,
    ) -> Result<Self, BundleError> {
        let ordered: BTreeSet<DocumentId> = documents.into_iter().collect();
        let mut bundle = Self {
            table,
            ledger,
            txn,
            locked: Vec::with_capacity(ordered.len()),
            triggers: BTreeMap::new(),
            modified: BTreeSet::new(),
            released: false,
        };

        for doc in ordered {
            table.lock_write(doc, timeout)?;
            bundle.locked.push(doc);

            if let Some(trigger) = service.trigger_for(doc) {
                if ledger.claim_before(doc) {
                    trigger.before_update(txn, doc)?;
                }
                bundle.triggers.insert(doc, trigger);
            }
        }

        let count = bundle.locked.len().to_string();
        let txn_id = txn.id().to_string();
        log_event_with_fields(
            Event::LockBundleAcquired,
            &[("documents", &count), ("txn", &txn_id)],
        );
        Ok(bundle)
    }

    pub fn documents(&self) -> &[DocumentId] {
        &self.locked
    }

    pub fn mark_modified(&mut self, doc: DocumentId) {
        self.modified.insert(doc);
    }

    pub fn modified(&self) -> &BTreeSet<DocumentId> {
        &self.modified
    }

    /// Fire after-update hooks for modified documents (or hand them to a
    /// deferring ledger), then unlock everything. Every lock is released
    /// even if a hook fails; the first hook error is returned.
    pub fn release(mut self) -> TriggerResult<()> {
        let errors = self.release_all();
        match errors.into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn release_all(&mut self) -> Vec<TriggerError> {
        if self.released {
            return Vec::new();
        }
        self.released = true;

        let mut errors = Vec::new();
        let triggers = std::mem::take(&mut self.triggers);
        let deferring = self.ledger.is_deferring();
        for doc in &self.modified {
            if deferring {
                self.ledger.defer_after(*doc);
            } else if let Some(trigger) = triggers.get(doc) {
                if let Err(err) = trigger.after_update(self.txn, *doc) {
                    errors.push(err);
                }
            }
        }
        let modified = self.modified.len().to_string();
        self.modified.clear();

        for doc in self.locked.drain(..).rev() {
            self.table.unlock(doc);
        }

        log_event_with_fields(Event::LockBundleReleased, &[("modified", &modified)]);
        errors
    }
}

impl Drop for DocumentLockBundle<'_> {
    fn drop(&mut self) {
        for err in self.release_all() {
            let doc = err.document().to_string();
            let reason = err.to_string();
            log_event_with_fields(
                Event::TriggerFailed,
                &[("document", &doc), ("reason", &reason)],
            );
        }
    }
}
