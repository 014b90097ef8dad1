//! Document triggers
//!
//! A [`TriggerService`] resolves the trigger configured for a document. The
//! lock bundle asks for it when the document's write lock is taken, fires
//! `before_update` right away, and keeps the instance until release, where
//! `after_update` fires for every document that was modified.
//!
//! A [`HookLedger`] spans the whole top-level invocation, so a document
//! locked by several bundles (the children of a conditional) still sees
//! each hook once.

mod errors;
mod ledger;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

pub use errors::{TriggerError, TriggerResult};
pub use ledger::{fire_after_hooks, HookLedger};

use crate::dom::DocumentId;
use crate::txn::Transaction;

/// Hooks run around a document mutation
pub trait DocumentTrigger: Send + Sync {
    /// Called once per invocation, while the document's write lock is held
    /// and before any edit touches it
    fn before_update(&self, txn: &Transaction, doc: DocumentId) -> TriggerResult<()>;

    /// Called once per invocation for a modified document, before its lock
    /// is released. Inside a conditional it fires after the last child,
    /// once the locks are already released.
    fn after_update(&self, txn: &Transaction, doc: DocumentId) -> TriggerResult<()>;
}

/// Resolves the trigger configured for a document, if any
pub trait TriggerService: Send + Sync {
    fn trigger_for(&self, doc: DocumentId) -> Option<Arc<dyn DocumentTrigger>>;
}

/// No document has a trigger
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTriggers;

impl TriggerService for NoTriggers {
    fn trigger_for(&self, _doc: DocumentId) -> Option<Arc<dyn DocumentTrigger>> {
        None
    }
}

/// Static document → trigger mapping, with an optional fallback for
/// documents that have no entry of their own
#[derive(Default, Clone)]
pub struct TriggerTable {
    triggers: BTreeMap<DocumentId, Arc<dyn DocumentTrigger>>,
    fallback: Option<Arc<dyn DocumentTrigger>>,
}

impl TriggerTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_trigger(mut self, doc: DocumentId, trigger: Arc<dyn DocumentTrigger>) -> Self {
        self.triggers.insert(doc, trigger);
        self
    }

    pub fn with_fallback(mut self, trigger: Arc<dyn DocumentTrigger>) -> Self {
        self.fallback = Some(trigger);
        self
    }
}

impl TriggerService for TriggerTable {
    fn trigger_for(&self, doc: DocumentId) -> Option<Arc<dyn DocumentTrigger>> {
        self.triggers
            .get(&doc)
            .or(self.fallback.as_ref())
            .map(Arc::clone)
    }
}

/// A trigger call observed by [`RecordingTrigger`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerCall {
    Before(DocumentId),
    After(DocumentId),
}

/// Records every hook call in order. Can be told to fail one phase for one
/// document.
#[derive(Debug, Default)]
pub struct RecordingTrigger {
    calls: Mutex<Vec<TriggerCall>>,
    fail_before: Option<DocumentId>,
    fail_after: Option<DocumentId>,
}

impl RecordingTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_before(doc: DocumentId) -> Self {
        Self {
            fail_before: Some(doc),
            ..Self::default()
        }
    }

    pub fn failing_after(doc: DocumentId) -> Self {
        Self {
            fail_after: Some(doc),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<TriggerCall> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn before_count(&self, doc: DocumentId) -> usize {
        self.calls()
            .iter()
            .filter(|c| **c == TriggerCall::Before(doc))
            .count()
    }

    pub fn after_count(&self, doc: DocumentId) -> usize {
        self.calls()
            .iter()
            .filter(|c| **c == TriggerCall::After(doc))
            .count()
    }

    fn record(&self, call: TriggerCall) {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(call);
    }
}

impl DocumentTrigger for RecordingTrigger {
    fn before_update(&self, _txn: &Transaction, doc: DocumentId) -> TriggerResult<()> {
        self.record(TriggerCall::Before(doc));
        if self.fail_before == Some(doc) {
            return Err(TriggerError::before(doc, "rejected by trigger"));
        }
        Ok(())
    }

    fn after_update(&self, _txn: &Transaction, doc: DocumentId) -> TriggerResult<()> {
        self.record(TriggerCall::After(doc));
        if self.fail_after == Some(doc) {
            return Err(TriggerError::after(doc, "after-update hook failed"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_triggers() {
        assert!(NoTriggers.trigger_for(DocumentId(1)).is_none());
    }

    #[test]
    fn test_table_lookup_and_fallback() {
        let specific: Arc<dyn DocumentTrigger> = Arc::new(RecordingTrigger::new());
        let table = TriggerTable::new().with_trigger(DocumentId(1), Arc::clone(&specific));
        assert!(table.trigger_for(DocumentId(1)).is_some());
        assert!(table.trigger_for(DocumentId(2)).is_none());

        let table = table.with_fallback(Arc::new(RecordingTrigger::new()));
        assert!(table.trigger_for(DocumentId(2)).is_some());
    }

    #[test]
    fn test_recording_trigger() {
        let txn = Transaction::begin();
        let trigger = RecordingTrigger::failing_after(DocumentId(2));
        trigger.before_update(&txn, DocumentId(2)).unwrap();
        assert!(trigger.after_update(&txn, DocumentId(2)).is_err());
        assert_eq!(
            trigger.calls(),
            vec![TriggerCall::Before(DocumentId(2)), TriggerCall::After(DocumentId(2))]
        );
        assert_eq!(trigger.before_count(DocumentId(2)), 1);
    }
}
