//! Invocation-wide hook bookkeeping
//!
//! One [`HookLedger`] lives for one top-level invocation. It guarantees a
//! document's before-hook fires at most once even when several lock
//! bundles touch it, and lets a conditional hold back after-hooks until
//! its last child has finished.

use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard};

use super::{TriggerError, TriggerResult, TriggerService};
use crate::dom::DocumentId;
use crate::observability::{log_event_with_fields, Event};
use crate::txn::Transaction;

#[derive(Debug, Default)]
struct LedgerState {
    before_fired: BTreeSet<DocumentId>,
    pending_after: BTreeSet<DocumentId>,
    deferral_depth: usize,
}

#[derive(Debug, Default)]
pub struct HookLedger {
    state: Mutex<LedgerState>,
}

impl HookLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, LedgerState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// True the first time it is asked about `doc`; false afterwards
    pub fn claim_before(&self, doc: DocumentId) -> bool {
        self.state().before_fired.insert(doc)
    }

    pub fn before_fired(&self, doc: DocumentId) -> bool {
        self.state().before_fired.contains(&doc)
    }

    /// Hold back after-hooks until the matching [`end_deferral`](Self::end_deferral).
    /// Deferrals nest.
    pub fn begin_deferral(&self) {
        self.state().deferral_depth += 1;
    }

    pub fn is_deferring(&self) -> bool {
        self.state().deferral_depth > 0
    }

    pub fn defer_after(&self, doc: DocumentId) {
        self.state().pending_after.insert(doc);
    }

    /// Close one deferral level. Returns the documents whose after-hooks
    /// are now due, which is empty while an outer level is still open.
    pub fn end_deferral(&self) -> BTreeSet<DocumentId> {
        let mut state = self.state();
        state.deferral_depth = state.deferral_depth.saturating_sub(1);
        if state.deferral_depth > 0 {
            return BTreeSet::new();
        }
        std::mem::take(&mut state.pending_after)
    }
}

/// Fire `after_update` for each document in `docs`, in ascending order.
/// Every hook runs; failures are logged and the first one is returned.
pub fn fire_after_hooks(
    service: &dyn TriggerService,
    txn: &Transaction,
    docs: &BTreeSet<DocumentId>,
) -> TriggerResult<()> {
    let mut first: Option<TriggerError> = None;
    for &doc in docs {
        let Some(trigger) = service.trigger_for(doc) else {
            continue;
        };
        if let Err(err) = trigger.after_update(txn, doc) {
            let document = doc.to_string();
            let reason = err.to_string();
            log_event_with_fields(
                Event::TriggerFailed,
                &[("document", &document), ("reason", &reason)],
            );
            first.get_or_insert(err);
        }
    }
    match first {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
