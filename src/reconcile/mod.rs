//! Stale-address reconciliation
//!
//! A batch selects its targets up front, but editing one target can split
//! a page and move targets that have not been processed yet. The batch's
//! [`AddressTable`] subscribes to the store's relocation events for the
//! duration of the batch and rewrites the cached address of every pending
//! handle that moved.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::dom::NodeHandle;
use crate::observability::{log_event_with_fields, Event};
use crate::storage::{DocumentStore, RelocationEvent, RelocationListener, SubscriptionId};

/// The selected handles of one batch, kept current as nodes move
#[derive(Debug)]
pub struct AddressTable {
    handles: Mutex<Vec<NodeHandle>>,
    /// Index of the first handle not yet processed
    cursor: AtomicUsize,
    rewritten: AtomicU64,
}

impl AddressTable {
    pub fn new(handles: Vec<NodeHandle>) -> Arc<Self> {
        Arc::new(Self {
            handles: Mutex::new(handles),
            cursor: AtomicUsize::new(0),
            rewritten: AtomicU64::new(0),
        })
    }

    pub fn len(&self) -> usize {
        self.handles
            .lock()
            .map(|h| h.len())
            .unwrap_or_else(|poisoned| poisoned.into_inner().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current handle at `index`, marking every earlier handle processed
    pub fn take(&self, index: usize) -> Option<NodeHandle> {
        let handles = self
            .handles
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let handle = handles.get(index).copied();
        self.cursor.store(index, Ordering::Release);
        handle
    }

    /// Number of cached addresses rewritten so far
    pub fn rewritten(&self) -> u64 {
        self.rewritten.load(Ordering::Relaxed)
    }
}

impl RelocationListener for AddressTable {
    fn relocated(&self, event: &RelocationEvent) {
        let mut handles = self
            .handles
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let pending = self.cursor.load(Ordering::Acquire);

        for handle in handles.iter_mut().skip(pending) {
            if handle.document == event.document && handle.address == event.old {
                handle.address = event.new;
                self.rewritten.fetch_add(1, Ordering::Relaxed);

                let node = handle.node.to_string();
                let old = event.old.to_string();
                let new = event.new.to_string();
                log_event_with_fields(
                    Event::RelocationApplied,
                    &[("node", &node), ("old", &old), ("new", &new)],
                );
            }
        }
    }
}

/// Keeps an [`AddressTable`] subscribed to a store; unsubscribes on drop
pub struct AddressSubscription<'s> {
    store: &'s dyn DocumentStore,
    id: SubscriptionId,
    table: Arc<AddressTable>,
}

impl<'s> AddressSubscription<'s> {
    pub fn register(store: &'s dyn DocumentStore, table: Arc<AddressTable>) -> Self {
        let id = store.subscribe(Arc::clone(&table) as Arc<dyn RelocationListener>);
        Self { store, id, table }
    }

    pub fn table(&self) -> &AddressTable {
        &self.table
    }
}

impl Drop for AddressSubscription<'_> {
    fn drop(&mut self) {
        self.store.unsubscribe(self.id);
    }
}
