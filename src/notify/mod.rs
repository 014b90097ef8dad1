//! Update notifications
//!
//! Listeners registered on a [`NotificationService`] hear about every node
//! an operator edits, right after the owning document is stored.

use std::sync::{Arc, RwLock};

use crate::dom::{DocumentId, NodeHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    Update,
}

pub trait UpdateListener: Send + Sync {
    fn document_updated(&self, kind: UpdateKind, doc: DocumentId, node: &NodeHandle);
}

/// Fan-out of update notifications to registered listeners
#[derive(Default)]
pub struct NotificationService {
    listeners: RwLock<Vec<Arc<dyn UpdateListener>>>,
}

impl NotificationService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, listener: Arc<dyn UpdateListener>) {
        self.listeners
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(listener);
    }

    pub fn notify(&self, kind: UpdateKind, doc: DocumentId, node: &NodeHandle) {
        let listeners = self
            .listeners
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for listener in listeners.iter() {
            listener.document_updated(kind, doc, node);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().map(|l| l.len()).unwrap_or(0)
    }
}
