//! Document store collaborator
//!
//! The engine never touches physical storage directly. Everything it needs
//! goes through [`DocumentStore`]: navigation, the structural edit
//! primitives, relocation events, and the maintenance calls run after a
//! mutation (store, flush, split count, defragment, consistency check).
//!
//! [`MemoryStore`] is the in-crate implementation. It keeps each document's
//! nodes in a chain of fixed-capacity pages in document order, so edits split
//! pages and relocate nodes the same way a disk-backed paged store does.
//!
//! # Relocation
//!
//! Whenever an edit moves a node to a new physical address, the store
//! publishes a [`RelocationEvent`] to every subscribed
//! [`RelocationListener`] after the edit completes and before the edit call
//! returns.

mod document;
mod errors;
mod memory;
mod page;

use std::sync::Arc;

use chrono::{DateTime, Utc};

pub use errors::{StorageError, StorageErrorCode, StorageResult};
pub use memory::{JournalEntry, JournalOp, MemoryStore};

use crate::dom::{Address, ContentNode, DocumentId, NodeHandle, NodeKind, ParentRef, QName};
use crate::txn::Transaction;

/// Snapshot of a stored node, produced by dereferencing a handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredNode {
    pub handle: NodeHandle,
    pub kind: NodeKind,
    /// Element or attribute name
    pub name: Option<QName>,
    /// Value of text, attribute, comment and processing-instruction nodes
    pub value: Option<String>,
}

/// A node's physical address changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelocationEvent {
    pub document: DocumentId,
    pub old: Address,
    pub new: Address,
}

/// Receives relocation events from the store
pub trait RelocationListener: Send + Sync {
    fn relocated(&self, event: &RelocationEvent);
}

/// Registration handle returned by [`DocumentStore::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(pub u64);

/// Persistent tree store consumed by the engine
pub trait DocumentStore: Send + Sync {
    // Navigation

    /// Dereference a handle. Fails with `XMUT_STALE_ADDRESS` if the cached
    /// address no longer holds the node.
    fn node(&self, handle: &NodeHandle) -> StorageResult<StoredNode>;

    fn root_element(&self, doc: DocumentId) -> StorageResult<Option<NodeHandle>>;

    /// Children of the document node: the root element plus any comments
    /// and processing instructions around it, in document order
    fn top_level(&self, doc: DocumentId) -> StorageResult<Vec<NodeHandle>>;

    fn children(&self, handle: &NodeHandle) -> StorageResult<Vec<NodeHandle>>;

    fn attributes(&self, handle: &NodeHandle) -> StorageResult<Vec<NodeHandle>>;

    /// Structural parent. `None` for attributes, which have an owner
    /// element instead of a parent.
    fn parent(&self, handle: &NodeHandle) -> StorageResult<Option<ParentRef>>;

    /// Owning element of an attribute; `None` for every other kind
    fn owner_element(&self, handle: &NodeHandle) -> StorageResult<Option<NodeHandle>>;

    fn string_value(&self, handle: &NodeHandle) -> StorageResult<String>;

    /// Deep copy of the subtree rooted at `handle`
    fn export(&self, handle: &NodeHandle) -> StorageResult<ContentNode>;

    fn serialize(&self, doc: DocumentId) -> StorageResult<String>;

    // Edit primitives

    /// Insert `content` as children of `parent` at 0-based `index`, or at the
    /// end when `index` is `None` or past the last child. Attribute content
    /// becomes attributes of `parent`.
    fn append_children(
        &self,
        txn: &Transaction,
        parent: &NodeHandle,
        index: Option<usize>,
        content: &[ContentNode],
    ) -> StorageResult<()>;

    fn insert_before(
        &self,
        txn: &Transaction,
        parent: &ParentRef,
        reference: &NodeHandle,
        content: &[ContentNode],
    ) -> StorageResult<()>;

    fn insert_after(
        &self,
        txn: &Transaction,
        parent: &ParentRef,
        reference: &NodeHandle,
        content: &[ContentNode],
    ) -> StorageResult<()>;

    fn remove_child(&self, txn: &Transaction, parent: &ParentRef, child: &NodeHandle) -> StorageResult<()>;

    /// Substitute `old` with a new node built from `replacement`, at the same
    /// position. Returns the handle of the new node.
    fn replace_child(
        &self,
        txn: &Transaction,
        parent: &ParentRef,
        old: &NodeHandle,
        replacement: &ContentNode,
    ) -> StorageResult<NodeHandle>;

    /// Replace all child nodes of an element with `content`
    fn update_children(
        &self,
        txn: &Transaction,
        element: &NodeHandle,
        content: &[ContentNode],
    ) -> StorageResult<()>;

    /// Set the value of a text, attribute, comment or PI node in place
    fn set_value(&self, txn: &Transaction, node: &NodeHandle, value: &str) -> StorageResult<()>;

    // Relocation events

    fn subscribe(&self, listener: Arc<dyn RelocationListener>) -> SubscriptionId;

    fn unsubscribe(&self, id: SubscriptionId);

    // Maintenance

    /// Persist the document and record its modification time
    fn store_document(
        &self,
        txn: &Transaction,
        doc: DocumentId,
        last_modified: DateTime<Utc>,
    ) -> StorageResult<()>;

    /// Make pending effects visible to subsequent reads
    fn flush(&self) -> StorageResult<()>;

    /// Number of page splits since the document was last compacted
    fn split_count(&self, doc: DocumentId) -> StorageResult<u32>;

    /// Rewrite the document's pages densely; resets its split count
    fn defragment(&self, txn: &Transaction, doc: DocumentId) -> StorageResult<()>;

    fn check_consistency(&self, doc: DocumentId) -> StorageResult<()>;
}
