//! Paged in-memory document store

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::document::{NodeData, Slot, StoredDocument};
use super::errors::{StorageError, StorageResult};
use super::page::Moved;
use super::{DocumentStore, RelocationEvent, RelocationListener, StoredNode, SubscriptionId};
use crate::dom::{ContentNode, DocumentId, NodeHandle, NodeId, NodeKind, ParentRef};
use crate::txn::Transaction;

/// Default number of node slots per page
pub const DEFAULT_PAGE_CAPACITY: usize = 64;

/// Kind of a journaled store operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalOp {
    Create,
    Insert,
    Remove,
    Replace,
    UpdateChildren,
    SetValue,
    Store,
    Defragment,
    Flush,
}

impl JournalOp {
    fn is_edit(&self) -> bool {
        matches!(
            self,
            JournalOp::Insert
                | JournalOp::Remove
                | JournalOp::Replace
                | JournalOp::UpdateChildren
                | JournalOp::SetValue
                | JournalOp::Defragment
        )
    }
}

/// One journaled store operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JournalEntry {
    pub txn: Option<Uuid>,
    pub document: Option<DocumentId>,
    pub op: JournalOp,
}

#[derive(Debug, Default)]
struct StoreInner {
    documents: BTreeMap<DocumentId, StoredDocument>,
    next_document: u32,
    next_node: u64,
    journal: Vec<JournalEntry>,
}

/// In-memory [`DocumentStore`] with paged node placement
pub struct MemoryStore {
    page_capacity: usize,
    inner: Mutex<StoreInner>,
    listeners: Mutex<BTreeMap<SubscriptionId, Arc<dyn RelocationListener>>>,
    next_subscription: AtomicU64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_page_capacity(DEFAULT_PAGE_CAPACITY)
    }

    /// Small capacities make page splits (and relocations) frequent
    pub fn with_page_capacity(page_capacity: usize) -> Self {
        Self {
            page_capacity,
            inner: Mutex::new(StoreInner {
                next_document: 1,
                next_node: 1,
                ..StoreInner::default()
            }),
            listeners: Mutex::new(BTreeMap::new()),
            next_subscription: AtomicU64::new(1),
        }
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, StoreInner>> {
        self.inner.lock().map_err(|_| StorageError::poisoned())
    }

    /// Create a document whose single top-level node is `root`
    pub fn create_document(&self, name: impl Into<String>, root: ContentNode) -> StorageResult<DocumentId> {
        let mut inner = self.lock()?;
        let id = DocumentId(inner.next_document);
        inner.next_document += 1;

        let mut doc = StoredDocument::new(id, name.into(), self.page_capacity);
        let mut moved = Vec::new();
        doc.insert(Slot::Child(None, 0), &root, &mut inner.next_node, &mut moved)?;
        doc.checksum = Some(doc.checksum()?);
        doc.dirty = false;

        inner.documents.insert(id, doc);
        inner.journal.push(JournalEntry {
            txn: None,
            document: Some(id),
            op: JournalOp::Create,
        });
        Ok(id)
    }

    pub fn last_modified(&self, doc: DocumentId) -> StorageResult<DateTime<Utc>> {
        self.read(doc, |d| Ok(d.last_modified))
    }

    pub fn page_count(&self, doc: DocumentId) -> StorageResult<usize> {
        self.read(doc, |d| Ok(d.chain.page_count()))
    }

    /// Copy of the operation journal
    pub fn journal(&self) -> Vec<JournalEntry> {
        self.inner
            .lock()
            .map(|inner| inner.journal.clone())
            .unwrap_or_default()
    }

    /// Number of relocation listeners currently subscribed
    pub fn listener_count(&self) -> usize {
        self.listeners
            .lock()
            .map(|l| l.len())
            .unwrap_or_default()
    }

    fn read<T>(
        &self,
        doc: DocumentId,
        f: impl FnOnce(&StoredDocument) -> StorageResult<T>,
    ) -> StorageResult<T> {
        let inner = self.lock()?;
        let document = inner
            .documents
            .get(&doc)
            .ok_or_else(|| StorageError::document_not_found(doc))?;
        f(document)
    }

    /// Run an edit against one document, journal it, then publish any
    /// relocations it caused. A failed edit leaves the document exactly as
    /// it was: nothing is journaled and no relocation is published.
    fn write<T>(
        &self,
        txn: Option<&Transaction>,
        doc: DocumentId,
        op: JournalOp,
        f: impl FnOnce(&mut StoredDocument, &mut u64, &mut Vec<Moved>) -> StorageResult<T>,
    ) -> StorageResult<T> {
        let mut moved = Vec::new();
        let result = {
            let mut guard = self.lock()?;
            let inner = &mut *guard;
            let document = inner
                .documents
                .get_mut(&doc)
                .ok_or_else(|| StorageError::document_not_found(doc))?;
            let snapshot = op.is_edit().then(|| document.clone());
            let result = f(document, &mut inner.next_node, &mut moved);
            match (&result, snapshot) {
                (Ok(_), _) => {
                    if op.is_edit() {
                        document.dirty = true;
                    }
                    inner.journal.push(JournalEntry {
                        txn: txn.map(Transaction::id),
                        document: Some(doc),
                        op,
                    });
                }
                (Err(_), Some(before)) => {
                    *document = before;
                    moved.clear();
                }
                (Err(_), None) => {}
            }
            result
        };
        self.publish(doc, &moved);
        result
    }

    fn publish(&self, doc: DocumentId, moved: &[Moved]) {
        if moved.is_empty() {
            return;
        }
        let listeners: Vec<Arc<dyn RelocationListener>> = match self.listeners.lock() {
            Ok(l) => l.values().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().values().cloned().collect(),
        };
        for m in moved {
            let event = RelocationEvent {
                document: doc,
                old: m.old,
                new: m.new,
            };
            for listener in &listeners {
                listener.relocated(&event);
            }
        }
    }
}

fn parent_slot(d: &StoredDocument, parent: &ParentRef) -> StorageResult<Option<NodeId>> {
    match parent {
        ParentRef::Element(handle) => {
            let id = d.resolve(handle)?;
            if d.record(id)?.data.kind() != NodeKind::Element {
                return Err(StorageError::structure(d.id, format!("node {} is not an element", id)));
            }
            Ok(Some(id))
        }
        ParentRef::Document(doc) if *doc == d.id => Ok(None),
        ParentRef::Document(doc) => Err(StorageError::structure(
            d.id,
            format!("parent {} is a different document", doc),
        )),
    }
}

/// Place `content` as children of `parent` starting at `child_at`.
/// Attribute items go to the end of the parent's attribute list.
fn place_children(
    d: &mut StoredDocument,
    parent: Option<NodeId>,
    mut child_at: usize,
    content: &[ContentNode],
    next_node: &mut u64,
    moved: &mut Vec<Moved>,
) -> StorageResult<()> {
    for item in content {
        match (item, parent) {
            (ContentNode::Attribute { .. }, Some(owner)) => {
                let at = d.record(owner)?.attributes.len();
                d.insert(Slot::Attribute(owner, at), item, next_node, moved)?;
            }
            _ => {
                d.insert(Slot::Child(parent, child_at), item, next_node, moved)?;
                child_at += 1;
            }
        }
    }
    Ok(())
}

fn place_attributes(
    d: &mut StoredDocument,
    owner: NodeId,
    mut at: usize,
    content: &[ContentNode],
    next_node: &mut u64,
    moved: &mut Vec<Moved>,
) -> StorageResult<()> {
    for item in content {
        d.insert(Slot::Attribute(owner, at), item, next_node, moved)?;
        at += 1;
    }
    Ok(())
}

/// Sibling insertion shared by insert-before and insert-after
fn insert_sibling(
    d: &mut StoredDocument,
    parent: &ParentRef,
    reference: &NodeHandle,
    content: &[ContentNode],
    after: bool,
    next_node: &mut u64,
    moved: &mut Vec<Moved>,
) -> StorageResult<()> {
    let r = d.resolve(reference)?;
    let p = parent_slot(d, parent)?;
    let offset = usize::from(after);

    if d.record(r)?.data.kind() == NodeKind::Attribute {
        let owner = p.ok_or_else(|| StorageError::structure(d.id, "attribute has no owning element"))?;
        if let Some(bad) = content.iter().find(|c| c.kind() != NodeKind::Attribute) {
            return Err(StorageError::invalid_content(
                d.id,
                format!("only attributes can be inserted next to an attribute, got {}", bad.kind()),
            ));
        }
        let at = d.attribute_index(owner, r)? + offset;
        return place_attributes(d, owner, at, content, next_node, moved);
    }

    let at = d.child_index(p, r)? + offset;
    place_children(d, p, at, content, next_node, moved)
}

impl DocumentStore for MemoryStore {
    fn node(&self, handle: &NodeHandle) -> StorageResult<StoredNode> {
        self.read(handle.document, |d| {
            let record = d.record(d.resolve(handle)?)?;
            Ok(StoredNode {
                handle: *handle,
                kind: record.data.kind(),
                name: record.data.name().cloned(),
                value: record.data.value().map(str::to_string),
            })
        })
    }

    fn root_element(&self, doc: DocumentId) -> StorageResult<Option<NodeHandle>> {
        self.read(doc, |d| d.root_element().map(|id| d.handle(id)).transpose())
    }

    fn top_level(&self, doc: DocumentId) -> StorageResult<Vec<NodeHandle>> {
        self.read(doc, |d| d.top.iter().map(|&id| d.handle(id)).collect())
    }

    fn children(&self, handle: &NodeHandle) -> StorageResult<Vec<NodeHandle>> {
        self.read(handle.document, |d| {
            let record = d.record(d.resolve(handle)?)?;
            record.children.iter().map(|&c| d.handle(c)).collect()
        })
    }

    fn attributes(&self, handle: &NodeHandle) -> StorageResult<Vec<NodeHandle>> {
        self.read(handle.document, |d| {
            let record = d.record(d.resolve(handle)?)?;
            record.attributes.iter().map(|&a| d.handle(a)).collect()
        })
    }

    fn parent(&self, handle: &NodeHandle) -> StorageResult<Option<ParentRef>> {
        self.read(handle.document, |d| {
            let record = d.record(d.resolve(handle)?)?;
            if record.data.kind() == NodeKind::Attribute {
                return Ok(None);
            }
            match record.parent {
                Some(p) => Ok(Some(ParentRef::Element(d.handle(p)?))),
                None => Ok(Some(ParentRef::Document(d.id))),
            }
        })
    }

    fn owner_element(&self, handle: &NodeHandle) -> StorageResult<Option<NodeHandle>> {
        self.read(handle.document, |d| {
            let record = d.record(d.resolve(handle)?)?;
            match (record.data.kind(), record.parent) {
                (NodeKind::Attribute, Some(owner)) => d.handle(owner).map(Some),
                _ => Ok(None),
            }
        })
    }

    fn string_value(&self, handle: &NodeHandle) -> StorageResult<String> {
        self.read(handle.document, |d| d.string_value(d.resolve(handle)?))
    }

    fn export(&self, handle: &NodeHandle) -> StorageResult<ContentNode> {
        self.read(handle.document, |d| d.export(d.resolve(handle)?))
    }

    fn serialize(&self, doc: DocumentId) -> StorageResult<String> {
        self.read(doc, StoredDocument::serialize)
    }

    fn append_children(
        &self,
        txn: &Transaction,
        parent: &NodeHandle,
        index: Option<usize>,
        content: &[ContentNode],
    ) -> StorageResult<()> {
        self.write(Some(txn), parent.document, JournalOp::Insert, |d, next, moved| {
            let p = d.resolve(parent)?;
            let record = d.record(p)?;
            if record.data.kind() != NodeKind::Element {
                return Err(StorageError::structure(
                    d.id,
                    format!("cannot append children to a {} node", record.data.kind()),
                ));
            }
            let len = record.children.len();
            let at = index.map_or(len, |i| i.min(len));
            place_children(d, Some(p), at, content, next, moved)
        })
    }

    fn insert_before(
        &self,
        txn: &Transaction,
        parent: &ParentRef,
        reference: &NodeHandle,
        content: &[ContentNode],
    ) -> StorageResult<()> {
        self.write(Some(txn), reference.document, JournalOp::Insert, |d, next, moved| {
            insert_sibling(d, parent, reference, content, false, next, moved)
        })
    }

    fn insert_after(
        &self,
        txn: &Transaction,
        parent: &ParentRef,
        reference: &NodeHandle,
        content: &[ContentNode],
    ) -> StorageResult<()> {
        self.write(Some(txn), reference.document, JournalOp::Insert, |d, next, moved| {
            insert_sibling(d, parent, reference, content, true, next, moved)
        })
    }

    fn remove_child(&self, txn: &Transaction, parent: &ParentRef, child: &NodeHandle) -> StorageResult<()> {
        self.write(Some(txn), child.document, JournalOp::Remove, |d, _, _| {
            let c = d.resolve(child)?;
            let p = parent_slot(d, parent)?;
            if d.record(c)?.data.kind() == NodeKind::Attribute {
                let owner = p.ok_or_else(|| StorageError::structure(d.id, "attribute has no owning element"))?;
                d.attribute_index(owner, c)?;
            } else {
                d.child_index(p, c)?;
            }
            d.remove(c)
        })
    }

    fn replace_child(
        &self,
        txn: &Transaction,
        parent: &ParentRef,
        old: &NodeHandle,
        replacement: &ContentNode,
    ) -> StorageResult<NodeHandle> {
        self.write(Some(txn), old.document, JournalOp::Replace, |d, next, moved| {
            let o = d.resolve(old)?;
            let p = parent_slot(d, parent)?;
            let old_is_attribute = d.record(o)?.data.kind() == NodeKind::Attribute;
            let new_is_attribute = replacement.kind() == NodeKind::Attribute;
            if old_is_attribute != new_is_attribute {
                return Err(StorageError::invalid_content(
                    d.id,
                    format!(
                        "cannot replace a {} node with a {} node",
                        d.record(o)?.data.kind(),
                        replacement.kind()
                    ),
                ));
            }

            let slot = if old_is_attribute {
                let owner = p.ok_or_else(|| StorageError::structure(d.id, "attribute has no owning element"))?;
                Slot::Attribute(owner, d.attribute_index(owner, o)?)
            } else {
                if p.is_none() && replacement.kind() == NodeKind::Text {
                    return Err(StorageError::invalid_content(d.id, "text cannot be placed at document level"));
                }
                Slot::Child(p, d.child_index(p, o)?)
            };

            d.remove(o)?;
            let id = d.insert(slot, replacement, next, moved)?;
            d.handle(id)
        })
    }

    fn update_children(
        &self,
        txn: &Transaction,
        element: &NodeHandle,
        content: &[ContentNode],
    ) -> StorageResult<()> {
        self.write(Some(txn), element.document, JournalOp::UpdateChildren, |d, next, moved| {
            let e = d.resolve(element)?;
            let record = d.record(e)?;
            if record.data.kind() != NodeKind::Element {
                return Err(StorageError::structure(
                    d.id,
                    format!("cannot replace the children of a {} node", record.data.kind()),
                ));
            }
            for child in record.children.clone() {
                d.remove(child)?;
            }
            place_children(d, Some(e), 0, content, next, moved)
        })
    }

    fn set_value(&self, txn: &Transaction, node: &NodeHandle, value: &str) -> StorageResult<()> {
        self.write(Some(txn), node.document, JournalOp::SetValue, |d, _, _| {
            let id = d.resolve(node)?;
            let doc = d.id;
            let record = d
                .nodes
                .get_mut(&id)
                .ok_or_else(|| StorageError::node_not_found(doc, id))?;
            match &mut record.data {
                NodeData::Element(_) => Err(StorageError::structure(doc, "an element has no value to set")),
                NodeData::Attribute(_, v)
                | NodeData::Text(v)
                | NodeData::Comment(v)
                | NodeData::ProcessingInstruction(_, v) => {
                    *v = value.to_string();
                    Ok(())
                }
            }
        })
    }

    fn subscribe(&self, listener: Arc<dyn RelocationListener>) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        match self.listeners.lock() {
            Ok(mut l) => l.insert(id, listener),
            Err(poisoned) => poisoned.into_inner().insert(id, listener),
        };
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        match self.listeners.lock() {
            Ok(mut l) => l.remove(&id),
            Err(poisoned) => poisoned.into_inner().remove(&id),
        };
    }

    fn store_document(
        &self,
        txn: &Transaction,
        doc: DocumentId,
        last_modified: DateTime<Utc>,
    ) -> StorageResult<()> {
        self.write(Some(txn), doc, JournalOp::Store, |d, _, _| {
            d.last_modified = last_modified;
            d.checksum = Some(d.checksum()?);
            d.dirty = false;
            Ok(())
        })
    }

    fn flush(&self) -> StorageResult<()> {
        let mut inner = self.lock()?;
        inner.journal.push(JournalEntry {
            txn: None,
            document: None,
            op: JournalOp::Flush,
        });
        Ok(())
    }

    fn split_count(&self, doc: DocumentId) -> StorageResult<u32> {
        self.read(doc, |d| Ok(d.chain.split_count()))
    }

    fn defragment(&self, txn: &Transaction, doc: DocumentId) -> StorageResult<()> {
        self.write(Some(txn), doc, JournalOp::Defragment, |d, _, moved| {
            let order = d.document_order()?;
            let relocated = d.chain.repack(&order);
            d.apply_moves(&relocated);
            moved.extend(relocated);
            Ok(())
        })
    }

    fn check_consistency(&self, doc: DocumentId) -> StorageResult<()> {
        self.read(doc, StoredDocument::check)
    }
}
