//! Identifiers and handles for stored nodes

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a stored document
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocumentId(pub u32);

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "doc:{}", self.0)
    }
}

/// Logical node identifier, immutable for the lifetime of the node
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Physical location of a node: page number and tuple id within the page
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address {
    pub page: u32,
    pub tid: u32,
}

impl Address {
    pub fn new(page: u32, tid: u32) -> Self {
        Self { page, tid }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.page, self.tid)
    }
}

/// Kind of a stored node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeKind {
    Element,
    Attribute,
    Text,
    Comment,
    ProcessingInstruction,
}

impl NodeKind {
    /// Returns the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Element => "element",
            NodeKind::Attribute => "attribute",
            NodeKind::Text => "text",
            NodeKind::Comment => "comment",
            NodeKind::ProcessingInstruction => "processing-instruction",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle to a stored node.
///
/// `address` is a cache of where the node lived when the handle was made.
/// The store rejects a handle whose address no longer holds `node`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeHandle {
    pub document: DocumentId,
    pub node: NodeId,
    pub address: Address,
}

impl NodeHandle {
    pub fn new(document: DocumentId, node: NodeId, address: Address) -> Self {
        Self {
            document,
            node,
            address,
        }
    }
}

impl fmt::Display for NodeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.document, self.node, self.address)
    }
}

/// The structural parent of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentRef {
    /// An element node (for attributes: the owning element)
    Element(NodeHandle),
    /// The document itself; the node is at document level
    Document(DocumentId),
}

impl ParentRef {
    pub fn document(&self) -> DocumentId {
        match self {
            ParentRef::Element(handle) => handle.document,
            ParentRef::Document(doc) => *doc,
        }
    }

    pub fn is_element(&self) -> bool {
        matches!(self, ParentRef::Element(_))
    }
}

/// The documents a modification is scoped to. Read-only to the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkingDocumentSet {
    documents: BTreeSet<DocumentId>,
}

impl WorkingDocumentSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of(documents: impl IntoIterator<Item = DocumentId>) -> Self {
        Self {
            documents: documents.into_iter().collect(),
        }
    }

    pub fn contains(&self, doc: DocumentId) -> bool {
        self.documents.contains(&doc)
    }

    pub fn iter(&self) -> impl Iterator<Item = DocumentId> + '_ {
        self.documents.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

impl FromIterator<DocumentId> for WorkingDocumentSet {
    fn from_iter<I: IntoIterator<Item = DocumentId>>(iter: I) -> Self {
        Self::of(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_display() {
        let handle = NodeHandle::new(DocumentId(3), NodeId(17), Address::new(2, 5));
        assert_eq!(handle.to_string(), "doc:3/17@2:5");
    }

    #[test]
    fn test_working_set_is_ordered_and_deduplicated() {
        let set = WorkingDocumentSet::of([DocumentId(4), DocumentId(1), DocumentId(4)]);
        assert_eq!(set.len(), 2);
        let ids: Vec<_> = set.iter().collect();
        assert_eq!(ids, vec![DocumentId(1), DocumentId(4)]);
    }

    #[test]
    fn test_parent_ref_document() {
        let handle = NodeHandle::new(DocumentId(9), NodeId(1), Address::new(0, 0));
        assert_eq!(ParentRef::Element(handle).document(), DocumentId(9));
        assert!(!ParentRef::Document(DocumentId(9)).is_element());
    }
}
