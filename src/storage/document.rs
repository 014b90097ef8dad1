//! In-memory document: logical tree plus its page chain

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use crc32fast::Hasher;

use super::errors::{StorageError, StorageResult};
use super::page::{Moved, PageChain};
use crate::dom::{Address, ContentNode, DocumentId, NodeHandle, NodeId, NodeKind, QName};

#[derive(Debug, Clone)]
pub(crate) enum NodeData {
    Element(QName),
    Attribute(QName, String),
    Text(String),
    Comment(String),
    ProcessingInstruction(String, String),
}

impl NodeData {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeData::Element(_) => NodeKind::Element,
            NodeData::Attribute(..) => NodeKind::Attribute,
            NodeData::Text(_) => NodeKind::Text,
            NodeData::Comment(_) => NodeKind::Comment,
            NodeData::ProcessingInstruction(..) => NodeKind::ProcessingInstruction,
        }
    }

    pub fn name(&self) -> Option<&QName> {
        match self {
            NodeData::Element(name) | NodeData::Attribute(name, _) => Some(name),
            _ => None,
        }
    }

    pub fn value(&self) -> Option<&str> {
        match self {
            NodeData::Element(_) => None,
            NodeData::Attribute(_, value)
            | NodeData::Text(value)
            | NodeData::Comment(value)
            | NodeData::ProcessingInstruction(_, value) => Some(value),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct NodeRecord {
    pub data: NodeData,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub attributes: Vec<NodeId>,
    pub address: Address,
}

/// Where a new node goes in the logical tree
#[derive(Debug, Clone, Copy)]
pub(crate) enum Slot {
    /// Child list of an element, or the document level when `None`
    Child(Option<NodeId>, usize),
    /// Attribute list of an element
    Attribute(NodeId, usize),
}

#[derive(Debug, Clone)]
pub(crate) struct StoredDocument {
    pub id: DocumentId,
    pub name: String,
    pub top: Vec<NodeId>,
    pub nodes: HashMap<NodeId, NodeRecord>,
    pub chain: PageChain,
    pub last_modified: DateTime<Utc>,
    pub checksum: Option<u32>,
    pub dirty: bool,
}

impl StoredDocument {
    pub fn new(id: DocumentId, name: String, page_capacity: usize) -> Self {
        Self {
            id,
            name,
            top: Vec::new(),
            nodes: HashMap::new(),
            chain: PageChain::new(page_capacity),
            last_modified: Utc::now(),
            checksum: None,
            dirty: true,
        }
    }

    pub fn record(&self, node: NodeId) -> StorageResult<&NodeRecord> {
        self.nodes
            .get(&node)
            .ok_or_else(|| StorageError::node_not_found(self.id, node))
    }

    fn record_mut(&mut self, node: NodeId) -> StorageResult<&mut NodeRecord> {
        let id = self.id;
        self.nodes
            .get_mut(&node)
            .ok_or_else(|| StorageError::node_not_found(id, node))
    }

    pub fn handle(&self, node: NodeId) -> StorageResult<NodeHandle> {
        Ok(NodeHandle::new(self.id, node, self.record(node)?.address))
    }

    /// Check that `handle` still addresses its node and return the node id
    pub fn resolve(&self, handle: &NodeHandle) -> StorageResult<NodeId> {
        match self.chain.locate(handle.address) {
            Some(node) if node == handle.node => Ok(node),
            _ if self.nodes.contains_key(&handle.node) => Err(StorageError::stale_address(handle)),
            _ => Err(StorageError::node_not_found(self.id, handle.node)),
        }
    }

    pub fn root_element(&self) -> Option<NodeId> {
        self.top.iter().copied().find(|id| {
            self.nodes
                .get(id)
                .map(|r| r.data.kind() == NodeKind::Element)
                .unwrap_or(false)
        })
    }

    pub fn siblings(&self, parent: Option<NodeId>) -> StorageResult<&Vec<NodeId>> {
        match parent {
            Some(p) => Ok(&self.record(p)?.children),
            None => Ok(&self.top),
        }
    }

    fn siblings_mut(&mut self, parent: Option<NodeId>) -> StorageResult<&mut Vec<NodeId>> {
        match parent {
            Some(p) => Ok(&mut self.record_mut(p)?.children),
            None => Ok(&mut self.top),
        }
    }

    /// Index of `child` in its parent's child list
    pub fn child_index(&self, parent: Option<NodeId>, child: NodeId) -> StorageResult<usize> {
        self.siblings(parent)?
            .iter()
            .position(|&c| c == child)
            .ok_or_else(|| {
                StorageError::structure(self.id, format!("node {} is not a child of the given parent", child))
            })
    }

    pub fn attribute_index(&self, owner: NodeId, attr: NodeId) -> StorageResult<usize> {
        self.record(owner)?
            .attributes
            .iter()
            .position(|&a| a == attr)
            .ok_or_else(|| {
                StorageError::structure(self.id, format!("node {} is not an attribute of node {}", attr, owner))
            })
    }

    /// Last node of the subtree rooted at `node`, in document order
    fn last_in_subtree(&self, node: NodeId) -> StorageResult<NodeId> {
        let record = self.record(node)?;
        if let Some(&last) = record.children.last() {
            return self.last_in_subtree(last);
        }
        Ok(record.attributes.last().copied().unwrap_or(node))
    }

    /// Node that precedes a new node placed at `slot`, in document order
    fn preceding(&self, slot: Slot) -> StorageResult<Option<NodeId>> {
        match slot {
            Slot::Attribute(owner, index) => {
                let attrs = &self.record(owner)?.attributes;
                Ok(Some(if index > 0 { attrs[index - 1] } else { owner }))
            }
            Slot::Child(parent, index) => {
                let siblings = self.siblings(parent)?;
                if index > 0 {
                    return self.last_in_subtree(siblings[index - 1]).map(Some);
                }
                match parent {
                    Some(p) => Ok(Some(self.record(p)?.attributes.last().copied().unwrap_or(p))),
                    None => Ok(None),
                }
            }
        }
    }

    fn address_of(&self, node: Option<NodeId>) -> StorageResult<Option<Address>> {
        node.map(|n| self.record(n).map(|r| r.address)).transpose()
    }

    /// Insert `content` at `slot`, creating records and placing every new
    /// node in the page chain. Returns the id of the new subtree root.
    pub fn insert(
        &mut self,
        slot: Slot,
        content: &ContentNode,
        next_node: &mut u64,
        moved: &mut Vec<Moved>,
    ) -> StorageResult<NodeId> {
        self.check_placement(slot, content)?;

        let id = NodeId(*next_node);
        *next_node += 1;
        let (data, attributes, children) = match content {
            ContentNode::Element {
                name,
                attributes,
                children,
            } => (NodeData::Element(name.clone()), attributes.as_slice(), children.as_slice()),
            ContentNode::Attribute { name, value } => {
                (NodeData::Attribute(name.clone(), value.clone()), &[][..], &[][..])
            }
            ContentNode::Text { value } => (NodeData::Text(value.clone()), &[][..], &[][..]),
            ContentNode::Comment { value } => (NodeData::Comment(value.clone()), &[][..], &[][..]),
            ContentNode::ProcessingInstruction { target, data } => (
                NodeData::ProcessingInstruction(target.clone(), data.clone()),
                &[][..],
                &[][..],
            ),
        };

        let parent = match slot {
            Slot::Child(parent, _) => parent,
            Slot::Attribute(owner, _) => Some(owner),
        };
        match slot {
            Slot::Child(parent, index) => self.siblings_mut(parent)?.insert(index, id),
            Slot::Attribute(owner, index) => self.record_mut(owner)?.attributes.insert(index, id),
        }
        self.nodes.insert(
            id,
            NodeRecord {
                data,
                parent,
                children: Vec::new(),
                attributes: Vec::new(),
                address: Address::new(0, 0),
            },
        );

        let prev = self.address_of(self.preceding(slot)?)?;
        let already_moved = moved.len();
        let address = self
            .chain
            .insert_after(prev, id, moved)
            .ok_or_else(|| StorageError::inconsistent(self.id, "preceding node has no slot"))?;
        self.apply_moves(&moved[already_moved..]);
        self.record_mut(id)?.address = address;

        for (index, (name, value)) in attributes.iter().enumerate() {
            let attr = ContentNode::Attribute {
                name: name.clone(),
                value: value.clone(),
            };
            self.insert(Slot::Attribute(id, index), &attr, next_node, moved)?;
        }
        for (index, child) in children.iter().enumerate() {
            self.insert(Slot::Child(Some(id), index), child, next_node, moved)?;
        }
        Ok(id)
    }

    fn check_placement(&self, slot: Slot, content: &ContentNode) -> StorageResult<()> {
        match (slot, content) {
            (Slot::Attribute(owner, _), ContentNode::Attribute { name, .. }) => {
                let duplicate = self.record(owner)?.attributes.iter().any(|a| {
                    self.nodes
                        .get(a)
                        .and_then(|r| r.data.name())
                        .map(|n| n.matches(name))
                        .unwrap_or(false)
                });
                if duplicate {
                    return Err(StorageError::invalid_content(
                        self.id,
                        format!("attribute {} is already present", name),
                    ));
                }
                Ok(())
            }
            (Slot::Attribute(..), other) => Err(StorageError::invalid_content(
                self.id,
                format!("a {} node cannot be placed as an attribute", other.kind()),
            )),
            (Slot::Child(..), ContentNode::Attribute { .. }) => Err(StorageError::invalid_content(
                self.id,
                "an attribute cannot be placed as a child node",
            )),
            (Slot::Child(None, _), ContentNode::Element { .. }) if self.root_element().is_some() => {
                Err(StorageError::invalid_content(
                    self.id,
                    "a document can have only one root element",
                ))
            }
            (Slot::Child(None, _), ContentNode::Text { .. }) => Err(StorageError::invalid_content(
                self.id,
                "text cannot be placed at document level",
            )),
            _ => Ok(()),
        }
    }

    pub fn apply_moves(&mut self, moved: &[Moved]) {
        for m in moved {
            if let Some(record) = self.nodes.get_mut(&m.node) {
                record.address = m.new;
            }
        }
    }

    /// Detach `node` and drop its whole subtree
    pub fn remove(&mut self, node: NodeId) -> StorageResult<()> {
        let record = self.record(node)?;
        let parent = record.parent;
        let is_attribute = record.data.kind() == NodeKind::Attribute;
        match (parent, is_attribute) {
            (Some(owner), true) => self.record_mut(owner)?.attributes.retain(|&a| a != node),
            (parent, _) => self.siblings_mut(parent)?.retain(|&c| c != node),
        }

        let mut doomed = Vec::new();
        self.collect_subtree(node, &mut doomed)?;
        for id in doomed {
            if let Some(record) = self.nodes.remove(&id) {
                self.chain.remove(record.address);
            }
        }
        Ok(())
    }

    fn collect_subtree(&self, node: NodeId, out: &mut Vec<NodeId>) -> StorageResult<()> {
        out.push(node);
        let record = self.record(node)?;
        out.extend(record.attributes.iter().copied());
        for &child in &record.children {
            self.collect_subtree(child, out)?;
        }
        Ok(())
    }

    /// All node ids in document order
    pub fn document_order(&self) -> StorageResult<Vec<NodeId>> {
        let mut order = Vec::with_capacity(self.nodes.len());
        for &node in &self.top {
            self.collect_subtree(node, &mut order)?;
        }
        Ok(order)
    }

    /// Deep copy of a stored subtree
    pub fn export(&self, node: NodeId) -> StorageResult<ContentNode> {
        let record = self.record(node)?;
        Ok(match &record.data {
            NodeData::Element(name) => {
                let mut attributes = Vec::with_capacity(record.attributes.len());
                for attr in &record.attributes {
                    if let NodeData::Attribute(n, v) = &self.record(*attr)?.data {
                        attributes.push((n.clone(), v.clone()));
                    }
                }
                let children = record
                    .children
                    .iter()
                    .map(|&c| self.export(c))
                    .collect::<StorageResult<Vec<_>>>()?;
                ContentNode::Element {
                    name: name.clone(),
                    attributes,
                    children,
                }
            }
            NodeData::Attribute(name, value) => ContentNode::Attribute {
                name: name.clone(),
                value: value.clone(),
            },
            NodeData::Text(value) => ContentNode::text(value.clone()),
            NodeData::Comment(value) => ContentNode::comment(value.clone()),
            NodeData::ProcessingInstruction(target, data) => {
                ContentNode::processing_instruction(target.clone(), data.clone())
            }
        })
    }

    pub fn string_value(&self, node: NodeId) -> StorageResult<String> {
        Ok(self.export(node)?.string_value())
    }

    pub fn serialize(&self) -> StorageResult<String> {
        let mut out = String::new();
        for &node in &self.top {
            self.write_node(node, &mut out)?;
        }
        Ok(out)
    }

    fn write_node(&self, node: NodeId, out: &mut String) -> StorageResult<()> {
        let record = self.record(node)?;
        match &record.data {
            NodeData::Element(name) => {
                out.push('<');
                out.push_str(&name.lexical());
                for attr in &record.attributes {
                    if let NodeData::Attribute(n, v) = &self.record(*attr)?.data {
                        out.push(' ');
                        out.push_str(&n.lexical());
                        out.push_str("=\"");
                        escape(v, true, out);
                        out.push('"');
                    }
                }
                if record.children.is_empty() {
                    out.push_str("/>");
                } else {
                    out.push('>');
                    for &child in &record.children {
                        self.write_node(child, out)?;
                    }
                    out.push_str("</");
                    out.push_str(&name.lexical());
                    out.push('>');
                }
            }
            NodeData::Attribute(name, value) => {
                out.push_str(&name.lexical());
                out.push_str("=\"");
                escape(value, true, out);
                out.push('"');
            }
            NodeData::Text(value) => escape(value, false, out),
            NodeData::Comment(value) => {
                out.push_str("<!--");
                out.push_str(value);
                out.push_str("-->");
            }
            NodeData::ProcessingInstruction(target, data) => {
                out.push_str("<?");
                out.push_str(target);
                if !data.is_empty() {
                    out.push(' ');
                    out.push_str(data);
                }
                out.push_str("?>");
            }
        }
        Ok(())
    }

    pub fn checksum(&self) -> StorageResult<u32> {
        let mut hasher = Hasher::new();
        hasher.update(self.serialize()?.as_bytes());
        Ok(hasher.finalize())
    }

    /// Structural consistency: chain ↔ records, parent links, page order,
    /// and the checksum taken at the last store.
    pub fn check(&self) -> StorageResult<()> {
        let slots = self.chain.slots();
        if slots.len() != self.nodes.len() {
            return Err(StorageError::inconsistent(
                self.id,
                format!("{} slots for {} nodes", slots.len(), self.nodes.len()),
            ));
        }
        for (address, node) in &slots {
            let record = self.nodes.get(node).ok_or_else(|| {
                StorageError::inconsistent(self.id, format!("slot {} holds unknown node {}", address, node))
            })?;
            if record.address != *address {
                return Err(StorageError::inconsistent(
                    self.id,
                    format!("node {} records address {} but lives at {}", node, record.address, address),
                ));
            }
        }

        for (&id, record) in &self.nodes {
            for &child in record.children.iter().chain(record.attributes.iter()) {
                let parent = self.record(child)?.parent;
                if parent != Some(id) {
                    return Err(StorageError::inconsistent(
                        self.id,
                        format!("node {} is listed under {} but points to {:?}", child, id, parent),
                    ));
                }
            }
        }

        let chain_order: Vec<NodeId> = slots.into_iter().map(|(_, n)| n).collect();
        if chain_order != self.document_order()? {
            return Err(StorageError::inconsistent(self.id, "page order differs from document order"));
        }

        if let (Some(expected), false) = (self.checksum, self.dirty) {
            let actual = self.checksum()?;
            if actual != expected {
                return Err(StorageError::inconsistent(
                    self.id,
                    format!("checksum mismatch: stored {:08x}, computed {:08x}", expected, actual),
                ));
            }
        }
        Ok(())
    }
}

fn escape(value: &str, attribute: bool, out: &mut String) {
    for c in value.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' if attribute => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
}
