//! Detached content fragments supplied to the operators

use serde::{Deserialize, Serialize};

use super::ids::NodeKind;
use super::qname::QName;

/// A node that is not (yet) part of any stored document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ContentNode {
    Element {
        name: QName,
        attributes: Vec<(QName, String)>,
        children: Vec<ContentNode>,
    },
    Attribute {
        name: QName,
        value: String,
    },
    Text {
        value: String,
    },
    Comment {
        value: String,
    },
    ProcessingInstruction {
        target: String,
        data: String,
    },
}

impl ContentNode {
    /// An empty element with an unprefixed name
    pub fn element(name: impl Into<String>) -> Self {
        Self::Element {
            name: QName::local(name),
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn element_named(name: QName) -> Self {
        Self::Element {
            name,
            attributes: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn attribute(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Attribute {
            name: QName::local(name),
            value: value.into(),
        }
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self::Text {
            value: value.into(),
        }
    }

    pub fn comment(value: impl Into<String>) -> Self {
        Self::Comment {
            value: value.into(),
        }
    }

    pub fn processing_instruction(target: impl Into<String>, data: impl Into<String>) -> Self {
        Self::ProcessingInstruction {
            target: target.into(),
            data: data.into(),
        }
    }

    /// Builder: add a child. No effect on non-element nodes.
    pub fn with_child(mut self, child: ContentNode) -> Self {
        if let Self::Element { children, .. } = &mut self {
            children.push(child);
        }
        self
    }

    /// Builder: add an attribute. No effect on non-element nodes.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        if let Self::Element { attributes, .. } = &mut self {
            attributes.push((QName::local(name), value.into()));
        }
        self
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Element { .. } => NodeKind::Element,
            Self::Attribute { .. } => NodeKind::Attribute,
            Self::Text { .. } => NodeKind::Text,
            Self::Comment { .. } => NodeKind::Comment,
            Self::ProcessingInstruction { .. } => NodeKind::ProcessingInstruction,
        }
    }

    /// Name of an element or attribute
    pub fn name(&self) -> Option<&QName> {
        match self {
            Self::Element { name, .. } | Self::Attribute { name, .. } => Some(name),
            _ => None,
        }
    }

    /// XPath string value: concatenated descendant text for elements
    pub fn string_value(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        match self {
            Self::Element { children, .. } => {
                for child in children {
                    if matches!(child, Self::Element { .. } | Self::Text { .. }) {
                        child.collect_text(out);
                    }
                }
            }
            Self::Attribute { value, .. } | Self::Text { value } | Self::Comment { value } => {
                out.push_str(value)
            }
            Self::ProcessingInstruction { data, .. } => out.push_str(data),
        }
    }

    /// Number of nodes in this fragment, attributes included
    pub fn node_count(&self) -> usize {
        match self {
            Self::Element {
                attributes,
                children,
                ..
            } => 1 + attributes.len() + children.iter().map(ContentNode::node_count).sum::<usize>(),
            _ => 1,
        }
    }
}

/// Concatenated string value of a content sequence
pub(crate) fn sequence_string_value(content: &[ContentNode]) -> String {
    content.iter().map(ContentNode::string_value).collect()
}
