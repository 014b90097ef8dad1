//! Query evaluation collaborator
//!
//! The engine hands a select or test expression, plus its namespace and
//! variable bindings and the working document set, to a
//! [`QueryEvaluator`] and gets back a [`Sequence`].
//!
//! [`PathEvaluator`] is a small evaluator over a [`DocumentStore`]
//! covering absolute child/attribute paths, literals, variables and one
//! general comparison.
//!
//! [`DocumentStore`]: crate::storage::DocumentStore

mod errors;
mod path;

use std::collections::BTreeMap;
use std::fmt;

pub use errors::{QueryError, QueryResult};
pub use path::PathEvaluator;

use crate::dom::{NodeHandle, WorkingDocumentSet};

/// Prefix → namespace URI
pub type NamespaceBindings = BTreeMap<String, String>;

/// Variable name (without `$`) → value
pub type VariableBindings = BTreeMap<String, Sequence>;

/// One item of a result sequence
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Node(NodeHandle),
    String(String),
    Integer(i64),
    Double(f64),
    Boolean(bool),
}

impl Item {
    pub fn is_node(&self) -> bool {
        matches!(self, Item::Node(_))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Item::Node(_) => "node()",
            Item::String(_) => "xs:string",
            Item::Integer(_) => "xs:integer",
            Item::Double(_) => "xs:double",
            Item::Boolean(_) => "xs:boolean",
        }
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Item::Node(handle) => write!(f, "{}", handle),
            Item::String(s) => write!(f, "\"{}\"", s),
            Item::Integer(i) => write!(f, "{}", i),
            Item::Double(d) => write!(f, "{}", d),
            Item::Boolean(b) => write!(f, "{}()", b),
        }
    }
}

/// An ordered result sequence
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sequence {
    items: Vec<Item>,
}

impl Sequence {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn single(item: Item) -> Self {
        Self { items: vec![item] }
    }

    pub fn of_nodes(nodes: impl IntoIterator<Item = NodeHandle>) -> Self {
        Self {
            items: nodes.into_iter().map(Item::Node).collect(),
        }
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Every item is a node. False for the empty sequence, whose item type
    /// is not a node type.
    pub fn is_node_sequence(&self) -> bool {
        !self.items.is_empty() && self.items.iter().all(Item::is_node)
    }

    /// The node handles, or the first item that is not a node
    pub fn into_nodes(self) -> Result<Vec<NodeHandle>, Item> {
        self.items
            .into_iter()
            .map(|item| match item {
                Item::Node(handle) => Ok(handle),
                other => Err(other),
            })
            .collect()
    }

    /// XPath effective boolean value
    pub fn effective_boolean_value(&self) -> QueryResult<bool> {
        match self.items.as_slice() {
            [] => Ok(false),
            [Item::Node(_), ..] => Ok(true),
            [Item::Boolean(b)] => Ok(*b),
            [Item::String(s)] => Ok(!s.is_empty()),
            [Item::Integer(i)] => Ok(*i != 0),
            [Item::Double(d)] => Ok(*d != 0.0 && !d.is_nan()),
            [first, ..] => Err(QueryError::NoBooleanValue(format!(
                "a sequence of {} items starting with {}",
                self.items.len(),
                first.type_name()
            ))),
        }
    }
}

impl FromIterator<Item> for Sequence {
    fn from_iter<I: IntoIterator<Item = Item>>(iter: I) -> Self {
        Self {
            items: iter.into_iter().collect(),
        }
    }
}

/// Query evaluator collaborator
pub trait QueryEvaluator: Send + Sync {
    fn evaluate(
        &self,
        expr: &str,
        namespaces: &NamespaceBindings,
        variables: &VariableBindings,
        docs: &WorkingDocumentSet,
    ) -> QueryResult<Sequence>;
}
