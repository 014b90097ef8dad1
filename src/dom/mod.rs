//! Node model shared by the store, the evaluator and the operators
//!
//! A stored node is identified by a [`NodeHandle`]: the owning document, a
//! logical [`NodeId`] that never changes for the node's lifetime, and a cached
//! physical [`Address`]. The address is only a hint. Any edit in the store may
//! move a node to another page, after which the cached address is stale.
//!
//! Content to be placed into a document is described by detached
//! [`ContentNode`] fragments.

mod content;
mod ids;
mod qname;

pub use content::ContentNode;
pub(crate) use content::sequence_string_value;
pub use ids::{Address, DocumentId, NodeHandle, NodeId, NodeKind, ParentRef, WorkingDocumentSet};
pub use qname::{is_valid_qname, QName, QNameError};
