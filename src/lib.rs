//! xmutate - structural update engine for a native XML document store
//!
//! Applies append, insert, remove, rename, replace and update-content
//! edits to stored XML nodes under per-document write locks, document
//! triggers, a WRITE permission check and one transaction per top-level
//! invocation.
//!
//! ```ignore
//! let store = Arc::new(MemoryStore::new());
//! let doc = store.create_document("a.xml", ContentNode::element("a"))?;
//! let engine = UpdateEngine::builder(store.clone()).build()?;
//!
//! let append = Append::new(
//!     Selection::new("/a", WorkingDocumentSet::of([doc])),
//!     vec![ContentNode::element("b")],
//! );
//! assert_eq!(engine.process(&Subject::new("admin"), &append)?, 1);
//! ```

pub mod config;
pub mod dom;
pub mod engine;
pub mod fragmentation;
pub mod lock;
pub mod modification;
pub mod notify;
pub mod observability;
pub mod query;
pub mod reconcile;
pub mod security;
pub mod storage;
pub mod trigger;
pub mod txn;

pub use engine::{UpdateEngine, UpdateEngineBuilder};
pub use modification::{
    Append, AppendPosition, Conditional, ErrorPolicy, Insert, Modification, ModificationError,
    ModificationResult, Remove, Rename, Replace, Selection, Update, UpdateErrors,
};
