//! Modification errors
//!
//! Every error ends the current invocation: the transaction aborts and
//! the lock bundle is released. Each variant carries a stable code.

use thiserror::Error;

use crate::dom::{DocumentId, NodeKind};
use crate::lock::{BundleError, LockError};
use crate::observability::Severity;
use crate::query::QueryError;
use crate::storage::{StorageError, StorageErrorCode};
use crate::trigger::TriggerError;
use crate::txn::TxnError;

pub type ModificationResult<T> = Result<T, ModificationError>;

#[derive(Debug, Clone, Error)]
pub enum ModificationError {
    /// The select expression did not yield a node sequence
    #[error("select expression did not yield a node sequence: {message}")]
    SelectType { message: String },

    #[error("subject '{subject}' lacks WRITE permission on {document}")]
    PermissionDenied { subject: String, document: DocumentId },

    #[error("structural violation: {message}")]
    StructuralViolation { message: String },

    #[error("{operation} does not support {kind} nodes")]
    UnsupportedNodeType {
        operation: &'static str,
        kind: NodeKind,
    },

    #[error("invalid content: {message}")]
    InvalidContent { message: String },

    #[error("query evaluation failed: {0}")]
    Query(#[from] QueryError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Trigger(#[from] TriggerError),

    #[error(transparent)]
    Engine(StorageError),

    #[error(transparent)]
    Transaction(#[from] TxnError),
}

impl ModificationError {
    pub fn select_type(message: impl Into<String>) -> Self {
        Self::SelectType {
            message: message.into(),
        }
    }

    pub fn structural(message: impl Into<String>) -> Self {
        Self::StructuralViolation {
            message: message.into(),
        }
    }

    pub fn invalid_content(message: impl Into<String>) -> Self {
        Self::InvalidContent {
            message: message.into(),
        }
    }

    pub fn unsupported(operation: &'static str, kind: NodeKind) -> Self {
        Self::UnsupportedNodeType { operation, kind }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::SelectType { .. } => "XMUT_SELECT_TYPE",
            Self::PermissionDenied { .. } => "XMUT_PERMISSION_DENIED",
            Self::StructuralViolation { .. } => "XMUT_STRUCTURAL_VIOLATION",
            Self::UnsupportedNodeType { .. } => "XMUT_UNSUPPORTED_NODE_TYPE",
            Self::InvalidContent { .. } => "XMUT_INVALID_CONTENT",
            Self::Query(_) => "XMUT_QUERY",
            Self::Lock(_) => "XMUT_LOCK",
            Self::Trigger(_) => "XMUT_TRIGGER",
            Self::Engine(err) => err.code().code(),
            Self::Transaction(_) => "XMUT_TRANSACTION",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::Engine(err) => err.severity(),
            Self::Lock(LockError::Poisoned) => Severity::Fatal,
            _ => Severity::Error,
        }
    }
}

/// Structure and content rejections from the store are reported as
/// their engine-level counterparts; everything else is an engine error.
impl From<StorageError> for ModificationError {
    fn from(err: StorageError) -> Self {
        match err.code() {
            StorageErrorCode::XmutInvalidContent => Self::invalid_content(err.message()),
            StorageErrorCode::XmutStructure => Self::structural(err.message()),
            _ => Self::Engine(err),
        }
    }
}

impl From<BundleError> for ModificationError {
    fn from(err: BundleError) -> Self {
        match err {
            BundleError::Lock(err) => Self::Lock(err),
            BundleError::Trigger(err) => Self::Trigger(err),
        }
    }
}
