//! Storage error types
//!
//! Error codes:
//! - XMUT_DOCUMENT_NOT_FOUND (ERROR)
//! - XMUT_NODE_NOT_FOUND (ERROR)
//! - XMUT_STALE_ADDRESS (ERROR)
//! - XMUT_INVALID_CONTENT (ERROR)
//! - XMUT_STRUCTURE (ERROR)
//! - XMUT_INCONSISTENT (FATAL)
//! - XMUT_STORE_POISONED (FATAL)

use std::fmt;

use crate::dom::{DocumentId, NodeHandle, NodeId};
use crate::observability::Severity;

/// Storage-specific error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorCode {
    /// Document id unknown to the store
    XmutDocumentNotFound,
    /// Node id no longer exists in its document
    XmutNodeNotFound,
    /// Cached address no longer holds the node
    XmutStaleAddress,
    /// Content cannot be placed where requested
    XmutInvalidContent,
    /// Parent/child relation supplied by the caller does not hold
    XmutStructure,
    /// Physical and logical structure disagree
    XmutInconsistent,
    /// Internal store lock was poisoned by a panicking writer
    XmutStorePoisoned,
}

impl StorageErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            StorageErrorCode::XmutDocumentNotFound => "XMUT_DOCUMENT_NOT_FOUND",
            StorageErrorCode::XmutNodeNotFound => "XMUT_NODE_NOT_FOUND",
            StorageErrorCode::XmutStaleAddress => "XMUT_STALE_ADDRESS",
            StorageErrorCode::XmutInvalidContent => "XMUT_INVALID_CONTENT",
            StorageErrorCode::XmutStructure => "XMUT_STRUCTURE",
            StorageErrorCode::XmutInconsistent => "XMUT_INCONSISTENT",
            StorageErrorCode::XmutStorePoisoned => "XMUT_STORE_POISONED",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            StorageErrorCode::XmutInconsistent | StorageErrorCode::XmutStorePoisoned => {
                Severity::Fatal
            }
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for StorageErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Storage error with code and context
#[derive(Debug, Clone)]
pub struct StorageError {
    code: StorageErrorCode,
    message: String,
    document: Option<DocumentId>,
}

impl StorageError {
    pub fn document_not_found(doc: DocumentId) -> Self {
        Self {
            code: StorageErrorCode::XmutDocumentNotFound,
            message: format!("document {} does not exist", doc),
            document: Some(doc),
        }
    }

    pub fn node_not_found(doc: DocumentId, node: NodeId) -> Self {
        Self {
            code: StorageErrorCode::XmutNodeNotFound,
            message: format!("node {} no longer exists in {}", node, doc),
            document: Some(doc),
        }
    }

    pub fn stale_address(handle: &NodeHandle) -> Self {
        Self {
            code: StorageErrorCode::XmutStaleAddress,
            message: format!(
                "address {} no longer holds node {} in {}",
                handle.address, handle.node, handle.document
            ),
            document: Some(handle.document),
        }
    }

    pub fn invalid_content(doc: DocumentId, reason: impl Into<String>) -> Self {
        Self {
            code: StorageErrorCode::XmutInvalidContent,
            message: reason.into(),
            document: Some(doc),
        }
    }

    pub fn structure(doc: DocumentId, reason: impl Into<String>) -> Self {
        Self {
            code: StorageErrorCode::XmutStructure,
            message: reason.into(),
            document: Some(doc),
        }
    }

    pub fn inconsistent(doc: DocumentId, reason: impl Into<String>) -> Self {
        Self {
            code: StorageErrorCode::XmutInconsistent,
            message: format!("{} is inconsistent: {}", doc, reason.into()),
            document: Some(doc),
        }
    }

    pub fn poisoned() -> Self {
        Self {
            code: StorageErrorCode::XmutStorePoisoned,
            message: "store lock poisoned".to_string(),
            document: None,
        }
    }

    /// Returns the error code
    pub fn code(&self) -> StorageErrorCode {
        self.code
    }

    /// Returns the severity level
    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the document the error concerns, if any
    pub fn document(&self) -> Option<DocumentId> {
        self.document
    }

    /// Returns whether this is a fatal error
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity(), self.code, self.message)
    }
}

impl std::error::Error for StorageError {}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
