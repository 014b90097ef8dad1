//! Trigger errors

use thiserror::Error;

use crate::dom::DocumentId;

pub type TriggerResult<T> = Result<T, TriggerError>;

/// Raised by a before- or after-update hook
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TriggerError {
    #[error("before-update trigger rejected {document}: {message}")]
    BeforeUpdate { document: DocumentId, message: String },

    #[error("after-update trigger failed for {document}: {message}")]
    AfterUpdate { document: DocumentId, message: String },
}

impl TriggerError {
    pub fn before(document: DocumentId, message: impl Into<String>) -> Self {
        TriggerError::BeforeUpdate {
            document,
            message: message.into(),
        }
    }

    pub fn after(document: DocumentId, message: impl Into<String>) -> Self {
        TriggerError::AfterUpdate {
            document,
            message: message.into(),
        }
    }

    pub fn document(&self) -> DocumentId {
        match self {
            TriggerError::BeforeUpdate { document, .. } | TriggerError::AfterUpdate { document, .. } => {
                *document
            }
        }
    }
}
