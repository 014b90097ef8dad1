//! Transaction errors

use thiserror::Error;
use uuid::Uuid;

/// Result type for transaction operations
pub type TxnResult<T> = Result<T, TxnError>;

/// Transaction errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TxnError {
    #[error("transaction {0} is not active")]
    NotActive(Uuid),

    #[error("commit of transaction {0} failed: {1}")]
    CommitFailed(Uuid, String),

    #[error("transaction manager state poisoned")]
    Poisoned,
}
