//! Lock errors

use std::time::Duration;

use thiserror::Error;

use crate::dom::DocumentId;
use crate::trigger::TriggerError;

pub type LockResult<T> = Result<T, LockError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    #[error("timed out after {}ms waiting for write lock on {document}", waited.as_millis())]
    Timeout { document: DocumentId, waited: Duration },

    #[error("write lock on {0} is already held by this thread")]
    AlreadyHeld(DocumentId),

    #[error("lock state poisoned by a panicked holder")]
    Poisoned,
}

/// Failure while assembling a lock bundle: either a lock could not be
/// taken or a before-update hook refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BundleError {
    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Trigger(#[from] TriggerError),
}
