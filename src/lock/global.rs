//! Coarse lock serializing selection

use std::sync::{Mutex, MutexGuard};

use super::errors::{LockError, LockResult};

/// Serializes selection across invocations. Held only while a select or
/// test expression is evaluated and its result materialized; never while
/// document locks are requested.
#[derive(Debug, Default)]
pub struct GlobalUpdateLock {
    inner: Mutex<()>,
}

/// Held while selecting; releases on drop
#[derive(Debug)]
pub struct SelectionGuard<'a> {
    _guard: MutexGuard<'a, ()>,
}

impl GlobalUpdateLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self) -> LockResult<SelectionGuard<'_>> {
        let guard = self.inner.lock().map_err(|_| LockError::Poisoned)?;
        Ok(SelectionGuard { _guard: guard })
    }

    /// True if some invocation is selecting right now
    pub fn is_held(&self) -> bool {
        self.inner.try_lock().is_err()
    }
}
