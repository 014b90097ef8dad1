//! Remove each target from its parent

use super::batch::{parent_of, run_batch};
use super::errors::{ModificationError, ModificationResult};
use super::selector::Selection;
use super::{Modification, UpdateContext};
use crate::txn::TransactionScope;

#[derive(Debug, Clone)]
pub struct Remove {
    selection: Selection,
}

impl Remove {
    pub fn new(selection: Selection) -> Self {
        Self { selection }
    }
}

impl Modification for Remove {
    fn name(&self) -> &'static str {
        "remove"
    }

    fn process(&self, ctx: &UpdateContext<'_>, scope: &mut TransactionScope<'_>) -> ModificationResult<u64> {
        run_batch(ctx, scope, self.name(), &self.selection, |txn, target| {
            let parent = parent_of(ctx.store, target)?;
            if !parent.is_element() {
                return Err(ModificationError::structural(format!(
                    "cannot remove {}: its parent is not an element; delete the document instead",
                    target
                )));
            }
            ctx.store.remove_child(txn, &parent, target)?;
            Ok(())
        })
    }
}
