//! Replace the content of each target, keeping the target itself

use super::batch::run_batch;
use super::errors::{ModificationError, ModificationResult};
use super::selector::Selection;
use super::{Modification, UpdateContext};
use crate::dom::{sequence_string_value, ContentNode, NodeKind};
use crate::txn::TransactionScope;

#[derive(Debug, Clone)]
pub struct Update {
    selection: Selection,
    content: Vec<ContentNode>,
}

impl Update {
    pub fn new(selection: Selection, content: Vec<ContentNode>) -> Self {
        Self { selection, content }
    }
}

impl Modification for Update {
    fn name(&self) -> &'static str {
        "update"
    }

    fn process(&self, ctx: &UpdateContext<'_>, scope: &mut TransactionScope<'_>) -> ModificationResult<u64> {
        if self.content.is_empty() {
            return Ok(0);
        }
        let value = sequence_string_value(&self.content);

        run_batch(ctx, scope, self.name(), &self.selection, |txn, target| {
            match ctx.store.node(target)?.kind {
                NodeKind::Element => ctx.store.update_children(txn, target, &self.content)?,
                NodeKind::Text | NodeKind::Attribute => ctx.store.set_value(txn, target, &value)?,
                other => return Err(ModificationError::unsupported("update", other)),
            }
            Ok(())
        })
    }
}
