//! Rename elements and attributes

use super::batch::{parent_of, run_batch};
use super::errors::{ModificationError, ModificationResult};
use super::selector::Selection;
use super::{Modification, UpdateContext};
use crate::dom::{ContentNode, NodeKind, QName};
use crate::txn::TransactionScope;

/// Substitutes each target with a renamed copy. The copy is a new node:
/// position is kept, node identity is not.
#[derive(Debug, Clone)]
pub struct Rename {
    selection: Selection,
    new_name: String,
}

impl Rename {
    pub fn new(selection: Selection, new_name: impl Into<String>) -> Self {
        Self {
            selection,
            new_name: new_name.into(),
        }
    }
}

impl Modification for Rename {
    fn name(&self) -> &'static str {
        "rename"
    }

    fn process(&self, ctx: &UpdateContext<'_>, scope: &mut TransactionScope<'_>) -> ModificationResult<u64> {
        let new_name = QName::parse(self.new_name.trim(), &self.selection.namespaces)
            .map_err(|e| ModificationError::invalid_content(e.to_string()))?;

        run_batch(ctx, scope, self.name(), &self.selection, |txn, target| {
            let node = ctx.store.node(target)?;
            let renamed = match node.kind {
                NodeKind::Element => {
                    let mut copy = ctx.store.export(target)?;
                    if let ContentNode::Element { name, .. } = &mut copy {
                        *name = new_name.clone();
                    }
                    copy
                }
                NodeKind::Attribute => ContentNode::Attribute {
                    name: new_name.clone(),
                    value: node.value.unwrap_or_default(),
                },
                other => return Err(ModificationError::unsupported("rename", other)),
            };
            let parent = parent_of(ctx.store, target)?;
            ctx.store.replace_child(txn, &parent, target, &renamed)?;
            Ok(())
        })
    }
}
