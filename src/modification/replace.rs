//! Replace whole nodes

use super::batch::{parent_of, run_batch};
use super::errors::{ModificationError, ModificationResult};
use super::selector::Selection;
use super::{Modification, UpdateContext};
use crate::dom::{ContentNode, NodeKind, ParentRef};
use crate::txn::TransactionScope;

/// Substitutes each target with exactly one content node.
///
/// Elements are swapped for the content node as given. Text targets become
/// a fresh text node holding the content's string value. Attribute targets
/// become the content attribute if one is given, otherwise an attribute of
/// the same name holding the content's string value.
///
/// Nodes directly under the document node cannot be replaced.
#[derive(Debug, Clone)]
pub struct Replace {
    selection: Selection,
    content: Vec<ContentNode>,
}

impl Replace {
    pub fn new(selection: Selection, content: Vec<ContentNode>) -> Self {
        Self { selection, content }
    }
}

impl Modification for Replace {
    fn name(&self) -> &'static str {
        "replace"
    }

    fn process(&self, ctx: &UpdateContext<'_>, scope: &mut TransactionScope<'_>) -> ModificationResult<u64> {
        let replacement = match self.content.as_slice() {
            [] => return Ok(0),
            [single] => single,
            many => {
                return Err(ModificationError::invalid_content(format!(
                    "replace requires exactly one content node, got {}",
                    many.len()
                )))
            }
        };

        run_batch(ctx, scope, self.name(), &self.selection, |txn, target| {
            let parent = parent_of(ctx.store, target)?;
            let node = ctx.store.node(target)?;
            if let ParentRef::Document(doc) = &parent {
                let message = match node.kind {
                    NodeKind::Element => format!(
                        "cannot replace the root element of {}; use update to replace its content, or delete the document",
                        doc
                    ),
                    kind => format!("cannot replace a document-level {} node in {}", kind, doc),
                };
                return Err(ModificationError::structural(message));
            }

            let fresh = match node.kind {
                NodeKind::Element => replacement.clone(),
                NodeKind::Text => ContentNode::text(replacement.string_value()),
                NodeKind::Attribute => match replacement {
                    ContentNode::Attribute { .. } => replacement.clone(),
                    other => ContentNode::Attribute {
                        name: node
                            .name
                            .clone()
                            .ok_or_else(|| ModificationError::structural("attribute without a name"))?,
                        value: other.string_value(),
                    },
                },
                other => return Err(ModificationError::unsupported("replace", other)),
            };
            ctx.store.replace_child(txn, &parent, target, &fresh)?;
            Ok(())
        })
    }
}
