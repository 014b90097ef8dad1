//! Insert content as siblings of each target

use super::batch::{parent_of, run_batch};
use super::errors::ModificationResult;
use super::selector::Selection;
use super::{Modification, UpdateContext};
use crate::dom::ContentNode;
use crate::txn::TransactionScope;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertPosition {
    Before,
    After,
}

#[derive(Debug, Clone)]
pub struct Insert {
    selection: Selection,
    content: Vec<ContentNode>,
    position: InsertPosition,
}

impl Insert {
    pub fn new(selection: Selection, content: Vec<ContentNode>, position: InsertPosition) -> Self {
        Self {
            selection,
            content,
            position,
        }
    }

    pub fn before(selection: Selection, content: Vec<ContentNode>) -> Self {
        Self::new(selection, content, InsertPosition::Before)
    }

    pub fn after(selection: Selection, content: Vec<ContentNode>) -> Self {
        Self::new(selection, content, InsertPosition::After)
    }
}

impl Modification for Insert {
    fn name(&self) -> &'static str {
        match self.position {
            InsertPosition::Before => "insert-before",
            InsertPosition::After => "insert-after",
        }
    }

    fn process(&self, ctx: &UpdateContext<'_>, scope: &mut TransactionScope<'_>) -> ModificationResult<u64> {
        if self.content.is_empty() {
            return Ok(0);
        }
        run_batch(ctx, scope, self.name(), &self.selection, |txn, target| {
            let parent = parent_of(ctx.store, target)?;
            match self.position {
                InsertPosition::Before => ctx.store.insert_before(txn, &parent, target, &self.content)?,
                InsertPosition::After => ctx.store.insert_after(txn, &parent, target, &self.content)?,
            }
            Ok(())
        })
    }
}
