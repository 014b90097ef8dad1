//! Conditional execution of a sequence of modifications

use super::errors::ModificationResult;
use super::selector::Selection;
use super::{Modification, UpdateContext};
use crate::observability::{log_event_with_fields, Event};
use crate::trigger::fire_after_hooks;
use crate::txn::TransactionScope;

/// Runs its children in order when the test expression is true.
///
/// Children share the enclosing transaction. Pending storage effects are
/// flushed after each child so the next child's selection sees them. The
/// first failing child aborts the rest.
///
/// Each document's before-hook fires once, the first time a child locks
/// it. After-hooks are held until the children are done and then fire
/// once per modified document, also when a child failed.
pub struct Conditional {
    test: Selection,
    children: Vec<Box<dyn Modification>>,
}

impl Conditional {
    pub fn new(test: Selection) -> Self {
        Self {
            test,
            children: Vec::new(),
        }
    }

    pub fn then(mut self, child: impl Modification + 'static) -> Self {
        self.children.push(Box::new(child));
        self
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    fn run_children(&self, ctx: &UpdateContext<'_>, scope: &mut TransactionScope<'_>) -> ModificationResult<u64> {
        let mut total = 0;
        for child in &self.children {
            total += child.process(ctx, scope)?;
            ctx.store.flush()?;
        }
        Ok(total)
    }
}

impl Modification for Conditional {
    fn name(&self) -> &'static str {
        "if"
    }

    fn process(&self, ctx: &UpdateContext<'_>, scope: &mut TransactionScope<'_>) -> ModificationResult<u64> {
        let holds = self.test.evaluate(ctx)?.effective_boolean_value()?;
        if !holds {
            log_event_with_fields(Event::ConditionalSkipped, &[("test", &self.test.expr)]);
            return Ok(0);
        }

        ctx.hooks.begin_deferral();
        let outcome = self.run_children(ctx, scope);
        let due = ctx.hooks.end_deferral();

        let hooks: ModificationResult<()> = if due.is_empty() {
            Ok(())
        } else {
            match scope.transaction() {
                Ok(txn) => fire_after_hooks(ctx.triggers, txn, &due).map_err(Into::into),
                Err(err) => Err(err.into()),
            }
        };
        let total = outcome?;
        hooks?;
        Ok(total)
    }
}

