//! Selection: select expression → ordered target list

use std::fmt;
use std::sync::{Arc, Mutex};

use super::errors::{ModificationError, ModificationResult};
use super::UpdateContext;
use crate::dom::{NodeHandle, WorkingDocumentSet};
use crate::observability::{log_event_with_fields, Event};
use crate::query::{NamespaceBindings, Sequence, VariableBindings};

/// Shared accumulator of trapped update errors, one per query context
#[derive(Debug, Clone, Default)]
pub struct UpdateErrors {
    messages: Arc<Mutex<Vec<String>>>,
}

impl UpdateErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, message: impl Into<String>) {
        self.messages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(message.into());
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.messages().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// What happens when a select expression yields something other than
/// nodes
#[derive(Debug, Clone, Default)]
pub enum ErrorPolicy {
    /// Raise immediately. An empty result is simply no targets.
    #[default]
    Raise,
    /// Record the error in the accumulator, raising only if the result
    /// held items. An empty result is recorded too.
    Trap(UpdateErrors),
}

/// A select expression with everything needed to evaluate it
#[derive(Debug, Clone)]
pub struct Selection {
    pub expr: String,
    pub namespaces: NamespaceBindings,
    pub variables: VariableBindings,
    pub docs: WorkingDocumentSet,
    pub policy: ErrorPolicy,
}

impl Selection {
    pub fn new(expr: impl Into<String>, docs: WorkingDocumentSet) -> Self {
        Self {
            expr: expr.into(),
            namespaces: NamespaceBindings::new(),
            variables: VariableBindings::new(),
            docs,
            policy: ErrorPolicy::Raise,
        }
    }

    pub fn with_namespace(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        self.namespaces.insert(prefix.into(), uri.into());
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: Sequence) -> Self {
        self.variables.insert(name.into(), value);
        self
    }

    pub fn with_policy(mut self, policy: ErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Same bindings and scope, different expression
    pub fn derive(&self, expr: impl Into<String>) -> Self {
        Self {
            expr: expr.into(),
            ..self.clone()
        }
    }

    /// Evaluate under the global update lock, releasing it on return
    pub(crate) fn evaluate(&self, ctx: &UpdateContext<'_>) -> ModificationResult<Sequence> {
        let _guard = ctx.locks.select_guard()?;
        let sequence =
            ctx.evaluator
                .evaluate(&self.expr, &self.namespaces, &self.variables, &self.docs)?;
        Ok(sequence)
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expr)
    }
}

/// Evaluates a selection into its target nodes
pub struct Selector;

impl Selector {
    /// Ordered target nodes. Never holds the global lock on return.
    pub fn select(ctx: &UpdateContext<'_>, selection: &Selection) -> ModificationResult<Vec<NodeHandle>> {
        let sequence = selection.evaluate(ctx)?;

        if !sequence.is_node_sequence() {
            let message = describe_non_nodes(&selection.expr, &sequence);
            if let ErrorPolicy::Trap(errors) = &selection.policy {
                errors.record(message.clone());
                ctx.metrics.increment_select_type_trapped();
                log_event_with_fields(
                    Event::SelectTypeTrapped,
                    &[("expr", &selection.expr), ("reason", &message)],
                );
            }
            if sequence.is_empty() {
                return Ok(Vec::new());
            }
            return Err(ModificationError::select_type(message));
        }

        let nodes = sequence
            .into_nodes()
            .map_err(|item| ModificationError::select_type(format!("unexpected {}", item)))?;
        let count = nodes.len().to_string();
        log_event_with_fields(
            Event::SelectionComplete,
            &[("expr", &selection.expr), ("nodes", &count)],
        );
        Ok(nodes)
    }
}

fn describe_non_nodes(expr: &str, sequence: &Sequence) -> String {
    match sequence.items().iter().find(|item| !item.is_node()) {
        Some(item) => format!(
            "select expression '{}' returned {} item {}",
            expr,
            item.type_name(),
            item
        ),
        None => format!("select expression '{}' returned an empty sequence", expr),
    }
}
