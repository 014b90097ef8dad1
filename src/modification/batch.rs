//! The protocol every structural operator runs
//!
//! select → open transaction → lock bundle (before-hooks) → subscribe
//! address table → per target: WRITE check, edit, store, mark modified,
//! notify → fragmentation accounting → release bundle (after-hooks).
//!
//! Any error drops the bundle, which still fires after-hooks for the
//! documents already modified and then unlocks everything. Documents
//! already stored are not rolled back.

use chrono::Utc;

use super::errors::{ModificationError, ModificationResult};
use super::selector::{Selection, Selector};
use super::UpdateContext;
use crate::dom::{NodeHandle, NodeKind, ParentRef};
use crate::notify::UpdateKind;
use crate::observability::{log_event_with_fields, Event};
use crate::reconcile::{AddressSubscription, AddressTable};
use crate::security::Permission;
use crate::storage::{DocumentStore, StorageError};
use crate::txn::{Transaction, TransactionScope};

pub(crate) fn run_batch<F>(
    ctx: &UpdateContext<'_>,
    scope: &mut TransactionScope<'_>,
    operation: &'static str,
    selection: &Selection,
    mut edit: F,
) -> ModificationResult<u64>
where
    F: FnMut(&Transaction, &NodeHandle) -> ModificationResult<()>,
{
    let nodes = Selector::select(ctx, selection)?;
    if nodes.is_empty() {
        return Ok(0);
    }

    let txn = scope.transaction()?;
    let mut bundle = ctx.locks.lock_for(&nodes, ctx.triggers, ctx.hooks, txn)?;

    let table = AddressTable::new(nodes);
    let subscription = AddressSubscription::register(ctx.store, table.clone());

    let mut count = 0u64;
    for index in 0..table.len() {
        let target = table
            .take(index)
            .ok_or_else(|| ModificationError::structural(format!("target {} vanished", index)))?;

        if !ctx
            .permissions
            .validate(ctx.subject, Permission::Write, target.document)
        {
            ctx.metrics.increment_permission_denials();
            return Err(ModificationError::PermissionDenied {
                subject: ctx.subject.name().to_string(),
                document: target.document,
            });
        }

        edit(txn, &target)?;

        ctx.store.store_document(txn, target.document, Utc::now())?;
        bundle.mark_modified(target.document);
        ctx.notifications
            .notify(UpdateKind::Update, target.document, &target);

        let document = target.document.to_string();
        let node = target.node.to_string();
        log_event_with_fields(
            Event::DocumentModified,
            &[("document", &document), ("node", &node), ("op", operation)],
        );
        count += 1;
    }
    drop(subscription);
    ctx.metrics.add_relocations(table.rewritten());

    ctx.accountant
        .run(ctx.store, txn, bundle.modified(), ctx.metrics)?;
    bundle.release()?;

    ctx.metrics.add_nodes_modified(count);
    Ok(count)
}

/// Structural parent of `node`. An attribute's parent is its owning
/// element.
pub(crate) fn parent_of(store: &dyn DocumentStore, node: &NodeHandle) -> ModificationResult<ParentRef> {
    if store.node(node)?.kind == NodeKind::Attribute {
        let owner = store
            .owner_element(node)?
            .ok_or_else(|| ModificationError::structural(format!("attribute {} has no owner", node)))?;
        return Ok(ParentRef::Element(owner));
    }
    store
        .parent(node)?
        .ok_or_else(|| StorageError::structure(node.document, format!("node {} has no parent", node)).into())
}
