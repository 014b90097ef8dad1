//! Trigger hooks, permission checks and the error policy
//!
//! Covers the before/after hook contract across multi-document batches,
//! what a failure at each stage leaves behind, and how non-node
//! selections are trapped or raised.

use std::sync::{Arc, Mutex};

use xmutate::dom::{ContentNode, DocumentId, NodeHandle, WorkingDocumentSet};
use xmutate::notify::{UpdateKind, UpdateListener};
use xmutate::query::{Item, Sequence};
use xmutate::security::{Permission, PermissionTable, Subject};
use xmutate::storage::{DocumentStore, MemoryStore};
use xmutate::trigger::{DocumentTrigger, RecordingTrigger, TriggerCall, TriggerTable};
use xmutate::txn::MemoryTransactionManager;
use xmutate::{
    Append, ErrorPolicy, ModificationError, Remove, Selection, UpdateEngine, UpdateErrors,
};

// =============================================================================
// Test Utilities
// =============================================================================

fn editor() -> Subject {
    Subject::new("editor")
}

fn store_with(count: usize) -> (Arc<MemoryStore>, Vec<DocumentId>) {
    let store = Arc::new(MemoryStore::new());
    let docs = (0..count)
        .map(|i| {
            store
                .create_document(format!("doc{}.xml", i), ContentNode::element("a"))
                .unwrap()
        })
        .collect();
    (store, docs)
}

fn engine_with(
    store: &Arc<MemoryStore>,
    trigger: Arc<RecordingTrigger>,
    permissions: PermissionTable,
    transactions: Arc<MemoryTransactionManager>,
) -> UpdateEngine {
    UpdateEngine::builder(store.clone())
        .triggers(Arc::new(
            TriggerTable::new().with_fallback(trigger as Arc<dyn DocumentTrigger>),
        ))
        .permissions(Arc::new(permissions))
        .transactions(transactions)
        .build()
        .unwrap()
}

fn append_b(docs: &[DocumentId]) -> Append {
    Append::new(
        Selection::new("/a", WorkingDocumentSet::of(docs.iter().copied())),
        vec![ContentNode::element("b")],
    )
}

#[derive(Default)]
struct Collector(Mutex<Vec<DocumentId>>);

impl UpdateListener for Collector {
    fn document_updated(&self, _kind: UpdateKind, doc: DocumentId, _node: &NodeHandle) {
        self.0.lock().unwrap().push(doc);
    }
}

// =============================================================================
// Hook Ordering
// =============================================================================

/// Before-hooks run in ascending document order, after-hooks only for
/// modified documents.
#[test]
fn test_hooks_bracket_every_locked_document() {
    let (store, docs) = store_with(3);
    let trigger = Arc::new(RecordingTrigger::new());
    let engine = engine_with(
        &store,
        trigger.clone(),
        PermissionTable::allow_all(),
        Arc::new(MemoryTransactionManager::new()),
    );

    let reversed: Vec<DocumentId> = docs.iter().rev().copied().collect();
    assert_eq!(engine.process(&editor(), &append_b(&reversed)).unwrap(), 3);

    let calls = trigger.calls();
    assert_eq!(
        &calls[..3],
        &[
            TriggerCall::Before(docs[0]),
            TriggerCall::Before(docs[1]),
            TriggerCall::Before(docs[2]),
        ]
    );
    for doc in &docs {
        assert_eq!(trigger.before_count(*doc), 1);
        assert_eq!(trigger.after_count(*doc), 1);
        assert!(!engine.locks().is_locked(*doc));
    }
}

/// Subscribers hear about every edited target.
#[test]
fn test_notifications_follow_edits() {
    let (store, docs) = store_with(2);
    let engine = UpdateEngine::builder(store.clone()).build().unwrap();
    let collector = Arc::new(Collector::default());
    engine.notifications().register(collector.clone());

    engine.process(&editor(), &append_b(&docs)).unwrap();
    assert_eq!(*collector.0.lock().unwrap(), docs);
}

// =============================================================================
// Hook Failures
// =============================================================================

/// A rejecting before-hook aborts before any edit and releases every lock.
#[test]
fn test_before_hook_failure_aborts_cleanly() {
    let (store, docs) = store_with(2);
    let trigger = Arc::new(RecordingTrigger::failing_before(docs[1]));
    let transactions = Arc::new(MemoryTransactionManager::new());
    let engine = engine_with(
        &store,
        trigger.clone(),
        PermissionTable::allow_all(),
        transactions.clone(),
    );

    let err = engine.process(&editor(), &append_b(&docs)).unwrap_err();
    assert!(matches!(err, ModificationError::Trigger(_)));
    assert_eq!(err.code(), "XMUT_TRIGGER");

    for doc in &docs {
        assert_eq!(store.serialize(*doc).unwrap(), "<a/>");
        assert!(!engine.locks().is_locked(*doc));
        assert_eq!(trigger.after_count(*doc), 0);
    }
    assert_eq!(transactions.aborted(), 1);
}

/// A failing after-hook surfaces as an error; the edits stay in place.
#[test]
fn test_after_hook_failure_surfaces() {
    let (store, docs) = store_with(1);
    let trigger = Arc::new(RecordingTrigger::failing_after(docs[0]));
    let transactions = Arc::new(MemoryTransactionManager::new());
    let engine = engine_with(
        &store,
        trigger.clone(),
        PermissionTable::allow_all(),
        transactions.clone(),
    );

    let err = engine.process(&editor(), &append_b(&docs)).unwrap_err();
    assert!(matches!(err, ModificationError::Trigger(_)));
    assert_eq!(store.serialize(docs[0]).unwrap(), "<a><b/></a>");
    assert_eq!(transactions.aborted(), 1);
    assert!(!engine.locks().is_locked(docs[0]));
}

// =============================================================================
// Permissions
// =============================================================================

/// A denied document is never modified; documents edited before the
/// denial keep their edits and still get their after-hook.
#[test]
fn test_permission_denial_mid_batch() {
    let (store, docs) = store_with(2);
    let subject = editor();
    let trigger = Arc::new(RecordingTrigger::new());
    let engine = engine_with(
        &store,
        trigger.clone(),
        PermissionTable::allow_all().deny(&subject, Permission::Write, docs[1]),
        Arc::new(MemoryTransactionManager::new()),
    );

    let err = engine.process(&subject, &append_b(&docs)).unwrap_err();
    match &err {
        ModificationError::PermissionDenied { subject, document } => {
            assert_eq!(subject, "editor");
            assert_eq!(*document, docs[1]);
        }
        other => panic!("unexpected error: {:?}", other),
    }

    assert_eq!(store.serialize(docs[0]).unwrap(), "<a><b/></a>");
    assert_eq!(store.serialize(docs[1]).unwrap(), "<a/>");
    assert_eq!(trigger.after_count(docs[0]), 1);
    assert_eq!(trigger.before_count(docs[1]), 1);
    assert_eq!(trigger.after_count(docs[1]), 0);
    assert_eq!(engine.metrics().snapshot().permission_denials, 1);
}

#[test]
fn test_system_subject_bypasses_table() {
    let (store, docs) = store_with(1);
    let engine = engine_with(
        &store,
        Arc::new(RecordingTrigger::new()),
        PermissionTable::deny_all(),
        Arc::new(MemoryTransactionManager::new()),
    );

    let err = engine.process(&editor(), &append_b(&docs)).unwrap_err();
    assert!(matches!(err, ModificationError::PermissionDenied { .. }));
    assert_eq!(engine.process(&Subject::system(), &append_b(&docs)).unwrap(), 1);
}

// =============================================================================
// Error Policy
// =============================================================================

#[test]
fn test_raise_policy_rejects_atomic_results() {
    let (store, docs) = store_with(1);
    let engine = UpdateEngine::builder(store.clone()).build().unwrap();
    let selection = Selection::new("'text'", WorkingDocumentSet::of([docs[0]]));

    let err = engine
        .process(&editor(), &Remove::new(selection))
        .unwrap_err();
    assert!(matches!(err, ModificationError::SelectType { .. }));
    assert_eq!(err.code(), "XMUT_SELECT_TYPE");
}

/// Empty sequences are not an error under the raise policy.
#[test]
fn test_raise_policy_accepts_empty_sequence() {
    let (store, docs) = store_with(1);
    let engine = UpdateEngine::builder(store.clone()).build().unwrap();
    let selection = Selection::new("()", WorkingDocumentSet::of([docs[0]]));

    assert_eq!(engine.process(&editor(), &Remove::new(selection)).unwrap(), 0);
}

/// Under the trap policy every non-node result is recorded; only a
/// non-empty one raises.
#[test]
fn test_trap_policy_records_and_raises() {
    let (store, docs) = store_with(1);
    let engine = UpdateEngine::builder(store.clone()).build().unwrap();
    let errors = UpdateErrors::new();
    let trapped = |expr: &str| {
        Selection::new(expr, WorkingDocumentSet::of([docs[0]]))
            .with_policy(ErrorPolicy::Trap(errors.clone()))
    };

    assert_eq!(engine.process(&editor(), &Remove::new(trapped("()"))).unwrap(), 0);
    assert_eq!(errors.len(), 1);

    let err = engine
        .process(&editor(), &Remove::new(trapped("$v").with_variable("v", Sequence::single(Item::Integer(1)))))
        .unwrap_err();
    assert!(matches!(err, ModificationError::SelectType { .. }));
    assert_eq!(errors.len(), 2);
    assert_eq!(engine.metrics().snapshot().select_type_trapped, 2);
    assert_eq!(store.serialize(docs[0]).unwrap(), "<a/>");
}

#[test]
fn test_unbound_variable_is_a_query_error() {
    let (store, docs) = store_with(1);
    let engine = UpdateEngine::builder(store.clone()).build().unwrap();
    let selection = Selection::new("$missing", WorkingDocumentSet::of([docs[0]]));

    let err = engine.process(&editor(), &Remove::new(selection)).unwrap_err();
    assert!(matches!(err, ModificationError::Query(_)));
    assert!(!engine.locks().is_selecting());
}
