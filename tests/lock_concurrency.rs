//! Concurrent batches and document locking
//!
//! A gate trigger parks one batch inside its before-hook while it holds a
//! document lock, so the tests can observe what other batches do in the
//! meantime.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use xmutate::config::EngineConfig;
use xmutate::dom::{ContentNode, DocumentId, WorkingDocumentSet};
use xmutate::lock::LockError;
use xmutate::security::Subject;
use xmutate::storage::{DocumentStore, MemoryStore};
use xmutate::trigger::{DocumentTrigger, TriggerResult, TriggerTable};
use xmutate::txn::Transaction;
use xmutate::{Append, ModificationError, Selection, UpdateEngine};

// =============================================================================
// Test Utilities
// =============================================================================

const WAIT: Duration = Duration::from_secs(5);

/// Blocks the first before-hook on `doc` until released
struct GateTrigger {
    doc: DocumentId,
    armed: AtomicBool,
    entered: Mutex<Sender<()>>,
    release: Mutex<Receiver<()>>,
}

impl DocumentTrigger for GateTrigger {
    fn before_update(&self, _txn: &Transaction, doc: DocumentId) -> TriggerResult<()> {
        if doc == self.doc && self.armed.swap(false, Ordering::SeqCst) {
            self.entered.lock().unwrap().send(()).unwrap();
            self.release.lock().unwrap().recv().unwrap();
        }
        Ok(())
    }

    fn after_update(&self, _txn: &Transaction, _doc: DocumentId) -> TriggerResult<()> {
        Ok(())
    }
}

struct Harness {
    store: Arc<MemoryStore>,
    engine: Arc<UpdateEngine>,
    gated: DocumentId,
    other: DocumentId,
    entered: Receiver<()>,
    release: Sender<()>,
}

fn harness(config: EngineConfig) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let gated = store.create_document("gated.xml", ContentNode::element("a")).unwrap();
    let other = store.create_document("other.xml", ContentNode::element("a")).unwrap();

    let (entered_tx, entered) = mpsc::channel();
    let (release, release_rx) = mpsc::channel();
    let gate = Arc::new(GateTrigger {
        doc: gated,
        armed: AtomicBool::new(true),
        entered: Mutex::new(entered_tx),
        release: Mutex::new(release_rx),
    });

    let engine = UpdateEngine::builder(store.clone())
        .triggers(Arc::new(TriggerTable::new().with_fallback(gate)))
        .config(config)
        .build()
        .unwrap();

    Harness {
        store,
        engine: Arc::new(engine),
        gated,
        other,
        entered,
        release,
    }
}

fn spawn_append(
    engine: &Arc<UpdateEngine>,
    doc: DocumentId,
    name: &str,
) -> Receiver<Result<u64, ModificationError>> {
    let engine = Arc::clone(engine);
    let append = Append::new(
        Selection::new("/a", WorkingDocumentSet::of([doc])),
        vec![ContentNode::element(name)],
    );
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let result = engine.process(&Subject::new("worker"), &append);
        let _ = tx.send(result);
    });
    rx
}

// =============================================================================
// Lock Scope
// =============================================================================

/// Batches on different documents do not wait for each other.
#[test]
fn test_disjoint_documents_run_concurrently() {
    let h = harness(EngineConfig::default());

    let first = spawn_append(&h.engine, h.gated, "b");
    h.entered.recv_timeout(WAIT).unwrap();
    assert!(h.engine.locks().is_locked(h.gated));
    assert!(!h.engine.locks().is_selecting());

    let second = spawn_append(&h.engine, h.other, "c");
    assert_eq!(second.recv_timeout(WAIT).unwrap().unwrap(), 1);
    assert_eq!(h.store.serialize(h.other).unwrap(), "<a><c/></a>");

    h.release.send(()).unwrap();
    assert_eq!(first.recv_timeout(WAIT).unwrap().unwrap(), 1);
    assert_eq!(h.store.serialize(h.gated).unwrap(), "<a><b/></a>");
}

/// A batch on a locked document waits for the holder to finish.
#[test]
fn test_shared_document_serializes() {
    let h = harness(EngineConfig::default());

    let first = spawn_append(&h.engine, h.gated, "b");
    h.entered.recv_timeout(WAIT).unwrap();

    let second = spawn_append(&h.engine, h.gated, "c");
    assert!(second.recv_timeout(Duration::from_millis(200)).is_err());
    assert_eq!(h.store.serialize(h.gated).unwrap(), "<a/>");

    h.release.send(()).unwrap();
    assert_eq!(first.recv_timeout(WAIT).unwrap().unwrap(), 1);
    assert_eq!(second.recv_timeout(WAIT).unwrap().unwrap(), 1);
    assert_eq!(h.store.serialize(h.gated).unwrap(), "<a><b/><c/></a>");
    assert!(!h.engine.locks().is_locked(h.gated));
}

// =============================================================================
// Timeouts
// =============================================================================

#[test]
fn test_lock_timeout_reports_document() {
    let config = EngineConfig::default().with_lock_timeout(Duration::from_millis(50));
    let h = harness(config);

    let first = spawn_append(&h.engine, h.gated, "b");
    h.entered.recv_timeout(WAIT).unwrap();

    let second = spawn_append(&h.engine, h.gated, "c");
    let err = second.recv_timeout(WAIT).unwrap().unwrap_err();
    assert_eq!(err.code(), "XMUT_LOCK");
    match err {
        ModificationError::Lock(LockError::Timeout { document, .. }) => assert_eq!(document, h.gated),
        other => panic!("unexpected error: {:?}", other),
    }

    h.release.send(()).unwrap();
    assert_eq!(first.recv_timeout(WAIT).unwrap().unwrap(), 1);
    assert_eq!(h.store.serialize(h.gated).unwrap(), "<a><b/></a>");
    assert_eq!(h.engine.metrics().snapshot().modifications_failed, 1);
}
