//! Page layout effects of batches
//!
//! Small page capacities force splits during ordinary edits. These tests
//! check that targets still resolve after their neighbours move, and that
//! fragmentation is accounted for once per modified document.

use std::io::Write;
use std::sync::Arc;

use tempfile::NamedTempFile;
use xmutate::config::EngineConfig;
use xmutate::dom::{ContentNode, DocumentId, WorkingDocumentSet};
use xmutate::security::Subject;
use xmutate::storage::{DocumentStore, JournalOp, MemoryStore};
use xmutate::{Append, Insert, Selection, UpdateEngine};

// =============================================================================
// Test Utilities
// =============================================================================

fn list(items: usize) -> ContentNode {
    (0..items).fold(ContentNode::element("r"), |root, _| {
        root.with_child(ContentNode::element("i"))
    })
}

fn engine(store: &Arc<MemoryStore>, config: EngineConfig) -> UpdateEngine {
    UpdateEngine::builder(store.clone())
        .config(config)
        .build()
        .unwrap()
}

fn defragmentations(store: &MemoryStore, doc: DocumentId) -> usize {
    store
        .journal()
        .iter()
        .filter(|e| e.op == JournalOp::Defragment && e.document == Some(doc))
        .count()
}

fn select(expr: &str, doc: DocumentId) -> Selection {
    Selection::new(expr, WorkingDocumentSet::of([doc]))
}

// =============================================================================
// Relocation
// =============================================================================

/// Appending to every item splits pages and moves later items; every
/// target is still edited exactly once.
#[test]
fn test_targets_survive_page_splits() {
    let paged = Arc::new(MemoryStore::with_page_capacity(2));
    let doc = paged.create_document("list.xml", list(4)).unwrap();
    let engine = engine(&paged, EngineConfig::default());

    assert_eq!(
        engine
            .process(&Subject::new("editor"), &append_for(doc))
            .unwrap(),
        4
    );

    let roomy = Arc::new(MemoryStore::new());
    let reference = roomy.create_document("list.xml", list(4)).unwrap();
    let engine_roomy = UpdateEngine::builder(roomy.clone()).build().unwrap();
    engine_roomy
        .process(&Subject::new("editor"), &append_for(reference))
        .unwrap();

    assert_eq!(
        paged.serialize(doc).unwrap(),
        roomy.serialize(reference).unwrap()
    );
    assert_eq!(
        paged.serialize(doc).unwrap(),
        "<r><i><x/><y/></i><i><x/><y/></i><i><x/><y/></i><i><x/><y/></i></r>"
    );
    assert!(engine.metrics().snapshot().relocations_applied > 0);
    assert_eq!(paged.listener_count(), 0);
}

fn append_for(doc: DocumentId) -> Append {
    Append::new(
        select("/r/i", doc),
        vec![ContentNode::element("x"), ContentNode::element("y")],
    )
}

#[test]
fn test_sibling_inserts_across_splits() {
    let store = Arc::new(MemoryStore::with_page_capacity(2));
    let doc = store.create_document("list.xml", list(3)).unwrap();
    let engine = engine(&store, EngineConfig::default());

    let insert = Insert::before(select("/r/i", doc), vec![ContentNode::element("h")]);
    assert_eq!(engine.process(&Subject::new("editor"), &insert).unwrap(), 3);
    assert_eq!(
        store.serialize(doc).unwrap(),
        "<r><h/><i/><h/><i/><h/><i/></r>"
    );
    store.check_consistency(doc).unwrap();
}

// =============================================================================
// Fragmentation
// =============================================================================

#[test]
fn test_limit_exceeded_defragments_once() {
    let store = Arc::new(MemoryStore::with_page_capacity(2));
    let doc = store.create_document("list.xml", list(3)).unwrap();
    let engine = engine(&store, EngineConfig::default().with_fragmentation_limit(0));

    engine
        .process(&Subject::new("editor"), &append_for(doc))
        .unwrap();

    assert_eq!(defragmentations(&store, doc), 1);
    assert_eq!(store.split_count(doc).unwrap(), 0);
    let snapshot = engine.metrics().snapshot();
    assert_eq!(snapshot.defragmentations, 1);
    assert_eq!(snapshot.consistency_checks, 1);
}

/// With no limit the layout is left alone but still checked.
#[test]
fn test_unlimited_never_defragments() {
    let store = Arc::new(MemoryStore::with_page_capacity(2));
    let doc = store.create_document("list.xml", list(3)).unwrap();
    let engine = engine(&store, EngineConfig::default());

    engine
        .process(&Subject::new("editor"), &append_for(doc))
        .unwrap();

    assert_eq!(defragmentations(&store, doc), 0);
    assert!(store.split_count(doc).unwrap() > 0);
    assert_eq!(engine.metrics().snapshot().consistency_checks, 1);
}

#[test]
fn test_limit_not_reached() {
    let store = Arc::new(MemoryStore::new());
    let doc = store.create_document("list.xml", list(3)).unwrap();
    let engine = engine(&store, EngineConfig::default().with_fragmentation_limit(1000));

    engine
        .process(&Subject::new("editor"), &append_for(doc))
        .unwrap();
    assert_eq!(defragmentations(&store, doc), 0);
}

#[test]
fn test_consistency_checks_can_be_disabled() {
    let store = Arc::new(MemoryStore::new());
    let doc = store.create_document("list.xml", list(1)).unwrap();
    let config = EngineConfig {
        consistency_checks: false,
        ..EngineConfig::default()
    };
    let engine = engine(&store, config);

    engine
        .process(&Subject::new("editor"), &append_for(doc))
        .unwrap();
    assert_eq!(engine.metrics().snapshot().consistency_checks, 0);
}

// =============================================================================
// Configuration
// =============================================================================

#[test]
fn test_engine_from_config_file() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{"fragmentation_limit": 0, "lock_timeout_ms": 250, "log_level": "WARN"}}"#
    )
    .unwrap();
    let config = EngineConfig::load(file.path()).unwrap();
    assert!(config.consistency_checks);

    let store = Arc::new(MemoryStore::with_page_capacity(2));
    let doc = store.create_document("list.xml", list(3)).unwrap();
    let engine = engine(&store, config);
    assert_eq!(
        engine.locks().timeout(),
        Some(std::time::Duration::from_millis(250))
    );

    engine
        .process(&Subject::new("editor"), &append_for(doc))
        .unwrap();
    assert_eq!(defragmentations(&store, doc), 1);
}

#[test]
fn test_invalid_config_rejected_by_builder() {
    let store = Arc::new(MemoryStore::new());
    let config = EngineConfig {
        fragmentation_limit: -5,
        ..EngineConfig::default()
    };
    assert!(UpdateEngine::builder(store).config(config).build().is_err());
}
