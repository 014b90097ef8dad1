//! Post-mutation fragmentation accounting
//!
//! After a batch has edited its documents, each modified document's page
//! split count is compared against the configured limit. Documents over
//! the limit are compacted. When consistency checks are enabled, every
//! modified document is then checked structurally, compacted or not.

use std::collections::BTreeSet;

use crate::config::EngineConfig;
use crate::dom::DocumentId;
use crate::observability::{log_event_with_fields, Event, MetricsRegistry};
use crate::storage::{DocumentStore, StorageResult};
use crate::txn::Transaction;

/// Split-count threshold; `None` never compacts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FragmentationPolicy {
    limit: Option<u32>,
}

impl FragmentationPolicy {
    pub fn never() -> Self {
        Self { limit: None }
    }

    pub fn limit(limit: u32) -> Self {
        Self { limit: Some(limit) }
    }

    /// Negative values mean never; values past `u32::MAX` saturate
    pub fn from_limit(limit: i64) -> Self {
        if limit < 0 {
            Self::never()
        } else {
            Self::limit(u32::try_from(limit).unwrap_or(u32::MAX))
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::from_limit(config.fragmentation_limit)
    }

    pub fn threshold(&self) -> Option<u32> {
        self.limit
    }

    /// True if `split_count` is strictly above the limit
    pub fn exceeded(&self, split_count: u32) -> bool {
        self.limit.is_some_and(|limit| split_count > limit)
    }
}

/// What the accountant did for one document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentationOutcome {
    pub document: DocumentId,
    pub split_count: u32,
    pub defragmented: bool,
    pub checked: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct FragmentationAccountant {
    policy: FragmentationPolicy,
    consistency_checks: bool,
}

impl FragmentationAccountant {
    pub fn new(policy: FragmentationPolicy, consistency_checks: bool) -> Self {
        Self {
            policy,
            consistency_checks,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(FragmentationPolicy::from_config(config), config.consistency_checks)
    }

    /// Evaluate every document in `modified` exactly once
    pub fn run(
        &self,
        store: &dyn DocumentStore,
        txn: &Transaction,
        modified: &BTreeSet<DocumentId>,
        metrics: &MetricsRegistry,
    ) -> StorageResult<Vec<FragmentationOutcome>> {
        modified
            .iter()
            .map(|&doc| self.account(store, txn, doc, metrics))
            .collect()
    }

    fn account(
        &self,
        store: &dyn DocumentStore,
        txn: &Transaction,
        doc: DocumentId,
        metrics: &MetricsRegistry,
    ) -> StorageResult<FragmentationOutcome> {
        let split_count = store.split_count(doc)?;
        let document = doc.to_string();

        let defragmented = self.policy.exceeded(split_count);
        if defragmented {
            let splits = split_count.to_string();
            log_event_with_fields(
                Event::DefragmentScheduled,
                &[("document", &document), ("split_count", &splits)],
            );
            store.defragment(txn, doc)?;
            metrics.increment_defragmentations();
        }

        if self.consistency_checks {
            store.check_consistency(doc)?;
            metrics.increment_consistency_checks();
            log_event_with_fields(Event::ConsistencyCheck, &[("document", &document)]);
        }

        Ok(FragmentationOutcome {
            document: doc,
            split_count,
            defragmented,
            checked: self.consistency_checks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::ContentNode;
    use crate::storage::MemoryStore;

    #[test]
    fn test_policy_from_limit() {
        assert_eq!(FragmentationPolicy::from_limit(-1).threshold(), None);
        assert_eq!(FragmentationPolicy::from_limit(0).threshold(), Some(0));
        assert!(!FragmentationPolicy::never().exceeded(u32::MAX));
        assert!(!FragmentationPolicy::limit(2).exceeded(2));
        assert!(FragmentationPolicy::limit(2).exceeded(3));
    }

    fn fragmented_store() -> (MemoryStore, DocumentId) {
        let store = MemoryStore::with_page_capacity(2);
        let mut root = ContentNode::element("r");
        for _ in 0..6 {
            root = root.with_child(ContentNode::element("x"));
        }
        let doc = store.create_document("r.xml", root).unwrap();
        (store, doc)
    }

    #[test]
    fn test_defragments_over_limit() {
        let (store, doc) = fragmented_store();
        let before = store.split_count(doc).unwrap();
        assert!(before > 0);

        let metrics = MetricsRegistry::new();
        let accountant = FragmentationAccountant::new(FragmentationPolicy::limit(0), true);
        let txn = Transaction::begin();
        let outcomes = accountant
            .run(&store, &txn, &BTreeSet::from([doc]), &metrics)
            .unwrap();

        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].defragmented);
        assert_eq!(outcomes[0].split_count, before);
        assert_eq!(store.split_count(doc).unwrap(), 0);
        assert_eq!(metrics.snapshot().defragmentations, 1);
        assert_eq!(metrics.snapshot().consistency_checks, 1);
    }

    #[test]
    fn test_never_policy_still_checks() {
        let (store, doc) = fragmented_store();
        let before = store.split_count(doc).unwrap();

        let metrics = MetricsRegistry::new();
        let accountant = FragmentationAccountant::new(FragmentationPolicy::never(), true);
        let outcomes = accountant
            .run(&store, &Transaction::begin(), &BTreeSet::from([doc]), &metrics)
            .unwrap();

        assert!(!outcomes[0].defragmented);
        assert!(outcomes[0].checked);
        assert_eq!(store.split_count(doc).unwrap(), before);
        assert_eq!(metrics.snapshot().defragmentations, 0);
    }

    #[test]
    fn test_checks_can_be_disabled() {
        let (store, doc) = fragmented_store();
        let metrics = MetricsRegistry::new();
        let accountant = FragmentationAccountant::new(FragmentationPolicy::never(), false);
        let outcomes = accountant
            .run(&store, &Transaction::begin(), &BTreeSet::from([doc]), &metrics)
            .unwrap();
        assert!(!outcomes[0].checked);
        assert_eq!(metrics.snapshot().consistency_checks, 0);
    }
}
