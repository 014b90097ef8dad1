//! Engine counters
//!
//! - Counters only, monotonic, reset on process start
//! - Relaxed atomics; readers see eventually consistent values

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Operational counters shared by an engine and its operators
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    /// Top-level invocations that committed
    modifications_processed: AtomicU64,
    /// Top-level invocations that aborted
    modifications_failed: AtomicU64,
    /// Target nodes edited
    nodes_modified: AtomicU64,
    /// Targets rejected by the WRITE check
    permission_denials: AtomicU64,
    /// Cached addresses rewritten from relocation events
    relocations_applied: AtomicU64,
    defragmentations: AtomicU64,
    consistency_checks: AtomicU64,
    /// Non-node selections recorded under the trap policy
    select_type_trapped: AtomicU64,
    txn_committed: AtomicU64,
    txn_aborted: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_processed(&self) {
        self.modifications_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_failed(&self) {
        self.modifications_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_nodes_modified(&self, count: u64) {
        self.nodes_modified.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_permission_denials(&self) {
        self.permission_denials.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_relocations(&self, count: u64) {
        self.relocations_applied.fetch_add(count, Ordering::Relaxed);
    }

    pub fn increment_defragmentations(&self) {
        self.defragmentations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_consistency_checks(&self) {
        self.consistency_checks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_select_type_trapped(&self) {
        self.select_type_trapped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_txn_committed(&self) {
        self.txn_committed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_txn_aborted(&self) {
        self.txn_aborted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            modifications_processed: self.modifications_processed.load(Ordering::Relaxed),
            modifications_failed: self.modifications_failed.load(Ordering::Relaxed),
            nodes_modified: self.nodes_modified.load(Ordering::Relaxed),
            permission_denials: self.permission_denials.load(Ordering::Relaxed),
            relocations_applied: self.relocations_applied.load(Ordering::Relaxed),
            defragmentations: self.defragmentations.load(Ordering::Relaxed),
            consistency_checks: self.consistency_checks.load(Ordering::Relaxed),
            select_type_trapped: self.select_type_trapped.load(Ordering::Relaxed),
            txn_committed: self.txn_committed.load(Ordering::Relaxed),
            txn_aborted: self.txn_aborted.load(Ordering::Relaxed),
        }
    }

    /// Snapshot rendered as a JSON object
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.snapshot()).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Point-in-time copy of every counter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub modifications_processed: u64,
    pub modifications_failed: u64,
    pub nodes_modified: u64,
    pub permission_denials: u64,
    pub relocations_applied: u64,
    pub defragmentations: u64,
    pub consistency_checks: u64,
    pub select_type_trapped: u64,
    pub txn_committed: u64,
    pub txn_aborted: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_new_registry_is_zero() {
        assert_eq!(MetricsRegistry::new().snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn test_counters() {
        let metrics = MetricsRegistry::new();
        metrics.increment_processed();
        metrics.add_nodes_modified(3);
        metrics.add_nodes_modified(2);
        metrics.increment_permission_denials();
        metrics.add_relocations(4);

        let snap = metrics.snapshot();
        assert_eq!(snap.modifications_processed, 1);
        assert_eq!(snap.nodes_modified, 5);
        assert_eq!(snap.permission_denials, 1);
        assert_eq!(snap.relocations_applied, 4);
        assert_eq!(snap.modifications_failed, 0);
    }

    #[test]
    fn test_to_json() {
        let metrics = MetricsRegistry::new();
        metrics.increment_defragmentations();
        let value: serde_json::Value = serde_json::from_str(&metrics.to_json()).unwrap();
        assert_eq!(value["defragmentations"], 1);
        assert_eq!(value["txn_committed"], 0);
    }

    #[test]
    fn test_concurrent_increments() {
        let metrics = Arc::new(MetricsRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let metrics = Arc::clone(&metrics);
                thread::spawn(move || {
                    for _ in 0..100 {
                        metrics.increment_txn_committed();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(metrics.snapshot().txn_committed, 800);
    }
}
