//! Lifecycle events emitted by the update engine

use std::fmt;

use super::logger::Severity;

/// Observable engine events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Invocation
    /// Top-level modification started
    ModificationBegin,
    /// Top-level modification finished
    ModificationComplete,
    /// Top-level modification failed and was aborted
    ModificationFailed,

    // Selection
    /// Select expression evaluated and materialized
    SelectionComplete,
    /// Non-node selection recorded in the update error sequence
    SelectTypeTrapped,
    /// Conditional test was false; children skipped
    ConditionalSkipped,

    // Locking and triggers
    /// Document write locks acquired as one bundle
    LockBundleAcquired,
    /// Document write locks released
    LockBundleReleased,
    /// An after-update hook failed while releasing on an error path
    TriggerFailed,

    // Mutation
    /// A document was changed and stored
    DocumentModified,
    /// A stale cached address was rewritten from a relocation event
    RelocationApplied,

    // Fragmentation
    /// Split count over threshold; compaction run
    DefragmentScheduled,
    /// Structural consistency check ran
    ConsistencyCheck,

    // Transactions
    /// Transaction committed
    TxnCommit,
    /// Transaction aborted
    TxnAbort,

    // Configuration
    /// Engine configuration loaded
    ConfigLoaded,
}

impl Event {
    /// Returns the event name
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ModificationBegin => "MODIFICATION_BEGIN",
            Event::ModificationComplete => "MODIFICATION_COMPLETE",
            Event::ModificationFailed => "MODIFICATION_FAILED",
            Event::SelectionComplete => "SELECTION_COMPLETE",
            Event::SelectTypeTrapped => "SELECT_TYPE_TRAPPED",
            Event::ConditionalSkipped => "CONDITIONAL_SKIPPED",
            Event::LockBundleAcquired => "LOCK_BUNDLE_ACQUIRED",
            Event::LockBundleReleased => "LOCK_BUNDLE_RELEASED",
            Event::TriggerFailed => "TRIGGER_FAILED",
            Event::DocumentModified => "DOCUMENT_MODIFIED",
            Event::RelocationApplied => "RELOCATION_APPLIED",
            Event::DefragmentScheduled => "DEFRAGMENT_SCHEDULED",
            Event::ConsistencyCheck => "CONSISTENCY_CHECK",
            Event::TxnCommit => "TXN_COMMIT",
            Event::TxnAbort => "TXN_ABORT",
            Event::ConfigLoaded => "CONFIG_LOADED",
        }
    }

    /// Default severity for this event
    pub fn severity(&self) -> Severity {
        match self {
            Event::ModificationFailed | Event::TriggerFailed => Severity::Error,
            Event::SelectTypeTrapped | Event::TxnAbort => Severity::Warn,
            Event::SelectionComplete
            | Event::LockBundleAcquired
            | Event::LockBundleReleased
            | Event::RelocationApplied
            | Event::ConsistencyCheck
            | Event::TxnCommit
            | Event::DocumentModified => Severity::Trace,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
