//! Structural modification operators
//!
//! Append, Insert-Before/After, Remove, Rename, Replace and Update all run
//! the same batch protocol: select targets under the global update lock,
//! lock the owning documents as one bundle, edit each target after a WRITE
//! check, then account for fragmentation and release the bundle.
//! [`Conditional`] wraps a sequence of operators behind a test expression
//! and runs them inside the caller's transaction.
//!
//! Every operator short-circuits to a count of 0 when its content is empty
//! or its selection is, without locking or opening a transaction.

mod append;
mod batch;
mod conditional;
mod errors;
mod insert;
mod remove;
mod rename;
mod replace;
mod selector;
mod update;

pub use append::{Append, AppendPosition};
pub use conditional::Conditional;
pub use errors::{ModificationError, ModificationResult};
pub use insert::{Insert, InsertPosition};
pub use remove::Remove;
pub use rename::Rename;
pub use replace::Replace;
pub use selector::{ErrorPolicy, Selection, Selector, UpdateErrors};
pub use update::Update;

use crate::fragmentation::FragmentationAccountant;
use crate::lock::LockCoordinator;
use crate::notify::NotificationService;
use crate::observability::MetricsRegistry;
use crate::query::QueryEvaluator;
use crate::security::{PermissionService, Subject};
use crate::storage::DocumentStore;
use crate::trigger::{HookLedger, TriggerService};
use crate::txn::TransactionScope;

/// Collaborators available to an operator for one invocation
pub struct UpdateContext<'e> {
    pub subject: &'e Subject,
    pub store: &'e dyn DocumentStore,
    pub evaluator: &'e dyn QueryEvaluator,
    pub locks: &'e LockCoordinator,
    pub triggers: &'e dyn TriggerService,
    /// Hook bookkeeping for this invocation only
    pub hooks: &'e HookLedger,
    pub permissions: &'e dyn PermissionService,
    pub notifications: &'e NotificationService,
    pub accountant: &'e FragmentationAccountant,
    pub metrics: &'e MetricsRegistry,
}

/// A modification operator
pub trait Modification: Send + Sync {
    /// Operator name as written in edit scripts
    fn name(&self) -> &'static str;

    /// Apply the operator inside `scope`'s transaction, opening it on the
    /// first edit. Returns the number of targets processed.
    fn process(&self, ctx: &UpdateContext<'_>, scope: &mut TransactionScope<'_>) -> ModificationResult<u64>;
}
