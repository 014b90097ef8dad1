//! Update engine facade
//!
//! One call to [`UpdateEngine::process`] is one top-level invocation: it
//! owns the transaction boundary, committing when the operator succeeds
//! and aborting when it fails. Edit scripts with several operators go
//! through [`UpdateEngine::process_all`], which runs each operator as its
//! own invocation.

use std::sync::Arc;

use crate::config::{ConfigResult, EngineConfig};
use crate::fragmentation::FragmentationAccountant;
use crate::lock::LockCoordinator;
use crate::modification::{Modification, ModificationError, ModificationResult, UpdateContext};
use crate::notify::NotificationService;
use crate::observability::{Logger, MetricsRegistry, ObservationScope};
use crate::query::{PathEvaluator, QueryEvaluator};
use crate::security::{PermissionService, PermissionTable, Subject};
use crate::storage::DocumentStore;
use crate::trigger::{HookLedger, NoTriggers, TriggerService};
use crate::txn::{MemoryTransactionManager, TransactionManager, TransactionScope};

pub struct UpdateEngine {
    store: Arc<dyn DocumentStore>,
    evaluator: Arc<dyn QueryEvaluator>,
    transactions: Arc<dyn TransactionManager>,
    permissions: Arc<dyn PermissionService>,
    triggers: Arc<dyn TriggerService>,
    notifications: Arc<NotificationService>,
    metrics: Arc<MetricsRegistry>,
    locks: LockCoordinator,
    accountant: FragmentationAccountant,
    config: EngineConfig,
}

impl UpdateEngine {
    pub fn builder(store: Arc<dyn DocumentStore>) -> UpdateEngineBuilder {
        UpdateEngineBuilder::new(store)
    }

    /// Run one modification as a top-level invocation
    pub fn process(&self, subject: &Subject, modification: &dyn Modification) -> ModificationResult<u64> {
        let observation = ObservationScope::with_fields(
            "MODIFICATION",
            &[("op", modification.name()), ("subject", subject.name())],
        );
        let hooks = HookLedger::new();
        let ctx = self.context(subject, &hooks);
        let mut scope = TransactionScope::new(self.transactions.as_ref());

        let result = modification.process(&ctx, &mut scope);
        let opened = scope.is_open();
        let outcome = match result {
            Ok(count) => scope.commit().map(|()| count).map_err(ModificationError::from),
            Err(err) => {
                scope.abort();
                if opened {
                    self.metrics.increment_txn_aborted();
                }
                Err(err)
            }
        };

        match outcome {
            Ok(count) => {
                if opened {
                    self.metrics.increment_txn_committed();
                }
                self.metrics.increment_processed();
                observation.complete_with_fields(&[("count", &count.to_string())]);
                Ok(count)
            }
            Err(err) => {
                self.metrics.increment_failed();
                observation.fail(err.code(), &err.to_string());
                Err(err)
            }
        }
    }

    /// Run each modification as its own invocation, stopping at the first
    /// error. Returns the summed count.
    pub fn process_all(
        &self,
        subject: &Subject,
        modifications: &[Box<dyn Modification>],
    ) -> ModificationResult<u64> {
        let mut total = 0;
        for modification in modifications {
            total += self.process(subject, modification.as_ref())?;
        }
        Ok(total)
    }

    fn context<'e>(&'e self, subject: &'e Subject, hooks: &'e HookLedger) -> UpdateContext<'e> {
        UpdateContext {
            subject,
            store: self.store.as_ref(),
            evaluator: self.evaluator.as_ref(),
            locks: &self.locks,
            triggers: self.triggers.as_ref(),
            hooks,
            permissions: self.permissions.as_ref(),
            notifications: &self.notifications,
            accountant: &self.accountant,
            metrics: &self.metrics,
        }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn metrics(&self) -> &MetricsRegistry {
        &self.metrics
    }

    pub fn notifications(&self) -> &NotificationService {
        &self.notifications
    }

    pub fn locks(&self) -> &LockCoordinator {
        &self.locks
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

/// Assembles an [`UpdateEngine`]. Every collaborator except the store has
/// an in-crate default.
pub struct UpdateEngineBuilder {
    store: Arc<dyn DocumentStore>,
    evaluator: Option<Arc<dyn QueryEvaluator>>,
    transactions: Option<Arc<dyn TransactionManager>>,
    permissions: Option<Arc<dyn PermissionService>>,
    triggers: Option<Arc<dyn TriggerService>>,
    notifications: Option<Arc<NotificationService>>,
    metrics: Option<Arc<MetricsRegistry>>,
    config: EngineConfig,
}

impl UpdateEngineBuilder {
    fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            evaluator: None,
            transactions: None,
            permissions: None,
            triggers: None,
            notifications: None,
            metrics: None,
            config: EngineConfig::default(),
        }
    }

    pub fn evaluator(mut self, evaluator: Arc<dyn QueryEvaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    pub fn transactions(mut self, transactions: Arc<dyn TransactionManager>) -> Self {
        self.transactions = Some(transactions);
        self
    }

    pub fn permissions(mut self, permissions: Arc<dyn PermissionService>) -> Self {
        self.permissions = Some(permissions);
        self
    }

    pub fn triggers(mut self, triggers: Arc<dyn TriggerService>) -> Self {
        self.triggers = Some(triggers);
        self
    }

    pub fn notifications(mut self, notifications: Arc<NotificationService>) -> Self {
        self.notifications = Some(notifications);
        self
    }

    pub fn metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate the config, apply its log level, and build the engine
    pub fn build(self) -> ConfigResult<UpdateEngine> {
        self.config.validate()?;
        Logger::set_min_severity(self.config.severity()?);

        let store = self.store;
        let evaluator: Arc<dyn QueryEvaluator> = match self.evaluator {
            Some(evaluator) => evaluator,
            None => Arc::new(PathEvaluator::new(Arc::clone(&store))),
        };
        let transactions: Arc<dyn TransactionManager> = match self.transactions {
            Some(transactions) => transactions,
            None => Arc::new(MemoryTransactionManager::new()),
        };
        let permissions: Arc<dyn PermissionService> = match self.permissions {
            Some(permissions) => permissions,
            None => Arc::new(PermissionTable::allow_all()),
        };
        let triggers: Arc<dyn TriggerService> = match self.triggers {
            Some(triggers) => triggers,
            None => Arc::new(NoTriggers),
        };

        Ok(UpdateEngine {
            evaluator,
            transactions,
            permissions,
            triggers,
            notifications: self.notifications.unwrap_or_default(),
            metrics: self.metrics.unwrap_or_default(),
            locks: LockCoordinator::new(self.config.lock_timeout()),
            accountant: FragmentationAccountant::from_config(&self.config),
            config: self.config,
            store,
        })
    }
}
