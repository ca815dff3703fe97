//! Command implementations

pub mod billing;
pub mod payments;
pub mod plans;
pub mod subscriptions;

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;
use subkit_subscriptions::{
    BillingConfig, BillingStore, Clock, FileStorage, LifecycleManager, LogNotifier, ManualClock,
    Notifier, PaymentEngine, PlanCatalog, Reports, Requester, SystemClock,
};

/// Services wired over the demo's file store
pub struct Context {
    pub storage: Arc<FileStorage>,
    pub requester: Requester,
    pub catalog: PlanCatalog,
    pub manager: Arc<LifecycleManager>,
    pub payments: Arc<PaymentEngine>,
    pub reports: Reports,
}

impl Context {
    pub fn open(
        storage_dir: &Path,
        config: BillingConfig,
        at: Option<DateTime<Utc>>,
        requester: Requester,
    ) -> Result<Self> {
        let storage = Arc::new(FileStorage::new(storage_dir.to_path_buf())?);
        let store: Arc<dyn BillingStore> = storage.clone();
        let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);
        let clock: Arc<dyn Clock> = match at {
            Some(at) => Arc::new(ManualClock::new(at)),
            None => Arc::new(SystemClock),
        };

        let payments = Arc::new(PaymentEngine::new(
            store.clone(),
            notifier.clone(),
            clock.clone(),
            config,
        ));
        let manager = Arc::new(LifecycleManager::new(
            store.clone(),
            payments.clone(),
            notifier,
            clock.clone(),
        ));

        tracing::debug!(path = %storage_dir.display(), user_id = %requester.user_id, "opened demo store");

        Ok(Self {
            storage,
            requester,
            catalog: PlanCatalog::new(store.clone(), clock.clone()),
            manager,
            payments,
            reports: Reports::new(store, clock),
        })
    }
}
