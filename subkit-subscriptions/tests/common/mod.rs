//! Shared fixtures for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use subkit_subscriptions::{
    Amount, BillingConfig, Clock, LifecycleManager, ManualClock, MemoryStorage, Notifier,
    Payment, PaymentEngine, PaymentMethodStore, PaymentStatus, PaymentStore, Plan, PlanCatalog,
    PlanStore, Reports, Subscription, SubscriptionStatus, SubscriptionStore,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    PaymentApproved { user_id: String, amount: Amount },
    PaymentRejected { user_id: String, reason: String },
    TrialExpiring { user_id: String, days_left: i64 },
    Cancelled { user_id: String, plan_name: String },
    Renewed { user_id: String, plan_name: String },
}

/// Notifier that keeps everything it was asked to send
#[derive(Default)]
pub struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }

    fn push(&self, notice: Notice) {
        self.notices.lock().unwrap().push(notice);
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify_payment_approved(&self, user_id: &str, amount: Amount) -> anyhow::Result<()> {
        self.push(Notice::PaymentApproved {
            user_id: user_id.to_string(),
            amount,
        });
        Ok(())
    }

    async fn notify_payment_rejected(
        &self,
        user_id: &str,
        _amount: Amount,
        reason: &str,
    ) -> anyhow::Result<()> {
        self.push(Notice::PaymentRejected {
            user_id: user_id.to_string(),
            reason: reason.to_string(),
        });
        Ok(())
    }

    async fn notify_trial_expiring(&self, user_id: &str, days_left: i64) -> anyhow::Result<()> {
        self.push(Notice::TrialExpiring {
            user_id: user_id.to_string(),
            days_left,
        });
        Ok(())
    }

    async fn notify_subscription_cancelled(
        &self,
        user_id: &str,
        plan_name: &str,
    ) -> anyhow::Result<()> {
        self.push(Notice::Cancelled {
            user_id: user_id.to_string(),
            plan_name: plan_name.to_string(),
        });
        Ok(())
    }

    async fn notify_subscription_renewed(
        &self,
        user_id: &str,
        plan_name: &str,
    ) -> anyhow::Result<()> {
        self.push(Notice::Renewed {
            user_id: user_id.to_string(),
            plan_name: plan_name.to_string(),
        });
        Ok(())
    }
}

/// Store that delegates to a shared [`MemoryStorage`] except where told to
/// fail: whole status listings, or writes to individual subscriptions.
#[derive(Default)]
pub struct FaultyStorage {
    inner: Arc<MemoryStorage>,
    listings_down: Mutex<HashSet<SubscriptionStatus>>,
    broken_subscriptions: Mutex<HashSet<String>>,
}

impl FaultyStorage {
    pub fn new(inner: Arc<MemoryStorage>) -> Self {
        Self {
            inner,
            ..Default::default()
        }
    }

    pub fn fail_listing(&self, status: SubscriptionStatus) {
        self.listings_down.lock().unwrap().insert(status);
    }

    pub fn fail_updates_of(&self, subscription_id: &str) {
        self.broken_subscriptions
            .lock()
            .unwrap()
            .insert(subscription_id.to_string());
    }
}

#[async_trait]
impl PlanStore for FaultyStorage {
    async fn get_plan(&self, id: &str) -> anyhow::Result<Option<Plan>> {
        self.inner.get_plan(id).await
    }
    async fn get_plan_by_name(&self, name: &str) -> anyhow::Result<Option<Plan>> {
        self.inner.get_plan_by_name(name).await
    }
    async fn list_active_plans(&self) -> anyhow::Result<Vec<Plan>> {
        self.inner.list_active_plans().await
    }
    async fn list_plans(&self) -> anyhow::Result<Vec<Plan>> {
        self.inner.list_plans().await
    }
    async fn add_plan(&self, plan: &Plan) -> anyhow::Result<()> {
        self.inner.add_plan(plan).await
    }
    async fn update_plan(&self, plan: &Plan) -> anyhow::Result<()> {
        self.inner.update_plan(plan).await
    }
    async fn remove_plan(&self, id: &str) -> anyhow::Result<()> {
        self.inner.remove_plan(id).await
    }
    async fn plan_name_exists(&self, name: &str) -> anyhow::Result<bool> {
        self.inner.plan_name_exists(name).await
    }
}

#[async_trait]
impl SubscriptionStore for FaultyStorage {
    async fn get_subscription(&self, id: &str) -> anyhow::Result<Option<Subscription>> {
        self.inner.get_subscription(id).await
    }
    async fn list_subscriptions_by_user(&self, user: &str) -> anyhow::Result<Vec<Subscription>> {
        self.inner.list_subscriptions_by_user(user).await
    }
    async fn get_active_subscription_by_user(
        &self,
        user: &str,
    ) -> anyhow::Result<Option<Subscription>> {
        self.inner.get_active_subscription_by_user(user).await
    }
    async fn list_subscriptions_by_status(
        &self,
        status: SubscriptionStatus,
    ) -> anyhow::Result<Vec<Subscription>> {
        if self.listings_down.lock().unwrap().contains(&status) {
            anyhow::bail!("replica unavailable");
        }
        self.inner.list_subscriptions_by_status(status).await
    }
    async fn list_subscriptions(&self) -> anyhow::Result<Vec<Subscription>> {
        self.inner.list_subscriptions().await
    }
    async fn add_subscription(&self, s: &Subscription) -> anyhow::Result<()> {
        self.inner.add_subscription(s).await
    }
    async fn update_subscription(&self, s: &Subscription) -> anyhow::Result<()> {
        if self
            .broken_subscriptions
            .lock()
            .unwrap()
            .contains(&s.subscription_id)
        {
            anyhow::bail!("write to {} rejected", s.subscription_id);
        }
        self.inner.update_subscription(s).await
    }
    async fn remove_subscription(&self, id: &str) -> anyhow::Result<()> {
        self.inner.remove_subscription(id).await
    }
}

#[async_trait]
impl PaymentStore for FaultyStorage {
    async fn get_payment(&self, id: &str) -> anyhow::Result<Option<Payment>> {
        self.inner.get_payment(id).await
    }
    async fn list_payments_by_subscription(&self, id: &str) -> anyhow::Result<Vec<Payment>> {
        self.inner.list_payments_by_subscription(id).await
    }
    async fn list_payments_by_status(&self, status: PaymentStatus) -> anyhow::Result<Vec<Payment>> {
        self.inner.list_payments_by_status(status).await
    }
    async fn list_payments_by_date_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Payment>> {
        self.inner.list_payments_by_date_range(from, to).await
    }
    async fn list_payments(&self) -> anyhow::Result<Vec<Payment>> {
        self.inner.list_payments().await
    }
    async fn add_payment(&self, p: &Payment) -> anyhow::Result<()> {
        self.inner.add_payment(p).await
    }
    async fn update_payment(&self, p: &Payment) -> anyhow::Result<()> {
        self.inner.update_payment(p).await
    }
}

#[async_trait]
impl PaymentMethodStore for FaultyStorage {
    async fn has_method_on_file(&self, user: &str) -> anyhow::Result<bool> {
        self.inner.has_method_on_file(user).await
    }
    async fn set_method_on_file(&self, user: &str, on_file: bool) -> anyhow::Result<()> {
        self.inner.set_method_on_file(user, on_file).await
    }
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap()
}

/// Every service wired over one in-memory store, a manual clock and a
/// recording notifier. The catalog holds Free, Basic (7-day trial) and Pro.
///
/// Services reach the store through `faults`, which passes everything
/// through until a test tells it to fail.
pub struct Harness {
    pub storage: Arc<MemoryStorage>,
    pub faults: Arc<FaultyStorage>,
    pub clock: ManualClock,
    pub notifier: Arc<RecordingNotifier>,
    pub payments: Arc<PaymentEngine>,
    pub manager: Arc<LifecycleManager>,
    pub catalog: PlanCatalog,
    pub reports: Reports,
    pub free: Plan,
    pub basic: Plan,
    pub pro: Plan,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(BillingConfig::default()).await
    }

    pub async fn with_config(config: BillingConfig) -> Self {
        Self::build(config, true).await
    }

    /// Catalog without the Free plan
    pub async fn without_free_plan() -> Self {
        Self::build(BillingConfig::default(), false).await
    }

    async fn build(config: BillingConfig, with_free: bool) -> Self {
        let storage = Arc::new(MemoryStorage::new());
        let clock = ManualClock::new(start_time());
        let notifier = Arc::new(RecordingNotifier::default());

        let free = Plan::new("Free", Amount::zero(), Amount::zero());
        let basic = Plan::new("Basic", Amount::from_cents(2990), Amount::from_cents(29900))
            .with_trial(7)
            .with_display_order(1);
        let pro = Plan::new("Pro", Amount::from_cents(4990), Amount::from_cents(49900))
            .with_display_order(2);
        if with_free {
            storage.add_plan(&free).await.unwrap();
        }
        storage.add_plan(&basic).await.unwrap();
        storage.add_plan(&pro).await.unwrap();

        let faults = Arc::new(FaultyStorage::new(storage.clone()));
        let payments = Arc::new(
            PaymentEngine::new(
                faults.clone(),
                notifier.clone(),
                Arc::new(clock.clone()),
                config,
            )
            .with_seed(2025),
        );
        let manager = Arc::new(LifecycleManager::new(
            faults.clone(),
            payments.clone(),
            notifier.clone(),
            Arc::new(clock.clone()),
        ));
        let catalog = PlanCatalog::new(faults.clone(), Arc::new(clock.clone()));
        let reports = Reports::new(faults.clone(), Arc::new(clock.clone()));

        Self {
            storage,
            faults,
            clock,
            notifier,
            payments,
            manager,
            catalog,
            reports,
            free,
            basic,
            pro,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// A second engine over the same store with a different config
    pub fn engine_with(&self, config: BillingConfig) -> PaymentEngine {
        PaymentEngine::new(
            self.faults.clone(),
            self.notifier.clone(),
            Arc::new(self.clock.clone()),
            config,
        )
        .with_seed(7)
    }
}
