use crate::payment::sort_newest_first;
use crate::{Amount, Payment, PaymentStatus, Plan, Subscription, SubscriptionStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[cfg(not(target_arch = "wasm32"))]
use serde::{de::DeserializeOwned, Serialize};
#[cfg(not(target_arch = "wasm32"))]
use std::path::{Path, PathBuf};

pub type Result<T> = anyhow::Result<T>;

/// Plan catalog persistence
#[async_trait]
pub trait PlanStore: Send + Sync {
    async fn get_plan(&self, plan_id: &str) -> Result<Option<Plan>>;
    async fn get_plan_by_name(&self, name: &str) -> Result<Option<Plan>>;
    /// Active plans ordered by display order, then name
    async fn list_active_plans(&self) -> Result<Vec<Plan>>;
    async fn list_plans(&self) -> Result<Vec<Plan>>;
    async fn add_plan(&self, plan: &Plan) -> Result<()>;
    async fn update_plan(&self, plan: &Plan) -> Result<()>;
    async fn remove_plan(&self, plan_id: &str) -> Result<()>;
    /// Exact, case-sensitive name match
    async fn plan_name_exists(&self, name: &str) -> Result<bool>;
}

/// Subscription persistence
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    async fn get_subscription(&self, subscription_id: &str) -> Result<Option<Subscription>>;
    /// Newest start date first
    async fn list_subscriptions_by_user(&self, user_id: &str) -> Result<Vec<Subscription>>;
    /// The subscription holding the user's seat (`Trial` or `Active`), if any
    async fn get_active_subscription_by_user(&self, user_id: &str)
        -> Result<Option<Subscription>>;
    /// Oldest first, so sweeps visit subscriptions in a stable order
    async fn list_subscriptions_by_status(
        &self,
        status: SubscriptionStatus,
    ) -> Result<Vec<Subscription>>;
    /// Newest first
    async fn list_subscriptions(&self) -> Result<Vec<Subscription>>;
    async fn add_subscription(&self, subscription: &Subscription) -> Result<()>;
    async fn update_subscription(&self, subscription: &Subscription) -> Result<()>;
    async fn remove_subscription(&self, subscription_id: &str) -> Result<()>;
    /// Monthly recurring revenue of `Active` subscriptions started by `now`
    async fn compute_mrr(&self, now: DateTime<Utc>) -> Result<Amount> {
        let active = self
            .list_subscriptions_by_status(SubscriptionStatus::Active)
            .await?;
        Ok(mrr_of(&active, now))
    }
}

/// Payment persistence. Payments are never removed.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn get_payment(&self, payment_id: &str) -> Result<Option<Payment>>;
    async fn list_payments_by_subscription(&self, subscription_id: &str) -> Result<Vec<Payment>>;
    async fn list_payments_by_status(&self, status: PaymentStatus) -> Result<Vec<Payment>>;
    /// Payments whose processing (or, if unprocessed, creation) date falls in
    /// `[from, to]`
    async fn list_payments_by_date_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Payment>>;
    async fn list_payments(&self) -> Result<Vec<Payment>>;
    async fn add_payment(&self, payment: &Payment) -> Result<()>;
    async fn update_payment(&self, payment: &Payment) -> Result<()>;
}

/// Whether a user has a usable payment method registered
#[async_trait]
pub trait PaymentMethodStore: Send + Sync {
    async fn has_method_on_file(&self, user_id: &str) -> Result<bool>;
    async fn set_method_on_file(&self, user_id: &str, on_file: bool) -> Result<()>;
}

/// Every store the services need, behind one handle.
pub trait BillingStore: PlanStore + SubscriptionStore + PaymentStore + PaymentMethodStore {}

impl<T> BillingStore for T where T: PlanStore + SubscriptionStore + PaymentStore + PaymentMethodStore
{}

fn mrr_of(subscriptions: &[Subscription], now: DateTime<Utc>) -> Amount {
    subscriptions
        .iter()
        .filter(|s| s.status == SubscriptionStatus::Active && s.start_date <= now)
        .map(|s| s.period.monthly_equivalent(s.amount))
        .sum()
}

fn sort_plans(plans: &mut [Plan]) {
    plans.sort_by(|a, b| {
        a.display_order
            .cmp(&b.display_order)
            .then_with(|| a.name.cmp(&b.name))
    });
}

/// In-process storage
///
/// Each entity kind lives in its own mutex-guarded map; no lock is held
/// across calls.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    plans: Arc<Mutex<HashMap<String, Plan>>>,
    subscriptions: Arc<Mutex<HashMap<String, Subscription>>>,
    payments: Arc<Mutex<HashMap<String, Payment>>>,
    payment_methods: Arc<Mutex<HashMap<String, bool>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PlanStore for MemoryStorage {
    async fn get_plan(&self, plan_id: &str) -> Result<Option<Plan>> {
        let plans = self.plans.lock().unwrap_or_else(|e| e.into_inner());
        Ok(plans.get(plan_id).cloned())
    }

    async fn get_plan_by_name(&self, name: &str) -> Result<Option<Plan>> {
        let plans = self.plans.lock().unwrap_or_else(|e| e.into_inner());
        Ok(plans.values().find(|p| p.name == name).cloned())
    }

    async fn list_active_plans(&self) -> Result<Vec<Plan>> {
        let plans = self.plans.lock().unwrap_or_else(|e| e.into_inner());
        let mut active: Vec<Plan> = plans.values().filter(|p| p.active).cloned().collect();
        sort_plans(&mut active);
        Ok(active)
    }

    async fn list_plans(&self) -> Result<Vec<Plan>> {
        let plans = self.plans.lock().unwrap_or_else(|e| e.into_inner());
        let mut all: Vec<Plan> = plans.values().cloned().collect();
        sort_plans(&mut all);
        Ok(all)
    }

    async fn add_plan(&self, plan: &Plan) -> Result<()> {
        let mut plans = self.plans.lock().unwrap_or_else(|e| e.into_inner());
        if plans.contains_key(&plan.plan_id) {
            anyhow::bail!("plan {} already exists", plan.plan_id);
        }
        plans.insert(plan.plan_id.clone(), plan.clone());
        Ok(())
    }

    async fn update_plan(&self, plan: &Plan) -> Result<()> {
        let mut plans = self.plans.lock().unwrap_or_else(|e| e.into_inner());
        match plans.get_mut(&plan.plan_id) {
            Some(existing) => {
                *existing = plan.clone();
                Ok(())
            }
            None => anyhow::bail!("plan {} does not exist", plan.plan_id),
        }
    }

    async fn remove_plan(&self, plan_id: &str) -> Result<()> {
        let mut plans = self.plans.lock().unwrap_or_else(|e| e.into_inner());
        plans.remove(plan_id);
        Ok(())
    }

    async fn plan_name_exists(&self, name: &str) -> Result<bool> {
        let plans = self.plans.lock().unwrap_or_else(|e| e.into_inner());
        Ok(plans.values().any(|p| p.name == name))
    }
}

#[async_trait]
impl SubscriptionStore for MemoryStorage {
    async fn get_subscription(&self, subscription_id: &str) -> Result<Option<Subscription>> {
        let subs = self.subscriptions.lock().unwrap_or_else(|e| e.into_inner());
        Ok(subs.get(subscription_id).cloned())
    }

    async fn list_subscriptions_by_user(&self, user_id: &str) -> Result<Vec<Subscription>> {
        let subs = self.subscriptions.lock().unwrap_or_else(|e| e.into_inner());
        let mut found: Vec<Subscription> = subs
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        found.sort_by_key(|s| std::cmp::Reverse(s.start_date));
        Ok(found)
    }

    async fn get_active_subscription_by_user(
        &self,
        user_id: &str,
    ) -> Result<Option<Subscription>> {
        let subs = self.subscriptions.lock().unwrap_or_else(|e| e.into_inner());
        Ok(subs
            .values()
            .find(|s| s.user_id == user_id && s.status.holds_seat())
            .cloned())
    }

    async fn list_subscriptions_by_status(
        &self,
        status: SubscriptionStatus,
    ) -> Result<Vec<Subscription>> {
        let subs = self.subscriptions.lock().unwrap_or_else(|e| e.into_inner());
        let mut found: Vec<Subscription> =
            subs.values().filter(|s| s.status == status).cloned().collect();
        found.sort_by_key(|s| s.created_at);
        Ok(found)
    }

    async fn list_subscriptions(&self) -> Result<Vec<Subscription>> {
        let subs = self.subscriptions.lock().unwrap_or_else(|e| e.into_inner());
        let mut all: Vec<Subscription> = subs.values().cloned().collect();
        all.sort_by_key(|s| std::cmp::Reverse(s.created_at));
        Ok(all)
    }

    async fn add_subscription(&self, subscription: &Subscription) -> Result<()> {
        let mut subs = self.subscriptions.lock().unwrap_or_else(|e| e.into_inner());
        if subs.contains_key(&subscription.subscription_id) {
            anyhow::bail!("subscription {} already exists", subscription.subscription_id);
        }
        subs.insert(subscription.subscription_id.clone(), subscription.clone());
        Ok(())
    }

    async fn update_subscription(&self, subscription: &Subscription) -> Result<()> {
        let mut subs = self.subscriptions.lock().unwrap_or_else(|e| e.into_inner());
        match subs.get_mut(&subscription.subscription_id) {
            Some(existing) => {
                *existing = subscription.clone();
                Ok(())
            }
            None => anyhow::bail!(
                "subscription {} does not exist",
                subscription.subscription_id
            ),
        }
    }

    async fn remove_subscription(&self, subscription_id: &str) -> Result<()> {
        let mut subs = self.subscriptions.lock().unwrap_or_else(|e| e.into_inner());
        subs.remove(subscription_id);
        Ok(())
    }
}

#[async_trait]
impl PaymentStore for MemoryStorage {
    async fn get_payment(&self, payment_id: &str) -> Result<Option<Payment>> {
        let payments = self.payments.lock().unwrap_or_else(|e| e.into_inner());
        Ok(payments.get(payment_id).cloned())
    }

    async fn list_payments_by_subscription(&self, subscription_id: &str) -> Result<Vec<Payment>> {
        let payments = self.payments.lock().unwrap_or_else(|e| e.into_inner());
        let mut found: Vec<Payment> = payments
            .values()
            .filter(|p| p.subscription_id == subscription_id)
            .cloned()
            .collect();
        sort_newest_first(&mut found);
        Ok(found)
    }

    async fn list_payments_by_status(&self, status: PaymentStatus) -> Result<Vec<Payment>> {
        let payments = self.payments.lock().unwrap_or_else(|e| e.into_inner());
        let mut found: Vec<Payment> = payments
            .values()
            .filter(|p| p.status == status)
            .cloned()
            .collect();
        sort_newest_first(&mut found);
        Ok(found)
    }

    async fn list_payments_by_date_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Payment>> {
        let payments = self.payments.lock().unwrap_or_else(|e| e.into_inner());
        let mut found: Vec<Payment> = payments
            .values()
            .filter(|p| {
                let date = p.effective_date();
                date >= from && date <= to
            })
            .cloned()
            .collect();
        sort_newest_first(&mut found);
        Ok(found)
    }

    async fn list_payments(&self) -> Result<Vec<Payment>> {
        let payments = self.payments.lock().unwrap_or_else(|e| e.into_inner());
        let mut all: Vec<Payment> = payments.values().cloned().collect();
        sort_newest_first(&mut all);
        Ok(all)
    }

    async fn add_payment(&self, payment: &Payment) -> Result<()> {
        let mut payments = self.payments.lock().unwrap_or_else(|e| e.into_inner());
        if payments.contains_key(&payment.payment_id) {
            anyhow::bail!("payment {} already exists", payment.payment_id);
        }
        payments.insert(payment.payment_id.clone(), payment.clone());
        Ok(())
    }

    async fn update_payment(&self, payment: &Payment) -> Result<()> {
        let mut payments = self.payments.lock().unwrap_or_else(|e| e.into_inner());
        match payments.get_mut(&payment.payment_id) {
            Some(existing) => {
                *existing = payment.clone();
                Ok(())
            }
            None => anyhow::bail!("payment {} does not exist", payment.payment_id),
        }
    }
}

#[async_trait]
impl PaymentMethodStore for MemoryStorage {
    async fn has_method_on_file(&self, user_id: &str) -> Result<bool> {
        let methods = self.payment_methods.lock().unwrap_or_else(|e| e.into_inner());
        Ok(methods.get(user_id).copied().unwrap_or(false))
    }

    async fn set_method_on_file(&self, user_id: &str, on_file: bool) -> Result<()> {
        let mut methods = self.payment_methods.lock().unwrap_or_else(|e| e.into_inner());
        methods.insert(user_id.to_string(), on_file);
        Ok(())
    }
}

/// File-based storage implementation (native only)
///
/// One pretty-printed JSON document per entity under `plans/`,
/// `subscriptions/` and `payments/`, plus a single `payment_methods.json`
/// map. Writers serialize on an fs2 exclusive lock over `.lock` in the base
/// directory, so several processes may share one directory.
#[cfg(not(target_arch = "wasm32"))]
pub struct FileStorage {
    base_path: PathBuf,
}

#[cfg(not(target_arch = "wasm32"))]
const PLANS_DIR: &str = "plans";
#[cfg(not(target_arch = "wasm32"))]
const SUBSCRIPTIONS_DIR: &str = "subscriptions";
#[cfg(not(target_arch = "wasm32"))]
const PAYMENTS_DIR: &str = "payments";
#[cfg(not(target_arch = "wasm32"))]
const PAYMENT_METHODS_FILE: &str = "payment_methods.json";

#[cfg(not(target_arch = "wasm32"))]
impl FileStorage {
    pub fn new(base_path: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&base_path)?;
        std::fs::create_dir_all(base_path.join(PLANS_DIR))?;
        std::fs::create_dir_all(base_path.join(SUBSCRIPTIONS_DIR))?;
        std::fs::create_dir_all(base_path.join(PAYMENTS_DIR))?;

        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Ids become file names, so anything that could leave `dir` is refused.
    fn entity_path(&self, dir: &str, id: &str) -> Result<PathBuf> {
        if id.is_empty()
            || id == "."
            || id == ".."
            || id.contains(['/', '\\', std::path::MAIN_SEPARATOR])
        {
            anyhow::bail!("invalid {} id {:?}", dir, id);
        }
        Ok(self.base_path.join(dir).join(format!("{}.json", id)))
    }

    /// Run `f` while holding the directory-wide writer lock.
    fn with_write_lock<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        use fs2::FileExt;
        use std::fs::OpenOptions;

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.base_path.join(".lock"))?;

        lock_file.lock_exclusive()?;
        let result = f();
        lock_file.unlock()?;
        result
    }

    /// Write through a temp file and rename so readers never see a torn
    /// document.
    fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(value)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    fn read_one<T: DeserializeOwned>(&self, dir: &str, id: &str) -> Result<Option<T>> {
        let path = self.entity_path(dir, id)?;
        if !path.exists() {
            return Ok(None);
        }
        let json = std::fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&json)?))
    }

    fn read_all<T: DeserializeOwned>(&self, dir: &str) -> Result<Vec<T>> {
        let mut items = Vec::new();
        for entry in std::fs::read_dir(self.base_path.join(dir))? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let json = std::fs::read_to_string(&path)?;
            items.push(serde_json::from_str(&json)?);
        }
        Ok(items)
    }

    fn insert<T: Serialize>(&self, dir: &str, id: &str, value: &T) -> Result<()> {
        let path = self.entity_path(dir, id)?;
        self.with_write_lock(|| {
            if path.exists() {
                anyhow::bail!("{} {} already exists", dir, id);
            }
            Self::write_json(&path, value)
        })
    }

    fn replace<T: Serialize>(&self, dir: &str, id: &str, value: &T) -> Result<()> {
        let path = self.entity_path(dir, id)?;
        self.with_write_lock(|| {
            if !path.exists() {
                anyhow::bail!("{} {} does not exist", dir, id);
            }
            Self::write_json(&path, value)
        })
    }

    fn delete(&self, dir: &str, id: &str) -> Result<()> {
        let path = self.entity_path(dir, id)?;
        self.with_write_lock(|| {
            if path.exists() {
                std::fs::remove_file(&path)?;
            }
            Ok(())
        })
    }

    fn read_payment_methods(&self) -> Result<HashMap<String, bool>> {
        let path = self.base_path.join(PAYMENT_METHODS_FILE);
        if !path.exists() {
            return Ok(HashMap::new());
        }
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

#[cfg(not(target_arch = "wasm32"))]
#[async_trait]
impl PlanStore for FileStorage {
    async fn get_plan(&self, plan_id: &str) -> Result<Option<Plan>> {
        self.read_one(PLANS_DIR, plan_id)
    }

    async fn get_plan_by_name(&self, name: &str) -> Result<Option<Plan>> {
        let plans: Vec<Plan> = self.read_all(PLANS_DIR)?;
        Ok(plans.into_iter().find(|p| p.name == name))
    }

    async fn list_active_plans(&self) -> Result<Vec<Plan>> {
        let mut plans: Vec<Plan> = self.read_all(PLANS_DIR)?;
        plans.retain(|p| p.active);
        sort_plans(&mut plans);
        Ok(plans)
    }

    async fn list_plans(&self) -> Result<Vec<Plan>> {
        let mut plans: Vec<Plan> = self.read_all(PLANS_DIR)?;
        sort_plans(&mut plans);
        Ok(plans)
    }

    async fn add_plan(&self, plan: &Plan) -> Result<()> {
        self.insert(PLANS_DIR, &plan.plan_id, plan)
    }

    async fn update_plan(&self, plan: &Plan) -> Result<()> {
        self.replace(PLANS_DIR, &plan.plan_id, plan)
    }

    async fn remove_plan(&self, plan_id: &str) -> Result<()> {
        self.delete(PLANS_DIR, plan_id)
    }

    async fn plan_name_exists(&self, name: &str) -> Result<bool> {
        Ok(self.get_plan_by_name(name).await?.is_some())
    }
}

#[cfg(not(target_arch = "wasm32"))]
#[async_trait]
impl SubscriptionStore for FileStorage {
    async fn get_subscription(&self, subscription_id: &str) -> Result<Option<Subscription>> {
        self.read_one(SUBSCRIPTIONS_DIR, subscription_id)
    }

    async fn list_subscriptions_by_user(&self, user_id: &str) -> Result<Vec<Subscription>> {
        let mut subs: Vec<Subscription> = self.read_all(SUBSCRIPTIONS_DIR)?;
        subs.retain(|s| s.user_id == user_id);
        subs.sort_by_key(|s| std::cmp::Reverse(s.start_date));
        Ok(subs)
    }

    async fn get_active_subscription_by_user(
        &self,
        user_id: &str,
    ) -> Result<Option<Subscription>> {
        let subs: Vec<Subscription> = self.read_all(SUBSCRIPTIONS_DIR)?;
        Ok(subs
            .into_iter()
            .find(|s| s.user_id == user_id && s.status.holds_seat()))
    }

    async fn list_subscriptions_by_status(
        &self,
        status: SubscriptionStatus,
    ) -> Result<Vec<Subscription>> {
        let mut subs: Vec<Subscription> = self.read_all(SUBSCRIPTIONS_DIR)?;
        subs.retain(|s| s.status == status);
        subs.sort_by_key(|s| s.created_at);
        Ok(subs)
    }

    async fn list_subscriptions(&self) -> Result<Vec<Subscription>> {
        let mut subs: Vec<Subscription> = self.read_all(SUBSCRIPTIONS_DIR)?;
        subs.sort_by_key(|s| std::cmp::Reverse(s.created_at));
        Ok(subs)
    }

    async fn add_subscription(&self, subscription: &Subscription) -> Result<()> {
        self.insert(SUBSCRIPTIONS_DIR, &subscription.subscription_id, subscription)
    }

    async fn update_subscription(&self, subscription: &Subscription) -> Result<()> {
        self.replace(SUBSCRIPTIONS_DIR, &subscription.subscription_id, subscription)
    }

    async fn remove_subscription(&self, subscription_id: &str) -> Result<()> {
        self.delete(SUBSCRIPTIONS_DIR, subscription_id)
    }
}

#[cfg(not(target_arch = "wasm32"))]
#[async_trait]
impl PaymentStore for FileStorage {
    async fn get_payment(&self, payment_id: &str) -> Result<Option<Payment>> {
        self.read_one(PAYMENTS_DIR, payment_id)
    }

    async fn list_payments_by_subscription(&self, subscription_id: &str) -> Result<Vec<Payment>> {
        let mut payments: Vec<Payment> = self.read_all(PAYMENTS_DIR)?;
        payments.retain(|p| p.subscription_id == subscription_id);
        sort_newest_first(&mut payments);
        Ok(payments)
    }

    async fn list_payments_by_status(&self, status: PaymentStatus) -> Result<Vec<Payment>> {
        let mut payments: Vec<Payment> = self.read_all(PAYMENTS_DIR)?;
        payments.retain(|p| p.status == status);
        sort_newest_first(&mut payments);
        Ok(payments)
    }

    async fn list_payments_by_date_range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Payment>> {
        let mut payments: Vec<Payment> = self.read_all(PAYMENTS_DIR)?;
        payments.retain(|p| {
            let date = p.effective_date();
            date >= from && date <= to
        });
        sort_newest_first(&mut payments);
        Ok(payments)
    }

    async fn list_payments(&self) -> Result<Vec<Payment>> {
        let mut payments: Vec<Payment> = self.read_all(PAYMENTS_DIR)?;
        sort_newest_first(&mut payments);
        Ok(payments)
    }

    async fn add_payment(&self, payment: &Payment) -> Result<()> {
        self.insert(PAYMENTS_DIR, &payment.payment_id, payment)
    }

    async fn update_payment(&self, payment: &Payment) -> Result<()> {
        self.replace(PAYMENTS_DIR, &payment.payment_id, payment)
    }
}

#[cfg(not(target_arch = "wasm32"))]
#[async_trait]
impl PaymentMethodStore for FileStorage {
    async fn has_method_on_file(&self, user_id: &str) -> Result<bool> {
        Ok(self
            .read_payment_methods()?
            .get(user_id)
            .copied()
            .unwrap_or(false))
    }

    async fn set_method_on_file(&self, user_id: &str, on_file: bool) -> Result<()> {
        self.with_write_lock(|| {
            let mut methods = self.read_payment_methods()?;
            methods.insert(user_id.to_string(), on_file);
            Self::write_json(&self.base_path.join(PAYMENT_METHODS_FILE), &methods)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BillingPeriod;
    use chrono::{Duration, TimeZone};
    use tempfile::tempdir;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
    }

    fn basic_plan() -> Plan {
        Plan::new("Basic", Amount::from_cents(2990), Amount::from_cents(29900))
    }

    #[tokio::test]
    async fn test_memory_plan_queries() {
        let storage = MemoryStorage::new();
        let free = Plan::new("Free", Amount::zero(), Amount::zero()).with_display_order(0);
        let mut pro = Plan::new("Pro", Amount::from_cents(4990), Amount::from_cents(49900))
            .with_display_order(2);
        pro.active = false;
        let basic = basic_plan().with_display_order(1);

        for plan in [&pro, &basic, &free] {
            storage.add_plan(plan).await.unwrap();
        }

        let active = storage.list_active_plans().await.unwrap();
        let names: Vec<&str> = active.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Free", "Basic"]);
        assert_eq!(storage.list_plans().await.unwrap().len(), 3);

        assert!(storage.plan_name_exists("Pro").await.unwrap());
        assert!(!storage.plan_name_exists("pro").await.unwrap());
        assert!(storage.add_plan(&free).await.is_err());
    }

    #[tokio::test]
    async fn test_memory_seat_lookup() {
        let storage = MemoryStorage::new();
        let plan = basic_plan();

        let mut old = Subscription::start("u1", &plan, BillingPeriod::Monthly, now()).unwrap();
        old.status = SubscriptionStatus::Expired;
        storage.add_subscription(&old).await.unwrap();
        assert!(storage
            .get_active_subscription_by_user("u1")
            .await
            .unwrap()
            .is_none());

        let current = Subscription::start(
            "u1",
            &plan,
            BillingPeriod::Monthly,
            now() + Duration::days(1),
        )
        .unwrap();
        storage.add_subscription(&current).await.unwrap();
        let seat = storage.get_active_subscription_by_user("u1").await.unwrap();
        assert_eq!(seat.unwrap().subscription_id, current.subscription_id);

        let history = storage.list_subscriptions_by_user("u1").await.unwrap();
        assert_eq!(history[0].subscription_id, current.subscription_id);
    }

    #[tokio::test]
    async fn test_compute_mrr_normalizes_annual() {
        let storage = MemoryStorage::new();
        let plan = basic_plan();

        let monthly = Subscription::start("u1", &plan, BillingPeriod::Monthly, now()).unwrap();
        let annual = Subscription::start("u2", &plan, BillingPeriod::Annual, now()).unwrap();
        let mut cancelled = Subscription::start("u3", &plan, BillingPeriod::Monthly, now()).unwrap();
        cancelled.status = SubscriptionStatus::Cancelled;

        for sub in [&monthly, &annual, &cancelled] {
            storage.add_subscription(sub).await.unwrap();
        }

        // 29.90 + 299.00 / 12 (24.92)
        let mrr = storage.compute_mrr(now()).await.unwrap();
        assert_eq!(mrr, Amount::from_cents(5482));
    }

    #[tokio::test]
    async fn test_memory_payment_method_default_false() {
        let storage = MemoryStorage::new();
        assert!(!storage.has_method_on_file("u1").await.unwrap());
        storage.set_method_on_file("u1", true).await.unwrap();
        assert!(storage.has_method_on_file("u1").await.unwrap());
    }

    #[tokio::test]
    async fn test_file_storage_round_trip() {
        let temp_dir = tempdir().unwrap();
        let storage = FileStorage::new(temp_dir.path().to_path_buf()).unwrap();

        let plan = basic_plan();
        storage.add_plan(&plan).await.unwrap();

        let loaded = storage.get_plan(&plan.plan_id).await.unwrap();
        assert_eq!(loaded, Some(plan.clone()));

        let mut renamed = plan.clone();
        renamed.name = "Starter".to_string();
        storage.update_plan(&renamed).await.unwrap();
        assert!(storage.plan_name_exists("Starter").await.unwrap());

        storage.remove_plan(&plan.plan_id).await.unwrap();
        assert!(storage.get_plan(&plan.plan_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_storage_update_missing_fails() {
        let temp_dir = tempdir().unwrap();
        let storage = FileStorage::new(temp_dir.path().to_path_buf()).unwrap();

        let payment = Payment::pending("sub_1", Amount::from_cents(100), now(), now());
        assert!(storage.update_payment(&payment).await.is_err());
        storage.add_payment(&payment).await.unwrap();
        assert!(storage.update_payment(&payment).await.is_ok());
    }
}
