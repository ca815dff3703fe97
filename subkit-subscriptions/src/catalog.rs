use crate::storage::BillingStore;
use crate::{
    Clock, NewPlan, Plan, PlanUpdate, Requester, Result, SubscriptionError, SubscriptionStatus,
};
use std::sync::Arc;

/// Admin-managed plan registry
pub struct PlanCatalog {
    storage: Arc<dyn BillingStore>,
    clock: Arc<dyn Clock>,
}

impl PlanCatalog {
    pub fn new(storage: Arc<dyn BillingStore>, clock: Arc<dyn Clock>) -> Self {
        Self { storage, clock }
    }

    /// Plans open for new subscriptions, in display order
    pub async fn list_active(&self) -> Result<Vec<Plan>> {
        Ok(self.storage.list_active_plans().await?)
    }

    pub async fn list_all(&self, requester: &Requester) -> Result<Vec<Plan>> {
        requester.require_admin()?;
        Ok(self.storage.list_plans().await?)
    }

    pub async fn get(&self, plan_id: &str) -> Result<Plan> {
        self.storage
            .get_plan(plan_id)
            .await?
            .ok_or_else(|| SubscriptionError::not_found("plan", plan_id))
    }

    #[tracing::instrument(skip(self, requester, request), fields(name = %request.name))]
    pub async fn create(&self, requester: &Requester, request: NewPlan) -> Result<Plan> {
        requester.require_admin()?;

        let mut plan = request.into_plan();
        plan.created_at = self.clock.now();
        plan.updated_at = plan.created_at;
        plan.validate()?;

        if self.storage.plan_name_exists(&plan.name).await? {
            return Err(SubscriptionError::Conflict(format!(
                "a plan named {} already exists",
                plan.name
            )));
        }

        self.storage.add_plan(&plan).await?;
        tracing::info!(plan_id = %plan.plan_id, "plan created");
        Ok(plan)
    }

    /// Apply a partial update.
    ///
    /// Once any subscription references the plan, only price, description,
    /// feature metadata, display order and the active flag may change.
    #[tracing::instrument(skip(self, requester, update))]
    pub async fn update(
        &self,
        requester: &Requester,
        plan_id: &str,
        update: PlanUpdate,
    ) -> Result<Plan> {
        requester.require_admin()?;
        let mut plan = self.get(plan_id).await?;

        if let Some(name) = update.name.as_deref().filter(|n| *n != plan.name) {
            if let Some(other) = self.storage.get_plan_by_name(name).await? {
                if other.plan_id != plan.plan_id {
                    return Err(SubscriptionError::Conflict(format!(
                        "a plan named {} already exists",
                        name
                    )));
                }
            }
        }

        if update.touches_locked_fields(&plan) && self.is_referenced(plan_id).await? {
            return Err(SubscriptionError::Conflict(format!(
                "plan {} is referenced by subscriptions; only prices, description, features, order and active flag may change",
                plan_id
            )));
        }

        update.apply(&mut plan);
        plan.validate()?;
        plan.updated_at = self.clock.now();

        self.storage.update_plan(&plan).await?;
        tracing::info!("plan updated");
        Ok(plan)
    }

    /// Remove a plan no Active subscription is billed against.
    ///
    /// Trials on the plan do not block removal: they resolve to a paid
    /// cycle at their locked amount or to the Free plan.
    #[tracing::instrument(skip(self, requester))]
    pub async fn remove(&self, requester: &Requester, plan_id: &str) -> Result<()> {
        requester.require_admin()?;
        self.get(plan_id).await?;

        let in_use = self
            .storage
            .list_subscriptions()
            .await?
            .iter()
            .any(|s| s.plan_id == plan_id && s.status == SubscriptionStatus::Active);
        if in_use {
            return Err(SubscriptionError::Conflict(format!(
                "plan {} has active subscriptions",
                plan_id
            )));
        }

        self.storage.remove_plan(plan_id).await?;
        tracing::info!("plan removed");
        Ok(())
    }

    async fn is_referenced(&self, plan_id: &str) -> Result<bool> {
        Ok(self
            .storage
            .list_subscriptions()
            .await?
            .iter()
            .any(|s| s.plan_id == plan_id))
    }
}
