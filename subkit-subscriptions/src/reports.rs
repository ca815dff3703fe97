//! Admin read models over subscriptions.

use crate::storage::BillingStore;
use crate::{Amount, Clock, Requester, Result, SubscriptionStatus};
use chrono::{Datelike, TimeZone, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscriptionOverview {
    pub total: usize,
    pub active: usize,
    pub trial: usize,
    pub cancelled: usize,
    pub expired: usize,
    /// Subscriptions started since the first day of the current month
    pub new_this_month: usize,
    pub mrr: Amount,
}

/// Active users on one plan
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanUsage {
    pub plan_id: String,
    pub plan_name: String,
    pub active_users: usize,
    pub monthly_revenue: Amount,
}

pub struct Reports {
    storage: Arc<dyn BillingStore>,
    clock: Arc<dyn Clock>,
}

impl Reports {
    pub fn new(storage: Arc<dyn BillingStore>, clock: Arc<dyn Clock>) -> Self {
        Self { storage, clock }
    }

    /// Monthly recurring revenue (annual charges count as ÷ 12)
    pub async fn mrr(&self, requester: &Requester) -> Result<Amount> {
        requester.require_admin()?;
        Ok(self.storage.compute_mrr(self.clock.now()).await?)
    }

    pub async fn overview(&self, requester: &Requester) -> Result<SubscriptionOverview> {
        requester.require_admin()?;
        let now = self.clock.now();
        let month_start = Utc
            .with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
            .single()
            .unwrap_or(now);

        let subs = self.storage.list_subscriptions().await?;
        let count = |status: SubscriptionStatus| subs.iter().filter(|s| s.status == status).count();

        Ok(SubscriptionOverview {
            total: subs.len(),
            active: count(SubscriptionStatus::Active),
            trial: count(SubscriptionStatus::Trial),
            cancelled: count(SubscriptionStatus::Cancelled),
            expired: count(SubscriptionStatus::Expired),
            new_this_month: subs.iter().filter(|s| s.start_date >= month_start).count(),
            mrr: self.storage.compute_mrr(now).await?,
        })
    }

    /// Active subscriptions grouped by plan, most popular first
    pub async fn active_users_by_plan(&self, requester: &Requester) -> Result<Vec<PlanUsage>> {
        requester.require_admin()?;

        let active = self
            .storage
            .list_subscriptions_by_status(SubscriptionStatus::Active)
            .await?;

        let mut by_plan: HashMap<String, PlanUsage> = HashMap::new();
        for sub in &active {
            let usage = by_plan
                .entry(sub.plan_id.clone())
                .or_insert_with(|| PlanUsage {
                    plan_id: sub.plan_id.clone(),
                    plan_name: sub.plan_id.clone(),
                    active_users: 0,
                    monthly_revenue: Amount::zero(),
                });
            usage.active_users += 1;
            usage.monthly_revenue = usage
                .monthly_revenue
                .saturating_add(&sub.period.monthly_equivalent(sub.amount));
        }

        let mut usages: Vec<PlanUsage> = by_plan.into_values().collect();
        for usage in &mut usages {
            if let Some(plan) = self.storage.get_plan(&usage.plan_id).await? {
                usage.plan_name = plan.name;
            }
        }
        usages.sort_by(|a, b| {
            b.active_users
                .cmp(&a.active_users)
                .then_with(|| a.plan_name.cmp(&b.plan_name))
        });
        Ok(usages)
    }
}
