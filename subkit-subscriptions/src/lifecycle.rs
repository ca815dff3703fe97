//! Subscription lifecycle state machine.
//!
//! ```text
//!            create (trial plan)            create (no trial)
//!                  │                               │
//!                  ▼     trial expiry / payment    ▼
//!               Trial ─────────────────────────▶ Active ◀──────────┐
//!                  │                               │               │
//!                  └──────────── cancel ───────────┤            renew
//!                                                  ▼               │
//!                                              Cancelled ──────────┤
//!                                                  │ settlement    │
//!                                                  ▼               │
//!                                               Expired ───────────┘
//! ```
//!
//! Interactive operations ([`create`](LifecycleManager::create),
//! [`cancel`](LifecycleManager::cancel), [`renew`](LifecycleManager::renew))
//! fail synchronously. The three sweeps isolate failures per subscription and
//! report them in a [`SweepReport`].

use crate::access::AccessPolicy;
use crate::notifier::log_failure;
use crate::storage::BillingStore;
use crate::{
    BillingConfig, BillingPeriod, Clock, Notifier, PaymentEngine, Requester, Result,
    Subscription, SubscriptionError, SubscriptionStatus,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Outcome of one batch sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Subscriptions the sweep looked at
    pub examined: usize,
    /// Subscriptions whose state changed
    pub changed: usize,
    /// Subscriptions that hit an error and were skipped
    pub failed: usize,
}

pub struct LifecycleManager {
    storage: Arc<dyn BillingStore>,
    payments: Arc<PaymentEngine>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    config: BillingConfig,
}

impl LifecycleManager {
    pub fn new(
        storage: Arc<dyn BillingStore>,
        payments: Arc<PaymentEngine>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let config = payments.config().clone();
        Self {
            storage,
            payments,
            notifier,
            clock,
            config,
        }
    }

    pub fn payments(&self) -> &Arc<PaymentEngine> {
        &self.payments
    }

    pub fn config(&self) -> &BillingConfig {
        &self.config
    }

    /// Subscribe `user_id` to an active plan.
    ///
    /// Starts in `Trial` when the plan offers one, `Active` otherwise. No
    /// charge is opened here; the first one comes from trial resolution or
    /// the renewal sweep.
    #[tracing::instrument(skip(self))]
    pub async fn create(
        &self,
        plan_id: &str,
        user_id: &str,
        period: BillingPeriod,
    ) -> Result<Subscription> {
        let plan = self
            .storage
            .get_plan(plan_id)
            .await?
            .filter(|p| p.active)
            .ok_or_else(|| SubscriptionError::not_found("plan", plan_id))?;

        self.ensure_seat_free(user_id, None).await?;

        let subscription = Subscription::start(user_id, &plan, period, self.clock.now())?;
        self.storage.add_subscription(&subscription).await?;

        tracing::info!(
            subscription_id = %subscription.subscription_id,
            status = %subscription.status,
            "subscription created"
        );
        Ok(subscription)
    }

    /// Cancel at the end of the paid period.
    ///
    /// Access runs until the current next-charge date; free-tier
    /// subscriptions, which have none, end immediately.
    #[tracing::instrument(skip(self, requester), fields(user_id = %requester.user_id))]
    pub async fn cancel(
        &self,
        subscription_id: &str,
        requester: &Requester,
    ) -> Result<Subscription> {
        let mut subscription = self
            .load_owned(subscription_id, requester, AccessPolicy::OwnerOrAdmin)
            .await?;

        if !subscription.status.holds_seat() {
            return Err(SubscriptionError::InvalidState(format!(
                "subscription {} is already {}",
                subscription_id, subscription.status
            )));
        }

        let now = self.clock.now();
        subscription.transition(SubscriptionStatus::Cancelled, now)?;
        subscription.end_date = Some(subscription.next_charge_date.unwrap_or(now));
        self.storage.update_subscription(&subscription).await?;

        tracing::info!(end_date = ?subscription.end_date, "subscription cancelled");

        let plan_name = self.plan_name(&subscription.plan_id).await;
        log_failure(
            "subscription_cancelled",
            &subscription.user_id,
            self.notifier
                .notify_subscription_cancelled(&subscription.user_id, &plan_name)
                .await,
        );
        Ok(subscription)
    }

    /// Bring a cancelled or expired subscription back to `Active` with a
    /// fresh cycle starting now.
    #[tracing::instrument(skip(self, requester), fields(user_id = %requester.user_id))]
    pub async fn renew(&self, subscription_id: &str, requester: &Requester) -> Result<Subscription> {
        let mut subscription = self
            .load_owned(subscription_id, requester, AccessPolicy::OwnerOrAdmin)
            .await?;

        if subscription.status.holds_seat() {
            return Err(SubscriptionError::InvalidState(format!(
                "subscription {} is {}, only cancelled or expired subscriptions can be renewed",
                subscription_id, subscription.status
            )));
        }
        self.ensure_seat_free(&subscription.user_id, Some(subscription_id))
            .await?;

        let now = self.clock.now();
        subscription.transition(SubscriptionStatus::Active, now)?;
        subscription.end_date = None;
        subscription.clear_trial();
        subscription.schedule_next_charge(now);
        self.storage.update_subscription(&subscription).await?;

        tracing::info!(next_charge = ?subscription.next_charge_date, "subscription renewed");

        let plan_name = self.plan_name(&subscription.plan_id).await;
        log_failure(
            "subscription_renewed",
            &subscription.user_id,
            self.notifier
                .notify_subscription_renewed(&subscription.user_id, &plan_name)
                .await,
        );
        Ok(subscription)
    }

    /// Resolve every trial whose end date has passed.
    ///
    /// Users with a payment method on file convert to a paid cycle with a
    /// pending charge; everyone else drops to the Free plan. Trials ending
    /// within `trial_warning_days` get a warning instead.
    #[tracing::instrument(skip(self))]
    pub async fn resolve_expired_trials(&self) -> Result<SweepReport> {
        let now = self.clock.now();
        let trials = self
            .storage
            .list_subscriptions_by_status(SubscriptionStatus::Trial)
            .await?;

        let mut report = SweepReport::default();
        for subscription in trials {
            report.examined += 1;

            if !subscription.trial_expired(now) {
                self.warn_if_trial_ending(&subscription, now).await;
                continue;
            }

            let id = subscription.subscription_id.clone();
            match self.resolve_trial(subscription, now).await {
                Ok(()) => report.changed += 1,
                Err(e) => {
                    report.failed += 1;
                    log_sweep_failure("resolve_expired_trials", &id, &e);
                }
            }
        }

        tracing::info!(?report, "trial sweep finished");
        Ok(report)
    }

    /// Renew every paid cycle whose next charge is due.
    ///
    /// Each missed cycle advances the next-charge date by one period from
    /// its previous value and opens its own charge, until the date is in the
    /// future. A subscription several cycles behind therefore catches up in
    /// one run, and a second run at the same instant changes nothing.
    #[tracing::instrument(skip(self))]
    pub async fn process_auto_renewals(&self) -> Result<SweepReport> {
        let now = self.clock.now();
        let active = self
            .storage
            .list_subscriptions_by_status(SubscriptionStatus::Active)
            .await?;

        let mut report = SweepReport::default();
        for subscription in active {
            report.examined += 1;
            if !subscription.renewal_due(now) {
                continue;
            }

            let id = subscription.subscription_id.clone();
            match self.renew_cycle(subscription, now).await {
                Ok(()) => report.changed += 1,
                Err(e) => {
                    report.failed += 1;
                    log_sweep_failure("process_auto_renewals", &id, &e);
                }
            }
        }

        tracing::info!(?report, "renewal sweep finished");
        Ok(report)
    }

    /// Expire cancelled subscriptions whose paid access has run out.
    #[tracing::instrument(skip(self))]
    pub async fn settle_cancellations(&self) -> Result<SweepReport> {
        let now = self.clock.now();
        let cancelled = self
            .storage
            .list_subscriptions_by_status(SubscriptionStatus::Cancelled)
            .await?;

        let mut report = SweepReport::default();
        for mut subscription in cancelled {
            report.examined += 1;
            if !subscription.settlement_due(now) {
                continue;
            }

            let id = subscription.subscription_id.clone();
            let result = match subscription.transition(SubscriptionStatus::Expired, now) {
                Ok(()) => self
                    .storage
                    .update_subscription(&subscription)
                    .await
                    .map_err(SubscriptionError::from),
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => {
                    report.changed += 1;
                    tracing::debug!(subscription_id = %id, "subscription expired");
                }
                Err(e) => {
                    report.failed += 1;
                    log_sweep_failure("settle_cancellations", &id, &e);
                }
            }
        }

        tracing::info!(?report, "settlement sweep finished");
        Ok(report)
    }

    pub async fn get(&self, subscription_id: &str, requester: &Requester) -> Result<Subscription> {
        self.load_owned(subscription_id, requester, AccessPolicy::OwnerOrAdmin)
            .await
    }

    /// Full history for one user, newest first
    pub async fn list_for_user(
        &self,
        user_id: &str,
        requester: &Requester,
    ) -> Result<Vec<Subscription>> {
        requester.require(user_id, AccessPolicy::OwnerOrAdmin)?;
        Ok(self.storage.list_subscriptions_by_user(user_id).await?)
    }

    /// The subscription currently holding the user's seat
    pub async fn active_for_user(
        &self,
        user_id: &str,
        requester: &Requester,
    ) -> Result<Option<Subscription>> {
        requester.require(user_id, AccessPolicy::OwnerOrAdmin)?;
        Ok(self.storage.get_active_subscription_by_user(user_id).await?)
    }

    pub async fn list_all(&self, requester: &Requester) -> Result<Vec<Subscription>> {
        requester.require_admin()?;
        Ok(self.storage.list_subscriptions().await?)
    }

    /// Hard delete. Payments referencing the subscription are kept.
    #[tracing::instrument(skip(self, requester), fields(user_id = %requester.user_id))]
    pub async fn remove(&self, subscription_id: &str, requester: &Requester) -> Result<()> {
        requester.require_admin()?;
        if self
            .storage
            .get_subscription(subscription_id)
            .await?
            .is_none()
        {
            return Err(SubscriptionError::not_found("subscription", subscription_id));
        }
        self.storage.remove_subscription(subscription_id).await?;
        tracing::info!("subscription removed");
        Ok(())
    }

    async fn resolve_trial(&self, mut subscription: Subscription, now: DateTime<Utc>) -> Result<()> {
        self.ensure_seat_free(&subscription.user_id, Some(&subscription.subscription_id))
            .await?;

        if self
            .storage
            .has_method_on_file(&subscription.user_id)
            .await?
        {
            subscription.activate_paid(now)?;
            self.storage.update_subscription(&subscription).await?;
            let payment = self.payments.open_charge(&subscription, now).await?;
            tracing::info!(
                subscription_id = %subscription.subscription_id,
                payment_id = %payment.payment_id,
                "trial converted to paid"
            );
            return Ok(());
        }

        let free = self
            .storage
            .get_plan_by_name(&self.config.free_plan_name)
            .await?
            .ok_or_else(|| {
                SubscriptionError::FatalConfiguration(format!(
                    "free plan {:?} is not in the catalog",
                    self.config.free_plan_name
                ))
            })?;

        subscription.transition(SubscriptionStatus::Active, now)?;
        subscription.clear_trial();
        subscription.plan_id = free.plan_id.clone();
        subscription.amount = free.monthly_price;
        subscription.next_charge_date = None;
        self.storage.update_subscription(&subscription).await?;

        tracing::info!(
            subscription_id = %subscription.subscription_id,
            plan_id = %free.plan_id,
            "trial downgraded to free plan"
        );
        Ok(())
    }

    /// One update and one charge per missed cycle, oldest first.
    async fn renew_cycle(&self, mut subscription: Subscription, now: DateTime<Utc>) -> Result<()> {
        // Fail before touching the subscription if no charge could be opened.
        self.payments.due_date(now)?;

        while let Some(previous) = subscription.next_charge_date.filter(|next| *next <= now) {
            let next = subscription.period.advance(previous);
            if next <= previous {
                return Err(SubscriptionError::InvalidState(format!(
                    "subscription {} has no billing date after {}",
                    subscription.subscription_id, previous
                )));
            }
            subscription.next_charge_date = Some(next);
            subscription.updated_at = now;
            self.storage.update_subscription(&subscription).await?;

            let payment = self.payments.open_charge(&subscription, now).await?;
            tracing::info!(
                subscription_id = %subscription.subscription_id,
                payment_id = %payment.payment_id,
                next_charge = %next,
                "cycle renewed"
            );
        }
        Ok(())
    }

    async fn warn_if_trial_ending(&self, subscription: &Subscription, now: DateTime<Utc>) {
        let warning_days = i64::from(self.config.trial_warning_days);
        if let Some(days_left) = subscription
            .trial_days_left(now)
            .filter(|d| warning_days > 0 && *d <= warning_days)
        {
            log_failure(
                "trial_expiring",
                &subscription.user_id,
                self.notifier
                    .notify_trial_expiring(&subscription.user_id, days_left)
                    .await,
            );
        }
    }

    /// `Conflict` if the user already holds a seat with a subscription other
    /// than `except`.
    async fn ensure_seat_free(&self, user_id: &str, except: Option<&str>) -> Result<()> {
        let holder = self
            .storage
            .list_subscriptions_by_user(user_id)
            .await?
            .into_iter()
            .find(|s| s.status.holds_seat() && except != Some(s.subscription_id.as_str()));
        match holder {
            Some(holder) => Err(SubscriptionError::Conflict(format!(
                "user {} already holds subscription {} ({})",
                user_id, holder.subscription_id, holder.status
            ))),
            None => Ok(()),
        }
    }

    async fn load_owned(
        &self,
        subscription_id: &str,
        requester: &Requester,
        policy: AccessPolicy,
    ) -> Result<Subscription> {
        let subscription = self
            .storage
            .get_subscription(subscription_id)
            .await?
            .ok_or_else(|| SubscriptionError::not_found("subscription", subscription_id))?;
        requester.require(&subscription.user_id, policy)?;
        Ok(subscription)
    }

    async fn plan_name(&self, plan_id: &str) -> String {
        match self.storage.get_plan(plan_id).await {
            Ok(Some(plan)) => plan.name,
            _ => plan_id.to_string(),
        }
    }
}

fn log_sweep_failure(sweep: &str, subscription_id: &str, error: &SubscriptionError) {
    if error.is_fatal() {
        tracing::error!(sweep, subscription_id, error = %error, "sweep item failed");
    } else {
        tracing::warn!(sweep, subscription_id, error = %error, "sweep item failed");
    }
}
