//! Simulated payment engine.
//!
//! Charges are opened by the lifecycle sweeps and settled when the owner
//! calls [`PaymentEngine::process`]. Outcomes are drawn from the configured
//! [`ApprovalPolicy`](crate::ApprovalPolicy); nothing talks to a real gateway.

use crate::access::AccessPolicy;
use crate::clock::days_after;
use crate::notifier::log_failure;
use crate::payment::sort_newest_first;
use crate::storage::BillingStore;
use crate::{
    Amount, BillingConfig, Clock, Notifier, Payment, PaymentFilter, PaymentStatus, Requester,
    Result, Subscription, SubscriptionError, FAILURE_REASONS,
};
use chrono::{DateTime, Datelike, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::{Arc, Mutex};

/// Aggregate view over every payment
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentStatistics {
    pub total: usize,
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
    pub cancelled: usize,
    pub refunded: usize,
    pub total_revenue: Amount,
    pub revenue_this_month: Amount,
    /// approved / total × 100, two decimal places
    pub approval_rate: Decimal,
}

pub struct PaymentEngine {
    storage: Arc<dyn BillingStore>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    config: BillingConfig,
    rng: Mutex<StdRng>,
}

enum Outcome {
    Approved,
    Rejected(&'static str),
}

impl PaymentEngine {
    pub fn new(
        storage: Arc<dyn BillingStore>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
        config: BillingConfig,
    ) -> Self {
        Self {
            storage,
            notifier,
            clock,
            config,
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Make outcomes reproducible
    pub fn with_seed(self, seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            ..self
        }
    }

    pub fn config(&self) -> &BillingConfig {
        &self.config
    }

    /// Open a pending charge for the subscription's current cycle amount.
    #[tracing::instrument(skip(self, subscription), fields(subscription_id = %subscription.subscription_id))]
    pub async fn open_charge(
        &self,
        subscription: &Subscription,
        now: DateTime<Utc>,
    ) -> Result<Payment> {
        let due = self.due_date(now)?;
        let payment = Payment::pending(&subscription.subscription_id, subscription.amount, due, now);
        self.storage.add_payment(&payment).await?;
        tracing::debug!(payment_id = %payment.payment_id, amount = %payment.amount, "charge opened");
        Ok(payment)
    }

    /// Due date for a charge opened at `now`
    pub(crate) fn due_date(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        days_after(now, self.config.payment_due_days)
    }

    /// Settle a pending payment with `method`.
    ///
    /// Only the subscription owner may pay. Approval of a trial's payment
    /// converts the trial to a paid cycle starting now.
    #[tracing::instrument(skip(self, requester), fields(user_id = %requester.user_id))]
    pub async fn process(
        &self,
        payment_id: &str,
        method: &str,
        requester: &Requester,
    ) -> Result<Payment> {
        let method = method.trim();
        if method.is_empty() {
            return Err(SubscriptionError::InvalidArgument(
                "payment method cannot be empty".to_string(),
            ));
        }

        let (payment, subscription) = self.load_owned(payment_id, requester, AccessPolicy::OwnerOnly).await?;
        if payment.status != PaymentStatus::Pending {
            return Err(SubscriptionError::InvalidState(format!(
                "payment {} is {}, only pending payments can be processed",
                payment_id, payment.status
            )));
        }

        self.settle(payment, subscription, method).await
    }

    /// Put a rejected payment back through the gateway with its recorded
    /// method, up to the configured retry cap.
    #[tracing::instrument(skip(self, requester), fields(user_id = %requester.user_id))]
    pub async fn reprocess(&self, payment_id: &str, requester: &Requester) -> Result<Payment> {
        let (mut payment, subscription) =
            self.load_owned(payment_id, requester, AccessPolicy::OwnerOnly).await?;

        if payment.status != PaymentStatus::Rejected {
            return Err(SubscriptionError::InvalidState(format!(
                "payment {} is {}, only rejected payments can be reprocessed",
                payment_id, payment.status
            )));
        }
        if !self.config.retry_allowed(payment.retry_count) {
            return Err(SubscriptionError::InvalidState(format!(
                "payment {} reached the retry limit ({} attempts)",
                payment_id, payment.retry_count
            )));
        }
        let method = payment.method.clone().ok_or_else(|| {
            SubscriptionError::InvalidState(format!(
                "payment {} has no recorded method",
                payment_id
            ))
        })?;

        payment.reset_for_retry(self.clock.now());
        self.storage.update_payment(&payment).await?;
        tracing::info!(retry_count = payment.retry_count, "reprocessing payment");

        self.settle(payment, subscription, &method).await
    }

    pub async fn get(&self, payment_id: &str, requester: &Requester) -> Result<Payment> {
        let (payment, _) = self
            .load_owned(payment_id, requester, AccessPolicy::OwnerOrAdmin)
            .await?;
        Ok(payment)
    }

    /// Every payment across the user's subscriptions, newest first
    pub async fn history_for_user(
        &self,
        user_id: &str,
        requester: &Requester,
    ) -> Result<Vec<Payment>> {
        requester.require(user_id, AccessPolicy::OwnerOrAdmin)?;

        let mut history = Vec::new();
        for sub in self.storage.list_subscriptions_by_user(user_id).await? {
            history.extend(
                self.storage
                    .list_payments_by_subscription(&sub.subscription_id)
                    .await?,
            );
        }
        sort_newest_first(&mut history);
        Ok(history)
    }

    pub async fn list(&self, filter: PaymentFilter, requester: &Requester) -> Result<Vec<Payment>> {
        requester.require_admin()?;

        let candidates = match (filter.status, filter.from, filter.to) {
            (_, Some(from), Some(to)) => self.storage.list_payments_by_date_range(from, to).await?,
            (Some(status), _, _) => self.storage.list_payments_by_status(status).await?,
            _ => self.storage.list_payments().await?,
        };
        Ok(candidates
            .into_iter()
            .filter(|p| filter.matches(p))
            .collect())
    }

    pub async fn statistics(&self) -> Result<PaymentStatistics> {
        let payments = self.storage.list_payments().await?;
        let now = self.clock.now();

        let count = |status: PaymentStatus| payments.iter().filter(|p| p.status == status).count();
        let approved: Vec<&Payment> = payments
            .iter()
            .filter(|p| p.status == PaymentStatus::Approved)
            .collect();

        let total_revenue: Amount = approved.iter().map(|p| p.amount).sum();
        let revenue_this_month: Amount = approved
            .iter()
            .filter(|p| {
                p.processed_at
                    .is_some_and(|at| at.year() == now.year() && at.month() == now.month())
            })
            .map(|p| p.amount)
            .sum();

        let approval_rate = if payments.is_empty() {
            Decimal::ZERO
        } else {
            (Decimal::from(approved.len()) * Decimal::ONE_HUNDRED / Decimal::from(payments.len()))
                .round_dp(2)
        };

        Ok(PaymentStatistics {
            total: payments.len(),
            pending: count(PaymentStatus::Pending),
            approved: approved.len(),
            rejected: count(PaymentStatus::Rejected),
            cancelled: count(PaymentStatus::Cancelled),
            refunded: count(PaymentStatus::Refunded),
            total_revenue,
            revenue_this_month,
            approval_rate,
        })
    }

    async fn load_owned(
        &self,
        payment_id: &str,
        requester: &Requester,
        policy: AccessPolicy,
    ) -> Result<(Payment, Subscription)> {
        let payment = self
            .storage
            .get_payment(payment_id)
            .await?
            .ok_or_else(|| SubscriptionError::not_found("payment", payment_id))?;
        let subscription = self
            .storage
            .get_subscription(&payment.subscription_id)
            .await?
            .ok_or_else(|| SubscriptionError::not_found("subscription", &payment.subscription_id))?;
        requester.require(&subscription.user_id, policy)?;
        Ok((payment, subscription))
    }

    fn draw(&self, method: &str) -> Outcome {
        let percent = self.config.approval_policy.approval_percent(method);
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        if rng.gen_range(1..=100u8) <= percent {
            Outcome::Approved
        } else {
            let reason = FAILURE_REASONS.choose(&mut *rng).copied().unwrap_or(FAILURE_REASONS[0]);
            Outcome::Rejected(reason)
        }
    }

    async fn settle(
        &self,
        mut payment: Payment,
        mut subscription: Subscription,
        method: &str,
    ) -> Result<Payment> {
        let now = self.clock.now();

        match self.draw(method) {
            Outcome::Approved => {
                payment.approve(method, now);
                self.storage.update_payment(&payment).await?;
                tracing::info!(payment_id = %payment.payment_id, method, "payment approved");

                if subscription.is_trial() {
                    subscription.activate_paid(now)?;
                    self.storage.update_subscription(&subscription).await?;
                    tracing::info!(
                        subscription_id = %subscription.subscription_id,
                        "trial converted by payment"
                    );
                }

                log_failure(
                    "payment_approved",
                    &subscription.user_id,
                    self.notifier
                        .notify_payment_approved(&subscription.user_id, payment.amount)
                        .await,
                );
            }
            Outcome::Rejected(reason) => {
                payment.reject(method, reason, now);
                self.storage.update_payment(&payment).await?;
                tracing::warn!(
                    payment_id = %payment.payment_id,
                    method,
                    reason,
                    retry_count = payment.retry_count,
                    "payment rejected"
                );

                log_failure(
                    "payment_rejected",
                    &subscription.user_id,
                    self.notifier
                        .notify_payment_rejected(&subscription.user_id, payment.amount, reason)
                        .await,
                );
            }
        }

        Ok(payment)
    }
}
