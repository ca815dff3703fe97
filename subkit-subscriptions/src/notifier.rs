//! Outbound user notifications.
//!
//! Delivery is fire-and-forget: services log a failed notification and carry
//! on, so a broken mail relay never rolls back a state change.

use crate::Amount;
use async_trait::async_trait;

pub type Result<T> = anyhow::Result<T>;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_payment_approved(&self, user_id: &str, amount: Amount) -> Result<()>;
    async fn notify_payment_rejected(
        &self,
        user_id: &str,
        amount: Amount,
        reason: &str,
    ) -> Result<()>;
    async fn notify_trial_expiring(&self, user_id: &str, days_left: i64) -> Result<()>;
    async fn notify_subscription_cancelled(&self, user_id: &str, plan_name: &str) -> Result<()>;
    async fn notify_subscription_renewed(&self, user_id: &str, plan_name: &str) -> Result<()>;
}

/// Emits every notification as a `tracing` event on the `subkit::notify`
/// target.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_payment_approved(&self, user_id: &str, amount: Amount) -> Result<()> {
        tracing::info!(target: "subkit::notify", user_id, %amount, "payment approved");
        Ok(())
    }

    async fn notify_payment_rejected(
        &self,
        user_id: &str,
        amount: Amount,
        reason: &str,
    ) -> Result<()> {
        tracing::info!(target: "subkit::notify", user_id, %amount, reason, "payment rejected");
        Ok(())
    }

    async fn notify_trial_expiring(&self, user_id: &str, days_left: i64) -> Result<()> {
        tracing::info!(target: "subkit::notify", user_id, days_left, "trial expiring");
        Ok(())
    }

    async fn notify_subscription_cancelled(&self, user_id: &str, plan_name: &str) -> Result<()> {
        tracing::info!(target: "subkit::notify", user_id, plan_name, "subscription cancelled");
        Ok(())
    }

    async fn notify_subscription_renewed(&self, user_id: &str, plan_name: &str) -> Result<()> {
        tracing::info!(target: "subkit::notify", user_id, plan_name, "subscription renewed");
        Ok(())
    }
}

/// Log and drop a notification failure.
pub(crate) fn log_failure(kind: &str, user_id: &str, result: Result<()>) {
    if let Err(e) = result {
        tracing::warn!(kind, user_id, error = %e, "notification delivery failed");
    }
}
