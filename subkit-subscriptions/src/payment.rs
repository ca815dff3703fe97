use crate::Amount;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reasons a simulated charge can be declined.
pub const FAILURE_REASONS: [&str; 4] = [
    "Card declined",
    "Insufficient funds",
    "Card expired",
    "Invalid data",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Approved,
    Rejected,
    Cancelled,
    Refunded,
}

impl PaymentStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Approved => "approved",
            PaymentStatus::Rejected => "rejected",
            PaymentStatus::Cancelled => "cancelled",
            PaymentStatus::Refunded => "refunded",
        };
        f.write_str(s)
    }
}

/// One charge against a subscription cycle. Payments are never deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payment {
    pub payment_id: String,
    pub subscription_id: String,
    pub amount: Amount,
    pub status: PaymentStatus,
    pub due_date: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    /// Opaque method label ("pix", "card", ...)
    pub method: Option<String>,
    pub transaction_id: Option<String>,
    pub failure_reason: Option<String>,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Open a pending charge
    pub fn pending(
        subscription_id: impl Into<String>,
        amount: Amount,
        due_date: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            payment_id: format!("pay_{}", uuid::Uuid::new_v4().simple()),
            subscription_id: subscription_id.into(),
            amount,
            status: PaymentStatus::Pending,
            due_date,
            processed_at: None,
            method: None,
            transaction_id: None,
            failure_reason: None,
            retry_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Date used for ordering and range queries: processing time if
    /// processed, creation time otherwise.
    pub fn effective_date(&self) -> DateTime<Utc> {
        self.processed_at.unwrap_or(self.created_at)
    }

    pub fn approve(&mut self, method: &str, now: DateTime<Utc>) {
        self.status = PaymentStatus::Approved;
        self.method = Some(method.to_string());
        self.processed_at = Some(now);
        self.transaction_id = Some(format!("txn_{}", uuid::Uuid::new_v4().simple()));
        self.failure_reason = None;
        self.updated_at = now;
    }

    pub fn reject(&mut self, method: &str, reason: &str, now: DateTime<Utc>) {
        self.status = PaymentStatus::Rejected;
        self.method = Some(method.to_string());
        self.processed_at = Some(now);
        self.transaction_id = None;
        self.failure_reason = Some(reason.to_string());
        self.retry_count += 1;
        self.updated_at = now;
    }

    /// Return a rejected payment to `Pending`, keeping method and retry count.
    pub fn reset_for_retry(&mut self, now: DateTime<Utc>) {
        self.status = PaymentStatus::Pending;
        self.processed_at = None;
        self.transaction_id = None;
        self.failure_reason = None;
        self.updated_at = now;
    }
}

/// Admin listing filter. All bounds are inclusive.
#[derive(Debug, Clone, Default)]
pub struct PaymentFilter {
    pub status: Option<PaymentStatus>,
    pub subscription_id: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl PaymentFilter {
    pub fn matches(&self, payment: &Payment) -> bool {
        let date = payment.effective_date();
        self.status.is_none_or(|s| s == payment.status)
            && self
                .subscription_id
                .as_ref()
                .is_none_or(|id| id == &payment.subscription_id)
            && self.from.is_none_or(|from| date >= from)
            && self.to.is_none_or(|to| date <= to)
    }
}

/// Newest first, by [`Payment::effective_date`].
pub(crate) fn sort_newest_first(payments: &mut [Payment]) {
    payments.sort_by_key(|p| std::cmp::Reverse(p.effective_date()));
}
