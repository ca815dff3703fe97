use crate::clock::days_after;
use crate::{Amount, Plan, Result, SubscriptionError};
use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Billing periodicity of a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingPeriod {
    Monthly,
    Annual,
}

impl BillingPeriod {
    pub fn months(&self) -> u32 {
        match self {
            BillingPeriod::Monthly => 1,
            BillingPeriod::Annual => 12,
        }
    }

    /// Move `from` forward by one period in calendar months.
    ///
    /// The day of month is clamped for short months (Jan 31 + 1 month is
    /// Feb 28/29).
    pub fn advance(&self, from: DateTime<Utc>) -> DateTime<Utc> {
        from.checked_add_months(Months::new(self.months()))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Normalize a per-cycle charge to its monthly share (annual ÷ 12).
    pub fn monthly_equivalent(&self, charge: Amount) -> Amount {
        charge
            .divide(self.months())
            .unwrap_or_else(Amount::zero)
    }
}

impl fmt::Display for BillingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BillingPeriod::Monthly => write!(f, "monthly"),
            BillingPeriod::Annual => write!(f, "annual"),
        }
    }
}

impl std::str::FromStr for BillingPeriod {
    type Err = SubscriptionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "monthly" | "month" => Ok(BillingPeriod::Monthly),
            "annual" | "yearly" | "year" => Ok(BillingPeriod::Annual),
            other => Err(SubscriptionError::InvalidArgument(format!(
                "unknown billing period: {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Trial,
    Active,
    Cancelled,
    Expired,
}

impl SubscriptionStatus {
    /// Legal lifecycle edges.
    ///
    /// | from      | to                 |
    /// |-----------|--------------------|
    /// | Trial     | Active, Cancelled  |
    /// | Active    | Cancelled          |
    /// | Cancelled | Expired, Active    |
    /// | Expired   | Active             |
    pub fn can_transition_to(&self, next: SubscriptionStatus) -> bool {
        use SubscriptionStatus::*;
        matches!(
            (self, next),
            (Trial, Active)
                | (Trial, Cancelled)
                | (Active, Cancelled)
                | (Cancelled, Expired)
                | (Cancelled, Active)
                | (Expired, Active)
        )
    }

    /// Whether a subscription in this status occupies the user's single seat.
    pub fn holds_seat(&self) -> bool {
        matches!(self, SubscriptionStatus::Trial | SubscriptionStatus::Active)
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SubscriptionStatus::Trial => "trial",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Cancelled => "cancelled",
            SubscriptionStatus::Expired => "expired",
        };
        f.write_str(s)
    }
}

/// A user's subscription to a plan
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Subscription {
    pub subscription_id: String,
    pub user_id: String,
    pub plan_id: String,
    pub status: SubscriptionStatus,
    pub period: BillingPeriod,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    /// `None` for free-tier subscriptions, which are never charged
    pub next_charge_date: Option<DateTime<Utc>>,
    pub trial: bool,
    pub trial_end_date: Option<DateTime<Utc>>,
    /// Charge per cycle
    pub amount: Amount,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// Start a subscription to `plan` at `now`.
    ///
    /// Trial-eligible plans start in `Trial` with the first charge at trial
    /// end; other plans start `Active` with the first charge one period out.
    /// A trial ending past the representable calendar is `InvalidArgument`.
    pub fn start(
        user_id: impl Into<String>,
        plan: &Plan,
        period: BillingPeriod,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let amount = plan.price_for(period);
        let (status, trial_end, next_charge) = if plan.trial_eligible {
            let end = days_after(now, plan.trial_days)?;
            (SubscriptionStatus::Trial, Some(end), Some(end))
        } else if amount.is_zero() {
            (SubscriptionStatus::Active, None, None)
        } else {
            (SubscriptionStatus::Active, None, Some(period.advance(now)))
        };

        Ok(Self {
            subscription_id: format!("sub_{}", uuid::Uuid::new_v4().simple()),
            user_id: user_id.into(),
            plan_id: plan.plan_id.clone(),
            status,
            period,
            start_date: now,
            end_date: None,
            next_charge_date: next_charge,
            trial: plan.trial_eligible,
            trial_end_date: trial_end,
            amount,
            created_at: now,
            updated_at: now,
        })
    }

    /// Free-tier subscriptions are never charged.
    pub fn is_free_tier(&self) -> bool {
        self.amount.is_zero()
    }

    /// Next charge one period after `from`, or none for the free tier.
    pub fn schedule_next_charge(&mut self, from: DateTime<Utc>) {
        self.next_charge_date = if self.is_free_tier() {
            None
        } else {
            Some(self.period.advance(from))
        };
    }

    pub fn is_trial(&self) -> bool {
        self.status == SubscriptionStatus::Trial
    }

    /// Trial whose end date has passed
    pub fn trial_expired(&self, now: DateTime<Utc>) -> bool {
        self.is_trial() && self.trial_end_date.is_some_and(|end| end <= now)
    }

    /// Whole days until the trial ends, for running trials only.
    pub fn trial_days_left(&self, now: DateTime<Utc>) -> Option<i64> {
        if !self.is_trial() {
            return None;
        }
        self.trial_end_date
            .filter(|end| *end > now)
            .map(|end| (end - now).num_days())
    }

    /// Active paid subscription whose next charge is due
    pub fn renewal_due(&self, now: DateTime<Utc>) -> bool {
        self.status == SubscriptionStatus::Active
            && self.next_charge_date.is_some_and(|next| next <= now)
    }

    /// Cancelled subscription whose paid access has run out
    pub fn settlement_due(&self, now: DateTime<Utc>) -> bool {
        self.status == SubscriptionStatus::Cancelled
            && self.end_date.is_some_and(|end| end <= now)
    }

    /// Move to `next`, rejecting edges the state machine does not allow.
    pub fn transition(&mut self, next: SubscriptionStatus, now: DateTime<Utc>) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(SubscriptionError::InvalidState(format!(
                "subscription {} cannot move from {} to {}",
                self.subscription_id, self.status, next
            )));
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    /// Convert a trial into a paid cycle starting at `now`.
    pub fn activate_paid(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.transition(SubscriptionStatus::Active, now)?;
        self.clear_trial();
        self.schedule_next_charge(now);
        Ok(())
    }

    pub(crate) fn clear_trial(&mut self) {
        self.trial = false;
        self.trial_end_date = None;
    }
}
