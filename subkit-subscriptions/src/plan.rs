use crate::subscription::BillingPeriod;
use crate::{Amount, Result, SubscriptionError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Trial length used when a plan does not specify one.
pub const DEFAULT_TRIAL_DAYS: u32 = 7;

/// Longest trial a plan may offer.
pub const MAX_TRIAL_DAYS: u32 = 365;

/// A subscribable plan in the catalog
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Plan {
    pub plan_id: String,
    pub name: String,
    pub description: Option<String>,
    pub monthly_price: Amount,
    pub annual_price: Amount,
    pub trial_eligible: bool,
    pub trial_days: u32,
    pub active: bool,
    pub display_order: i32,
    /// Opaque feature list rendered by the product, never interpreted here
    pub features: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Plan {
    /// Create an active plan without trial
    pub fn new(name: impl Into<String>, monthly_price: Amount, annual_price: Amount) -> Self {
        let now = Utc::now();
        Self {
            plan_id: format!("plan_{}", uuid::Uuid::new_v4().simple()),
            name: name.into(),
            description: None,
            monthly_price,
            annual_price,
            trial_eligible: false,
            trial_days: DEFAULT_TRIAL_DAYS,
            active: true,
            display_order: 0,
            features: serde_json::json!({}),
            created_at: now,
            updated_at: now,
        }
    }

    /// Offer a free trial of `days` days
    pub fn with_trial(mut self, days: u32) -> Self {
        self.trial_eligible = true;
        self.trial_days = days;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_features(mut self, features: serde_json::Value) -> Self {
        self.features = features;
        self
    }

    pub fn with_display_order(mut self, order: i32) -> Self {
        self.display_order = order;
        self
    }

    /// Charge for one cycle at the given periodicity
    pub fn price_for(&self, period: BillingPeriod) -> Amount {
        match period {
            BillingPeriod::Monthly => self.monthly_price,
            BillingPeriod::Annual => self.annual_price,
        }
    }

    /// Validate plan data
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(SubscriptionError::InvalidArgument(
                "Plan name cannot be empty".to_string(),
            ));
        }
        if self.monthly_price.is_negative() || self.annual_price.is_negative() {
            return Err(SubscriptionError::InvalidArgument(
                "Plan prices cannot be negative".to_string(),
            ));
        }
        if self.trial_eligible && self.trial_days == 0 {
            return Err(SubscriptionError::InvalidArgument(
                "Trial plans need at least one trial day".to_string(),
            ));
        }
        if self.trial_days > MAX_TRIAL_DAYS {
            return Err(SubscriptionError::InvalidArgument(format!(
                "Trials are limited to {} days, got {}",
                MAX_TRIAL_DAYS, self.trial_days
            )));
        }
        Ok(())
    }
}

/// Admin request to create a plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPlan {
    pub name: String,
    pub description: Option<String>,
    pub monthly_price: Amount,
    pub annual_price: Amount,
    pub trial_eligible: bool,
    #[serde(default = "default_trial_days")]
    pub trial_days: u32,
    #[serde(default)]
    pub display_order: i32,
    #[serde(default)]
    pub features: serde_json::Value,
}

fn default_trial_days() -> u32 {
    DEFAULT_TRIAL_DAYS
}

impl NewPlan {
    pub fn into_plan(self) -> Plan {
        let mut plan = Plan::new(self.name, self.monthly_price, self.annual_price)
            .with_display_order(self.display_order);
        if let Some(description) = self.description {
            plan = plan.with_description(description);
        }
        if !self.features.is_null() {
            plan = plan.with_features(self.features);
        }
        plan.trial_eligible = self.trial_eligible;
        plan.trial_days = self.trial_days;
        plan
    }
}

/// Partial update of a plan. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlanUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub monthly_price: Option<Amount>,
    pub annual_price: Option<Amount>,
    pub trial_eligible: Option<bool>,
    pub trial_days: Option<u32>,
    pub active: Option<bool>,
    pub display_order: Option<i32>,
    pub features: Option<serde_json::Value>,
}

impl PlanUpdate {
    /// Whether this update touches fields that are frozen once a
    /// subscription references the plan.
    pub fn touches_locked_fields(&self, plan: &Plan) -> bool {
        self.name.as_ref().is_some_and(|n| n != &plan.name)
            || self.trial_eligible.is_some_and(|t| t != plan.trial_eligible)
            || self.trial_days.is_some_and(|d| d != plan.trial_days)
    }

    pub fn apply(self, plan: &mut Plan) {
        if let Some(name) = self.name {
            plan.name = name;
        }
        if let Some(description) = self.description {
            plan.description = Some(description);
        }
        if let Some(price) = self.monthly_price {
            plan.monthly_price = price;
        }
        if let Some(price) = self.annual_price {
            plan.annual_price = price;
        }
        if let Some(trial) = self.trial_eligible {
            plan.trial_eligible = trial;
        }
        if let Some(days) = self.trial_days {
            plan.trial_days = days;
        }
        if let Some(active) = self.active {
            plan.active = active;
        }
        if let Some(order) = self.display_order {
            plan.display_order = order;
        }
        if let Some(features) = self.features {
            plan.features = features;
        }
    }
}
