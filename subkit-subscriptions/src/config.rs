//! Billing configuration

use crate::{Result, SubscriptionError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Longest gap allowed between opening a charge and its due date.
pub const MAX_PAYMENT_DUE_DAYS: u32 = 365;

/// How the simulated gateway decides whether a charge goes through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApprovalPolicy {
    /// Same approval chance for every method
    Flat { percent: u8 },
    /// Approval chance depends on the payment method label
    ByMethod {
        pix: u8,
        card: u8,
        boleto: u8,
        other: u8,
    },
}

impl ApprovalPolicy {
    /// Approval chance in percent for `method`.
    pub fn approval_percent(&self, method: &str) -> u8 {
        let percent = match self {
            ApprovalPolicy::Flat { percent } => *percent,
            ApprovalPolicy::ByMethod {
                pix,
                card,
                boleto,
                other,
            } => match method.to_ascii_lowercase().as_str() {
                "pix" => *pix,
                "card" | "credit_card" | "debit_card" => *card,
                "boleto" => *boleto,
                _ => *other,
            },
        };
        percent.min(100)
    }

    pub fn by_method() -> Self {
        ApprovalPolicy::ByMethod {
            pix: 90,
            card: 80,
            boleto: 85,
            other: 70,
        }
    }
}

impl Default for ApprovalPolicy {
    fn default() -> Self {
        ApprovalPolicy::Flat { percent: 85 }
    }
}

/// Billing service configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BillingConfig {
    /// Name of the plan trials fall back to when no payment method is on file
    pub free_plan_name: String,
    /// Days between opening a charge and its due date
    pub payment_due_days: u32,
    /// Maximum rejections before reprocessing is refused; `None` disables the cap
    pub max_payment_retries: Option<u32>,
    pub approval_policy: ApprovalPolicy,
    /// Running trials ending within this many days get a warning
    pub trial_warning_days: u32,
    /// Delay between scheduler cycles
    #[serde(with = "duration_secs")]
    pub sweep_interval: Duration,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            free_plan_name: "Free".to_string(),
            payment_due_days: 7,
            max_payment_retries: Some(3),
            approval_policy: ApprovalPolicy::default(),
            trial_warning_days: 3,
            sweep_interval: Duration::from_secs(3600),
        }
    }
}

impl BillingConfig {
    pub fn with_free_plan_name(mut self, name: impl Into<String>) -> Self {
        self.free_plan_name = name.into();
        self
    }

    pub fn with_payment_due_days(mut self, days: u32) -> Self {
        self.payment_due_days = days;
        self
    }

    pub fn with_max_payment_retries(mut self, retries: Option<u32>) -> Self {
        self.max_payment_retries = retries;
        self
    }

    pub fn with_approval_policy(mut self, policy: ApprovalPolicy) -> Self {
        self.approval_policy = policy;
        self
    }

    pub fn with_trial_warning_days(mut self, days: u32) -> Self {
        self.trial_warning_days = days;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    /// Reject settings the engine cannot work with. Called on configs read
    /// from outside the process.
    pub fn validate(&self) -> Result<()> {
        if self.free_plan_name.trim().is_empty() {
            return Err(SubscriptionError::InvalidArgument(
                "free_plan_name cannot be empty".to_string(),
            ));
        }
        if self.payment_due_days > MAX_PAYMENT_DUE_DAYS {
            return Err(SubscriptionError::InvalidArgument(format!(
                "payment_due_days must be at most {}, got {}",
                MAX_PAYMENT_DUE_DAYS, self.payment_due_days
            )));
        }
        if self.sweep_interval.is_zero() {
            return Err(SubscriptionError::InvalidArgument(
                "sweep_interval must be at least one second".to_string(),
            ));
        }
        Ok(())
    }

    /// Whether a payment that has been rejected `retry_count` times may be
    /// reprocessed.
    pub fn retry_allowed(&self, retry_count: u32) -> bool {
        self.max_payment_retries.is_none_or(|max| retry_count < max)
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BillingConfig::default();
        assert_eq!(config.free_plan_name, "Free");
        assert_eq!(config.payment_due_days, 7);
        assert_eq!(config.max_payment_retries, Some(3));
        assert_eq!(config.approval_policy.approval_percent("pix"), 85);
    }

    #[test]
    fn test_by_method_percentages() {
        let policy = ApprovalPolicy::by_method();
        assert_eq!(policy.approval_percent("PIX"), 90);
        assert_eq!(policy.approval_percent("card"), 80);
        assert_eq!(policy.approval_percent("boleto"), 85);
        assert_eq!(policy.approval_percent("crypto"), 70);
    }

    #[test]
    fn test_retry_cap() {
        let config = BillingConfig::default();
        assert!(config.retry_allowed(2));
        assert!(!config.retry_allowed(3));

        let uncapped = config.with_max_payment_retries(None);
        assert!(uncapped.retry_allowed(100));
    }

    #[test]
    fn test_validate_bounds() {
        assert!(BillingConfig::default().validate().is_ok());

        let config = BillingConfig::default()
            .with_free_plan_name("Gratis")
            .with_payment_due_days(MAX_PAYMENT_DUE_DAYS)
            .with_trial_warning_days(5)
            .with_sweep_interval(Duration::from_secs(30));
        assert!(config.validate().is_ok());
        assert_eq!(config.trial_warning_days, 5);

        let too_late = BillingConfig::default().with_payment_due_days(MAX_PAYMENT_DUE_DAYS + 1);
        assert!(matches!(
            too_late.validate(),
            Err(SubscriptionError::InvalidArgument(_))
        ));

        let unnamed = BillingConfig::default().with_free_plan_name(" ");
        assert!(unnamed.validate().is_err());

        let spinning = BillingConfig::default().with_sweep_interval(Duration::ZERO);
        assert!(spinning.validate().is_err());
    }

    #[test]
    fn test_partial_json() {
        let config: BillingConfig = serde_json::from_str(
            r#"{"free_plan_name":"Gratis","sweep_interval":60,"approval_policy":{"kind":"by_method","pix":95,"card":80,"boleto":85,"other":50}}"#,
        )
        .unwrap();
        assert_eq!(config.free_plan_name, "Gratis");
        assert_eq!(config.sweep_interval, Duration::from_secs(60));
        assert_eq!(config.payment_due_days, 7);
        assert_eq!(config.approval_policy.approval_percent("pix"), 95);
    }
}
