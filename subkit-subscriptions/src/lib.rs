//! # Subkit Subscriptions
//!
//! Subscription lifecycle and billing engine for a multi-tenant SaaS product.
//!
//! ## Components
//! - [`PlanCatalog`]: admin-managed registry of plans
//! - [`LifecycleManager`]: the subscription state machine
//!   (trial → active → cancelled → expired) and its batch sweeps
//! - [`PaymentEngine`]: opens charges, simulates approval and feeds outcomes
//!   back into subscription state
//! - [`BillingScheduler`]: periodic runner for the three sweeps
//! - [`Reports`]: MRR and overview read models
//!
//! Persistence and notification delivery are traits ([`storage`],
//! [`Notifier`]); [`MemoryStorage`], [`FileStorage`] and [`LogNotifier`] are
//! shipped for tests and the demo CLI.
//!
//! All money is fixed-point [`Amount`]; all time comes from a [`Clock`].

pub mod access;
pub mod amount;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod lifecycle;
pub mod notifier;
pub mod payment;
pub mod payments;
pub mod plan;
pub mod reports;
pub mod storage;
pub mod subscription;

// Platform-specific modules
#[cfg(not(target_arch = "wasm32"))]
pub mod monitor;

pub use access::{AccessPolicy, Requester, Role};
pub use amount::Amount;
pub use catalog::PlanCatalog;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ApprovalPolicy, BillingConfig, MAX_PAYMENT_DUE_DAYS};
pub use lifecycle::{LifecycleManager, SweepReport};
pub use notifier::{LogNotifier, Notifier};
pub use payment::{Payment, PaymentFilter, PaymentStatus, FAILURE_REASONS};
pub use payments::{PaymentEngine, PaymentStatistics};
pub use plan::{NewPlan, Plan, PlanUpdate, DEFAULT_TRIAL_DAYS, MAX_TRIAL_DAYS};
pub use reports::{PlanUsage, Reports, SubscriptionOverview};
pub use storage::{
    BillingStore, MemoryStorage, PaymentMethodStore, PaymentStore, PlanStore, SubscriptionStore,
};
pub use subscription::{BillingPeriod, Subscription, SubscriptionStatus};

#[cfg(not(target_arch = "wasm32"))]
pub use storage::FileStorage;

#[cfg(not(target_arch = "wasm32"))]
pub use monitor::{BillingScheduler, CycleReport, SweepFailure};

pub type Result<T> = std::result::Result<T, SubscriptionError>;

#[derive(thiserror::Error, Debug)]
pub enum SubscriptionError {
    #[error("{resource} not found: {id}")]
    NotFound { resource: &'static str, id: String },
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Deployment is missing something the lifecycle depends on, e.g. the
    /// Free plan.
    #[error("fatal configuration error: {0}")]
    FatalConfiguration(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl SubscriptionError {
    pub fn not_found(resource: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource,
            id: id.into(),
        }
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Errors caused by the caller rather than by the deployment or storage.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound { .. }
                | Self::Unauthorized(_)
                | Self::Conflict(_)
                | Self::InvalidState(_)
                | Self::InvalidArgument(_)
        )
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::FatalConfiguration(_))
    }
}
