//! Billing cycle scheduler (native only - needs tokio timers)
//!
//! Runs the three lifecycle sweeps in a fixed order: trial resolution,
//! auto-renewal, settlement. A sweep that fails as a whole (e.g. the store
//! is unreachable while listing) is recorded and the next sweep still runs.

use crate::{LifecycleManager, Result, SweepReport};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

/// A sweep that could not run at all
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SweepFailure {
    pub sweep: &'static str,
    pub error: String,
}

/// Result of one full billing cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub trials: SweepReport,
    pub renewals: SweepReport,
    pub settlements: SweepReport,
    pub failed_sweeps: Vec<SweepFailure>,
}

impl CycleReport {
    pub fn changed(&self) -> usize {
        self.trials.changed + self.renewals.changed + self.settlements.changed
    }

    pub fn is_clean(&self) -> bool {
        self.failed_sweeps.is_empty()
            && self.trials.failed == 0
            && self.renewals.failed == 0
            && self.settlements.failed == 0
    }
}

/// Periodic runner for the lifecycle sweeps
pub struct BillingScheduler {
    manager: Arc<LifecycleManager>,
    interval: Duration,
}

impl BillingScheduler {
    pub fn new(manager: Arc<LifecycleManager>, interval: Duration) -> Self {
        Self { manager, interval }
    }

    /// Use the manager's configured `sweep_interval`
    pub fn with_configured_interval(manager: Arc<LifecycleManager>) -> Self {
        let interval = manager.config().sweep_interval;
        Self::new(manager, interval)
    }

    /// Run every sweep once
    #[tracing::instrument(skip(self))]
    pub async fn run_cycle(&self) -> CycleReport {
        let mut report = CycleReport::default();

        report.trials = record(
            &mut report.failed_sweeps,
            "resolve_expired_trials",
            self.manager.resolve_expired_trials().await,
        );
        report.renewals = record(
            &mut report.failed_sweeps,
            "process_auto_renewals",
            self.manager.process_auto_renewals().await,
        );
        report.settlements = record(
            &mut report.failed_sweeps,
            "settle_cancellations",
            self.manager.settle_cancellations().await,
        );

        tracing::info!(
            changed = report.changed(),
            failed_sweeps = report.failed_sweeps.len(),
            "billing cycle finished"
        );
        report
    }

    /// Run cycles until `shutdown` resolves, returning how many ran.
    ///
    /// A cycle in progress always completes; shutdown is only observed
    /// while waiting for the next one.
    pub async fn run_until<F>(&self, shutdown: F) -> usize
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut cycles = 0;
        loop {
            self.run_cycle().await;
            cycles += 1;
            tokio::select! {
                _ = &mut shutdown => break,
                _ = sleep(self.interval) => {}
            }
        }
        tracing::info!(cycles, "scheduler stopped");
        cycles
    }
}

fn record(
    failures: &mut Vec<SweepFailure>,
    sweep: &'static str,
    result: Result<SweepReport>,
) -> SweepReport {
    match result {
        Ok(report) => report,
        Err(e) => {
            tracing::error!(sweep, error = %e, "sweep aborted");
            failures.push(SweepFailure {
                sweep,
                error: e.to_string(),
            });
            SweepReport::default()
        }
    }
}
