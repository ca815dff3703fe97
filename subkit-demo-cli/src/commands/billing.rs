//! Billing cycle and reporting commands

use super::Context;
use crate::ui;
use anyhow::Result;
use subkit_subscriptions::{BillingScheduler, CycleReport, SweepReport};

#[tracing::instrument(skip(ctx))]
pub async fn run_cycle(ctx: &Context) -> Result<()> {
    let scheduler = BillingScheduler::with_configured_interval(ctx.manager.clone());
    let spinner = ui::spinner("Running billing sweeps...");
    let report = scheduler.run_cycle().await;
    spinner.finish_and_clear();

    print_cycle(&report);
    Ok(())
}

/// Run cycles on the configured interval until Ctrl-C
#[tracing::instrument(skip(ctx))]
pub async fn watch(ctx: &Context) -> Result<()> {
    let interval = ctx.manager.config().sweep_interval;
    ui::info(&format!(
        "Running billing sweeps every {}s, press Ctrl-C to stop",
        interval.as_secs()
    ));

    let scheduler = BillingScheduler::new(ctx.manager.clone(), interval);
    let cycles = scheduler
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await;

    ui::success(&format!("Stopped after {} cycle(s)", cycles));
    Ok(())
}

#[tracing::instrument(skip(ctx))]
pub async fn stats(ctx: &Context) -> Result<()> {
    let stats = ctx.payments.statistics().await?;

    ui::header("Payment Statistics");
    ui::key_value("Total", &stats.total.to_string());
    ui::key_value("Pending", &stats.pending.to_string());
    ui::key_value("Approved", &stats.approved.to_string());
    ui::key_value("Rejected", &stats.rejected.to_string());
    ui::key_value("Cancelled", &stats.cancelled.to_string());
    ui::key_value("Refunded", &stats.refunded.to_string());
    ui::separator();
    ui::key_value("Total revenue", &stats.total_revenue.to_string());
    ui::key_value("Revenue this month", &stats.revenue_this_month.to_string());
    ui::key_value("Approval rate", &format!("{}%", stats.approval_rate));
    Ok(())
}

#[tracing::instrument(skip(ctx))]
pub async fn mrr(ctx: &Context) -> Result<()> {
    let mrr = ctx.reports.mrr(&ctx.requester).await?;
    ui::key_value("MRR", &mrr.to_string());
    Ok(())
}

#[tracing::instrument(skip(ctx))]
pub async fn overview(ctx: &Context) -> Result<()> {
    let overview = ctx.reports.overview(&ctx.requester).await?;
    ui::header("Subscription Overview");
    ui::json(&serde_json::to_value(&overview)?);
    Ok(())
}

#[tracing::instrument(skip(ctx))]
pub async fn by_plan(ctx: &Context) -> Result<()> {
    let usage = ctx.reports.active_users_by_plan(&ctx.requester).await?;

    ui::header("Active Users by Plan");
    if usage.is_empty() {
        ui::info("No active subscriptions");
        return Ok(());
    }
    for plan in &usage {
        ui::key_value(
            &plan.plan_name,
            &format!("{} active, {} / month", plan.active_users, plan.monthly_revenue),
        );
    }
    Ok(())
}

fn print_cycle(report: &CycleReport) {
    ui::header("Billing Cycle");
    print_sweep("Trials", &report.trials);
    print_sweep("Renewals", &report.renewals);
    print_sweep("Settlements", &report.settlements);

    for failure in &report.failed_sweeps {
        ui::error(&format!("{} did not run: {}", failure.sweep, failure.error));
    }
    if report.is_clean() {
        ui::success(&format!("{} subscription(s) changed", report.changed()));
    } else {
        ui::warning("Cycle finished with errors, see the log for details");
    }
}

fn print_sweep(name: &str, sweep: &SweepReport) {
    ui::key_value(
        name,
        &format!(
            "{} examined, {} changed, {} failed",
            sweep.examined, sweep.changed, sweep.failed
        ),
    );
}
