//! Subscription lifecycle commands

use super::Context;
use crate::ui;
use anyhow::{anyhow, Result};
use subkit_subscriptions::{BillingPeriod, PlanStore, Subscription};

/// Subscribe the current user. `plan` may be an ID or an exact name.
#[tracing::instrument(skip(ctx))]
pub async fn subscribe(ctx: &Context, plan: &str, period: BillingPeriod) -> Result<()> {
    let plan_id = match ctx.storage.get_plan(plan).await? {
        Some(found) => found.plan_id,
        None => ctx
            .storage
            .get_plan_by_name(plan)
            .await?
            .map(|p| p.plan_id)
            .ok_or_else(|| anyhow!("no plan with ID or name '{}'", plan))?,
    };

    let subscription = ctx
        .manager
        .create(&plan_id, &ctx.requester.user_id, period)
        .await?;

    ui::success("Subscription created");
    print_subscription(&subscription);
    if subscription.is_trial() {
        ui::info("Register a payment method before the trial ends to keep the plan:");
        ui::info("  subkit-demo payment-method set");
    }
    Ok(())
}

#[tracing::instrument(skip(ctx))]
pub async fn cancel(ctx: &Context, subscription_id: &str) -> Result<()> {
    let subscription = ctx.manager.cancel(subscription_id, &ctx.requester).await?;
    ui::success("Subscription cancelled");
    if let Some(end) = subscription.end_date {
        ui::key_value("Access until", &end.to_rfc3339());
    }
    Ok(())
}

#[tracing::instrument(skip(ctx))]
pub async fn renew(ctx: &Context, subscription_id: &str) -> Result<()> {
    let subscription = ctx.manager.renew(subscription_id, &ctx.requester).await?;
    ui::success("Subscription renewed");
    print_subscription(&subscription);
    Ok(())
}

#[tracing::instrument(skip(ctx))]
pub async fn show(ctx: &Context, subscription_id: &str) -> Result<()> {
    let subscription = ctx.manager.get(subscription_id, &ctx.requester).await?;
    ui::header("Subscription");
    print_subscription(&subscription);
    Ok(())
}

#[tracing::instrument(skip(ctx))]
pub async fn list(ctx: &Context, all: bool) -> Result<()> {
    let subscriptions = if all {
        ctx.manager.list_all(&ctx.requester).await?
    } else {
        ctx.manager
            .list_for_user(&ctx.requester.user_id, &ctx.requester)
            .await?
    };

    ui::header("Subscriptions");
    if subscriptions.is_empty() {
        ui::info("No subscriptions found");
        return Ok(());
    }
    for subscription in &subscriptions {
        print_subscription(subscription);
    }
    Ok(())
}

#[tracing::instrument(skip(ctx))]
pub async fn remove(ctx: &Context, subscription_id: &str) -> Result<()> {
    ctx.manager.remove(subscription_id, &ctx.requester).await?;
    ui::success(&format!("Subscription {} removed", subscription_id));
    Ok(())
}

fn print_subscription(subscription: &Subscription) {
    ui::separator();
    ui::key_value("ID", &subscription.subscription_id);
    ui::key_value("User", &subscription.user_id);
    ui::key_value("Plan", &subscription.plan_id);
    ui::key_value("Status", &ui::status(&subscription.status.to_string()).to_string());
    ui::key_value(
        "Amount",
        &format!("{} / {}", subscription.amount, subscription.period),
    );
    ui::key_value("Started", &subscription.start_date.to_rfc3339());
    if let Some(trial_end) = subscription.trial_end_date {
        ui::key_value("Trial ends", &trial_end.to_rfc3339());
    }
    if let Some(next) = subscription.next_charge_date {
        ui::key_value("Next charge", &next.to_rfc3339());
    }
    if let Some(end) = subscription.end_date {
        ui::key_value("Ends", &end.to_rfc3339());
    }
}
