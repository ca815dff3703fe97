//! Plan catalog commands

use super::Context;
use crate::ui;
use anyhow::Result;
use subkit_subscriptions::{Amount, NewPlan, Plan, PlanStore, PlanUpdate, Requester};

/// Catalog created by `init`: name, monthly, annual, trial days, order
const DEFAULT_CATALOG: [(&str, i64, i64, Option<u32>, i32); 3] = [
    ("Free", 0, 0, None, 0),
    ("Basic", 2990, 29900, Some(7), 1),
    ("Pro", 4990, 49900, None, 2),
];

/// Seed the default catalog, skipping plans that already exist
#[tracing::instrument(skip(ctx))]
pub async fn seed(ctx: &Context) -> Result<()> {
    ui::header("Initialize Plan Catalog");

    // Seeding is a bootstrap step, so it always runs with the admin role.
    let admin = Requester::admin(ctx.requester.user_id.clone());
    let mut created = 0;
    for (name, monthly, annual, trial_days, order) in DEFAULT_CATALOG {
        if ctx.storage.plan_name_exists(name).await? {
            ui::info(&format!("{} already exists", name));
            continue;
        }
        let plan = ctx
            .catalog
            .create(
                &admin,
                NewPlan {
                    name: name.to_string(),
                    description: None,
                    monthly_price: Amount::from_cents(monthly),
                    annual_price: Amount::from_cents(annual),
                    trial_eligible: trial_days.is_some(),
                    trial_days: trial_days.unwrap_or_default(),
                    display_order: order,
                    features: serde_json::Value::Null,
                },
            )
            .await?;
        ui::key_value(&plan.name, &plan.plan_id);
        created += 1;
    }

    ui::success(&format!("{} plan(s) created", created));
    Ok(())
}

#[tracing::instrument(skip(ctx))]
pub async fn list(ctx: &Context, all: bool) -> Result<()> {
    let plans = if all {
        ctx.catalog.list_all(&ctx.requester).await?
    } else {
        ctx.catalog.list_active().await?
    };

    ui::header("Plans");
    if plans.is_empty() {
        ui::info("No plans yet. Run `subkit-demo init` to create the default catalog.");
        return Ok(());
    }
    for plan in &plans {
        print_plan(plan);
    }
    Ok(())
}

#[tracing::instrument(skip(ctx, description))]
pub async fn create(
    ctx: &Context,
    name: String,
    monthly: Amount,
    annual: Amount,
    trial_days: Option<u32>,
    description: Option<String>,
    order: i32,
) -> Result<()> {
    let plan = ctx
        .catalog
        .create(
            &ctx.requester,
            NewPlan {
                name,
                description,
                monthly_price: monthly,
                annual_price: annual,
                trial_eligible: trial_days.is_some(),
                trial_days: trial_days.unwrap_or_default(),
                display_order: order,
                features: serde_json::Value::Null,
            },
        )
        .await?;

    ui::success("Plan created");
    print_plan(&plan);
    Ok(())
}

#[tracing::instrument(skip(ctx, update))]
pub async fn update(ctx: &Context, plan_id: &str, update: PlanUpdate) -> Result<()> {
    let plan = ctx.catalog.update(&ctx.requester, plan_id, update).await?;
    ui::success("Plan updated");
    print_plan(&plan);
    Ok(())
}

#[tracing::instrument(skip(ctx))]
pub async fn remove(ctx: &Context, plan_id: &str) -> Result<()> {
    ctx.catalog.remove(&ctx.requester, plan_id).await?;
    ui::success(&format!("Plan {} removed", plan_id));
    Ok(())
}

fn print_plan(plan: &Plan) {
    ui::separator();
    ui::key_value("Name", &plan.name);
    ui::key_value("ID", &plan.plan_id);
    ui::key_value("Monthly", &plan.monthly_price.to_string());
    ui::key_value("Annual", &plan.annual_price.to_string());
    if plan.trial_eligible {
        ui::key_value("Trial", &format!("{} days", plan.trial_days));
    }
    if let Some(description) = &plan.description {
        ui::key_value("Description", description);
    }
    if !plan.active {
        ui::key_value("Status", "inactive");
    }
}
