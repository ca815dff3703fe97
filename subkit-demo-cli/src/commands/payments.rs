//! Payment commands

use super::Context;
use crate::ui;
use anyhow::Result;
use subkit_subscriptions::{Payment, PaymentFilter, PaymentMethodStore, PaymentStatus};

#[tracing::instrument(skip(ctx))]
pub async fn pay(ctx: &Context, payment_id: &str, method: &str) -> Result<()> {
    let payment = ctx
        .payments
        .process(payment_id, method, &ctx.requester)
        .await?;
    report_outcome(&payment);
    Ok(())
}

#[tracing::instrument(skip(ctx))]
pub async fn reprocess(ctx: &Context, payment_id: &str) -> Result<()> {
    let payment = ctx.payments.reprocess(payment_id, &ctx.requester).await?;
    report_outcome(&payment);
    Ok(())
}

#[tracing::instrument(skip(ctx))]
pub async fn show(ctx: &Context, payment_id: &str) -> Result<()> {
    let payment = ctx.payments.get(payment_id, &ctx.requester).await?;
    ui::header("Payment");
    print_payment(&payment);
    Ok(())
}

/// The current user's payments, newest first
#[tracing::instrument(skip(ctx))]
pub async fn history(ctx: &Context) -> Result<()> {
    let payments = ctx
        .payments
        .history_for_user(&ctx.requester.user_id, &ctx.requester)
        .await?;
    print_payments(&payments);
    Ok(())
}

#[tracing::instrument(skip(ctx))]
pub async fn list_all(
    ctx: &Context,
    status: Option<PaymentStatus>,
    subscription_id: Option<String>,
) -> Result<()> {
    let filter = PaymentFilter {
        status,
        subscription_id,
        ..Default::default()
    };
    let payments = ctx.payments.list(filter, &ctx.requester).await?;
    print_payments(&payments);
    Ok(())
}

#[tracing::instrument(skip(ctx))]
pub async fn set_method(ctx: &Context, on_file: bool) -> Result<()> {
    ctx.storage
        .set_method_on_file(&ctx.requester.user_id, on_file)
        .await?;
    if on_file {
        ui::success("Payment method registered");
    } else {
        ui::success("Payment method removed");
    }
    Ok(())
}

#[tracing::instrument(skip(ctx))]
pub async fn show_method(ctx: &Context) -> Result<()> {
    let on_file = ctx
        .storage
        .has_method_on_file(&ctx.requester.user_id)
        .await?;
    ui::key_value("User", &ctx.requester.user_id);
    ui::key_value("Method on file", if on_file { "yes" } else { "no" });
    Ok(())
}

fn report_outcome(payment: &Payment) {
    match payment.status {
        PaymentStatus::Approved => ui::success(&format!("Payment approved: {}", payment.amount)),
        PaymentStatus::Rejected => {
            ui::warning(&format!(
                "Payment rejected: {}",
                payment.failure_reason.as_deref().unwrap_or("unknown reason")
            ));
            ui::info(&format!(
                "Retry with: subkit-demo reprocess {}",
                payment.payment_id
            ));
        }
        other => ui::info(&format!("Payment is {}", other)),
    }
    print_payment(payment);
}

fn print_payments(payments: &[Payment]) {
    ui::header("Payments");
    if payments.is_empty() {
        ui::info("No payments found");
        return;
    }
    for payment in payments {
        print_payment(payment);
    }
}

fn print_payment(payment: &Payment) {
    ui::separator();
    ui::key_value("ID", &payment.payment_id);
    ui::key_value("Subscription", &payment.subscription_id);
    ui::key_value("Amount", &payment.amount.to_string());
    ui::key_value("Status", &ui::status(&payment.status.to_string()).to_string());
    ui::key_value("Due", &payment.due_date.to_rfc3339());
    if let Some(method) = &payment.method {
        ui::key_value("Method", method);
    }
    if let Some(txn) = &payment.transaction_id {
        ui::key_value("Transaction", txn);
    }
    if let Some(reason) = &payment.failure_reason {
        ui::key_value("Failure", reason);
    }
    if payment.retry_count > 0 {
        ui::key_value("Attempts rejected", &payment.retry_count.to_string());
    }
}
