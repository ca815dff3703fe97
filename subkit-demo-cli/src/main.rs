//! Subkit Demo CLI
//!
//! Command-line interface for exercising the subscription lifecycle against a
//! local file store.

use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use subkit_subscriptions::{Amount, BillingConfig, BillingPeriod, PaymentStatus, Requester};

mod commands;
mod ui;

use commands::Context;

#[derive(Parser)]
#[command(name = "subkit-demo")]
#[command(about = "Subkit Demo CLI - Manage plans, subscriptions and simulated payments", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Custom storage directory (can also be set via SUBKIT_DEMO_DIR env var)
    #[arg(long, global = true)]
    storage_dir: Option<String>,

    /// Billing configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Act as this user
    #[arg(long = "as", global = true, default_value = "demo-user")]
    user: String,

    /// Act with the admin role
    #[arg(long, global = true)]
    admin: bool,

    /// Pin the clock to an RFC 3339 instant instead of the system time
    #[arg(long, global = true)]
    at: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the default Free, Basic and Pro plans
    Init,

    /// Plan catalog
    Plans {
        #[command(subcommand)]
        action: PlanAction,
    },

    /// Subscribe the current user to a plan
    Subscribe {
        /// Plan ID or exact plan name
        plan: String,

        /// Billing period (monthly or annual)
        #[arg(short, long, default_value = "monthly")]
        period: BillingPeriod,
    },

    /// Cancel a subscription at the end of its paid period
    Cancel {
        subscription_id: String,
    },

    /// Reactivate a cancelled or expired subscription
    Renew {
        subscription_id: String,
    },

    /// Show subscriptions
    Subscriptions {
        /// Every user's subscriptions (admin)
        #[arg(long)]
        all: bool,

        /// Show a single subscription
        #[arg(long)]
        id: Option<String>,
    },

    /// Delete a subscription record (admin)
    RemoveSubscription {
        subscription_id: String,
    },

    /// Process a pending payment
    Pay {
        payment_id: String,

        /// Payment method (pix, card, boleto, ...)
        #[arg(short, long)]
        method: String,
    },

    /// Re-run a rejected payment with its recorded method
    Reprocess {
        payment_id: String,
    },

    /// Show payments
    Payments {
        /// Every user's payments (admin)
        #[arg(long)]
        all: bool,

        /// Filter by status (admin listing only)
        #[arg(long)]
        status: Option<StatusArg>,

        /// Filter by subscription (admin listing only)
        #[arg(long)]
        subscription: Option<String>,

        /// Show a single payment
        #[arg(long)]
        id: Option<String>,
    },

    /// Register or clear the current user's payment method on file
    PaymentMethod {
        #[command(subcommand)]
        action: MethodAction,
    },

    /// Run the billing sweeps
    RunCycle {
        /// Keep running on the configured interval until Ctrl-C
        #[arg(long)]
        watch: bool,
    },

    /// Payment statistics
    Stats,

    /// Subscription reports (admin)
    Report {
        #[command(subcommand)]
        kind: ReportKind,
    },
}

#[derive(Subcommand)]
enum PlanAction {
    /// List plans (active only unless --all)
    List {
        #[arg(long)]
        all: bool,
    },

    /// Create a plan (admin)
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        monthly: Amount,
        #[arg(long)]
        annual: Amount,
        /// Offer a trial of this many days
        #[arg(long)]
        trial_days: Option<u32>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, default_value_t = 0)]
        order: i32,
    },

    /// Update a plan (admin)
    Update {
        plan_id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        monthly: Option<Amount>,
        #[arg(long)]
        annual: Option<Amount>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        active: Option<bool>,
        #[arg(long)]
        order: Option<i32>,
    },

    /// Remove a plan (admin)
    Remove {
        plan_id: String,
    },
}

#[derive(Subcommand)]
enum MethodAction {
    /// Mark a payment method as on file
    Set,
    /// Remove the payment method on file
    Clear,
    /// Show whether a payment method is on file
    Show,
}

#[derive(Subcommand)]
enum ReportKind {
    /// Monthly recurring revenue
    Mrr,
    /// Counts by status, new this month and MRR
    Overview,
    /// Active users per plan
    ByPlan,
}

#[derive(Clone, Copy, ValueEnum)]
enum StatusArg {
    Pending,
    Approved,
    Rejected,
    Cancelled,
    Refunded,
}

impl From<StatusArg> for PaymentStatus {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::Pending => PaymentStatus::Pending,
            StatusArg::Approved => PaymentStatus::Approved,
            StatusArg::Rejected => PaymentStatus::Rejected,
            StatusArg::Cancelled => PaymentStatus::Cancelled,
            StatusArg::Refunded => PaymentStatus::Refunded,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("subkit_demo_cli=debug,subkit_subscriptions=debug,subkit::notify=debug")
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter("subkit_demo_cli=info,subkit_subscriptions=warn,subkit::notify=info")
            .init();
    }

    // Setup storage directory
    let storage_dir = if let Some(dir) = cli.storage_dir {
        PathBuf::from(dir)
    } else if let Ok(dir) = std::env::var("SUBKIT_DEMO_DIR") {
        PathBuf::from(dir)
    } else {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("subkit-demo")
    };

    let config = match &cli.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            serde_json::from_str::<BillingConfig>(&raw)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => BillingConfig::default(),
    };
    config.validate().context("invalid billing config")?;

    let at = cli
        .at
        .as_deref()
        .map(|s| {
            DateTime::parse_from_rfc3339(s)
                .map(|t| t.with_timezone(&Utc))
                .with_context(|| format!("invalid --at timestamp: {}", s))
        })
        .transpose()?;

    let requester = if cli.admin {
        Requester::admin(cli.user)
    } else {
        Requester::user(cli.user)
    };

    let ctx = Context::open(&storage_dir, config, at, requester)?;

    // Dispatch commands
    let outcome = match cli.command {
        Commands::Init => commands::plans::seed(&ctx).await,
        Commands::Plans { action } => match action {
            PlanAction::List { all } => commands::plans::list(&ctx, all).await,
            PlanAction::Create {
                name,
                monthly,
                annual,
                trial_days,
                description,
                order,
            } => {
                commands::plans::create(&ctx, name, monthly, annual, trial_days, description, order)
                    .await
            }
            PlanAction::Update {
                plan_id,
                name,
                monthly,
                annual,
                description,
                active,
                order,
            } => {
                let update = subkit_subscriptions::PlanUpdate {
                    name,
                    description,
                    monthly_price: monthly,
                    annual_price: annual,
                    active,
                    display_order: order,
                    ..Default::default()
                };
                commands::plans::update(&ctx, &plan_id, update).await
            }
            PlanAction::Remove { plan_id } => commands::plans::remove(&ctx, &plan_id).await,
        },
        Commands::Subscribe { plan, period } => {
            commands::subscriptions::subscribe(&ctx, &plan, period).await
        }
        Commands::Cancel { subscription_id } => {
            commands::subscriptions::cancel(&ctx, &subscription_id).await
        }
        Commands::Renew { subscription_id } => {
            commands::subscriptions::renew(&ctx, &subscription_id).await
        }
        Commands::Subscriptions { all, id } => match id {
            Some(id) => commands::subscriptions::show(&ctx, &id).await,
            None => commands::subscriptions::list(&ctx, all).await,
        },
        Commands::RemoveSubscription { subscription_id } => {
            commands::subscriptions::remove(&ctx, &subscription_id).await
        }
        Commands::Pay { payment_id, method } => {
            commands::payments::pay(&ctx, &payment_id, &method).await
        }
        Commands::Reprocess { payment_id } => {
            commands::payments::reprocess(&ctx, &payment_id).await
        }
        Commands::Payments {
            all,
            status,
            subscription,
            id,
        } => match id {
            Some(id) => commands::payments::show(&ctx, &id).await,
            None if all => {
                commands::payments::list_all(&ctx, status.map(Into::into), subscription).await
            }
            None => commands::payments::history(&ctx).await,
        },
        Commands::PaymentMethod { action } => match action {
            MethodAction::Set => commands::payments::set_method(&ctx, true).await,
            MethodAction::Clear => commands::payments::set_method(&ctx, false).await,
            MethodAction::Show => commands::payments::show_method(&ctx).await,
        },
        Commands::RunCycle { watch } => {
            if watch {
                commands::billing::watch(&ctx).await
            } else {
                commands::billing::run_cycle(&ctx).await
            }
        }
        Commands::Stats => commands::billing::stats(&ctx).await,
        Commands::Report { kind } => match kind {
            ReportKind::Mrr => commands::billing::mrr(&ctx).await,
            ReportKind::Overview => commands::billing::overview(&ctx).await,
            ReportKind::ByPlan => commands::billing::by_plan(&ctx).await,
        },
    };

    if let Err(e) = outcome {
        ui::error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}
