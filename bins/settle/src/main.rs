//! Stockflow settlement runner
//!
//! Applies a JSON settlement plan to the back-office service.
//!
//! ```text
//! stockflow-settle <plan.json> [--dry-run]
//! ```

mod plan;

use std::sync::Arc;

use anyhow::{Context, bail};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stockflow_gateway::{BackofficeApi, HttpGateway, RequestContext};
use stockflow_session::SettlementSession;
use stockflow_shared::AppConfig;

use crate::plan::{SettlementPlan, execute};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stockflow=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut args = std::env::args().skip(1);
    let Some(plan_path) = args.next() else {
        bail!("usage: stockflow-settle <plan.json> [--dry-run]");
    };
    let dry_run = args.any(|a| a == "--dry-run");

    let config = AppConfig::load().context("failed to load configuration")?;
    let plan_json = std::fs::read_to_string(&plan_path)
        .with_context(|| format!("failed to read {plan_path}"))?;
    let plan = SettlementPlan::from_json(&plan_json)?;

    let gateway = HttpGateway::from_config(&config.gateway)?;
    info!(base_url = gateway.base_url(), dry_run, "using back-office service");

    let ctx = match &config.gateway.access_token {
        Some(token) => RequestContext::with_token(token.clone()),
        None => RequestContext::anonymous(),
    };
    let ctx = match std::env::var("USER") {
        Ok(user) => ctx.for_operator(user),
        Err(_) => ctx,
    };

    let api: Arc<dyn BackofficeApi> = Arc::new(gateway);
    let mut session = SettlementSession::from_config(api, ctx, &config)?;

    let report = execute(&mut session, &plan, dry_run).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
