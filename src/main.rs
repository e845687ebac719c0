use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use refwatch::engine;
use refwatch::sciwheel::SciwheelClient;
use refwatch::slack::{DeliveryService, DryRunDelivery, WebhookClient};
use refwatch::state;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Post newly added reference-library items to per-channel webhooks"
)]
struct Args {
    /// Path to the CSV route table (channel, projectId, webhook, lastDate)
    #[arg(long)]
    state: PathBuf,

    /// Reference-library API key (falls back to SCIWHEEL_API_KEY)
    #[arg(long)]
    api_key: Option<String>,

    /// Bot token for fetching the mention roster (falls back to SLACK_BOT_TOKEN)
    #[arg(long)]
    slack_token: Option<String>,

    /// Log composed messages instead of posting, and skip the state write
    #[arg(long)]
    dry_run: bool,

    /// Seconds to pause between consecutive deliveries on a route
    #[arg(long, default_value = "1")]
    pacing_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let Some(api_key) = args
        .api_key
        .or_else(|| std::env::var("SCIWHEEL_API_KEY").ok())
    else {
        bail!("missing source API key: pass --api-key or set SCIWHEEL_API_KEY");
    };
    let slack_token = args
        .slack_token
        .or_else(|| std::env::var("SLACK_BOT_TOKEN").ok());

    // Without the prior watermarks we must not deliver anything, so a
    // load failure aborts the run.
    let mut routes = state::load(&args.state)
        .with_context(|| format!("failed to load route table {}", args.state.display()))?;
    info!(routes = routes.len(), "loaded route table");

    let source = SciwheelClient::new(api_key);
    let webhooks = WebhookClient::new();

    let roster = match &slack_token {
        Some(token) => match webhooks.fetch_roster(token).await {
            Ok(roster) => {
                info!(recipients = roster.len(), "fetched mention roster");
                roster
            }
            Err(err) => {
                warn!(%err, "roster fetch failed; mentions will pass through unresolved");
                Vec::new()
            }
        },
        None => {
            info!("no roster credential; mentions will pass through unresolved");
            Vec::new()
        }
    };

    let pacing = Duration::from_secs(args.pacing_secs);
    let dry_run = DryRunDelivery;
    let delivery: &dyn DeliveryService = if args.dry_run { &dry_run } else { &webhooks };

    let report = engine::run_sync(&mut routes, &source, delivery, &roster, pacing).await;
    info!(
        delivered = report.delivered,
        failed = report.failed,
        routes_changed = report.routes_changed,
        "sync run complete"
    );

    // Delivery failures are per-route and already logged; they do not
    // fail the process.
    if args.dry_run {
        info!("dry run; route table not updated");
    } else if report.changed() {
        state::save(&args.state, &routes)
            .with_context(|| format!("failed to write route table {}", args.state.display()))?;
        info!("route table updated");
    }
    Ok(())
}
