//! Batch job: sync the roster, crawl every user's feed, store new posts.

use anyhow::{Context, Result};
use board_watch::engine::{self, RunSummary};
use board_watch::{load_roster, sync_roster, Config, HttpFetcher, RunContext};
use chrono::Utc;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "board-watch")]
#[command(about = "Ingest new discussion-board posts for every tracked user")]
struct Cli {
    /// Roster file (overrides ROSTER_PATH)
    #[arg(long)]
    roster: Option<PathBuf>,

    /// Database URL (overrides DATABASE_URL)
    #[arg(long)]
    database_url: Option<String>,

    /// Print the run summary as JSON on stdout
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,board_watch=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = Config::from_env().context("Failed to load configuration")?;
    if let Some(roster) = cli.roster {
        config.roster_path = roster;
    }
    if let Some(database_url) = cli.database_url {
        config.database_url = database_url;
    }
    tracing::info!(roster = %config.roster_path.display(), "Configuration loaded");

    let roster = load_roster(&config.roster_path)
        .await
        .context("Failed to load roster")?;

    let fetcher = HttpFetcher::new(&config.user_agent, config.fetch_timeout)
        .context("Failed to create HTTP client")?;

    let ctx = RunContext::open(config)
        .await
        .context("Failed to open database")?;

    sync_roster(&roster, ctx.store().pool())
        .await
        .context("Failed to sync roster")?;

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Shutdown requested, finishing in-flight work");
                shutdown.cancel();
            }
        }
    });

    let now = Utc::now().with_timezone(&ctx.config().site_offset);
    let result = engine::run(&ctx, Arc::new(fetcher), shutdown, now).await;
    ctx.close().await;
    let summary = result.context("Ingestion run failed")?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }

    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!(
        "{} users, {} new posts, {} new brands, {} failed",
        summary.users, summary.posts_inserted, summary.brands_created, summary.failed_users
    );
    for report in summary.reports.iter().filter(|r| r.status.is_failure()) {
        println!("  {} ({}): {:?}", report.external_user_id, report.user_id, report.status);
    }
}
