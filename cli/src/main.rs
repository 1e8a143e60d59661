//! eventsync CLI — run the ingestion pipeline and inspect what it stored.
//!
//! # Commands
//! ```text
//! eventsync run        [--network <name>] [--max-restarts <n>]
//! eventsync backfill   [--start-block <n>] [--batch-size <n>]
//! eventsync stats
//! eventsync events     [--organizer <address>]
//! eventsync seed-event
//! eventsync networks
//! ```

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use eventsync_core::{NetworkProfile, QueryService};
use eventsync_evm::topics::normalize_address;
use eventsync_evm::{PipelineBuilder, SupervisorExit};
use eventsync_rpc::EndpointResolver;
use eventsync_storage::SqliteStore;

mod config;
mod logging;

use config::{NetworkArgs, PipelineArgs};
use logging::LogConfig;

#[derive(Parser)]
#[command(
    name = "eventsync",
    about = "Event-registry and ticket-contract ingestion pipeline",
    long_about = "
Mirrors an on-chain event registry and its NFT ticket contract into SQLite.
Logs are reconciled against contract state; an append-only ingestion log
doubles as the backfill checkpoint.

ENVIRONMENT VARIABLES:
  EVENTSYNC_NETWORK          Network profile (see `eventsync networks`)
  EVENTSYNC_RPC_URL          RPC URL override
  EVENTSYNC_WS_URL           WebSocket URL override
  DATABASE_URL               SQLite database (default sqlite:./eventsync.db)
  EVENTSYNC_LOG              Log level
",
    version
)]
struct Cli {
    #[command(flatten)]
    network: NetworkArgs,

    /// SQLite database path or URL
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite:./eventsync.db", global = true)]
    database_url: String,

    /// Global log level
    #[arg(long, env = "EVENTSYNC_LOG", default_value = "info", global = true)]
    log_level: String,

    /// Per-crate levels, e.g. "eventsync_rpc=debug,sqlx=warn"
    #[arg(long, global = true)]
    log_components: Option<String>,

    /// Emit JSON log lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve endpoints and run the supervised pipeline until Ctrl-C
    Run {
        #[command(flatten)]
        pipeline: PipelineArgs,
    },

    /// Run one backfill pass to the current head and exit
    Backfill {
        #[command(flatten)]
        pipeline: PipelineArgs,
    },

    /// Show row counts and the most recent ingestion-log entries
    Stats {
        /// Number of recent ingestion-log entries to show
        #[arg(long, default_value_t = 10)]
        recent: usize,
    },

    /// List stored events as JSON
    Events {
        /// Only events created by this organizer
        #[arg(long)]
        organizer: Option<String>,
    },

    /// Insert the sample test event
    #[command(name = "seed-event")]
    SeedEvent,

    /// List built-in network profiles
    Networks,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log = LogConfig { level: cli.log_level.clone(), json: cli.log_json, ..Default::default() }
        .with_overrides(cli.log_components.as_deref());
    logging::init_tracing(&log);

    match &cli.command {
        Commands::Run { pipeline } => cmd_run(&cli, pipeline).await,
        Commands::Backfill { pipeline } => cmd_backfill(&cli, pipeline).await,
        Commands::Stats { recent } => cmd_stats(&cli, *recent).await,
        Commands::Events { organizer } => cmd_events(&cli, organizer.as_deref()).await,
        Commands::SeedEvent => cmd_seed_event(&cli).await,
        Commands::Networks => cmd_networks(),
    }
}

async fn open_store(cli: &Cli) -> Result<Arc<SqliteStore>> {
    let store = SqliteStore::open(&cli.database_url)
        .await
        .with_context(|| format!("opening database {}", cli.database_url))?;
    Ok(Arc::new(store))
}

async fn query_service(cli: &Cli) -> Result<QueryService> {
    let profile = cli.network.profile()?;
    let (registry, tickets) = profile.contracts()?;
    let store = open_store(cli).await?;
    Ok(QueryService::new(
        store.clone(),
        store,
        normalize_address(&registry)?,
        normalize_address(&tickets)?,
    ))
}

/// Resolve endpoints for the selected profile and wire the pipeline.
async fn build_pipeline(cli: &Cli, args: &PipelineArgs) -> Result<eventsync_evm::Pipeline> {
    let profile = cli.network.profile()?;
    let (registry, tickets) = profile.contracts()?;
    tracing::info!(network = %profile.name, chain_id = profile.chain_id, "starting");

    let resolver = Arc::new(
        EndpointResolver::new(profile.rpc_candidates(), profile.ws_url.clone()).expect_chain_id(profile.chain_id),
    );
    let endpoint = resolver.resolve().await.context("resolving RPC endpoint")?;
    let store = open_store(cli).await?;

    let pipeline = PipelineBuilder::new()
        .config(args.config())
        .contracts(registry, tickets)
        .failover(resolver)
        .build(&endpoint, store.clone(), store)?;
    Ok(pipeline)
}

async fn cmd_run(cli: &Cli, args: &PipelineArgs) -> Result<()> {
    let pipeline = build_pipeline(cli, args).await?;
    if pipeline.is_degraded() {
        tracing::warn!("no live subscription; polling every {:?}", pipeline.config().poll_interval);
    }

    let cancel = CancellationToken::new();
    let signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested");
            signal.cancel();
        }
    });

    match pipeline.supervisor().run(cancel).await {
        SupervisorExit::Cancelled => {
            tracing::info!("pipeline stopped");
            Ok(())
        }
        SupervisorExit::RestartsExhausted { restarts, last_error } => {
            Err(anyhow!("subscription failed after {restarts} restarts: {last_error}"))
        }
    }
}

async fn cmd_backfill(cli: &Cli, args: &PipelineArgs) -> Result<()> {
    let pipeline = build_pipeline(cli, args).await?;
    let report = pipeline.backfill().run().await.context("backfill")?;
    println!("Backfill complete");
    println!("  Resumed from: {}", report.resumed_from.map_or("-".into(), |b| b.to_string()));
    println!("  Head:         {}", report.head);
    println!("  Batches:      {}", report.batches);
    println!("  Logs:         {} ({} failed)", report.logs, report.failed);
    println!("  Checkpoint:   {}", report.checkpoint.map_or("-".into(), |b| b.to_string()));
    Ok(())
}

async fn cmd_stats(cli: &Cli, recent: usize) -> Result<()> {
    let query = query_service(cli).await?;
    let stats = query.stats().await?;
    println!("Events:        {}", stats.events);
    println!("Participants:  {}", stats.participants);
    println!("Sponsors:      {}", stats.sponsors);
    println!("Tickets:       {}", stats.tickets);
    println!("Ingestion log: {}", stats.ingestion_entries);

    let entries = query.recent_ingestion(recent).await?;
    if !entries.is_empty() {
        println!("\nRecent ingestion:");
        for e in entries {
            println!(
                "  {}  {:<24} block {:<10} {:<8} {}",
                e.created_at.format("%Y-%m-%d %H:%M:%S"),
                e.kind,
                e.block_number,
                e.status,
                e.detail.unwrap_or_default()
            );
        }
    }
    Ok(())
}

async fn cmd_events(cli: &Cli, organizer: Option<&str>) -> Result<()> {
    let query = query_service(cli).await?;
    let events = match organizer {
        Some(org) => query.events_by_organizer(org).await?,
        None => query.events().await?,
    };
    println!("{}", serde_json::to_string_pretty(&events)?);
    Ok(())
}

async fn cmd_seed_event(cli: &Cli) -> Result<()> {
    let query = query_service(cli).await?;
    match query.create_test_event().await {
        Ok(event) => {
            println!("Created test event {} ({})", event.event_id, event.title);
            Ok(())
        }
        Err(e) if e.is_conflict() => {
            println!("Test event already exists");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn cmd_networks() -> Result<()> {
    for p in NetworkProfile::builtins() {
        let default = if p.name == NetworkProfile::DEFAULT { " (default)" } else { "" };
        println!("{}{default}", p.name);
        println!("  chain id:   {}", p.chain_id);
        println!("  rpc:        {}", p.rpc_candidates().join(", "));
        println!("  ws:         {}", p.ws_url.as_deref().unwrap_or("-"));
        println!("  registry:   {}", p.event_registry.as_deref().unwrap_or("-"));
        println!("  tickets:    {}", p.ticket_contract.as_deref().unwrap_or("-"));
    }
    Ok(())
}
