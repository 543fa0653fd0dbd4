use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use strato_core::SystemClock;
use strato_store::{GcReport, StoreConfig, StratoStore};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Init(args) => init(args).await,
        Command::Migrate(args) => migrate(args).await,
        Command::Gc(args) => collect_garbage(args).await,
        Command::Health(args) => check_health(args).await,
    }
}

#[derive(Parser)]
#[command(author, version, about = "Operator utilities for a strato datastore")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the datastore directory, its config file and schema.
    Init(DatastoreArgs),
    /// Apply pending schema migrations.
    Migrate(DatastoreArgs),
    /// Remove expired entities, subscriptions and old tombstones.
    Gc(GcArgs),
    /// Check that the configured backend answers queries.
    Health(DatastoreArgs),
}

#[derive(Parser)]
struct DatastoreArgs {
    /// Directory holding `strato.json` and, for sqlite, the database file.
    #[arg(long, env = "STRATO_DATASTORE", default_value = ".strato")]
    datastore: PathBuf,
}

#[derive(Parser)]
struct GcArgs {
    #[command(flatten)]
    datastore: DatastoreArgs,
    /// Keep running, sweeping every N seconds until interrupted.
    #[arg(long)]
    interval_secs: Option<u64>,
}

async fn init(args: DatastoreArgs) -> Result<()> {
    let config = StoreConfig::load_or_init(&args.datastore)
        .with_context(|| format!("load config under {}", args.datastore.display()))?;
    StratoStore::connect(&config, &args.datastore)
        .await
        .context("create datastore")?;
    println!(
        "initialised {} datastore at {}",
        config.backend_name(),
        args.datastore.display()
    );
    Ok(())
}

async fn migrate(args: DatastoreArgs) -> Result<()> {
    let store = open(&args.datastore).await?;
    store.migrate().await.context("apply migrations")?;
    println!("schema is up to date");
    Ok(())
}

async fn collect_garbage(args: GcArgs) -> Result<()> {
    let store = open(&args.datastore.datastore).await?;
    let gc = store.garbage_collector(Arc::new(SystemClock));
    let Some(interval_secs) = args.interval_secs else {
        let report = gc.run_once().await.context("gc sweep")?;
        return print_report(&report);
    };

    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match gc.run_once().await {
                    Ok(report) => print_report(&report)?,
                    Err(err) => log::error!("gc sweep failed: {err}"),
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("listen for shutdown")?;
                log::info!("gc loop stopped");
                return Ok(());
            }
        }
    }
}

async fn check_health(args: DatastoreArgs) -> Result<()> {
    let store = open(&args.datastore).await?;
    store.health_check().await.context("health check")?;
    println!("healthy");
    Ok(())
}

async fn open(datastore: &Path) -> Result<StratoStore> {
    StratoStore::open_dir(datastore)
        .await
        .with_context(|| format!("open datastore at {}", datastore.display()))
}

/// One JSON object per sweep on stdout.
fn print_report(report: &GcReport) -> Result<()> {
    println!("{}", serde_json::to_string(report).context("encode gc report")?);
    Ok(())
}
