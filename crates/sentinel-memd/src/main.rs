//! Sentinel memory daemon.
//!
//! Loads a [`MemoryConfig`], wires the memory tiers and deterministic
//! capabilities, then runs the standard sync task set on an interval until
//! the requested number of cycles has run or ctrl-c is received.
//!
//! Procedural memory lives in SQLite when `--db` is given; otherwise every
//! tier is in-memory.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use sentinel_memory::fakes::{DigestProver, MemoryPubSub};
use sentinel_memory::metrics::METRICS;
use sentinel_memory::telemetry::init_tracing;
use sentinel_memory::{
    IntegrityGuard, MemoryConfig, MemoryRoot, SyncCoordinator, SyncReport, SyncTaskSet,
    TieredStore,
};
use sentinel_state::fakes::{MemoryKeyValueStore, MemoryVectorStore};
use sentinel_state::{
    ProceduralRecord, RelationalStore, SqliteRelationalStore, CREATE_KNOWN_EXPLOITS,
    SELECT_KNOWN_EXPLOITS,
};
use tokio::sync::watch;
use tracing::{info, Level};

#[derive(Parser, Debug)]
#[command(name = "sentinel-memd")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Runs Sentinel memory synchronization cycles", long_about = None)]
struct Cli {
    /// Path to a TOML configuration file (defaults apply when omitted)
    #[arg(short, long, env = "SENTINEL_MEMD_CONFIG")]
    config: Option<PathBuf>,

    /// SQLite file for procedural memory (in-memory when omitted)
    #[arg(long, env = "SENTINEL_MEMD_DB")]
    db: Option<PathBuf>,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Number of cycles to run (0 = until ctrl-c)
    #[arg(long, default_value_t = 1)]
    cycles: u64,

    /// Delay between cycles in milliseconds
    #[arg(long, default_value_t = 1_000)]
    interval_ms: u64,
}

fn load_config(path: Option<&PathBuf>) -> Result<MemoryConfig> {
    match path {
        Some(path) => MemoryConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display())),
        None => Ok(MemoryConfig::default()),
    }
}

/// Build the tiers, opening and preparing the SQLite store when `db` is set.
async fn open_store(db: Option<&PathBuf>) -> Result<TieredStore> {
    let Some(path) = db else {
        return Ok(TieredStore::in_memory());
    };

    let procedural = SqliteRelationalStore::open(path)
        .with_context(|| format!("failed to open database {}", path.display()))?;
    procedural
        .execute(CREATE_KNOWN_EXPLOITS, &[])
        .await
        .context("failed to prepare known_exploits table")?;
    let rows = procedural.query(SELECT_KNOWN_EXPLOITS, &[]).await?;
    let exploits = rows
        .iter()
        .map(ProceduralRecord::from_row)
        .collect::<Result<Vec<_>, _>>()
        .context("known_exploits holds malformed rows")?;
    info!(db = %path.display(), exploits = exploits.len(), "procedural store opened");

    Ok(TieredStore::new(
        Arc::new(MemoryKeyValueStore::new()),
        Arc::new(MemoryVectorStore::new()),
        Arc::new(procedural),
    ))
}

fn log_report(cycle: u64, report: &SyncReport) -> Result<()> {
    info!(
        cycle = cycle,
        committed = report.committed(),
        failed = report.failed(),
        duration_ms = report.duration_ms,
        report = %serde_json::to_string(report)?,
        "sync report"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    init_tracing(cli.json, level);

    let config = load_config(cli.config.as_ref())?;
    info!(
        strategy = %config.sync.strategy,
        latency_budget_ms = config.sync.latency_budget_ms,
        max_retries = config.sync.max_retries,
        "sentinel-memd starting"
    );

    let store = open_store(cli.db.as_ref()).await?;
    let pubsub = Arc::new(MemoryPubSub::new());
    let coordinator = SyncCoordinator::new(store, pubsub, config.sync.clone())?;
    let integrity =
        IntegrityGuard::with_statement(Arc::new(DigestProver::new()), &config.guard.proof_statement);
    let tasks = SyncTaskSet::standard();
    let interval = Duration::from_millis(cli.interval_ms);

    if cli.cycles == 0 {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = coordinator.spawn_periodic(tasks, interval, shutdown_rx);
        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for ctrl-c")?;
        info!("shutdown requested");
        shutdown_tx.send(true).ok();
        let cycles = handle.await.context("sync loop panicked")?;
        info!(cycles = cycles, "sync loop stopped");
    } else {
        let mut last = None;
        for cycle in 1..=cli.cycles {
            let report = coordinator.run_sync_cycle(&tasks).await;
            log_report(cycle, &report)?;
            last = Some(report);
            if cycle < cli.cycles {
                tokio::time::sleep(interval).await;
            }
        }

        if let Some(report) = last {
            let root = MemoryRoot::from_snapshot(&serde_json::to_value(&report)?);
            let proof = integrity.prove_integrity(&root).await?;
            info!(root = %proof.root, proof = %proof.proof, "last report attested");
        }
    }

    METRICS.flush();
    Ok(())
}
