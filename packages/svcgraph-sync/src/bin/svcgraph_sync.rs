//! svcgraph-sync - run one locked graph sync
//!
//! Usage:
//!   svcgraph-sync sync --event event.json
//!   svcgraph-sync sync --snapshot services.json [--tx <id>]
//!   svcgraph-sync lock-status
//!
//! Configuration comes from flags or the matching environment variables
//! (`ENV_LOCK_ITEM_ID`, `ENV_LOCK_DIR`, `GRAPH_URL`, `ENV_DEPENDENCY_TAG`).

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use svcgraph::{
    FileLockStore, LockManager, MemoryGraph, Orchestrator, QueueEvent, Snapshot, SyncConfig,
    SyncError,
};

#[derive(Parser, Debug)]
#[command(name = "svcgraph-sync", version, about = "Sync a service registry snapshot into the service graph")]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct ConfigArgs {
    /// Lock record identifier
    #[arg(long, env = "ENV_LOCK_ITEM_ID", global = true)]
    lock_key: Option<String>,

    /// Directory holding lock records
    #[arg(long, env = "ENV_LOCK_DIR", global = true)]
    lock_dir: Option<PathBuf>,

    /// Graph image path
    #[arg(long = "graph", env = "GRAPH_URL", global = true)]
    graph_path: Option<PathBuf>,

    /// Tag key that names a service's dependency
    #[arg(long, env = "ENV_DEPENDENCY_TAG", global = true)]
    dependency_tag: Option<String>,
}

impl ConfigArgs {
    fn into_config(self) -> SyncConfig {
        let defaults = SyncConfig::default();
        SyncConfig {
            lock_key: self.lock_key.unwrap_or(defaults.lock_key),
            lock_dir: self.lock_dir.unwrap_or(defaults.lock_dir),
            graph_path: self.graph_path.unwrap_or(defaults.graph_path),
            dependency_tag: self.dependency_tag.unwrap_or(defaults.dependency_tag),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one transaction
    Sync {
        /// Queue event (`Records[0].body` is the snapshot, `messageId` the transaction id)
        #[arg(long, conflicts_with_all = ["snapshot", "tx"])]
        event: Option<PathBuf>,

        /// Bare snapshot file
        #[arg(long, required_unless_present = "event")]
        snapshot: Option<PathBuf>,

        /// Transaction id for --snapshot; defaults to a hash of the file
        #[arg(long, requires = "snapshot")]
        tx: Option<String>,
    },
    /// Print the lock record
    LockStatus,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let code = err
                .downcast_ref::<SyncError>()
                .map(SyncError::code)
                .unwrap_or("INTERNAL_ERROR");
            eprintln!("[svcgraph-sync] {}: {:#}", code, err);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = cli.config.into_config();
    config.validate().map_err(SyncError::from)?;

    let locks = FileLockStore::open(&config.lock_dir)
        .with_context(|| format!("opening lock store {}", config.lock_dir.display()))?;

    match cli.command {
        Command::LockStatus => {
            let manager = LockManager::new(locks);
            match manager.status(&config.lock_key)? {
                Some(record) => println!(
                    "{} locked={} version={}",
                    record.key, record.locked, record.version
                ),
                None => println!("{} absent", config.lock_key),
            }
            Ok(())
        }
        Command::Sync { event, snapshot, tx } => {
            // Image is read by the orchestrator once the lock is held
            let graph = MemoryGraph::bind(&config.graph_path);
            let mut orchestrator = Orchestrator::new(&config, locks, graph)?;

            let outcome = match (event, snapshot) {
                (Some(path), _) => {
                    let raw = fs::read_to_string(&path)
                        .with_context(|| format!("reading event {}", path.display()))?;
                    orchestrator.handle_event(&QueueEvent::from_json(&raw)?)?
                }
                (None, Some(path)) => {
                    let raw = fs::read_to_string(&path)
                        .with_context(|| format!("reading snapshot {}", path.display()))?;
                    let tx = tx.unwrap_or_else(|| content_tx_id(&raw));
                    orchestrator.run(&Snapshot::from_json(&raw)?, &tx)?
                }
                (None, None) => anyhow::bail!("either --event or --snapshot is required"),
            };

            let report = &outcome.report;
            println!(
                "tx={} state={} lock_version={} services=+{}/~{} instances=+{}/~{} deps={} missing={} pruned={}",
                outcome.tx,
                outcome.state,
                outcome.lease.version,
                report.services_created,
                report.services_updated,
                report.instances_created,
                report.instances_updated,
                report.dependencies_linked,
                report.missing_targets.len(),
                report.pruned(),
            );
            Ok(())
        }
    }
}

/// Same file contents, same transaction id: re-running a file is a no-op.
fn content_tx_id(raw: &str) -> String {
    let hash = blake3::hash(raw.as_bytes());
    format!("snap-{}", &hash.to_hex()[..16])
}
