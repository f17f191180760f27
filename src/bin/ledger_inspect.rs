//! # Ledger Inspector
//!
//! Prints the done and failed id counts of a completion ledger and reports any
//! id recorded as both. Exits with status 1 when such an overlap exists.

use anyhow::Context;
use clap::Parser;
use estimation_core::config::ConfigManager;
use estimation_core::ledger::{CompletionLedger, FileSystemFactStore};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "ledger-inspect")]
#[command(about = "Inspect the completion ledger of an estimation run")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Ledger root directory; defaults to `ledger.root` from the configuration
    root: Option<PathBuf>,

    /// Configuration file to read the ledger root from
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let _subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .try_init();

    match inspect(&cli).await {
        Ok(true) => process::exit(0),
        Ok(false) => process::exit(1),
        Err(e) => {
            error!("Ledger inspection failed: {e:#}");
            process::exit(2);
        }
    }
}

/// Returns whether the ledger is consistent
async fn inspect(cli: &Cli) -> anyhow::Result<bool> {
    let root = match &cli.root {
        Some(root) => root.clone(),
        None => {
            let manager = ConfigManager::load_from(cli.config.as_deref())
                .context("loading configuration")?;
            manager.config().ledger.root.clone()
        }
    };

    let ledger = CompletionLedger::new(Arc::new(FileSystemFactStore::new(&root)));
    let snapshot = ledger
        .snapshot()
        .await
        .with_context(|| format!("reading ledger at {}", root.display()))?;
    let overlap = snapshot.overlapping_ids();

    if cli.json {
        let report = serde_json::json!({
            "root": root,
            "done": snapshot.done.len(),
            "failed": snapshot.failed.len(),
            "overlap": overlap,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Ledger: {}", root.display());
        println!("Done:   {}", snapshot.done.len());
        println!("Failed: {}", snapshot.failed.len());
        if overlap.is_empty() {
            println!("No item is recorded as both done and failed");
        } else {
            println!("Recorded as both done and failed: {overlap:?}");
        }
    }

    Ok(overlap.is_empty())
}
