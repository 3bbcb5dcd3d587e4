//! `mailprobe` - bulk SMTP/IMAP account and SOCKS proxy verifier.
//!
//! Reads an input list, runs one batch through the core orchestrator, prints
//! progress to stderr, and a final report to stdout.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod cli;
mod input;
mod report;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use mailprobe_core::{
    BatchConfig, BatchOrchestrator, MemoryResultStore, PoolRegistry, ResultStore,
    SqliteResultStore,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mailprobe=info,mailprobe_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let base = match &cli.config {
        Some(path) => BatchConfig::from_json(&read(path)?)
            .with_context(|| format!("invalid config {}", path.display()))?,
        None => BatchConfig::default(),
    };
    let config = cli.batch_config(base).context("invalid batch configuration")?;

    let subjects = input::parse_subjects(&read(&cli.input)?, config.protocol);
    if !subjects.rejected.is_empty() {
        warn!(
            skipped = subjects.rejected.len(),
            first_line = subjects.rejected[0],
            "ignored malformed input lines"
        );
    }
    anyhow::ensure!(
        !subjects.items.is_empty(),
        "no usable entries in {}",
        cli.input.display()
    );

    let proxies = match &cli.proxies {
        Some(path) => {
            let loaded = input::parse_proxies(&read(path)?);
            if !loaded.rejected.is_empty() {
                warn!(skipped = loaded.rejected.len(), "ignored malformed proxy lines");
            }
            loaded.items
        }
        None => Vec::new(),
    };

    let store: Arc<dyn ResultStore> = match &cli.db {
        Some(path) => Arc::new(
            SqliteResultStore::new(&path.to_string_lossy())
                .await
                .with_context(|| format!("cannot open database {}", path.display()))?,
        ),
        None => Arc::new(MemoryResultStore::new()),
    };

    let orchestrator = BatchOrchestrator::new(Arc::new(PoolRegistry::default()), store);
    let batch_id = orchestrator
        .start(subjects.items, proxies, config)
        .await
        .context("batch did not start")?;
    info!(%batch_id, "checking");

    let mut ticker = tokio::time::interval(Duration::from_millis(cli.progress_ms.max(100)));
    let finished = orchestrator.wait(batch_id);
    tokio::pin!(finished);
    let mut interrupted = false;

    let metrics = loop {
        tokio::select! {
            metrics = &mut finished => break metrics?,
            signal = tokio::signal::ctrl_c(), if !interrupted => {
                signal.context("cannot listen for ctrl-c")?;
                interrupted = true;
                warn!(%batch_id, "interrupted, waiting for in-flight checks");
                orchestrator.stop(batch_id)?;
            }
            _ = ticker.tick() => {
                if !cli.json {
                    eprintln!("{}", report::progress_line(&orchestrator.status(batch_id).await?));
                }
            }
        }
    };

    let results = orchestrator.recent(batch_id, cli.show).await?;
    if cli.json {
        println!("{}", report::json(&metrics, &results)?);
    } else {
        print!("{}", report::summary(&metrics, &results));
    }
    Ok(())
}

fn read(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))
}
