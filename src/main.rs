//! youai-immich: migrate a youai cloud photo library into Immich.
//!
//! The source library is walked album by album into a local ledger of JSON
//! files. Every file is then downloaded, uploaded to Immich, added to the
//! Immich album with the same title, and recorded as migrated. Progress is
//! durable after every file, so an interrupted run resumes where it stopped.

#![warn(clippy::all)]

mod cli;
mod config;
mod destination;
mod enumerate;
mod ledger;
mod retry;
mod shutdown;
mod source;
mod sync;
#[cfg(test)]
mod test_support;
mod types;

use std::path::Path;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::Command;
use destination::DestinationClient;
use enumerate::{AlbumEnumerator, FileEnumerator};
use ledger::Ledger;
use retry::Retrier;
use source::SourceClient;
use sync::SyncPipeline;

/// Run the status command.
async fn run_status(out_dir: &Path, args: cli::StatusArgs) -> anyhow::Result<()> {
    if !out_dir.exists() {
        println!("No ledger found at {}", out_dir.display());
        println!("Run a sync first to create it.");
        return Ok(());
    }

    let mut ledger = Ledger::open(out_dir).await?;
    let summary = ledger.summary().await?;

    println!("Ledger: {}", out_dir.display());
    println!();
    println!("Albums:     {}", summary.albums);
    println!("Files:      {}", summary.files);
    println!("  Migrated: {}", summary.migrated);
    println!("  Pending:  {}", summary.pending);
    println!();
    if summary.failures.is_empty() {
        println!("No recorded failures");
    } else {
        println!("Recorded failures:");
        for (kind, count) in &summary.failures {
            println!("  {:<20} {}", kind.as_str(), count);
        }
    }

    if args.failures {
        let failures = ledger.failures().await?;
        if !failures.is_empty() {
            println!();
        }
        for event in failures {
            println!(
                "  [{}] {} #{} {} - {}",
                event.time,
                event.kind,
                event.walked_i,
                event.id.as_deref().or(event.url.as_deref()).unwrap_or("-"),
                event.error.as_deref().unwrap_or("unknown error")
            );
        }
    }
    Ok(())
}

/// Run the sync command: enumerate, provision albums, migrate files.
async fn run_sync(cli: &cli::Cli) -> anyhow::Result<()> {
    let config = config::Config::load(cli)?;
    tracing::debug!(?config, "Loaded configuration");

    let mut ledger = Ledger::open(&config.out_dir).await?;
    ledger.clear_enumeration(config.clear_downloads).await?;
    tracing::info!("Ledger at {}", ledger.root().display());

    let source = SourceClient::new(config.source.clone()).context("Cannot build source client")?;
    let destination =
        DestinationClient::new(config.destination.clone()).context("Cannot build Immich client")?;
    let retrier = Retrier::new(config.retry);

    let shutdown_token = shutdown::install_signal_handler();

    tracing::info!("Enumerating albums...");
    let albums = AlbumEnumerator::new(&source, &ledger, &retrier).run().await?;
    if shutdown_token.is_cancelled() {
        return Ok(());
    }

    tracing::info!("Enumerating files...");
    let files = FileEnumerator::new(&source, &ledger, &retrier, &config.source.need_amount)
        .run()
        .await?;
    if shutdown_token.is_cancelled() {
        return Ok(());
    }

    let mut pipeline = SyncPipeline::new(
        &source,
        &destination,
        &mut ledger,
        &retrier,
        config.sync.clone(),
    );
    pipeline.setup(&albums).await?;
    let summary = pipeline.run(&files, &shutdown_token).await?;

    if summary.failed_total() > 0 {
        tracing::warn!(
            "{} files failed; see {} and re-run to retry them",
            summary.failed_total(),
            config.out_dir.join("failure.json").display()
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(cli.log_level.as_filter())),
        )
        .init();

    match cli.effective_command() {
        Command::Status(args) => {
            run_status(&config::expand_tilde(&cli.out_dir), args).await
        }
        Command::Sync => run_sync(&cli).await,
    }
}
