//! VulnGraph Ingest - vulnerability ingestion tool

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use vulngraph_common::logging::{init_logging, LogConfig, LogLevel};
use vulngraph_ingest::cli::{Cli, Command};
use vulngraph_ingest::config::IngestConfig;
use vulngraph_ingest::framework::{DependencyLayers, IngestionRun, RunOptions, RunReport, StorageBackend};
use vulngraph_ingest::nvd::{load_feed, Cve, NvdAdapter, NvdClient};
use vulngraph_ingest::storage::{MemoryStorage, PgStorage};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbose flag; environment takes precedence
    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    let log_config = LogConfig::default()
        .with_level(log_level)
        .with_file_prefix("vulngraph-ingest")
        .merge_env()?;
    let _guard = init_logging(&log_config)?;

    let mut config = IngestConfig::from_env().context("Failed to load ingestion configuration")?;
    if let Some(workers) = cli.workers {
        config.workers = workers;
        config.validate()?;
    }

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current layer");
            on_signal.cancel();
        }
    });

    match cli.command {
        Command::Feed { path, dry_run } => {
            let records = load_feed(&path)
                .await
                .with_context(|| format!("Failed to load feed from {}", path.display()))?;
            let report = ingest(&config, records, dry_run, cancel).await?;
            summarize(&report);
        },
        Command::Api {
            start_year,
            end_year,
            dry_run,
        } => {
            let client = Arc::new(NvdClient::new(&config.nvd)?);
            let fetched = client
                .fetch_years(
                    start_year,
                    end_year.unwrap_or(start_year),
                    config.workers,
                    cancel.clone(),
                )
                .await
                .context("Failed to fetch CVEs from the NVD API")?;
            for (window, err) in &fetched.failed_windows {
                warn!(window = %window, error = %err, "Window not ingested");
            }

            let report = ingest(&config, fetched.records, dry_run, cancel).await?;
            summarize(&report);
        },
        Command::Migrate => {
            let storage = PgStorage::connect(&config.database)
                .await
                .context("Failed to connect to database")?;
            storage.migrate().await?;
        },
    }

    Ok(())
}

async fn open_storage(config: &IngestConfig, dry_run: bool) -> Result<Arc<dyn StorageBackend>> {
    if dry_run {
        info!("Dry run: writing to in-memory storage");
        return Ok(Arc::new(MemoryStorage::new()));
    }

    let storage = PgStorage::connect(&config.database)
        .await
        .context("Failed to connect to database")?;
    Ok(Arc::new(storage))
}

async fn ingest(
    config: &IngestConfig,
    records: Vec<Cve>,
    dry_run: bool,
    cancel: CancellationToken,
) -> Result<RunReport> {
    let storage = open_storage(config, dry_run).await?;
    let run = IngestionRun::new(
        NvdAdapter::new()?,
        storage,
        DependencyLayers::standard()?,
        RunOptions::from(config),
    )
    .with_cancellation(cancel);

    let report = run.execute(records).await.context("Ingestion run failed")?;
    Ok(report)
}

fn summarize(report: &RunReport) {
    for (entity_type, written) in &report.written {
        info!(entity_type = %entity_type, written, "Written");
    }
    for batch in &report.failed_batches {
        warn!(
            layer = batch.layer,
            batch = batch.batch,
            entities = batch.entity_count,
            cause = %batch.cause,
            "Batch not persisted"
        );
    }

    info!(
        run_id = %report.run_id,
        records = report.records,
        written = report.total_written(),
        skipped = report.total_skipped(),
        excluded = report.total_excluded(),
        failed_batches = report.failed_batches.len(),
        cancelled = report.cancelled,
        duration_ms = report.duration().num_milliseconds(),
        "Ingestion complete"
    );
}
