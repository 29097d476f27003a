//! Wiring from configuration to a running orchestrator, and the polling loop.

use crate::config::{AppConfig, LedgerBackend};
use crate::ledger::UploadLedger;
use crate::orchestrator::{ScanOrchestrator, ScanPolicy};
use anyhow::Context;
use providers::document_api::{DocumentApiConfig, DocumentApiSink};
use providers::noop::NoopSink;
use providers::UploadSink;
use std::sync::Arc;
use std::time::Duration;
use storage::{JsonSnapshotStore, LedgerStore, SqliteLedgerStore};
use tokio::sync::watch;
use tracing::{debug, info};

pub async fn open_ledger(config: &AppConfig) -> anyhow::Result<UploadLedger> {
    let store: Arc<dyn LedgerStore> = match config.ledger.backend {
        LedgerBackend::Json => Arc::new(JsonSnapshotStore::new(&config.ledger.path)),
        LedgerBackend::Sqlite => Arc::new(
            SqliteLedgerStore::open(&config.ledger.path)
                .await
                .context("open sqlite ledger")?,
        ),
    };
    let ledger = UploadLedger::open(store)
        .await
        .with_context(|| format!("load upload ledger from {}", config.ledger.path))?;
    info!(records = ledger.len(), path = %config.ledger.path, "upload ledger loaded");
    Ok(ledger)
}

pub fn build_sink(config: &AppConfig) -> anyhow::Result<Arc<dyn UploadSink>> {
    if config.dry_run {
        info!("dry run enabled, nothing will be sent");
        return Ok(Arc::new(NoopSink));
    }
    let sink = DocumentApiSink::new(DocumentApiConfig {
        base_url: config.sink.base_url.clone(),
        api_key: config.api_key.clone(),
        timeout: config.sink.timeout(),
    })
    .context("build http client")?;
    Ok(Arc::new(sink))
}

pub async fn build_orchestrator(config: &AppConfig) -> anyhow::Result<ScanOrchestrator> {
    let policy = ScanPolicy::from_config(config)?;
    let ledger = open_ledger(config).await?;
    let sink = build_sink(config)?;
    Ok(ScanOrchestrator::new(
        config.workspace_mapping.clone(),
        policy,
        ledger,
        sink,
    ))
}

/// Runs passes back to back with `interval` between them until the shutdown
/// flag turns true (or its sender is dropped). A running pass is only cut
/// short between two files.
pub async fn run(
    orchestrator: ScanOrchestrator,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut orchestrator = orchestrator.with_shutdown(shutdown.clone());
    info!(interval_secs = interval.as_secs(), "agent running");
    let mut passes = 0u64;
    loop {
        if *shutdown.borrow() {
            break;
        }
        let summary = orchestrator.run_pass().await;
        passes += 1;
        debug!(pass = passes, discovered = summary.discovered, "pass finished");
        if summary.interrupted {
            break;
        }
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }
    info!(passes, "agent stopped");
}
