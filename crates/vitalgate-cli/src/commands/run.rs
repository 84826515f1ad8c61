//! `vitalgate run`: the gateway proper.
//!
//! Opens the database, starts one connection per discovered analyzer and
//! the sync worker, then logs measurements until Ctrl-C or SIGTERM. Every
//! measurement is stored and queued by the manager's sink before this loop
//! sees it, so an interrupted run loses nothing that was decoded.

use anyhow::Context;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use vitalgate_core::constants::DEFAULT_HL7_PORT;
use vitalgate_hardware::DeviceManager;
use vitalgate_storage::{Database, StorageSink};
use vitalgate_sync::{HttpSyncApi, SyncWorker};

use crate::settings::GatewayConfig;

pub async fn execute(config: GatewayConfig, sync_enabled: bool) -> anyhow::Result<()> {
    let db = Database::new(config.database.clone())
        .await
        .with_context(|| format!("cannot open database {}", config.database.path))?;

    let mut manager = DeviceManager::new(config.manager.clone(), StorageSink::new(&db));
    manager
        .discover(&config.devices)
        .await
        .context("device discovery failed")?;
    let started = manager.connect_all();
    if started == 0 {
        warn!(
            hl7_port = DEFAULT_HL7_PORT,
            "No analyzers found; configure devices.serial_paths or devices.listen"
        );
    }

    let cancel = CancellationToken::new();
    let worker = if sync_enabled {
        Some(spawn_sync_worker(&db, &config, cancel.child_token())?)
    } else {
        info!("Sync disabled, measurements stay local");
        None
    };

    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown requested");
        signal_cancel.cancel();
    });

    info!(devices = started, "Gateway running");
    while let Some(measurement) = manager.next_measurement(&cancel).await {
        info!(
            measurement_id = %measurement.id(),
            device_id = %measurement.device_id,
            quality = %measurement.quality,
            fields = measurement.fields.len(),
            has_phone = measurement.customer_phone.is_some(),
            "Measurement stored"
        );
    }

    let stats = manager.stats();
    let report = manager.shutdown().await;
    info!(
        received = stats.measurements_received,
        decode_failures = stats.decode_failures,
        reconnects = stats.reconnects,
        sink_failures = stats.sink_failures,
        drained = report.pending.len(),
        "Devices stopped"
    );
    if !report.unsaved.is_empty() {
        error!(
            lost = report.unsaved.len(),
            "Measurements could not be stored before shutdown"
        );
    }

    if let Some(worker) = worker {
        match tokio::time::timeout(config.manager.shutdown_timeout, worker).await {
            Ok(Ok(Ok(()))) => info!("Sync worker stopped"),
            Ok(Ok(Err(e))) => error!(error = %e, "Sync worker failed"),
            Ok(Err(e)) => error!(error = %e, "Sync worker task panicked"),
            Err(_) => warn!("Sync worker did not stop in time"),
        }
    }

    db.close().await;
    Ok(())
}

fn spawn_sync_worker(
    db: &Database,
    config: &GatewayConfig,
    cancel: CancellationToken,
) -> anyhow::Result<JoinHandle<vitalgate_sync::Result<()>>> {
    let api = HttpSyncApi::new(config.sync.api.clone()).context("invalid sync.api settings")?;
    info!(endpoint = api.endpoint(), "Sync enabled");
    let worker = SyncWorker::new(
        db,
        api,
        config.sync.backoff.clone(),
        config.sync.worker.clone(),
    );
    Ok(tokio::spawn(async move { worker.run(cancel).await }))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
