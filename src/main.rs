use std::sync::Arc;

use tracing::info;

use campus_booking::config::Config;
use campus_booking::directory::MemoryDirectory;
use campus_booking::engine::Engine;
use campus_booking::notify::NotifyHub;
use campus_booking::{maintenance, observability, seed};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    observability::init_logging();

    let config = Config::from_env();
    observability::init_metrics(config.metrics_port)?;

    std::fs::create_dir_all(&config.data_dir)?;

    let directory = Arc::new(MemoryDirectory::new());
    let notify = Arc::new(NotifyHub::new());
    let engine = Arc::new(Engine::new(config.wal_path(), notify, directory.clone())?);

    info!("campus-booking started");
    info!("  wal: {}", config.wal_path().display());
    info!("  compact_threshold: {}", config.compact_threshold);
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    if config.seed_demo_data {
        seed::bootstrap(&engine, &directory).await?;
    }

    let compactor = tokio::spawn(maintenance::run_compactor(
        engine.clone(),
        config.compact_threshold,
    ));

    shutdown_signal().await?;
    info!("shutdown signal received");
    compactor.abort();

    if let Err(e) = engine.compact_wal().await {
        tracing::warn!(error = %e, "final compaction failed");
    }
    info!("campus-booking stopped");
    Ok(())
}

async fn shutdown_signal() -> std::io::Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            r = ctrl_c => r?,
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await?;
    }
    Ok(())
}
