use std::sync::Arc;
use std::time::Duration;

use crate::engine::{BookingError, Engine};

const CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Compact the log once more than `threshold` appends have accumulated.
/// Returns whether a compaction ran.
pub async fn compact_if_needed(engine: &Engine, threshold: u64) -> Result<bool, BookingError> {
    let appends = engine.wal_appends_since_compact().await;
    if appends < threshold {
        tracing::debug!(appends, threshold, "compaction not needed");
        return Ok(false);
    }
    engine.compact_wal().await?;
    Ok(true)
}

/// Background task that keeps the booking log short.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(CHECK_INTERVAL);
    loop {
        interval.tick().await;
        if let Err(e) = compact_if_needed(&engine, threshold).await {
            tracing::warn!(error = %e, "background compaction failed");
        }
    }
}
