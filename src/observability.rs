use std::net::SocketAddr;

use tracing_subscriber::EnvFilter;

// ── Booking activity ────────────────────────────────────────────

/// Counter: bookings recorded (requests and imports).
pub const BOOKINGS_CREATED_TOTAL: &str = "campus_booking_bookings_created_total";

/// Counter: status transitions applied. Labels: action.
pub const TRANSITIONS_TOTAL: &str = "campus_booking_transitions_total";

/// Counter: requests or approvals refused because the slot is taken.
pub const CONFLICTS_TOTAL: &str = "campus_booking_conflicts_total";

// ── Storage ─────────────────────────────────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "campus_booking_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "campus_booking_wal_flush_batch_size";

/// Counter: log compactions performed.
pub const WAL_COMPACTIONS_TOTAL: &str = "campus_booking_wal_compactions_total";

/// Structured logs to stderr. `RUST_LOG` overrides the default level.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Install the Prometheus exporter on `port`. No-op if port is None.
pub fn init_metrics(port: Option<u16>) -> Result<(), String> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("failed to install Prometheus exporter: {e}"))?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}
