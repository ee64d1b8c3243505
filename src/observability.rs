use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: booking API requests. Labels: operation, outcome.
pub const REQUESTS_TOTAL: &str = "staychain_requests_total";

/// Histogram: booking API latency in seconds. Labels: operation.
pub const REQUEST_DURATION_SECONDS: &str = "staychain_request_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: bookings held by the ledger.
pub const BOOKINGS_STORED: &str = "staychain_bookings_stored";

/// Counter: WAL compactions performed.
pub const WAL_COMPACTIONS_TOTAL: &str = "staychain_wal_compactions_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "staychain_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "staychain_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Record one finished API call.
pub fn record_request(operation: &'static str, outcome: &'static str, elapsed: std::time::Duration) {
    metrics::counter!(REQUESTS_TOTAL, "operation" => operation, "outcome" => outcome).increment(1);
    metrics::histogram!(REQUEST_DURATION_SECONDS, "operation" => operation)
        .record(elapsed.as_secs_f64());
}
