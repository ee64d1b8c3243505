use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use staychain::booking::BookingService;
use staychain::config::Config;
use staychain::ledger::Ledger;
use staychain::{compactor, http};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    staychain::observability::init(config.metrics_port)?;

    // Ensure data directory exists
    std::fs::create_dir_all(&config.data_dir)?;

    let ledger = Arc::new(Ledger::open(config.wal_path())?);
    tokio::spawn(compactor::run_compactor(ledger.clone(), config.compact_threshold));

    let service = Arc::new(BookingService::new(ledger.clone(), config.overlap_policy));
    let app = http::router(service.clone(), config.max_connections);

    let addr = config.addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("staychain listening on {addr}");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  bookings: {}", ledger.booking_count());
    info!("  max_connections: {}", config.max_connections);
    info!("  overlap_policy: {:?}", service.policy());
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("staychain stopped");
    Ok(())
}

/// Resolves on SIGTERM or ctrl-c; in-flight requests are drained by axum.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!("failed to register SIGTERM handler: {e}");
                ctrl_c.await.ok();
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
    info!("shutdown signal received, draining requests");
}
