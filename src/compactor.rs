use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::ledger::Ledger;

const CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Compact the ledger's WAL whenever `threshold` appends have piled up.
/// Returns true if a compaction ran.
pub async fn compact_if_needed(ledger: &Ledger, threshold: u64) -> bool {
    let appends = ledger.wal_appends_since_compact().await;
    if appends < threshold {
        return false;
    }
    match ledger.compact_wal().await {
        Ok(()) => {
            metrics::counter!(crate::observability::WAL_COMPACTIONS_TOTAL).increment(1);
            info!(
                "compacted WAL after {appends} appends ({} bookings)",
                ledger.booking_count()
            );
            true
        }
        Err(e) => {
            warn!("WAL compaction failed: {e}");
            false
        }
    }
}

/// Background task running `compact_if_needed` on a fixed interval.
pub async fn run_compactor(ledger: Arc<Ledger>, threshold: u64) {
    let mut interval = tokio::time::interval(CHECK_INTERVAL);
    loop {
        interval.tick().await;
        compact_if_needed(&ledger, threshold).await;
    }
}
