use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use mutual_db::Database;

/// Background task that purges messages past their per-message `expires_at`.
/// Aggregates of the affected texts are recomputed by the purge itself.
pub async fn run_sweep_loop(db: Arc<Database>, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        let db = db.clone();
        let now = chrono::Utc::now();
        match tokio::task::spawn_blocking(move || db.purge_expired(now)).await {
            Ok(Ok(count)) => {
                if count > 0 {
                    info!("Sweep: purged {} expired messages", count);
                }
            }
            Ok(Err(e)) => warn!("Sweep error: {:#}", e),
            Err(e) => warn!("Sweep task failed: {}", e),
        }
    }
}
