use std::sync::Arc;
use std::time::Duration;

use bridge_db::{CorrelationStore, Database};
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const PRUNE_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Background task that drops correlation rows older than `days`.
pub async fn run_prune_loop(db: Arc<Database>, days: u32, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(PRUNE_INTERVAL);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = interval.tick() => {}
        }

        let cutoff = Utc::now() - chrono::Duration::days(i64::from(days));
        let db = db.clone();
        match tokio::task::spawn_blocking(move || db.prune_correlations(cutoff)).await {
            Ok(Ok(count)) => {
                if count > 0 {
                    info!(count, days, "Retention: pruned old correlations");
                }
            }
            Ok(Err(e)) => warn!(error = %e, "Retention prune failed"),
            Err(e) => warn!(error = %e, "Retention task failed"),
        }
    }
}
