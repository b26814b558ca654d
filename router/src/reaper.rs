use std::{sync::Arc, time::Duration};

use kv_route_cache_map::WorkerTable;

/// Periodically drops workers that have gone quiet well past the staleness
/// window, so a worker that crashes and never comes back doesn't linger in
/// the table forever. Runs at 10x the staleness window to give transient
/// network blips plenty of room before a worker is forgotten outright.
pub async fn run(worker_table: Arc<WorkerTable>, interval: Duration, staleness_window: Duration) {
    let max_age = staleness_window * 10;
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        let removed = worker_table.evict_stale(max_age);
        for worker_id in removed {
            tracing::info!(worker_id = %worker_id, "reaped stale worker");
        }
    }
}
