use std::time::Duration;

use kv_route_protocol::{EvictMessage, HeartbeatMessage, SyncMessage};
use tokio::sync::watch;

use crate::state::WorkerState;

/// Sends a heartbeat every `interval`. Stops advertising once the worker has
/// marked itself unhealthy, so it ages out of the router's live set on the
/// next staleness check instead of the router needing a dedicated
/// unhealthy-report message.
///
/// Exits as soon as `shutdown` reports `true`, so the caller can `.await`
/// the `JoinHandle` this was spawned on and know the loop has actually
/// stopped rather than merely that the process is tearing down around it.
pub async fn heartbeat_loop(
    state: WorkerState,
    client: reqwest::Client,
    router_url: String,
    advertise_url: String,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut sequence: u64 = 0;
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => break,
        }
        if !state.is_healthy() {
            continue;
        }
        sequence += 1;
        let load_ms = state.scheduler.current_load_ms().await;
        let message = HeartbeatMessage {
            worker_id: state.worker_id.clone(),
            current_load_ms: load_ms,
            worker_url: Some(advertise_url.clone()),
            sequence,
        };
        if let Err(err) = client
            .post(format!("{router_url}/internal/heartbeat"))
            .json(&message)
            .send()
            .await
        {
            tracing::warn!(error = %err, "heartbeat delivery failed");
        }
    }
}

/// Drains pending eviction events and pushes them to the router. This is
/// the fast path the consistency protocol relies on to keep the router's
/// belief fresh between full syncs; best-effort, no retry on failure since
/// the next periodic sync is the backstop. Exits once `shutdown` fires.
pub async fn eviction_loop(
    state: WorkerState,
    client: reqwest::Client,
    router_url: String,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => break,
        }
        for block_hash in state.scheduler.take_evictions().await {
            let message = EvictMessage {
                worker_id: state.worker_id.clone(),
                block_hash,
            };
            if let Err(err) = client
                .post(format!("{router_url}/internal/evict"))
                .json(&message)
                .send()
                .await
            {
                tracing::warn!(error = %err, "eviction report delivery failed");
            }
        }
    }
}

/// Periodic full-state anti-entropy sync. The per-worker cache only tracks
/// a flat set of resident hashes, not the ordered sequences they arrived
/// in, so this always takes the router's degraded set-only reconciliation
/// path rather than supplying `sequences`. Exits once `shutdown` fires.
pub async fn sync_loop(
    state: WorkerState,
    client: reqwest::Client,
    router_url: String,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => break,
        }
        let cached_hashes = state.scheduler.resident_hashes().await;
        let message = SyncMessage {
            worker_id: state.worker_id.clone(),
            cached_hashes,
            sequences: None,
        };
        if let Err(err) = client
            .post(format!("{router_url}/internal/sync"))
            .json(&message)
            .send()
            .await
        {
            tracing::warn!(error = %err, "sync delivery failed");
        }
    }
}
