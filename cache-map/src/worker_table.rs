use std::time::{Duration, Instant};

use dashmap::DashMap;
use kv_route_protocol::WorkerId;

#[derive(Debug, Clone)]
struct WorkerEntry {
    load_ms: f64,
    worker_url: Option<String>,
    last_heartbeat: Instant,
    last_sequence: u64,
    healthy: bool,
}

/// A read-only view of one worker's state, for dispatch decisions and the
/// `/internal/health` style surfaces.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerSnapshot {
    pub worker_id: WorkerId,
    pub load_ms: f64,
    pub worker_url: Option<String>,
    pub healthy: bool,
}

/// Router-side live-worker table.
///
/// A worker appears on first heartbeat, is considered live while
/// heartbeats arrive within `staleness_window`, and can be marked
/// permanently unhealthy on an invariant-violation report until it
/// re-registers.
#[derive(Debug)]
pub struct WorkerTable {
    workers: DashMap<WorkerId, WorkerEntry>,
    staleness_window: Duration,
}

impl WorkerTable {
    pub fn new(staleness_window: Duration) -> Self {
        Self {
            workers: DashMap::new(),
            staleness_window,
        }
    }

    /// Apply a heartbeat. Returns `false` (ignored) if `sequence` is not
    /// newer than the last one recorded for this worker — the transport
    /// gives no ordering guarantee, so an out-of-order delivery must not
    /// regress `last_heartbeat` or `load_ms`.
    pub fn heartbeat(
        &self,
        worker_id: &WorkerId,
        load_ms: f64,
        worker_url: Option<String>,
        sequence: u64,
    ) -> bool {
        let mut entry = self.workers.entry(worker_id.clone()).or_insert(WorkerEntry {
            load_ms: 0.0,
            worker_url: None,
            last_heartbeat: Instant::now(),
            last_sequence: 0,
            healthy: true,
        });

        if sequence != 0 && sequence <= entry.last_sequence {
            return false;
        }

        entry.load_ms = load_ms;
        entry.last_heartbeat = Instant::now();
        entry.last_sequence = sequence;
        if worker_url.is_some() {
            entry.worker_url = worker_url;
        }
        entry.healthy = true;
        true
    }

    /// Speculatively inflate a worker's load after dispatch, to avoid a
    /// thundering-herd effect among near-simultaneous identical requests.
    /// Corrected by the next authoritative heartbeat, which replaces
    /// `load_ms` outright.
    pub fn inflate_load(&self, worker_id: &WorkerId, addend_ms: f64) {
        if let Some(mut entry) = self.workers.get_mut(worker_id) {
            entry.load_ms += addend_ms;
        }
    }

    pub fn mark_unhealthy(&self, worker_id: &WorkerId) {
        if let Some(mut entry) = self.workers.get_mut(worker_id) {
            entry.healthy = false;
        }
    }

    pub fn remove(&self, worker_id: &WorkerId) {
        self.workers.remove(worker_id);
    }

    /// Drop entries that haven't heartbeated within `max_age`, returning the
    /// ids removed. Distinct from liveness filtering in [`Self::live_workers`]:
    /// a long-dead entry is still harmless to keep around for dispatch
    /// purposes (it's already excluded), but left unbounded it leaks memory
    /// for workers that are never coming back.
    pub fn evict_stale(&self, max_age: Duration) -> Vec<WorkerId> {
        let dead: Vec<WorkerId> = self
            .workers
            .iter()
            .filter(|entry| entry.last_heartbeat.elapsed() >= max_age)
            .map(|entry| entry.key().clone())
            .collect();
        for worker_id in &dead {
            self.workers.remove(worker_id);
        }
        dead
    }

    fn is_live(&self, entry: &WorkerEntry) -> bool {
        entry.healthy && entry.last_heartbeat.elapsed() < self.staleness_window
    }

    /// Workers considered live: healthy and heartbeating within the
    /// staleness window.
    pub fn live_workers(&self) -> Vec<WorkerSnapshot> {
        self.workers
            .iter()
            .filter(|entry| self.is_live(&entry))
            .map(|entry| WorkerSnapshot {
                worker_id: entry.key().clone(),
                load_ms: entry.load_ms,
                worker_url: entry.worker_url.clone(),
                healthy: entry.healthy,
            })
            .collect()
    }

    pub fn load_of(&self, worker_id: &WorkerId) -> Option<f64> {
        self.workers.get(worker_id).map(|e| e.load_ms)
    }

    pub fn is_empty(&self) -> bool {
        self.live_workers().is_empty()
    }
}
