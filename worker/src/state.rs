use std::sync::{atomic::AtomicBool, Arc};

use crate::actor::SchedulerHandle;

#[derive(Clone)]
pub struct WorkerState {
    pub worker_id: String,
    pub scheduler: SchedulerHandle,
    /// Flips to `false` on an invariant violation (e.g. the eviction queue
    /// is exhausted while every resident block is still pinned). Checked by
    /// the heartbeat loop, which stops advertising liveness once unhealthy
    /// — the worker ages out of the router's live set on the next
    /// staleness check rather than the router needing a dedicated
    /// unhealthy-report message.
    pub healthy: Arc<AtomicBool>,
}

impl WorkerState {
    pub fn new(worker_id: String, scheduler: SchedulerHandle) -> Self {
        Self {
            worker_id,
            scheduler,
            healthy: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(std::sync::atomic::Ordering::Relaxed)
    }

    pub fn mark_unhealthy(&self) {
        self.healthy.store(false, std::sync::atomic::Ordering::Relaxed);
    }
}
