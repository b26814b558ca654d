use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use kv_route_protocol::{BlockHash, CacheStatus, RoutingStrategy, WorkerId};

use crate::{trie::GlobalCacheMap, worker_table::WorkerTable};

#[derive(Debug, Clone, Copy)]
pub struct DispatcherConfig {
    pub strategy: RoutingStrategy,
    /// Speculative load inflation applied to the chosen worker right after
    /// dispatch, to damp the thundering-herd effect of near-simultaneous
    /// identical requests. Corrected by the next heartbeat.
    pub speculative_load_addend_ms: f64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            strategy: RoutingStrategy::CacheAware,
            speculative_load_addend_ms: 50.0,
        }
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("no_workers_available")]
    NoWorkersAvailable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DispatchOutcome {
    pub worker_id: WorkerId,
    pub cache_status: CacheStatus,
    pub match_length: usize,
}

/// Selects a worker per the configured strategy and speculatively updates
/// the global cache map and the chosen worker's load.
pub struct Dispatcher {
    cache_map: Arc<GlobalCacheMap>,
    worker_table: Arc<WorkerTable>,
    config: DispatcherConfig,
    round_robin_counter: AtomicUsize,
    /// Shared rotation pointer for breaking ties within any tied subset —
    /// least-loaded ties and cache-aware-miss-fallback ties alike. Any
    /// deterministic rotation that avoids repeatedly picking the same
    /// first match works here; a single shared counter is the simplest one.
    tie_break_counter: AtomicUsize,
}

impl Dispatcher {
    pub fn new(
        cache_map: Arc<GlobalCacheMap>,
        worker_table: Arc<WorkerTable>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            cache_map,
            worker_table,
            config,
            round_robin_counter: AtomicUsize::new(0),
            tie_break_counter: AtomicUsize::new(0),
        }
    }

    pub fn dispatch(&self, sequence: &[BlockHash]) -> Result<DispatchOutcome, DispatchError> {
        let live = self.worker_table.live_workers();
        if live.is_empty() {
            return Err(DispatchError::NoWorkersAvailable);
        }
        let live_ids: Vec<WorkerId> = live.iter().map(|w| w.worker_id.clone()).collect();

        let (worker_id, cache_status, match_length) = match self.config.strategy {
            RoutingStrategy::CacheAware => self.dispatch_cache_aware(sequence, &live_ids),
            RoutingStrategy::RoundRobin => {
                let idx = self.round_robin_counter.fetch_add(1, Ordering::Relaxed) % live_ids.len();
                (live_ids[idx].clone(), CacheStatus::Miss, 0)
            }
            RoutingStrategy::LeastLoaded => {
                (self.pick_least_loaded(&live_ids), CacheStatus::Miss, 0)
            }
        };

        // Speculative update: make this decision visible to concurrent
        // dispatches immediately, before the worker itself confirms
        // anything.
        if !sequence.is_empty() {
            self.cache_map.add_block_sequence(&worker_id, sequence);
        }
        self.worker_table
            .inflate_load(&worker_id, self.config.speculative_load_addend_ms);

        Ok(DispatchOutcome {
            worker_id,
            cache_status,
            match_length,
        })
    }

    fn dispatch_cache_aware(
        &self,
        sequence: &[BlockHash],
        live_ids: &[WorkerId],
    ) -> (WorkerId, CacheStatus, usize) {
        let (candidates, match_length) = self.cache_map.longest_prefix_candidates(sequence);
        let live_set: HashSet<&WorkerId> = live_ids.iter().collect();
        let live_candidates: Vec<WorkerId> = candidates
            .into_iter()
            .filter(|w| live_set.contains(w))
            .collect();

        if match_length > 0 && !live_candidates.is_empty() {
            let worker_id = self.pick_least_loaded(&live_candidates);
            (worker_id, CacheStatus::Hit, match_length)
        } else {
            // MISS falls through to LEAST_LOADED semantics.
            let worker_id = self.pick_least_loaded(live_ids);
            (worker_id, CacheStatus::Miss, 0)
        }
    }

    /// Minimum-load selection with deterministic rotation among ties.
    fn pick_least_loaded(&self, candidates: &[WorkerId]) -> WorkerId {
        debug_assert!(!candidates.is_empty());
        let mut min_load = f64::INFINITY;
        for id in candidates {
            if let Some(load) = self.worker_table.load_of(id) {
                if load < min_load {
                    min_load = load;
                }
            }
        }

        let mut tied: Vec<&WorkerId> = candidates
            .iter()
            .filter(|id| self.worker_table.load_of(id).unwrap_or(f64::INFINITY) == min_load)
            .collect();
        // Stable, deterministic order for the tie class so the rotation
        // pointer's meaning doesn't depend on incoming iteration order.
        tied.sort();

        let idx = self.tie_break_counter.fetch_add(1, Ordering::Relaxed) % tied.len();
        tied[idx].clone()
    }
}
