use std::collections::HashMap;

use kv_route_protocol::BlockHash;

use crate::{BlockCache, BlockCacheError};

/// Latency-model constants. Defaults match the reference configuration;
/// these are tunable knobs, not invariants.
#[derive(Debug, Clone, Copy)]
pub struct LatencyConfig {
    pub prefill_base_ms: f64,
    pub prefill_per_block_ms: f64,
    pub decode_per_token_ms: f64,
    pub block_size: usize,
}

impl Default for LatencyConfig {
    fn default() -> Self {
        Self {
            prefill_base_ms: 5.0,
            prefill_per_block_ms: 2.5,
            decode_per_token_ms: 15.0,
            block_size: kv_route_protocol::DEFAULT_BLOCK_SIZE,
        }
    }
}

/// A pending or in-flight request on a worker.
#[derive(Debug, Clone)]
pub struct Task {
    pub request_id: String,
    /// Every block hash this task holds a refcount on, including the
    /// original prefix sequence and any synthetic blocks produced by
    /// decode-time cache growth (see [`Scheduler::admit`]).
    pub block_hashes: Vec<BlockHash>,
    pub num_cached_at_ingress: usize,
    pub decode_tokens: u32,
    pub total_latency_ms: f64,
}

/// Single-owner admission controller for one worker's [`BlockCache`].
///
/// Not `Send`-shared: the `worker` binary wraps one `Scheduler` behind an
/// actor task reading from an `mpsc` channel, so admission, completion, and
/// load queries are totally ordered by construction rather than by a lock.
#[derive(Debug)]
pub struct Scheduler {
    cache: BlockCache,
    config: LatencyConfig,
    active: HashMap<String, Task>,
}

impl Scheduler {
    pub fn new(capacity: usize, config: LatencyConfig) -> Self {
        Self {
            cache: BlockCache::new(capacity),
            config,
            active: HashMap::new(),
        }
    }

    /// Admit one task: allocate its prefix, compute the piecewise
    /// prefill+decode latency, and charge any decode-time cache-miss
    /// extension at the prefill per-block rate, rather than treating a
    /// decode-time cache miss as an error path.
    pub fn admit(
        &mut self,
        request_id: String,
        sequence: Vec<BlockHash>,
        decode_tokens: u32,
    ) -> Result<&Task, BlockCacheError> {
        let (num_cached_prefix, _) = self.cache.allocate(&sequence)?;
        let blocks_to_compute = sequence.len().saturating_sub(num_cached_prefix);
        let prefill_ms =
            self.config.prefill_base_ms + blocks_to_compute as f64 * self.config.prefill_per_block_ms;

        // Decode-time cache growth: every full block of generated tokens
        // extends the resident sequence and is recomputed like prefill.
        let decode_block_count = decode_tokens as usize / self.config.block_size;
        let decode_blocks: Vec<BlockHash> = (0..decode_block_count)
            .map(|i| synthetic_decode_block_hash(&request_id, i))
            .collect();
        self.cache.allocate(&decode_blocks)?;
        let decode_extension_ms = decode_block_count as f64 * self.config.prefill_per_block_ms;

        let decode_ms = decode_tokens as f64 * self.config.decode_per_token_ms;
        let total_latency_ms = prefill_ms + decode_extension_ms + decode_ms;

        let mut held_blocks = sequence;
        held_blocks.extend(decode_blocks);

        let task = Task {
            request_id: request_id.clone(),
            block_hashes: held_blocks,
            num_cached_at_ingress: num_cached_prefix,
            decode_tokens,
            total_latency_ms,
        };
        self.active.insert(request_id.clone(), task);
        Ok(self.active.get(&request_id).expect("just inserted"))
    }

    /// Release a completed task's blocks back to the evictable pool.
    pub fn complete(&mut self, request_id: &str) -> Option<Task> {
        let task = self.active.remove(request_id)?;
        self.cache.release(&task.block_hashes);
        Some(task)
    }

    /// Sum of remaining estimated latency over active tasks, in
    /// milliseconds — the load figure reported in heartbeats. Each
    /// task contributes its full latency until it completes and is
    /// removed, so this can only decrease between admissions as tasks
    /// finish, never increase on its own.
    pub fn current_load_ms(&self) -> f64 {
        self.active.values().map(|t| t.total_latency_ms).sum()
    }

    pub fn active_task_count(&self) -> usize {
        self.active.len()
    }

    pub fn stats(&self) -> crate::BlockStats {
        self.cache.stats()
    }

    /// Drain pending eviction events for the push-based report path.
    pub fn take_evictions(&mut self) -> Vec<BlockHash> {
        self.cache.take_evictions()
    }

    /// Every hash currently resident, for the periodic anti-entropy sync.
    pub fn resident_hashes(&self) -> Vec<BlockHash> {
        // cache doesn't expose iteration directly to keep BlockCache's
        // surface small; Scheduler is the only caller that needs it.
        self.cache.resident_hashes()
    }
}

fn synthetic_decode_block_hash(request_id: &str, block_index: usize) -> BlockHash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(request_id.as_bytes());
    hasher.update(&block_index.to_le_bytes());
    hasher.finalize().to_hex().to_string()
}
