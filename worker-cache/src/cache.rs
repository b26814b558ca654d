use std::{cmp::Reverse, collections::BinaryHeap, collections::HashMap};

use kv_route_protocol::BlockHash;

/// The atomic cache unit.
#[derive(Debug, Clone)]
struct Block {
    ref_count: u32,
    evictable: bool,
    last_used: u64,
    sequence_index: u64,
}

/// A block's position in the eviction priority queue at the time it was
/// pushed. Ordering is `(last_used ascending, sequence_index descending,
/// block_hash ascending)`.
///
/// `Ord` is derived field-order, so `sequence_index` is wrapped in
/// [`Reverse`] to flip its comparison (we want the *larger* sequence index
/// to sort as the *smaller* key, so it's popped first among ties).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct EvictionKey {
    last_used: u64,
    sequence_index: Reverse<u64>,
    block_hash: BlockHash,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BlockCacheError {
    #[error("request needs {requested} blocks but capacity is only {capacity}")]
    RequestTooLarge { requested: usize, capacity: usize },
    #[error("invariant violation: no evictable block available to satisfy allocation")]
    NoEvictableBlock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockStats {
    pub resident: usize,
    pub evictable: usize,
    pub capacity: usize,
}

/// Fixed-capacity KV block cache for a single worker.
#[derive(Debug)]
pub struct BlockCache {
    capacity: usize,
    blocks: HashMap<BlockHash, Block>,
    /// Lazily-cleaned min-priority queue: entries may go stale (a block was
    /// re-acquired after being pushed) and are validated on pop rather than
    /// removed eagerly, to avoid a linear scan of the heap on every release.
    evictable_queue: BinaryHeap<Reverse<EvictionKey>>,
    clock: u64,
    next_sequence_index: u64,
    pending_evictions: Vec<BlockHash>,
}

impl BlockCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            blocks: HashMap::new(),
            evictable_queue: BinaryHeap::new(),
            clock: 0,
            next_sequence_index: 0,
            pending_evictions: Vec::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> BlockStats {
        let evictable = self.blocks.values().filter(|b| b.evictable).count();
        BlockStats {
            resident: self.blocks.len(),
            evictable,
            capacity: self.capacity,
        }
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// For each hash in `sequence`, in order: bump its refcount if present,
    /// otherwise insert it (evicting if at capacity). Returns
    /// `(num_cached_prefix, num_newly_allocated)`.
    ///
    /// `num_cached_prefix` only counts a *contiguous* leading run of
    /// already-resident blocks: once a miss is hit, later incidental
    /// matches (from an unrelated sequence) don't count as cached prefix,
    /// matching the KV-cache semantics where a miss forces recomputation of
    /// everything after it regardless of what happens to be resident.
    pub fn allocate(
        &mut self,
        sequence: &[BlockHash],
    ) -> Result<(usize, usize), BlockCacheError> {
        if sequence.len() > self.capacity {
            return Err(BlockCacheError::RequestTooLarge {
                requested: sequence.len(),
                capacity: self.capacity,
            });
        }

        let mut num_cached_prefix = 0;
        let mut still_prefix = true;
        let mut num_newly_allocated = 0;

        for hash in sequence {
            let now = self.tick();
            let already_resident = self.blocks.contains_key(hash);

            if still_prefix {
                if already_resident {
                    num_cached_prefix += 1;
                } else {
                    still_prefix = false;
                }
            }

            if let Some(block) = self.blocks.get_mut(hash) {
                if block.ref_count == 0 {
                    block.evictable = false;
                }
                block.ref_count += 1;
                block.last_used = now;
            } else {
                if self.blocks.len() >= self.capacity {
                    self.evict_one()?;
                }
                let sequence_index = self.next_sequence_index;
                self.next_sequence_index += 1;
                self.blocks.insert(
                    hash.clone(),
                    Block {
                        ref_count: 1,
                        evictable: false,
                        last_used: now,
                        sequence_index,
                    },
                );
                num_newly_allocated += 1;
            }
        }

        Ok((num_cached_prefix, num_newly_allocated))
    }

    /// Decrement refcounts; blocks reaching zero become evictable.
    pub fn release(&mut self, sequence: &[BlockHash]) {
        for hash in sequence {
            let now = self.tick();
            let Some(block) = self.blocks.get_mut(hash) else {
                continue;
            };
            if block.ref_count == 0 {
                tracing::warn!(block_hash = %hash, "release called on a block with ref_count already 0");
                continue;
            }
            block.ref_count -= 1;
            if block.ref_count == 0 {
                block.evictable = true;
                block.last_used = now;
                self.evictable_queue.push(Reverse(EvictionKey {
                    last_used: block.last_used,
                    sequence_index: Reverse(block.sequence_index),
                    block_hash: hash.clone(),
                }));
            }
        }
    }

    /// Pop the head of the eviction queue, discarding stale entries
    /// (re-acquired since being queued) until a live evictable block is
    /// found. Removes it from `blocks` and records it for the next
    /// eviction-report drain.
    fn evict_one(&mut self) -> Result<(), BlockCacheError> {
        loop {
            let Reverse(candidate) = self
                .evictable_queue
                .pop()
                .ok_or(BlockCacheError::NoEvictableBlock)?;

            let Some(block) = self.blocks.get(&candidate.block_hash) else {
                continue; // already evicted via another path; stale entry
            };
            if !block.evictable || block.last_used != candidate.last_used {
                continue; // re-acquired since this entry was queued; stale
            }

            self.blocks.remove(&candidate.block_hash);
            self.pending_evictions.push(candidate.block_hash);
            return Ok(());
        }
    }

    /// Drain block hashes evicted since the last call, for the worker's
    /// push-based eviction report.
    pub fn take_evictions(&mut self) -> Vec<BlockHash> {
        std::mem::take(&mut self.pending_evictions)
    }

    pub fn contains(&self, hash: &BlockHash) -> bool {
        self.blocks.contains_key(hash)
    }

    /// Every hash currently resident, for full-state anti-entropy sync.
    pub fn resident_hashes(&self) -> Vec<BlockHash> {
        self.blocks.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hashes(labels: &[&str]) -> Vec<BlockHash> {
        labels.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn allocate_cold_then_release_returns_to_zero_refcount_same_membership() {
        let mut cache = BlockCache::new(4);
        let seq = hashes(&["a", "b"]);
        let (prefix, new) = cache.allocate(&seq).unwrap();
        assert_eq!((prefix, new), (0, 2));
        assert_eq!(cache.stats().resident, 2);

        cache.release(&seq);
        assert_eq!(cache.stats().resident, 2); // membership unchanged
        assert_eq!(cache.stats().evictable, 2); // but now evictable
    }

    #[test]
    fn repeated_allocate_increments_prefix_and_skips_reinsertion() {
        let mut cache = BlockCache::new(4);
        let seq = hashes(&["a", "b"]);
        cache.allocate(&seq).unwrap();
        cache.release(&seq);

        let (prefix, new) = cache.allocate(&seq).unwrap();
        assert_eq!((prefix, new), (2, 0));
    }

    #[test]
    fn request_larger_than_capacity_is_rejected() {
        let mut cache = BlockCache::new(2);
        let seq = hashes(&["a", "b", "c"]);
        assert_eq!(
            cache.allocate(&seq),
            Err(BlockCacheError::RequestTooLarge {
                requested: 3,
                capacity: 2
            })
        );
    }

    #[test]
    fn eviction_prefers_oldest_last_used() {
        let mut cache = BlockCache::new(2);
        cache.allocate(&hashes(&["a"])).unwrap();
        cache.allocate(&hashes(&["b"])).unwrap();
        cache.release(&hashes(&["a", "b"]));

        // "a" was released (and thus touched) before "b", so it is older.
        cache.allocate(&hashes(&["c"])).unwrap();
        assert!(!cache.contains(&"a".to_string()));
        assert!(cache.contains(&"b".to_string()));
        assert!(cache.contains(&"c".to_string()));
    }

    #[test]
    fn eviction_tie_break_prefers_larger_sequence_index() {
        let mut cache = BlockCache::new(2);
        // Both inserted in the same allocate call, so they release with the
        // same `last_used` tick; "b" has the larger sequence_index.
        cache.allocate(&hashes(&["a", "b"])).unwrap();
        cache.release(&hashes(&["a", "b"]));

        cache.allocate(&hashes(&["c"])).unwrap();
        assert!(cache.contains(&"a".to_string()));
        assert!(!cache.contains(&"b".to_string()));
    }

    #[test]
    fn never_evicts_a_block_with_live_refcount() {
        let mut cache = BlockCache::new(1);
        cache.allocate(&hashes(&["a"])).unwrap(); // ref_count = 1, held
        let err = cache.allocate(&hashes(&["b"])).unwrap_err();
        assert_eq!(err, BlockCacheError::NoEvictableBlock);
    }

    #[test]
    fn stale_heap_entry_is_discarded_on_pop() {
        let mut cache = BlockCache::new(2);
        cache.allocate(&hashes(&["a", "b"])).unwrap();
        cache.release(&hashes(&["a", "b"]));
        // Re-acquire "a" — its old heap entry (same block, old last_used)
        // becomes stale once last_used changes on reuse, then release again
        // with a fresh timestamp so two heap entries exist for "a".
        cache.allocate(&hashes(&["a"])).unwrap();
        cache.release(&hashes(&["a"]));

        cache.allocate(&hashes(&["c"])).unwrap();
        // "b" is strictly older than the re-queued "a", so it evicts first.
        assert!(!cache.contains(&"b".to_string()));
        assert!(cache.contains(&"a".to_string()));
    }

    #[test]
    fn eviction_emits_event_drained_once() {
        let mut cache = BlockCache::new(1);
        cache.allocate(&hashes(&["a"])).unwrap();
        cache.release(&hashes(&["a"]));
        cache.allocate(&hashes(&["b"])).unwrap();

        let evicted = cache.take_evictions();
        assert_eq!(evicted, hashes(&["a"]));
        assert!(cache.take_evictions().is_empty());
    }
}
