use std::collections::{HashMap, HashSet};

use kv_route_protocol::{BlockHash, WorkerId};
use parking_lot::RwLock;

type NodeId = usize;
const ROOT: NodeId = 0;

#[derive(Debug, Default)]
struct TrieNode {
    parent: Option<NodeId>,
    /// The hash labeling the arc from `parent` into this node; `None` only
    /// for the root, which represents the empty prefix.
    via_hash: Option<BlockHash>,
    children: HashMap<BlockHash, NodeId>,
    /// Workers whose cached sequence reaches at least this node. By
    /// construction (every insertion walks from the root, adding the
    /// worker at each visited node) this is always a subset of the
    /// parent's worker set — so a plain lookup at the deepest reached node
    /// already *is* the intersection of workers caching that whole prefix.
    workers: HashSet<WorkerId>,
}

#[derive(Debug, Default)]
struct Arena {
    nodes: Vec<Option<TrieNode>>,
    free: Vec<NodeId>,
}

impl Arena {
    fn new() -> Self {
        Self {
            nodes: vec![Some(TrieNode::default())], // root
            free: Vec::new(),
        }
    }

    fn get(&self, id: NodeId) -> &TrieNode {
        self.nodes[id].as_ref().expect("dangling node id")
    }

    fn get_mut(&mut self, id: NodeId) -> &mut TrieNode {
        self.nodes[id].as_mut().expect("dangling node id")
    }

    fn alloc(&mut self, parent: NodeId, via_hash: BlockHash) -> NodeId {
        let node = TrieNode {
            parent: Some(parent),
            via_hash: Some(via_hash),
            children: HashMap::new(),
            workers: HashSet::new(),
        };
        if let Some(id) = self.free.pop() {
            self.nodes[id] = Some(node);
            id
        } else {
            self.nodes.push(Some(node));
            self.nodes.len() - 1
        }
    }

    fn free_node(&mut self, id: NodeId) {
        self.nodes[id] = None;
        self.free.push(id);
    }
}

/// Router-side many-worker view of which block sequences live where.
///
/// Supports longest-prefix lookup and stays consistent under
/// eviction reports and full-state sync by pruning trie nodes whose
/// worker set empties and which have no children.
#[derive(Debug)]
pub struct GlobalCacheMap {
    arena: RwLock<Arena>,
    /// `block_hash -> worker set`: every (hash, worker) pair appears here
    /// iff the worker is known to hold that hash. Used for the coherence
    /// invariant and for fast "does any worker hold this hash" checks.
    reverse_index: dashmap::DashMap<BlockHash, HashSet<WorkerId>>,
    /// Extra bookkeeping, not a first-class data structure in its own
    /// right: per worker, which node ids its own insertions touched for a
    /// given hash.
    /// This is what makes `remove_block` O(1) amortized instead of a full
    /// trie scan — a worker's own path set is small relative to the whole
    /// trie even though the same hash value can label unrelated nodes in
    /// other workers' branches.
    worker_node_index: dashmap::DashMap<WorkerId, HashMap<BlockHash, HashSet<NodeId>>>,
}

impl Default for GlobalCacheMap {
    fn default() -> Self {
        Self::new()
    }
}

impl GlobalCacheMap {
    pub fn new() -> Self {
        Self {
            arena: RwLock::new(Arena::new()),
            reverse_index: dashmap::DashMap::new(),
            worker_node_index: dashmap::DashMap::new(),
        }
    }

    /// Longest prefix of `sequence` with a non-empty worker set, and the
    /// worker set at that depth. `(empty set, 0)` if nothing matches.
    pub fn longest_prefix_candidates(&self, sequence: &[BlockHash]) -> (HashSet<WorkerId>, usize) {
        let arena = self.arena.read();
        let mut current = ROOT;
        let mut depth = 0;
        let mut best = HashSet::new();

        for hash in sequence {
            let Some(&child_id) = arena.get(current).children.get(hash) else {
                break;
            };
            let child = arena.get(child_id);
            if child.workers.is_empty() {
                break;
            }
            best = child.workers.clone();
            current = child_id;
            depth += 1;
        }

        (best, depth)
    }

    /// Insert or extend the path for `sequence`, adding `worker_id` to
    /// every node touched.
    pub fn add_block_sequence(&self, worker_id: &WorkerId, sequence: &[BlockHash]) {
        if sequence.is_empty() {
            return;
        }
        let mut arena = self.arena.write();
        let mut current = ROOT;
        let mut per_worker = self
            .worker_node_index
            .entry(worker_id.clone())
            .or_default();

        for hash in sequence {
            let child_id = match arena.get(current).children.get(hash) {
                Some(&id) => id,
                None => {
                    let id = arena.alloc(current, hash.clone());
                    arena.get_mut(current).children.insert(hash.clone(), id);
                    id
                }
            };

            let child = arena.get_mut(child_id);
            if child.workers.insert(worker_id.clone()) {
                self.reverse_index
                    .entry(hash.clone())
                    .or_default()
                    .insert(worker_id.clone());
                per_worker
                    .entry(hash.clone())
                    .or_default()
                    .insert(child_id);
            }
            current = child_id;
        }
    }

    /// Remove `worker_id` from every trie node labeled `hash` that this
    /// worker's own insertions touched, pruning nodes whose worker set
    /// empties and which have no children. No-op if the worker never held
    /// this hash.
    pub fn remove_block(&self, worker_id: &WorkerId, hash: &BlockHash) {
        let Some(mut per_worker) = self.worker_node_index.get_mut(worker_id) else {
            return;
        };
        let Some(node_ids) = per_worker.remove(hash) else {
            return;
        };
        drop(per_worker);

        let mut arena = self.arena.write();
        for node_id in node_ids {
            self.remove_worker_from_node(&mut arena, node_id, worker_id);
        }

        if let Some(mut workers) = self.reverse_index.get_mut(hash) {
            workers.remove(worker_id);
            if workers.is_empty() {
                drop(workers);
                self.reverse_index.remove(hash);
            }
        }
    }

    fn remove_worker_from_node(&self, arena: &mut Arena, node_id: NodeId, worker_id: &WorkerId) {
        let node = arena.get_mut(node_id);
        node.workers.remove(worker_id);
        if !node.workers.is_empty() || !node.children.is_empty() || node_id == ROOT {
            return;
        }

        // Leaf with no remaining interest: prune and recurse upward.
        let parent = node.parent;
        let via_hash = node.via_hash.clone();
        arena.free_node(node_id);

        if let (Some(parent_id), Some(hash)) = (parent, via_hash) {
            arena.get_mut(parent_id).children.remove(&hash);
            // Parent may now itself be prunable if it has no workers of
            // its own and no other children.
            let parent_node = arena.get(parent_id);
            if parent_node.workers.is_empty() && parent_node.children.is_empty() {
                // Re-run pruning on the parent using an empty-worker probe;
                // we don't know which worker emptied it last, but an empty
                // worker set with no children is prunable regardless.
                self.prune_if_dead(arena, parent_id);
            }
        }
    }

    fn prune_if_dead(&self, arena: &mut Arena, node_id: NodeId) {
        if node_id == ROOT {
            return;
        }
        let node = arena.get(node_id);
        if !node.workers.is_empty() || !node.children.is_empty() {
            return;
        }
        let parent = node.parent;
        let via_hash = node.via_hash.clone();
        arena.free_node(node_id);
        if let (Some(parent_id), Some(hash)) = (parent, via_hash) {
            arena.get_mut(parent_id).children.remove(&hash);
            self.prune_if_dead(arena, parent_id);
        }
    }

    /// Every hash this worker is currently known to hold (derived view,
    /// used by `sync_worker_state`).
    fn worker_hash_set(&self, worker_id: &WorkerId) -> HashSet<BlockHash> {
        self.worker_node_index
            .get(worker_id)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Replace the router's belief about `worker_id` with authoritative
    /// state reported by that worker (anti-entropy sync).
    ///
    /// When `sequences` is provided, full trie reconstruction is possible.
    /// When absent, fresh hashes are recorded as independent depth-1 paths
    /// from the root — a degraded set-membership fallback for when only a
    /// bare set is available.
    pub fn sync_worker_state(
        &self,
        worker_id: &WorkerId,
        authoritative_hashes: &HashSet<BlockHash>,
        sequences: Option<&[Vec<BlockHash>]>,
    ) {
        let before = self.worker_hash_set(worker_id);

        let stale: Vec<BlockHash> = before.difference(authoritative_hashes).cloned().collect();
        if !stale.is_empty() {
            tracing::debug!(worker_id = %worker_id, stale_count = stale.len(), "anti-entropy sync removing stale blocks");
        }
        for hash in stale {
            self.remove_block(worker_id, &hash);
        }

        match sequences {
            Some(sequences) => {
                for sequence in sequences {
                    self.add_block_sequence(worker_id, sequence);
                }
            }
            None => {
                let after = self.worker_hash_set(worker_id);
                let fresh: Vec<BlockHash> =
                    authoritative_hashes.difference(&after).cloned().collect();
                for hash in fresh {
                    self.add_block_sequence(worker_id, std::slice::from_ref(&hash));
                }
            }
        }
    }

    /// Snapshot of the reverse index, for testing the coherence invariant.
    #[cfg(test)]
    fn reverse_index_workers(&self, hash: &BlockHash) -> HashSet<WorkerId> {
        self.reverse_index
            .get(hash)
            .map(|w| w.clone())
            .unwrap_or_default()
    }
}
