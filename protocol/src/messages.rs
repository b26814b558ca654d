use serde::{Deserialize, Serialize};

use crate::{BlockHash, CacheStatus, WorkerId};

/// `POST /v1/completions` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Already-tokenized prompt. Real tokenization is an external
    /// collaborator; this crate never sees raw prompt text.
    pub prompt_tokens: Vec<u32>,
    pub max_tokens: u32,
}

/// `POST /v1/completions` response body.
///
/// `status` is `"forwarded"` in proxy mode (the request body was sent on to
/// `assigned_worker` and `worker_response` carries its reply) or
/// `"simulated"` in simulation mode (the routing decision only; the worker
/// is never contacted).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub assigned_worker: WorkerId,
    pub status: String,
    pub block_hashes: Vec<BlockHash>,
    pub match_length: usize,
    pub cache_status: CacheStatus,
    /// The chosen worker's own response to the forwarded admit call.
    /// Present only when `status == "forwarded"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_response: Option<serde_json::Value>,
}

/// `POST /internal/heartbeat` body: `{worker_id, current_load, worker_url?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatMessage {
    pub worker_id: WorkerId,
    pub current_load_ms: f64,
    pub worker_url: Option<String>,
    /// Monotonically increasing per-worker sequence number so the router
    /// can discard a heartbeat that arrives out of order over HTTP.
    pub sequence: u64,
}

/// `POST /internal/evict` body: `{worker_id, block_hash}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvictMessage {
    pub worker_id: WorkerId,
    pub block_hash: BlockHash,
}

/// `POST /internal/sync` body: `{worker_id, cached_hashes, sequences?}`.
///
/// `sequences`, when present, lets the router fully reconstruct trie paths
/// (required for longest-prefix matching). When absent the router falls
/// back to reverse-index-only membership for the hashes in `cached_hashes`
/// — a degraded but acceptable fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncMessage {
    pub worker_id: WorkerId,
    pub cached_hashes: Vec<BlockHash>,
    pub sequences: Option<Vec<Vec<BlockHash>>>,
}

/// Uniform `{ok: true}` ack for the internal protocol endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OkResponse {
    pub ok: bool,
}

impl Default for OkResponse {
    fn default() -> Self {
        Self { ok: true }
    }
}
