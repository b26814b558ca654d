//! Wire types and deterministic block hashing shared between the router and
//! worker binaries.
//!
//! Tokenization itself is a black box to this crate: callers hand us an
//! already-tokenized prompt and we are responsible only for splitting it
//! into fixed-size blocks and digesting each block into a stable, opaque
//! [`BlockHash`].

mod hashing;
mod messages;
mod strategy;

pub use hashing::{hash_prompt, BlockHashError, DEFAULT_BLOCK_SIZE};
pub use messages::{
    CompletionRequest, CompletionResponse, EvictMessage, HeartbeatMessage, OkResponse,
    SyncMessage,
};
pub use strategy::{CacheStatus, RoutingStrategy};

/// Opaque, byte-stable digest identifying a block's token content.
///
/// Uniform length, hex-encoded, directly usable as a map key and safe to
/// serialize across the router/worker HTTP boundary.
pub type BlockHash = String;

/// Stable identifier for a worker process. Workers choose their own id at
/// startup (e.g. from configuration); the router never invents one.
pub type WorkerId = String;
