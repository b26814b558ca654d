//! Per-worker KV block cache: allocation, reference counting, and
//! priority-queue eviction, plus the scheduler's prefill/decode latency
//! model.
//!
//! Both pieces are synchronous and single-threaded by design — the `worker`
//! binary crate wraps a [`BlockCache`]/[`Scheduler`] pair behind a single
//! actor task so that all mutation is structurally serialized, rather than
//! behind a mutex shared across request-handling tasks.

mod cache;
mod scheduler;

pub use cache::{BlockCache, BlockCacheError, BlockStats};
pub use scheduler::{LatencyConfig, Scheduler, Task};
