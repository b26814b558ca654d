//! Router-side state: the global cache map, the live-worker table feeding
//! the consistency protocol, and the dispatch strategies built on top of
//! both.

mod dispatch;
mod trie;
mod worker_table;

pub use dispatch::{DispatchError, DispatchOutcome, Dispatcher, DispatcherConfig};
pub use trie::GlobalCacheMap;
pub use worker_table::{WorkerSnapshot, WorkerTable};

pub use kv_route_protocol::RoutingStrategy;
