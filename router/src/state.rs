use std::{sync::Arc, time::Duration};

use kv_route_cache_map::{Dispatcher, GlobalCacheMap, WorkerTable};

#[derive(Clone)]
pub struct AppState {
    pub cache_map: Arc<GlobalCacheMap>,
    pub worker_table: Arc<WorkerTable>,
    pub dispatcher: Arc<Dispatcher>,
    pub http_client: reqwest::Client,
    pub dispatch_timeout: Duration,
    /// `true` forwards the request body to the chosen worker (proxy mode);
    /// `false` returns the routing decision only (simulation mode).
    pub proxy_mode: bool,
}
