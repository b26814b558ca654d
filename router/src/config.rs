use std::time::Duration;

use clap::Parser;
use kv_route_protocol::RoutingStrategy;

/// Router process configuration. Every knob can be set as a flag or as the
/// matching environment variable.
#[derive(Parser, Debug, Clone)]
#[command(name = "router", about = "Cache-aware inference request router")]
pub struct RouterConfig {
    /// Address to bind the HTTP listener on.
    #[arg(long, env = "ROUTER_LISTEN", default_value = "0.0.0.0:8000")]
    pub listen: String,

    /// Dispatch strategy.
    #[arg(long, env = "ROUTER_STRATEGY", default_value = "cache_aware")]
    pub strategy: RoutingStrategy,

    /// Proxy mode: forward the request body to the chosen worker and return
    /// its response. When `false` (simulation mode), the router returns the
    /// routing decision only and never contacts the worker.
    #[arg(long, env = "ROUTER_PROXY_MODE", default_value_t = false)]
    pub proxy_mode: bool,

    /// Speculative load inflation applied to a worker immediately after it
    /// is chosen, in milliseconds.
    #[arg(long, env = "ROUTER_SPECULATIVE_LOAD_ADDEND_MS", default_value_t = 50.0)]
    pub speculative_load_addend_ms: f64,

    /// A worker is considered live if a heartbeat arrived within this many
    /// milliseconds.
    #[arg(long, env = "ROUTER_STALENESS_WINDOW_MS", default_value_t = 3_000)]
    pub staleness_window_ms: u64,

    /// How often the background reaper checks for and evicts stale workers
    /// from the live set.
    #[arg(long, env = "ROUTER_REAPER_INTERVAL_MS", default_value_t = 1_000)]
    pub reaper_interval_ms: u64,

    /// Deadline for a single forward-to-worker call before the router
    /// gives up and returns a gateway timeout.
    #[arg(long, env = "ROUTER_DISPATCH_TIMEOUT_MS", default_value_t = 30_000)]
    pub dispatch_timeout_ms: u64,

    /// Log format: "pretty" for local development, "json" for production
    /// log pipelines.
    #[arg(long, env = "ROUTER_LOG_FORMAT", default_value = "pretty")]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl RouterConfig {
    pub fn staleness_window(&self) -> Duration {
        Duration::from_millis(self.staleness_window_ms)
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_millis(self.reaper_interval_ms)
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch_timeout_ms)
    }
}
