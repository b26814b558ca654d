use std::time::Duration;

use clap::Parser;

/// Worker process configuration. Every knob can be set as a flag or as the
/// matching environment variable.
#[derive(Parser, Debug, Clone)]
#[command(name = "worker", about = "Per-worker KV block cache and scheduler")]
pub struct WorkerConfig {
    /// Stable identifier this worker reports to the router. The router
    /// never invents one; it must be supplied here.
    #[arg(long, env = "WORKER_ID")]
    pub worker_id: String,

    /// Address to bind this worker's own HTTP listener on.
    #[arg(long, env = "WORKER_LISTEN", default_value = "0.0.0.0:9000")]
    pub listen: String,

    /// Address at which the router can reach this worker, reported in
    /// heartbeats and sync messages. Defaults to `http://<listen>` when
    /// `listen` is routable as-is; set explicitly behind NAT/containers.
    #[arg(long, env = "WORKER_ADVERTISE_URL")]
    pub advertise_url: Option<String>,

    /// Base URL of the router to report to.
    #[arg(long, env = "WORKER_ROUTER_URL")]
    pub router_url: String,

    /// Number of fixed-size blocks this worker's cache can hold.
    #[arg(long, env = "WORKER_CACHE_CAPACITY", default_value_t = 10_000)]
    pub cache_capacity: usize,

    /// How often to send a heartbeat to the router, in milliseconds.
    #[arg(long, env = "WORKER_HEARTBEAT_INTERVAL_MS", default_value_t = 1_000)]
    pub heartbeat_interval_ms: u64,

    /// How often to send a full-state anti-entropy sync to the router, in
    /// milliseconds.
    #[arg(long, env = "WORKER_SYNC_INTERVAL_MS", default_value_t = 5_000)]
    pub sync_interval_ms: u64,

    /// Log format: "pretty" for local development, "json" for production
    /// log pipelines.
    #[arg(long, env = "WORKER_LOG_FORMAT", default_value = "pretty")]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl WorkerConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_millis(self.sync_interval_ms)
    }

    pub fn advertised_url(&self) -> String {
        self.advertise_url
            .clone()
            .unwrap_or_else(|| format!("http://{}", self.listen))
    }
}
