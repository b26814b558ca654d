use serde::{Deserialize, Serialize};

/// Router dispatch strategy, selected at startup via configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
#[clap(rename_all = "snake_case")]
pub enum RoutingStrategy {
    /// Longest-prefix cache match; falls back to least-loaded on a miss.
    CacheAware,
    /// Monotonic counter modulo the live worker count.
    RoundRobin,
    /// Minimum current load, ties broken by rotation.
    LeastLoaded,
}

/// Whether the routed prompt's leading block(s) were already cached at the
/// chosen worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CacheStatus {
    Hit,
    Miss,
}
