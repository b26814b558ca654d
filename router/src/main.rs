use std::sync::Arc;

use clap::Parser;
use kv_route_cache_map::{Dispatcher, DispatcherConfig, GlobalCacheMap, WorkerTable};
use kv_route_router::{
    config::{LogFormat, RouterConfig},
    reaper, routes,
    state::AppState,
};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = RouterConfig::parse();
    init_tracing(config.log_format);

    let cache_map = Arc::new(GlobalCacheMap::new());
    let worker_table = Arc::new(WorkerTable::new(config.staleness_window()));
    let dispatcher = Arc::new(Dispatcher::new(
        cache_map.clone(),
        worker_table.clone(),
        DispatcherConfig {
            strategy: config.strategy,
            speculative_load_addend_ms: config.speculative_load_addend_ms,
        },
    ));

    let state = AppState {
        cache_map,
        worker_table: worker_table.clone(),
        dispatcher,
        http_client: reqwest::Client::new(),
        dispatch_timeout: config.dispatch_timeout(),
        proxy_mode: config.proxy_mode,
    };

    tokio::spawn(reaper::run(
        worker_table,
        config.reaper_interval(),
        config.staleness_window(),
    ));

    let app = routes::build(state);
    let listener = tokio::net::TcpListener::bind(&config.listen).await?;
    tracing::info!(listen = %config.listen, strategy = ?config.strategy, "router listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .init();
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
