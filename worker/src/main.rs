use clap::Parser;
use kv_route_worker::{
    actor::SchedulerHandle,
    background,
    config::{LogFormat, WorkerConfig},
    routes,
    state::WorkerState,
};
use kv_route_worker_cache::LatencyConfig;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = WorkerConfig::parse();
    init_tracing(config.log_format);

    let scheduler = SchedulerHandle::spawn(config.cache_capacity, LatencyConfig::default());
    let state = WorkerState::new(config.worker_id.clone(), scheduler);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let http_client = reqwest::Client::new();
    let heartbeat_handle = tokio::spawn(background::heartbeat_loop(
        state.clone(),
        http_client.clone(),
        config.router_url.clone(),
        config.advertised_url(),
        config.heartbeat_interval(),
        shutdown_rx.clone(),
    ));
    let eviction_handle = tokio::spawn(background::eviction_loop(
        state.clone(),
        http_client.clone(),
        config.router_url.clone(),
        config.heartbeat_interval(),
        shutdown_rx.clone(),
    ));
    let sync_handle = tokio::spawn(background::sync_loop(
        state.clone(),
        http_client,
        config.router_url.clone(),
        config.sync_interval(),
        shutdown_rx,
    ));

    let app = routes::build(state);
    let listener = tokio::net::TcpListener::bind(&config.listen).await?;
    tracing::info!(listen = %config.listen, worker_id = %config.worker_id, router_url = %config.router_url, "worker listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    for handle in [heartbeat_handle, eviction_handle, sync_handle] {
        if let Err(err) = handle.await {
            tracing::warn!(error = %err, "background task panicked during shutdown");
        }
    }

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
