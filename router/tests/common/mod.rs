use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{routing::post, Json, Router as AxumRouter};
use kv_route_cache_map::{Dispatcher, DispatcherConfig, GlobalCacheMap, WorkerTable};
use kv_route_protocol::{OkResponse, RoutingStrategy};
use kv_route_router::{routes, state::AppState};

/// Starts a bare-bones mock worker that accepts any `/internal/admit` body
/// and acknowledges it, for exercising the router's forward-to-worker path
/// without a real inference backend.
pub async fn spawn_mock_worker() -> SocketAddr {
    let app = AxumRouter::new().route("/internal/admit", post(|| async { Json(OkResponse::default()) }));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// A mock worker whose `/internal/admit` always rejects with 413, as a real
/// worker does when a prompt needs more blocks than its cache capacity.
pub async fn spawn_capacity_exceeded_worker() -> SocketAddr {
    let app = AxumRouter::new().route(
        "/internal/admit",
        post(|| async {
            (
                axum::http::StatusCode::PAYLOAD_TOO_LARGE,
                Json(serde_json::json!({
                    "error": {"type": "Payload Too Large", "code": "request_too_large", "message": "too big"}
                })),
            )
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

pub struct Harness {
    pub app: AxumRouter,
    pub cache_map: Arc<GlobalCacheMap>,
    pub worker_table: Arc<WorkerTable>,
}

pub fn build_harness(strategy: RoutingStrategy, proxy_mode: bool) -> Harness {
    let cache_map = Arc::new(GlobalCacheMap::new());
    let worker_table = Arc::new(WorkerTable::new(Duration::from_secs(5)));
    let dispatcher = Arc::new(Dispatcher::new(
        cache_map.clone(),
        worker_table.clone(),
        DispatcherConfig {
            strategy,
            speculative_load_addend_ms: 50.0,
        },
    ));
    let state = AppState {
        cache_map: cache_map.clone(),
        worker_table: worker_table.clone(),
        dispatcher,
        http_client: reqwest::Client::new(),
        dispatch_timeout: Duration::from_secs(5),
        proxy_mode,
    };
    Harness {
        app: routes::build(state),
        cache_map,
        worker_table,
    }
}

pub async fn register_worker(worker_table: &WorkerTable, worker_id: &str, addr: SocketAddr) {
    worker_table.heartbeat(
        &worker_id.to_string(),
        0.0,
        Some(format!("http://{addr}")),
        1,
    );
}
