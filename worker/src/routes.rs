use std::time::Duration;

use axum::{
    extract::State,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use kv_route_protocol::{hash_prompt, CompletionRequest, OkResponse, DEFAULT_BLOCK_SIZE};
use kv_route_worker_cache::BlockCacheError;
use serde_json::json;

use crate::{error, state::WorkerState};

pub fn build(state: WorkerState) -> Router {
    Router::new()
        .route("/internal/admit", post(admit))
        .route("/internal/health", get(health))
        .route("/healthz", get(healthz))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn health(State(state): State<WorkerState>) -> Json<serde_json::Value> {
    let stats = state.scheduler.stats().await;
    let load = state.scheduler.current_load_ms().await;
    Json(json!({
        "worker_id": state.worker_id,
        "healthy": state.is_healthy(),
        "current_load_ms": load,
        "resident_blocks": stats.resident,
        "evictable_blocks": stats.evictable,
        "capacity": stats.capacity,
    }))
}

async fn admit(
    State(state): State<WorkerState>,
    Json(request): Json<CompletionRequest>,
) -> Response {
    let (block_hashes, _total_tokens) = match hash_prompt(&request.prompt_tokens, DEFAULT_BLOCK_SIZE) {
        Ok(hashed) => hashed,
        Err(err) => return error::bad_request("invalid_prompt", err.to_string()),
    };

    let request_id = uuid::Uuid::new_v4().to_string();
    match state
        .scheduler
        .admit(request_id.clone(), block_hashes, request.max_tokens)
        .await
    {
        Ok(task) => {
            let scheduler = state.scheduler.clone();
            let latency = Duration::from_millis(task.total_latency_ms.round() as u64);
            // No real inference engine: simulate the request's lifetime and
            // release its blocks back to the evictable pool on completion.
            tokio::spawn(async move {
                tokio::time::sleep(latency).await;
                scheduler.complete(request_id).await;
            });
            Json(OkResponse::default()).into_response()
        }
        Err(err) => {
            if matches!(err, BlockCacheError::NoEvictableBlock) {
                tracing::error!(worker_id = %state.worker_id, "invariant violation: no evictable block available");
                state.mark_unhealthy();
            }
            error::from_block_cache_error(err)
        }
    }
}
