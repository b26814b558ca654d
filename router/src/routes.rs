use std::collections::HashSet;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use kv_route_protocol::{
    hash_prompt, CompletionRequest, CompletionResponse, EvictMessage, HeartbeatMessage,
    OkResponse, SyncMessage, DEFAULT_BLOCK_SIZE,
};

use crate::{error, state::AppState};

pub fn build(state: AppState) -> Router {
    Router::new()
        .route("/v1/completions", post(completions))
        .route("/internal/heartbeat", post(heartbeat))
        .route("/internal/evict", post(evict))
        .route("/internal/sync", post(sync))
        .route("/healthz", get(healthz))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn completions(
    State(state): State<AppState>,
    Json(request): Json<CompletionRequest>,
) -> Response {
    let (block_hashes, _total_tokens) = match hash_prompt(&request.prompt_tokens, DEFAULT_BLOCK_SIZE) {
        Ok(hashed) => hashed,
        Err(err) => return error::bad_request("invalid_prompt", err.to_string()),
    };

    let outcome = match state.dispatcher.dispatch(&block_hashes) {
        Ok(outcome) => outcome,
        Err(err) => return error::from_dispatch_error(err),
    };

    // Simulation mode: the routing decision is the whole answer. The
    // worker is never contacted.
    if !state.proxy_mode {
        return Json(CompletionResponse {
            assigned_worker: outcome.worker_id,
            status: "simulated".to_string(),
            block_hashes,
            match_length: outcome.match_length,
            cache_status: outcome.cache_status,
            worker_response: None,
        })
        .into_response();
    }

    // Proxy mode: forward the request body to the chosen worker and
    // return its response nested under `worker_response`.
    let Some(worker_url) = state
        .worker_table
        .live_workers()
        .into_iter()
        .find(|w| w.worker_id == outcome.worker_id)
        .and_then(|w| w.worker_url)
    else {
        return error::bad_gateway(
            "worker_unreachable",
            format!("worker {} has no known address", outcome.worker_id),
        );
    };

    let forward = state
        .http_client
        .post(format!("{worker_url}/internal/admit"))
        .json(&request)
        .timeout(state.dispatch_timeout)
        .send();

    let response = match tokio::time::timeout(state.dispatch_timeout, forward).await {
        Ok(Ok(response)) => response,
        Ok(Err(err)) => return error::bad_gateway("worker_unreachable", err.to_string()),
        Err(_) => {
            return error::gateway_timeout(
                "dispatch_deadline_exceeded",
                format!("worker {} did not respond in time", outcome.worker_id),
            )
        }
    };

    let worker_status = response.status();
    if worker_status == StatusCode::PAYLOAD_TOO_LARGE {
        return error::request_too_large(
            "request_too_large",
            format!(
                "worker {} rejected the request: prompt exceeds its cache capacity",
                outcome.worker_id
            ),
        );
    }
    if !worker_status.is_success() {
        return error::bad_gateway(
            "worker_rejected_request",
            format!("worker {} returned {}", outcome.worker_id, worker_status),
        );
    }

    let worker_response = response.json::<serde_json::Value>().await.ok();

    Json(CompletionResponse {
        assigned_worker: outcome.worker_id,
        status: "forwarded".to_string(),
        block_hashes,
        match_length: outcome.match_length,
        cache_status: outcome.cache_status,
        worker_response,
    })
    .into_response()
}

async fn heartbeat(
    State(state): State<AppState>,
    Json(message): Json<HeartbeatMessage>,
) -> Json<OkResponse> {
    state.worker_table.heartbeat(
        &message.worker_id,
        message.current_load_ms,
        message.worker_url,
        message.sequence,
    );
    Json(OkResponse::default())
}

async fn evict(State(state): State<AppState>, Json(message): Json<EvictMessage>) -> Json<OkResponse> {
    state.cache_map.remove_block(&message.worker_id, &message.block_hash);
    Json(OkResponse::default())
}

async fn sync(State(state): State<AppState>, Json(message): Json<SyncMessage>) -> Json<OkResponse> {
    let authoritative: HashSet<_> = message.cached_hashes.into_iter().collect();
    state.cache_map.sync_worker_state(
        &message.worker_id,
        &authoritative,
        message.sequences.as_deref(),
    );
    Json(OkResponse::default())
}
