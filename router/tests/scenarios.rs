mod common;

use axum::{
    body::Body,
    http::{header::CONTENT_TYPE, Request, StatusCode},
};
use http_body_util::BodyExt;
use kv_route_protocol::{CacheStatus, CompletionResponse, RoutingStrategy};
use tower::ServiceExt;

fn completions_request(prompt_tokens: Vec<u32>, max_tokens: u32) -> Request<Body> {
    let body = serde_json::json!({
        "prompt_tokens": prompt_tokens,
        "max_tokens": max_tokens,
    });
    Request::builder()
        .method("POST")
        .uri("/v1/completions")
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

async fn completion_response(response: axum::response::Response) -> CompletionResponse {
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn miss_then_hit_same_prompt_sticks_to_chosen_worker() {
    let harness = common::build_harness(RoutingStrategy::CacheAware, true);
    let addr = common::spawn_mock_worker().await;
    common::register_worker(&harness.worker_table, "w1", addr).await;

    let tokens: Vec<u32> = (0..32).collect();

    let first = harness
        .app
        .clone()
        .oneshot(completions_request(tokens.clone(), 0))
        .await
        .unwrap();
    let first = completion_response(first).await;
    assert_eq!(first.cache_status, CacheStatus::Miss);
    assert_eq!(first.assigned_worker, "w1");

    let second = harness
        .app
        .clone()
        .oneshot(completions_request(tokens, 0))
        .await
        .unwrap();
    let second = completion_response(second).await;
    assert_eq!(second.cache_status, CacheStatus::Hit);
    assert_eq!(second.assigned_worker, "w1");
    assert_eq!(second.match_length, 2);
}

#[tokio::test]
async fn no_live_workers_returns_service_unavailable() {
    let harness = common::build_harness(RoutingStrategy::CacheAware, true);
    let tokens: Vec<u32> = (0..16).collect();

    let response = harness
        .app
        .oneshot(completions_request(tokens, 0))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn eviction_report_clears_router_belief_and_next_request_misses() {
    let harness = common::build_harness(RoutingStrategy::CacheAware, true);
    let addr = common::spawn_mock_worker().await;
    common::register_worker(&harness.worker_table, "w1", addr).await;

    let tokens: Vec<u32> = (0..16).collect();
    let first = harness
        .app
        .clone()
        .oneshot(completions_request(tokens.clone(), 0))
        .await
        .unwrap();
    let first = completion_response(first).await;
    assert_eq!(first.cache_status, CacheStatus::Miss);
    let hash = first.block_hashes[0].clone();

    // Worker reports the block evicted.
    let evict_body = serde_json::json!({"worker_id": "w1", "block_hash": hash});
    let evict_req = Request::builder()
        .method("POST")
        .uri("/internal/evict")
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(&evict_body).unwrap()))
        .unwrap();
    let evict_resp = harness.app.clone().oneshot(evict_req).await.unwrap();
    assert_eq!(evict_resp.status(), StatusCode::OK);

    let second = harness
        .app
        .oneshot(completions_request(tokens, 0))
        .await
        .unwrap();
    let second = completion_response(second).await;
    assert_eq!(second.cache_status, CacheStatus::Miss);
}

#[tokio::test]
async fn round_robin_distributes_across_three_workers() {
    let harness = common::build_harness(RoutingStrategy::RoundRobin, true);
    for id in ["w1", "w2", "w3"] {
        let addr = common::spawn_mock_worker().await;
        common::register_worker(&harness.worker_table, id, addr).await;
    }

    let mut counts = std::collections::HashMap::new();
    for _ in 0..9 {
        let tokens: Vec<u32> = (0..16).collect();
        let response = harness
            .app
            .clone()
            .oneshot(completions_request(tokens, 0))
            .await
            .unwrap();
        let response = completion_response(response).await;
        *counts.entry(response.assigned_worker).or_insert(0) += 1;
    }

    assert_eq!(counts.len(), 3);
    for count in counts.values() {
        assert_eq!(*count, 3);
    }
}

#[tokio::test]
async fn heartbeat_endpoint_registers_worker_for_dispatch() {
    let harness = common::build_harness(RoutingStrategy::LeastLoaded, true);
    let addr = common::spawn_mock_worker().await;

    let heartbeat_body = serde_json::json!({
        "worker_id": "w1",
        "current_load_ms": 0.0,
        "worker_url": format!("http://{addr}"),
        "sequence": 1,
    });
    let heartbeat_req = Request::builder()
        .method("POST")
        .uri("/internal/heartbeat")
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(&heartbeat_body).unwrap()))
        .unwrap();
    let heartbeat_resp = harness.app.clone().oneshot(heartbeat_req).await.unwrap();
    assert_eq!(heartbeat_resp.status(), StatusCode::OK);

    let tokens: Vec<u32> = (0..16).collect();
    let response = harness
        .app
        .oneshot(completions_request(tokens, 0))
        .await
        .unwrap();
    let response = completion_response(response).await;
    assert_eq!(response.assigned_worker, "w1");
}

#[tokio::test]
async fn simulation_mode_returns_decision_without_contacting_worker() {
    // No mock worker is spawned at all: if the router tried to contact it,
    // the forward would fail and this would come back as bad_gateway.
    let harness = common::build_harness(RoutingStrategy::CacheAware, false);
    harness
        .worker_table
        .heartbeat(&"w1".to_string(), 0.0, Some("http://127.0.0.1:1".to_string()), 1);

    let tokens: Vec<u32> = (0..16).collect();
    let response = harness
        .app
        .oneshot(completions_request(tokens, 0))
        .await
        .unwrap();
    let response = completion_response(response).await;
    assert_eq!(response.status, "simulated");
    assert_eq!(response.assigned_worker, "w1");
    assert!(response.worker_response.is_none());
}

#[tokio::test]
async fn proxy_mode_forwarded_response_carries_worker_reply() {
    let harness = common::build_harness(RoutingStrategy::CacheAware, true);
    let addr = common::spawn_mock_worker().await;
    common::register_worker(&harness.worker_table, "w1", addr).await;

    let tokens: Vec<u32> = (0..16).collect();
    let response = harness
        .app
        .oneshot(completions_request(tokens, 0))
        .await
        .unwrap();
    let response = completion_response(response).await;
    assert_eq!(response.status, "forwarded");
    assert_eq!(response.worker_response, Some(serde_json::json!({"ok": true})));
}

#[tokio::test]
async fn worker_capacity_exceeded_propagates_as_request_too_large() {
    let harness = common::build_harness(RoutingStrategy::CacheAware, true);
    let addr = common::spawn_capacity_exceeded_worker().await;
    common::register_worker(&harness.worker_table, "w1", addr).await;

    let tokens: Vec<u32> = (0..16).collect();
    let response = harness
        .app
        .oneshot(completions_request(tokens, 0))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn healthz_reports_ok() {
    let harness = common::build_harness(RoutingStrategy::CacheAware, true);
    let request = Request::builder()
        .uri("/healthz")
        .body(Body::empty())
        .unwrap();
    let response = harness.app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
