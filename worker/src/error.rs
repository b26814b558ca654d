use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use kv_route_worker_cache::BlockCacheError;
use serde::Serialize;

#[derive(Serialize)]
struct ErrorResponse<'a> {
    error: ErrorDetail<'a>,
}

#[derive(Serialize)]
struct ErrorDetail<'a> {
    #[serde(rename = "type")]
    error_type: &'static str,
    code: &'a str,
    message: &'a str,
}

fn create_error(status: StatusCode, code: &str, message: impl Into<String>) -> Response {
    let message_str = message.into();
    (
        status,
        Json(ErrorResponse {
            error: ErrorDetail {
                error_type: status.canonical_reason().unwrap_or("Unknown Status Code"),
                code,
                message: &message_str,
            },
        }),
    )
        .into_response()
}

pub fn bad_request(code: &str, message: impl Into<String>) -> Response {
    create_error(StatusCode::BAD_REQUEST, code, message)
}

pub fn from_block_cache_error(err: BlockCacheError) -> Response {
    match err {
        BlockCacheError::RequestTooLarge { .. } => {
            create_error(StatusCode::PAYLOAD_TOO_LARGE, "request_too_large", err.to_string())
        }
        BlockCacheError::NoEvictableBlock => {
            // Invariant violation: every resident block is pinned and the
            // cache has nothing left to evict. The caller sees 503; the
            // worker marks itself unhealthy so the router stops routing to
            // it rather than retrying the same failure.
            create_error(StatusCode::SERVICE_UNAVAILABLE, "invariant_violation", err.to_string())
        }
    }
}
