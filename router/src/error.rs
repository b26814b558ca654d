use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
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

pub fn bad_request(code: impl Into<String>, message: impl Into<String>) -> Response {
    create_error(StatusCode::BAD_REQUEST, code, message)
}

pub fn request_too_large(code: impl Into<String>, message: impl Into<String>) -> Response {
    create_error(StatusCode::PAYLOAD_TOO_LARGE, code, message)
}

pub fn service_unavailable(code: impl Into<String>, message: impl Into<String>) -> Response {
    create_error(StatusCode::SERVICE_UNAVAILABLE, code, message)
}

pub fn bad_gateway(code: impl Into<String>, message: impl Into<String>) -> Response {
    create_error(StatusCode::BAD_GATEWAY, code, message)
}

pub fn gateway_timeout(code: impl Into<String>, message: impl Into<String>) -> Response {
    create_error(StatusCode::GATEWAY_TIMEOUT, code, message)
}

pub fn internal_error(code: impl Into<String>, message: impl Into<String>) -> Response {
    create_error(StatusCode::INTERNAL_SERVER_ERROR, code, message)
}

fn create_error(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Response {
    let code_str = code.into();
    let message_str = message.into();
    (
        status,
        Json(ErrorResponse {
            error: ErrorDetail {
                error_type: status.canonical_reason().unwrap_or("Unknown Status Code"),
                code: &code_str,
                message: &message_str,
            },
        }),
    )
        .into_response()
}

/// Maps a [`kv_route_cache_map::DispatchError`] onto the router's HTTP error
/// surface.
pub fn from_dispatch_error(err: kv_route_cache_map::DispatchError) -> Response {
    match err {
        kv_route_cache_map::DispatchError::NoWorkersAvailable => service_unavailable(
            "no_workers_available",
            "no live workers are registered with the router",
        ),
    }
}
