//! Uniform JSON responses with CORS headers.
//!
//! Every handler builds its response through these helpers, including
//! rejections, so browsers and vendors always see the same headers.

use axum::{
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

pub const ALLOWED_METHODS: &str = "POST, OPTIONS";

pub const ALLOWED_HEADERS: &str = "authorization, content-type, svix-id, svix-timestamp, \
    svix-signature, webhook-id, webhook-timestamp, webhook-signature, x-vercel-signature, \
    x-activity-token";

/// CORS headers attached to every response.
pub fn cors_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOWED_METHODS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOWED_HEADERS),
    );
    headers
}

/// Serialize `body` as JSON with the given status.
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().extend(cors_headers());
    response
}

pub fn success_response<T: Serialize>(body: &T) -> Response {
    json_response(StatusCode::OK, body)
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    status: &'static str,
    error: &'a str,
}

/// `{"status":"error","error":message}` with the given status.
pub fn error_response(status: StatusCode, message: &str) -> Response {
    json_response(
        status,
        &ErrorBody {
            status: "error",
            error: message,
        },
    )
}

/// Empty 204 answer to a CORS preflight request.
pub fn preflight_response() -> Response {
    let mut response = StatusCode::NO_CONTENT.into_response();
    response.headers_mut().extend(cors_headers());
    response
}
