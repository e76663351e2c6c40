//! Request tracing middleware
//!
//! Tags every RPC with a request id (taken from `X-Request-ID` when the
//! caller sent one) and records its outcome in an `rpc` span under the
//! node's span. The id is echoed back in the response headers.

use axum::{
    body::Body,
    extract::State,
    http::{HeaderValue, Request, Response},
    middleware::Next,
};
use std::time::Instant;
use tracing::{debug, error, info, Instrument};
use uuid::Uuid;

/// Header name for request ID
pub const REQUEST_ID_HEADER: &str = "X-Request-ID";

/// Generate a new unique request ID
pub fn generate_request_id() -> String {
    Uuid::new_v4().to_string()
}

fn request_id_of(request: &Request<Body>) -> String {
    request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(generate_request_id)
}

pub async fn request_tracing_middleware(
    State(parent): State<tracing::Span>,
    request: Request<Body>,
    next: Next,
) -> Response<Body> {
    let start = Instant::now();
    let request_id = request_id_of(&request);
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let span = tracing::info_span!(
        parent: &parent,
        "rpc",
        request_id = %request_id,
        method = %method,
        path = %path,
    );

    let mut response = next.run(request).instrument(span.clone()).await;

    let duration = start.elapsed();
    let status = response.status();

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    let status_code = status.as_u16();
    let duration_ms = duration.as_millis() as u64;
    if status.is_server_error() {
        error!(parent: &span, status = status_code, duration_ms, "RPC failed");
    } else if status.is_client_error() {
        debug!(parent: &span, status = status_code, duration_ms, "RPC refused");
    } else {
        info!(parent: &span, status = status_code, duration_ms, "RPC completed");
    }

    response
}
