//! HTTP binding of the gateway
//!
//! Routes:
//! - `GET  /v1/kv/:key`               read
//! - `PUT  /v1/kv/:key`               write (master only)
//! - `POST /v1/replication/subscribe` register a replica (master only)
//! - `POST /v1/replication/apply`     replicated batch (replicas only)
//! - `GET  /health`                   node status

use super::Gateway;
use crate::common::tracing_middleware::request_tracing_middleware;
use crate::common::Error;
use crate::proto::{
    routes, ApplyBatchRequest, Empty, ErrorBody, GetResponse, HealthResponse, SetRequest,
    SubscribeRequest,
};
use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;

/// Upper bound for a request body (replicated batches included)
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// Error wrapper turning [`Error`] into a coded JSON response
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            code: self.0.code(),
            message: self.0.to_string(),
        };
        (self.0.to_http_status(), Json(body)).into_response()
    }
}

pub fn create_router(gateway: Arc<Gateway>, span: tracing::Span) -> Router {
    Router::new()
        .route(routes::KV, get(get_key).put(put_key))
        .route(routes::SUBSCRIBE, post(subscribe))
        .route(routes::APPLY, post(apply_batch))
        .route(routes::HEALTH, get(health))
        .with_state(gateway)
        .layer(axum::middleware::from_fn_with_state(
            span,
            request_tracing_middleware,
        ))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
}

async fn get_key(
    State(gateway): State<Arc<Gateway>>,
    Path(key): Path<String>,
) -> Result<Json<GetResponse>, ApiError> {
    let value = gateway.read(&key)?;
    Ok(Json(GetResponse { value }))
}

async fn put_key(
    State(gateway): State<Arc<Gateway>>,
    Path(key): Path<String>,
    Json(req): Json<SetRequest>,
) -> Result<Json<Empty>, ApiError> {
    gateway.write(&key, &req.value).await?;
    Ok(Json(Empty {}))
}

async fn subscribe(
    State(gateway): State<Arc<Gateway>>,
    Json(req): Json<SubscribeRequest>,
) -> Result<Json<Empty>, ApiError> {
    gateway
        .subscribe(&req.address, req.asynchronous, &req.credential)
        .await?;
    Ok(Json(Empty {}))
}

async fn apply_batch(
    State(gateway): State<Arc<Gateway>>,
    Json(req): Json<ApplyBatchRequest>,
) -> Result<Json<Empty>, ApiError> {
    gateway.apply_replicated_batch(&req.entries, &req.credential)?;
    Ok(Json(Empty {}))
}

async fn health(State(gateway): State<Arc<Gateway>>) -> Json<HealthResponse> {
    let replicas = gateway
        .coordinator()
        .list_replicas()
        .map(|r| r.len())
        .unwrap_or(0);
    Json(HealthResponse {
        status: "healthy".to_string(),
        role: gateway.role().to_string(),
        storage: gateway.storage_kind().to_string(),
        replicas,
        version: crate::VERSION.to_string(),
    })
}
