//! REST API for share and square retrieval
//!
//! Every retrieval request runs through the node's getter (normally a
//! cascade) under a context bounded by the configured request timeout.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::context::Context;
use crate::getter::{Getter, GetterError};
use crate::metrics::Metrics;
use crate::share::{DataHash, ExtendedDataSquare, Root, Share};
use crate::store::EdsStore;

/// API state shared across handlers
#[derive(Clone)]
pub struct ApiState {
    pub getter: Arc<dyn Getter>,
    pub store: Arc<EdsStore>,
    pub metrics: Metrics,
    pub request_timeout: Duration,
}

#[derive(Serialize, Deserialize)]
pub struct GetShareRequest {
    pub root: Root,
    pub row: usize,
    pub col: usize,
}

#[derive(Serialize, Deserialize)]
pub struct ShareResponse {
    pub hash: DataHash,
    pub row: usize,
    pub col: usize,
    pub data: String, // base64-encoded
}

#[derive(Serialize, Deserialize)]
pub struct GetEdsRequest {
    pub root: Root,
}

/// A square on the wire: row-major base64-encoded shares
#[derive(Serialize, Deserialize)]
pub struct SquareBody {
    pub width: usize,
    pub shares: Vec<String>,
}

#[derive(Serialize, Deserialize)]
pub struct StoreEdsResponse {
    pub hash: DataHash,
    pub root: Root,
}

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub square_count: usize,
    pub total_bytes: usize,
}

#[derive(Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub causes: Vec<String>,
}

/// Create the REST API router
pub fn create_router(
    getter: Arc<dyn Getter>,
    store: Arc<EdsStore>,
    metrics: Metrics,
    request_timeout: Duration,
) -> Router {
    let state = ApiState {
        getter,
        store,
        metrics,
        request_timeout,
    };

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_endpoint))
        .route("/api/v1/share", post(get_share))
        .route("/api/v1/eds", post(get_eds).put(store_eds).get(list_eds))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Health check endpoint
async fn health_check(State(state): State<ApiState>) -> impl IntoResponse {
    let stats = state.store.stats().await;

    Json(HealthResponse {
        status: "ok".to_string(),
        square_count: stats.square_count,
        total_bytes: stats.total_size,
    })
}

/// Prometheus metrics endpoint
async fn metrics_endpoint(State(state): State<ApiState>) -> impl IntoResponse {
    let stats = state.store.stats().await;
    let metrics = state
        .metrics
        .to_prometheus(stats.square_count, stats.total_size);

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        metrics,
    )
}

/// Fetch one share (POST /api/v1/share)
async fn get_share(
    State(state): State<ApiState>,
    Json(request): Json<GetShareRequest>,
) -> Result<Json<ShareResponse>, ApiError> {
    let hash = request.root.hash();
    info!("API: Fetching share ({}, {}) of {}", request.row, request.col, hash);

    let ctx = Context::background().with_timeout(state.request_timeout);
    let share = state
        .getter
        .get_share(&ctx, &request.root, request.row, request.col)
        .await?;

    Ok(Json(ShareResponse {
        hash,
        row: request.row,
        col: request.col,
        data: base64::prelude::BASE64_STANDARD.encode(share.as_ref()),
    }))
}

/// Fetch a whole square (POST /api/v1/eds)
async fn get_eds(
    State(state): State<ApiState>,
    Json(request): Json<GetEdsRequest>,
) -> Result<Json<SquareBody>, ApiError> {
    info!("API: Fetching square {}", request.root.hash());

    let ctx = Context::background().with_timeout(state.request_timeout);
    let eds = state.getter.get_eds(&ctx, &request.root).await?;

    info!(
        "API: Fetched square {} (width {}, {} bytes)",
        request.root.hash(),
        eds.width(),
        eds.size()
    );

    Ok(Json(SquareBody {
        width: eds.width(),
        shares: eds
            .shares()
            .iter()
            .map(|s| base64::prelude::BASE64_STANDARD.encode(s.as_ref()))
            .collect(),
    }))
}

/// Store a square locally (PUT /api/v1/eds)
async fn store_eds(
    State(state): State<ApiState>,
    Json(body): Json<SquareBody>,
) -> Result<Json<StoreEdsResponse>, ApiError> {
    let shares = body
        .shares
        .iter()
        .map(|s| base64::prelude::BASE64_STANDARD.decode(s).map(Share::new))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ApiError::BadRequest(format!("Invalid share encoding: {}", e)))?;

    let eds = ExtendedDataSquare::new(body.width, shares)
        .map_err(|e| ApiError::BadRequest(format!("Invalid square: {}", e)))?;

    let root = state
        .store
        .put(&eds)
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to store square: {}", e)))?;

    info!("API: Stored square {} ({} bytes)", root.hash(), eds.size());

    Ok(Json(StoreEdsResponse {
        hash: root.hash(),
        root,
    }))
}

/// List locally stored squares (GET /api/v1/eds)
async fn list_eds(State(state): State<ApiState>) -> impl IntoResponse {
    Json(state.store.list_hashes().await)
}

/// API error type
#[derive(Debug)]
enum ApiError {
    BadRequest(String),
    Internal(String),
    Getter(GetterError),
}

impl From<GetterError> for ApiError {
    fn from(err: GetterError) -> Self {
        ApiError::Getter(err)
    }
}

/// An exhausted cascade takes the status its causes agree on, else 502
fn getter_status(err: &GetterError) -> StatusCode {
    match err {
        GetterError::NotFound(_) => StatusCode::NOT_FOUND,
        GetterError::Exhausted(list) => {
            let mut statuses = list.iter().map(getter_status);
            match statuses.next() {
                Some(first) if statuses.all(|s| s == first) => first,
                _ => StatusCode::BAD_GATEWAY,
            }
        }
        GetterError::Storage(_) | GetterError::Exchange(_) => StatusCode::BAD_GATEWAY,
        GetterError::Context(_) => StatusCode::GATEWAY_TIMEOUT,
        GetterError::OutOfBounds { .. } | GetterError::Invalid(_) => StatusCode::BAD_REQUEST,
        GetterError::NoGetters => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse {
                    error: msg,
                    causes: Vec::new(),
                },
            ),
            ApiError::Internal(msg) => {
                error!("API error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse {
                        error: msg,
                        causes: Vec::new(),
                    },
                )
            }
            ApiError::Getter(err) => {
                let status = getter_status(&err);
                warn!(%status, "API: retrieval failed: {}", err);
                let causes = match &err {
                    GetterError::Exhausted(list) => list.iter().map(|e| e.to_string()).collect(),
                    _ => Vec::new(),
                };
                let error = match &err {
                    GetterError::Exhausted(list) => {
                        format!("all {} getters failed", list.len())
                    }
                    other => other.to_string(),
                };
                (status, ErrorResponse { error, causes })
            }
        };

        (status, Json(body)).into_response()
    }
}
