//! Read-only HTTP API over the signal store.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use shadow_core::{ShadowError, SignalPath, SignalRecord, SignalStore, StoreStats};
use shadow_protocol::{DiscoveryResponse, ErrorBody};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SignalStore>,
    pub discovery: Arc<DiscoveryResponse>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/vehicle-shadow", get(discovery_handler))
        .route("/vehicle-shadow/v1/signals", get(signals_handler))
        .route("/vehicle-shadow/v1/signals/*path", get(signal_handler))
        .route("/vehicle-shadow/v1/stats", get(stats_handler))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

/// Start the HTTP API server
pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("HTTP server listening on {}", addr);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn discovery_handler(State(state): State<AppState>) -> Json<DiscoveryResponse> {
    Json(state.discovery.as_ref().clone())
}

/// Every record, in path order.
async fn signals_handler(State(state): State<AppState>) -> Json<Vec<SignalRecord>> {
    let records = state
        .store
        .get(&Default::default())
        .into_values()
        .flatten()
        .collect();
    Json(records)
}

type ApiError = (StatusCode, Json<ErrorBody>);

fn api_error(status: StatusCode, err: ShadowError) -> ApiError {
    (status, Json(ErrorBody::from(err)))
}

/// One record. Accepts `Vehicle.Speed` as well as `Vehicle/Speed`.
async fn signal_handler(
    Path(path): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<SignalRecord>, ApiError> {
    let raw = path.trim_matches('/').replace('/', ".");
    let path = SignalPath::parse(&raw).map_err(|e| {
        api_error(
            StatusCode::BAD_REQUEST,
            ShadowError::InvalidRequest {
                reason: e.to_string(),
            },
        )
    })?;

    state.store.get_one(&path).map(Json).ok_or_else(|| {
        api_error(
            StatusCode::NOT_FOUND,
            ShadowError::NotFound { path: raw.clone() },
        )
    })
}

async fn stats_handler(State(state): State<AppState>) -> Json<StoreStats> {
    Json(state.store.stats())
}
