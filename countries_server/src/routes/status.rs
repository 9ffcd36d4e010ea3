//! Service probes: liveness and refresh status.

use crate::error::ApiError;
use crate::server::AppState;
use axum::Extension;
use axum::Json;
use countries_core::StoreStatus;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_ms: u128,
}

#[tracing::instrument(level = "debug", skip_all)]
pub async fn get_health(Extension(state): Extension<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_ms: state.started_at.elapsed().as_millis(),
    })
}

/// Stored record count and the committed refresh timestamp (null before the first refresh).
#[tracing::instrument(level = "debug", skip_all)]
pub async fn get_status(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<StoreStatus>, ApiError> {
    Ok(Json(state.store.status().await?))
}
