use crate::error::ApiError;
use crate::server::AppState;
use axum::Extension;
use axum::Json;
use axum::extract::{Path, Query};
use axum::routing::{get, post};
use chrono::{DateTime, Utc};
use countries_core::{CountryQuery, CountryRecord, CountrySort, Error as CoreError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub message: &'static str,
    pub total_countries: u64,
    pub last_refreshed_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListCountriesQuery {
    pub region: Option<String>,
    pub currency: Option<String>,
    pub sort: Option<String>,
}

impl ListCountriesQuery {
    fn into_query(self) -> CountryQuery {
        fn non_blank(v: Option<String>) -> Option<String> {
            v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
        }
        CountryQuery {
            region: non_blank(self.region),
            currency: non_blank(self.currency),
            sort: self.sort.as_deref().and_then(CountrySort::parse),
        }
    }
}

#[tracing::instrument(level = "debug", skip_all)]
pub fn router() -> axum::Router {
    axum::Router::new()
        .route("/countries/refresh", post(refresh))
        .route("/countries", get(list_countries))
        .route("/countries/{name}", get(get_country).delete(delete_country))
}

#[tracing::instrument(level = "info", skip_all)]
pub async fn refresh(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<RefreshResponse>, ApiError> {
    let summary = state.orchestrator.refresh().await?;
    Ok(Json(RefreshResponse {
        message: "Countries refreshed successfully",
        total_countries: summary.total,
        last_refreshed_at: summary.refreshed_at,
    }))
}

#[tracing::instrument(level = "debug", skip_all)]
pub async fn list_countries(
    Extension(state): Extension<Arc<AppState>>,
    Query(q): Query<ListCountriesQuery>,
) -> Result<Json<Vec<CountryRecord>>, ApiError> {
    let query = q.into_query();
    Ok(Json(state.store.list_countries(&query).await?))
}

#[tracing::instrument(level = "debug", skip(state))]
pub async fn get_country(
    Extension(state): Extension<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<CountryRecord>, ApiError> {
    let name = required_name(&name)?;
    let country = state
        .store
        .get_country(name)
        .await?
        .ok_or_else(|| CoreError::NotFound("Country not found".to_string()))?;
    Ok(Json(country))
}

#[tracing::instrument(level = "info", skip(state))]
pub async fn delete_country(
    Extension(state): Extension<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let name = required_name(&name)?;
    if !state.store.delete_country(name).await? {
        return Err(CoreError::NotFound("Country not found".to_string()).into());
    }
    Ok(Json(MessageResponse {
        message: format!("Country {name} deleted successfully"),
    }))
}

fn required_name(raw: &str) -> Result<&str, ApiError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(ApiError::required("name"));
    }
    Ok(name)
}
