use crate::routes;
use axum::{Extension, Router};
use countries_core::{
    CountryStore, ExternalSourceClient, PngSummaryRenderer, RandomMultiplier,
    ReconciliationEngine, RefreshConfig, RefreshOrchestrator, RenderConfig, SqliteCountryStore,
};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<RefreshOrchestrator>,
    pub store: Arc<dyn CountryStore>,
    /// Where `GET /countries/image` looks for the artifact.
    pub render: RenderConfig,
    pub started_at: Instant,
}

impl AppState {
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn new(
        orchestrator: Arc<RefreshOrchestrator>,
        store: Arc<dyn CountryStore>,
        render: RenderConfig,
    ) -> Self {
        Self {
            orchestrator,
            store,
            render,
            started_at: Instant::now(),
        }
    }
}

/// Wire the production stack: SQLite store, HTTP sources, PNG renderer,
/// random multipliers.
#[tracing::instrument(level = "info", skip_all, fields(database = %database.display()))]
pub async fn build_state(
    database: &Path,
    refresh: &RefreshConfig,
    render: RenderConfig,
) -> anyhow::Result<AppState> {
    let store = Arc::new(SqliteCountryStore::new(database).await?);
    let sources = ExternalSourceClient::from_config(refresh)?;
    let orchestrator = RefreshOrchestrator::new(
        sources,
        ReconciliationEngine::new(store.clone()),
        Arc::new(PngSummaryRenderer::new(render.clone())),
        Arc::new(RandomMultiplier),
    );
    Ok(AppState::new(Arc::new(orchestrator), store, render))
}

#[tracing::instrument(level = "debug", skip_all)]
pub fn router(state: AppState) -> Router {
    let state = Arc::new(state);
    let request_id = axum::http::HeaderName::from_static("x-request-id");

    Router::new()
        .merge(routes::router())
        .layer(Extension(state))
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

#[tracing::instrument(level = "info", skip_all, fields(%addr))]
pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use countries_core::{
        CatalogSource, ExchangeRateTable, FixedMultiplier, RateSource, RawSourceRecord,
    };
    use serde_json::Value;
    use std::time::Duration;

    struct Catalog(Vec<RawSourceRecord>);

    #[async_trait]
    impl CatalogSource for Catalog {
        async fn fetch_catalog(&self) -> countries_core::Result<Vec<RawSourceRecord>> {
            Ok(self.0.clone())
        }
    }

    struct Rates(Option<ExchangeRateTable>);

    #[async_trait]
    impl RateSource for Rates {
        async fn fetch_rates(&self) -> countries_core::Result<ExchangeRateTable> {
            self.0
                .clone()
                .ok_or_else(|| {
                    countries_core::Error::BackendMessage("503 from upstream".to_string())
                })
        }
    }

    fn record(
        name: &str,
        region: &str,
        population: Option<i64>,
        currency: &str,
    ) -> RawSourceRecord {
        RawSourceRecord {
            name: Some(name.to_string()),
            capital: None,
            region: Some(region.to_string()),
            population,
            currencies: vec![currency.to_string()],
            flag: Some(format!("https://flags.example/{}.svg", name.to_lowercase())),
            malformed: Default::default(),
        }
    }

    struct Harness {
        _dir: tempfile::TempDir,
        base: String,
        state: AppState,
        http: reqwest::Client,
    }

    async fn harness(catalog: Vec<RawSourceRecord>, rates: Option<ExchangeRateTable>) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(
            SqliteCountryStore::new(dir.path().join("countries.db"))
                .await
                .unwrap(),
        );
        let render = RenderConfig {
            cache_dir: dir.path().join("cache"),
            font_path: None,
        };
        let orchestrator = RefreshOrchestrator::new(
            ExternalSourceClient::new(
                Arc::new(Catalog(catalog)),
                Arc::new(Rates(rates)),
                Duration::from_secs(2),
            ),
            ReconciliationEngine::new(store.clone()),
            Arc::new(PngSummaryRenderer::new(render.clone())),
            Arc::new(FixedMultiplier(1000)),
        );
        let state = AppState::new(Arc::new(orchestrator), store, render);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Harness {
            _dir: dir,
            base: format!("http://{addr}"),
            state,
            http: reqwest::Client::new(),
        }
    }

    fn rates() -> ExchangeRateTable {
        [("NGN".to_string(), 1600.0), ("GHS".to_string(), 16.0)]
            .into_iter()
            .collect()
    }

    fn west_africa() -> Vec<RawSourceRecord> {
        vec![
            record("Nigeria", "Africa", Some(200_000_000), "NGN"),
            record("Ghana", "Africa", Some(30_000_000), "GHS"),
        ]
    }

    #[tokio::test]
    async fn refresh_then_read_back() {
        let h = harness(west_africa(), Some(rates())).await;

        let resp = h
            .http
            .post(format!("{}/countries/refresh", h.base))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        assert!(resp.headers().contains_key("x-request-id"));
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["message"], "Countries refreshed successfully");
        assert_eq!(body["total_countries"], 2);

        let list: Value = h
            .http
            .get(format!("{}/countries?region=AFRICA&sort=gdp_desc", h.base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let names: Vec<_> = list
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["Nigeria", "Ghana"]);

        let one: Value = h
            .http
            .get(format!("{}/countries/nigeria", h.base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(one["currency_code"], "NGN");
        assert_eq!(one["estimated_gdp"], 125_000_000_000.0);

        let status: Value = h
            .http
            .get(format!("{}/status", h.base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(status["total_countries"], 2);
        assert_eq!(status["last_refreshed_at"], body["last_refreshed_at"]);

        h.state.orchestrator.settle_render().await;
        let image = h
            .http
            .get(format!("{}/countries/image", h.base))
            .send()
            .await
            .unwrap();
        assert_eq!(image.status(), 200);
        assert_eq!(image.headers()["content-type"], "image/png");
        assert!(!image.bytes().await.unwrap().is_empty());

        let deleted = h
            .http
            .delete(format!("{}/countries/GHANA", h.base))
            .send()
            .await
            .unwrap();
        assert_eq!(deleted.status(), 200);
        let missing = h
            .http
            .get(format!("{}/countries/ghana", h.base))
            .send()
            .await
            .unwrap();
        assert_eq!(missing.status(), 404);
        let body: Value = missing.json().await.unwrap();
        assert_eq!(body["error"], "Country not found");
    }

    #[tokio::test]
    async fn failing_rates_source_is_a_503() {
        let h = harness(west_africa(), None).await;
        let resp = h
            .http
            .post(format!("{}/countries/refresh", h.base))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 503);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"], "External data source unavailable");
        assert_eq!(body["details"], "Could not fetch data from Exchange Rates API");

        let status = h.state.store.status().await.unwrap();
        assert_eq!(status.total_countries, 0);
    }

    #[tokio::test]
    async fn rejected_records_are_a_400_with_details() {
        let mut catalog = west_africa();
        catalog.push(record("Belize", "Americas", None, "BZD"));
        let h = harness(catalog, Some(rates())).await;

        let resp = h
            .http
            .post(format!("{}/countries/refresh", h.base))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"], "Validation failed");
        assert_eq!(body["details"]["Belize"]["population"], "is required");
        assert_eq!(body["total_countries"], 2);
        let status = h.state.store.status().await.unwrap();
        assert_eq!(status.total_countries, 2);
        assert_eq!(
            body["last_refreshed_at"],
            serde_json::to_value(status.last_refreshed_at).unwrap()
        );
    }

    #[tokio::test]
    async fn image_and_blank_name_edge_cases() {
        let h = harness(vec![], Some(rates())).await;

        let resp = h
            .http
            .get(format!("{}/countries/image", h.base))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"], "Summary image not found");

        let resp = h
            .http
            .delete(format!("{}/countries/%20", h.base))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["details"]["name"], "is required");

        let health: Value = h
            .http
            .get(format!("{}/health", h.base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health["status"], "ok");

        let status: Value = h
            .http
            .get(format!("{}/status", h.base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(status["total_countries"], 0);
        assert!(status["last_refreshed_at"].is_null());
    }
}
