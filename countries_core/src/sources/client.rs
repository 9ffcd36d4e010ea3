use crate::config::RefreshConfig;
use crate::models::{ExchangeRateTable, RawSourceRecord};
use crate::sources::http::{OpenExchangeRates, RestCountriesCatalog, build_client};
use crate::sources::traits::{CatalogSource, RateSource, SourceKind};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// One of the two sources failed or timed out; nothing from this cycle is used.
#[derive(thiserror::Error, Debug)]
#[error("external data source unavailable: {source_kind}")]
pub struct SourceUnavailable {
    pub source_kind: SourceKind,
    #[source]
    pub cause: Option<crate::Error>,
}

/// Both sources, fetched together.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceSnapshot {
    pub catalog: Vec<RawSourceRecord>,
    pub rates: ExchangeRateTable,
}

#[derive(Clone)]
pub struct ExternalSourceClient {
    catalog: Arc<dyn CatalogSource>,
    rates: Arc<dyn RateSource>,
    timeout: Duration,
}

impl ExternalSourceClient {
    pub fn new(
        catalog: Arc<dyn CatalogSource>,
        rates: Arc<dyn RateSource>,
        timeout: Duration,
    ) -> Self {
        Self {
            catalog,
            rates,
            timeout,
        }
    }

    /// HTTP sources built from configuration.
    #[tracing::instrument(level = "debug")]
    pub fn from_config(cfg: &RefreshConfig) -> crate::Result<Self> {
        cfg.validate()?;
        let client = build_client(cfg.fetch_timeout)?;
        Ok(Self::new(
            Arc::new(RestCountriesCatalog::new(
                client.clone(),
                cfg.countries_url.clone(),
            )),
            Arc::new(OpenExchangeRates::new(client, cfg.exchange_url.clone())),
            cfg.fetch_timeout,
        ))
    }

    /// Fetch the catalog and the rate table concurrently.
    ///
    /// Both must succeed. The first observed failure is returned immediately.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn fetch_sources(&self) -> Result<SourceSnapshot, SourceUnavailable> {
        let (catalog, rates) = tokio::try_join!(
            guarded(SourceKind::Catalog, self.timeout, self.catalog.fetch_catalog()),
            guarded(SourceKind::Rates, self.timeout, self.rates.fetch_rates()),
        )?;
        Ok(SourceSnapshot { catalog, rates })
    }
}

async fn guarded<T>(
    kind: SourceKind,
    timeout: Duration,
    fut: impl Future<Output = crate::Result<T>>,
) -> Result<T, SourceUnavailable> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(v)) => Ok(v),
        Ok(Err(e)) => {
            tracing::warn!(source = %kind, error = %e, "source fetch failed");
            Err(SourceUnavailable {
                source_kind: kind,
                cause: Some(e),
            })
        }
        Err(_) => {
            tracing::warn!(
                source = %kind,
                timeout_ms = timeout.as_millis() as u64,
                "source fetch timed out"
            );
            Err(SourceUnavailable {
                source_kind: kind,
                cause: None,
            })
        }
    }
}
