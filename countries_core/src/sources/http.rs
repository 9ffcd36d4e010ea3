//! `reqwest`-backed sources: RESTCountries v2 and open.er-api.com.

use crate::models::{ExchangeRateTable, RawSourceRecord};
use crate::sources::traits::{CatalogSource, RateSource};
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::instrument;

/// Shared HTTP client for both sources.
#[instrument(level = "debug")]
pub fn build_client(timeout: Duration) -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    headers.insert(USER_AGENT, HeaderValue::from_static("countries-refresh/0.1"));
    Client::builder()
        .timeout(timeout)
        .default_headers(headers)
        .build()
        .map_err(Error::backend_reqwest)
}

#[derive(Clone)]
pub struct RestCountriesCatalog {
    client: Client,
    url: String,
}

impl RestCountriesCatalog {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl CatalogSource for RestCountriesCatalog {
    #[instrument(level = "debug", skip(self), fields(url = %self.url))]
    async fn fetch_catalog(&self) -> Result<Vec<RawSourceRecord>> {
        let resp = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(Error::backend_reqwest)?
            .error_for_status()
            .map_err(Error::backend_reqwest)?;

        // Entries decode one by one so a malformed record cannot sink the catalog.
        let entries: Vec<serde_json::Value> = resp.json().await.map_err(Error::backend_reqwest)?;
        let records: Vec<RawSourceRecord> =
            entries.into_iter().map(RawSourceRecord::from_value).collect();
        let malformed = records.iter().filter(|r| !r.malformed.is_empty()).count();
        tracing::debug!(records = records.len(), malformed, "country catalog fetched");
        Ok(records)
    }
}

#[derive(Debug, Deserialize)]
struct RatesEnvelope {
    #[serde(default)]
    rates: Option<HashMap<String, f64>>,
}

#[derive(Clone)]
pub struct OpenExchangeRates {
    client: Client,
    url: String,
}

impl OpenExchangeRates {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl RateSource for OpenExchangeRates {
    #[instrument(level = "debug", skip(self), fields(url = %self.url))]
    async fn fetch_rates(&self) -> Result<ExchangeRateTable> {
        let resp = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(Error::backend_reqwest)?
            .error_for_status()
            .map_err(Error::backend_reqwest)?;

        let envelope: RatesEnvelope = resp.json().await.map_err(Error::backend_reqwest)?;
        let rates = envelope.rates.ok_or_else(|| {
            Error::BackendMessage("invalid exchange rate data format".to_string())
        })?;
        tracing::debug!(rates = rates.len(), "exchange rates fetched");
        Ok(ExchangeRateTable::new(rates))
    }
}
