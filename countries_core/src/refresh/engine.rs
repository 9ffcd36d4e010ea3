use crate::estimator::{MultiplierSource, estimate};
use crate::models::{CountryCandidate, ExchangeRateTable, RawSourceRecord};
use crate::reconcile::ReconciliationEngine;
use crate::refresh::models::{RefreshError, RefreshState, RefreshSummary};
use crate::render::traits::{SummaryInput, SummaryRenderer};
use crate::sources::client::ExternalSourceClient;
use chrono::{DateTime, Duration, SubsecRound, Utc};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;

/// Runs one refresh cycle end to end: fetch, derive, reconcile, then render
/// the summary in the background.
pub struct RefreshOrchestrator {
    sources: ExternalSourceClient,
    reconciler: ReconciliationEngine,
    renderer: Arc<dyn SummaryRenderer>,
    multipliers: Arc<dyn MultiplierSource>,
    last_stamp: Mutex<Option<DateTime<Utc>>>,
    pending_render: Mutex<Option<JoinHandle<()>>>,
}

impl RefreshOrchestrator {
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn new(
        sources: ExternalSourceClient,
        reconciler: ReconciliationEngine,
        renderer: Arc<dyn SummaryRenderer>,
        multipliers: Arc<dyn MultiplierSource>,
    ) -> Self {
        Self {
            sources,
            reconciler,
            renderer,
            multipliers,
            last_stamp: Mutex::new(None),
            pending_render: Mutex::new(None),
        }
    }

    #[tracing::instrument(level = "info", skip(self))]
    pub async fn refresh(&self) -> Result<RefreshSummary, RefreshError> {
        enter(RefreshState::Fetching);
        let snapshot = self.sources.fetch_sources().await.map_err(|e| {
            tracing::warn!(source = %e.source_kind, "refresh aborted: source unavailable");
            RefreshError::from(e)
        })?;

        enter(RefreshState::Deriving);
        let candidates =
            derive_candidates(snapshot.catalog, &snapshot.rates, self.multipliers.as_ref());

        enter(RefreshState::Reconciling);
        let refreshed_at = self.next_timestamp(Utc::now());
        let outcome = self
            .reconciler
            .reconcile(candidates, refreshed_at)
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "refresh aborted: reconciliation rolled back");
                RefreshError::PersistenceFailure(e)
            })?;

        enter(RefreshState::Committed);
        let summary = RefreshSummary {
            total: outcome.committed.len() as u64,
            refreshed_at,
        };

        enter(RefreshState::Rendering);
        self.spawn_render(SummaryInput::from_committed(&outcome.committed, refreshed_at));

        enter(RefreshState::Done);
        if outcome.faults.is_empty() {
            tracing::info!(
                total = summary.total,
                refreshed_at = %refreshed_at,
                "refresh completed"
            );
            Ok(summary)
        } else {
            tracing::warn!(
                total = summary.total,
                faults = outcome.faults.len(),
                "refresh completed with rejected records"
            );
            Err(RefreshError::ValidationFailed {
                summary,
                faults: outcome.faults,
            })
        }
    }

    /// Wait for the most recently spawned summary render, if any.
    ///
    /// `refresh` never does this itself; one-shot callers that are about to
    /// exit use it so the artifact is not lost with the runtime.
    pub async fn settle_render(&self) {
        let handle = self
            .pending_render
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "summary render task panicked");
            }
        }
    }

    /// Fire and forget. Failures are logged and never reach the caller.
    fn spawn_render(&self, input: SummaryInput) {
        let renderer = Arc::clone(&self.renderer);
        let handle = tokio::spawn(async move {
            match renderer.render(&input).await {
                Ok(path) => tracing::debug!(path = %path.display(), "summary rendered"),
                Err(e) => tracing::warn!(error = %e, "summary render failed"),
            }
        });
        *self
            .pending_render
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    /// Microsecond-precision stamp, strictly after the previous one.
    fn next_timestamp(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let mut last = self
            .last_stamp
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut stamp = now.trunc_subsecs(6);
        if let Some(prev) = *last {
            if stamp <= prev {
                stamp = prev + Duration::microseconds(1);
            }
        }
        *last = Some(stamp);
        stamp
    }
}

fn enter(state: RefreshState) {
    tracing::debug!(state = %state, "refresh state");
}

/// Turn raw catalog entries into candidates, deriving rate and GDP per record.
///
/// Records without a population get no estimate; validation rejects them later.
pub fn derive_candidates(
    records: Vec<RawSourceRecord>,
    rates: &ExchangeRateTable,
    multipliers: &dyn MultiplierSource,
) -> Vec<CountryCandidate> {
    records
        .into_iter()
        .map(|raw| {
            let currency_code = raw.primary_currency().map(str::to_string);
            let (exchange_rate, estimated_gdp) = match raw.population {
                Some(population) => {
                    let e = estimate(population, currency_code.as_deref(), rates, multipliers);
                    (e.exchange_rate, e.estimated_gdp)
                }
                None => (currency_code.as_deref().and_then(|c| rates.rate(c)), None),
            };
            CountryCandidate {
                name: raw.name,
                capital: raw.capital,
                region: raw.region,
                population: raw.population,
                currency_code,
                exchange_rate,
                estimated_gdp,
                flag_url: raw.flag,
                malformed: raw.malformed,
            }
        })
        .collect()
}
