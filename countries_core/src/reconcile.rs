//! Reconciliation of derived candidates against stored countries.
//!
//! Validation faults are per record and never abort the batch. Everything that
//! survives validation is written in one transaction together with the refresh
//! timestamp; an infrastructure failure there discards the whole cycle.

use crate::Result;
use crate::models::{CountryCandidate, CountryRecord, ValidationFault, name_key};
use crate::store::traits::{CountryStore, UpsertBatch, UpsertRow, UpsertTarget, ValidCountry};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub committed: Vec<CountryRecord>,
    pub faults: Vec<ValidationFault>,
}

/// Check required fields. `index` is the candidate's position in the batch,
/// used as the fault subject when the name itself is missing.
pub fn validate(
    index: usize,
    candidate: CountryCandidate,
) -> std::result::Result<ValidCountry, ValidationFault> {
    let name = candidate
        .name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());

    // Decode-time faults take precedence over "is required".
    let mut fields = candidate.malformed;
    if name.is_none() {
        fields
            .entry("name".to_string())
            .or_insert_with(|| "is required".to_string());
    }
    match candidate.population {
        None => {
            fields
                .entry("population".to_string())
                .or_insert_with(|| "is required".to_string());
        }
        Some(p) if p < 0 => {
            fields.insert(
                "population".to_string(),
                "must be a non-negative integer".to_string(),
            );
        }
        Some(_) => {}
    }

    match (name, candidate.population) {
        (Some(name), Some(population)) if fields.is_empty() => Ok(ValidCountry {
            name,
            capital: candidate.capital,
            region: candidate.region,
            population,
            currency_code: candidate.currency_code,
            exchange_rate: candidate.exchange_rate,
            estimated_gdp: candidate.estimated_gdp,
            flag_url: candidate.flag_url,
        }),
        (name, _) => Err(ValidationFault {
            subject: name.unwrap_or_else(|| format!("record[{index}]")),
            fields,
        }),
    }
}

/// Resolve each valid country against the stored name index.
///
/// Names that collide case-insensitively within the batch collapse into one
/// row; the last occurrence wins and keeps the first occurrence's position.
pub fn plan_batch(valid: Vec<ValidCountry>, existing: &HashMap<String, i64>) -> UpsertBatch {
    let mut rows: Vec<UpsertRow> = Vec::with_capacity(valid.len());
    let mut positions: HashMap<String, usize> = HashMap::with_capacity(valid.len());

    for country in valid {
        let key = name_key(&country.name);
        let target = existing
            .get(&key)
            .map_or(UpsertTarget::New, |id| UpsertTarget::Existing(*id));
        let row = UpsertRow { target, country };

        match positions.get(&key) {
            Some(&pos) => {
                tracing::warn!(
                    name = %row.country.name,
                    "duplicate country in batch; keeping last occurrence"
                );
                rows[pos] = row;
            }
            None => {
                positions.insert(key, rows.len());
                rows.push(row);
            }
        }
    }

    UpsertBatch { rows }
}

#[derive(Clone)]
pub struct ReconciliationEngine {
    store: Arc<dyn CountryStore>,
}

impl ReconciliationEngine {
    pub fn new(store: Arc<dyn CountryStore>) -> Self {
        Self { store }
    }

    #[tracing::instrument(
        level = "debug",
        skip(self, candidates),
        fields(candidates = candidates.len())
    )]
    pub async fn reconcile(
        &self,
        candidates: Vec<CountryCandidate>,
        refreshed_at: DateTime<Utc>,
    ) -> Result<Reconciliation> {
        let mut valid = Vec::with_capacity(candidates.len());
        let mut faults = Vec::new();
        for (idx, candidate) in candidates.into_iter().enumerate() {
            match validate(idx, candidate) {
                Ok(v) => valid.push(v),
                Err(fault) => {
                    tracing::debug!(subject = %fault.subject, "candidate rejected");
                    faults.push(fault);
                }
            }
        }

        self.store.ensure_schema().await?;
        let existing = self.store.load_name_index().await?;
        let batch = plan_batch(valid, &existing);
        let committed = self.store.apply_batch(&batch, refreshed_at).await?;

        tracing::debug!(
            committed = committed.len(),
            faults = faults.len(),
            "reconciliation committed"
        );
        Ok(Reconciliation { committed, faults })
    }
}
