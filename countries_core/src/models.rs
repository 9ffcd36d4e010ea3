use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// A country as delivered by the external catalog (RESTCountries v2 shape).
///
/// `name` and `population` are required for a record to be stored, but they are
/// kept optional here so a malformed entry surfaces as a validation fault
/// instead of failing the whole catalog decode. Decode catalog entries with
/// [`RawSourceRecord::from_value`] to get that per-record isolation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawSourceRecord {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub capital: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub population: Option<i64>,
    /// Currency codes in catalog order.
    #[serde(default, deserialize_with = "deserialize_currency_codes")]
    pub currencies: Vec<String>,
    #[serde(default)]
    pub flag: Option<String>,
    /// Fields present in the source but of the wrong type, `field -> reason`.
    #[serde(skip)]
    pub malformed: BTreeMap<String, String>,
}

impl RawSourceRecord {
    /// Decode one catalog entry. A well-formed entry decodes as-is; otherwise
    /// each field is salvaged on its own and wrong-typed required fields are
    /// recorded in `malformed`.
    pub fn from_value(value: Value) -> Self {
        match serde_json::from_value::<Self>(value.clone()) {
            Ok(record) => record,
            Err(e) => {
                tracing::debug!(error = %e, "malformed catalog entry; salvaging fields");
                Self::salvage(&value)
            }
        }
    }

    fn salvage(value: &Value) -> Self {
        let mut malformed = BTreeMap::new();
        let text = |field: &str| value.get(field).and_then(Value::as_str).map(str::to_string);

        let name = match value.get("name") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => {
                malformed.insert("name".to_string(), "must be a string".to_string());
                None
            }
        };
        let population = match value.get("population") {
            None | Some(Value::Null) => None,
            Some(v) => match v.as_i64() {
                Some(p) => Some(p),
                None => {
                    malformed.insert(
                        "population".to_string(),
                        "must be a non-negative integer".to_string(),
                    );
                    None
                }
            },
        };
        let currencies = value
            .get("currencies")
            .and_then(|c| deserialize_currency_codes(c.clone()).ok())
            .unwrap_or_default();

        Self {
            name,
            capital: text("capital"),
            region: text("region"),
            population,
            currencies,
            flag: text("flag"),
            malformed,
        }
    }

    /// First currency code, if any.
    pub fn primary_currency(&self) -> Option<&str> {
        self.currencies.first().map(String::as_str)
    }
}

#[derive(Deserialize)]
struct CurrencyEntry {
    #[serde(default)]
    code: Option<String>,
}

fn deserialize_currency_codes<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let entries: Option<Vec<CurrencyEntry>> = Option::deserialize(deserializer)?;
    Ok(entries
        .unwrap_or_default()
        .into_iter()
        .filter_map(|c| c.code)
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect())
}

/// Currency code → rate against the base currency, fetched fresh each cycle.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExchangeRateTable(HashMap<String, f64>);

impl ExchangeRateTable {
    pub fn new(rates: HashMap<String, f64>) -> Self {
        Self(rates)
    }

    /// Positive, finite rate for `code`. Zero, negative and NaN rates count as absent.
    pub fn rate(&self, code: &str) -> Option<f64> {
        self.0
            .get(code)
            .copied()
            .filter(|r| r.is_finite() && *r > 0.0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, f64)> for ExchangeRateTable {
    fn from_iter<T: IntoIterator<Item = (String, f64)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Persisted country row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountryRecord {
    pub id: i64,
    pub name: String,
    pub capital: Option<String>,
    pub region: Option<String>,
    pub population: i64,
    pub currency_code: Option<String>,
    pub exchange_rate: Option<f64>,
    pub estimated_gdp: Option<f64>,
    pub flag_url: Option<String>,
    pub last_refreshed_at: DateTime<Utc>,
}

/// A derived record awaiting validation and reconciliation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CountryCandidate {
    pub name: Option<String>,
    pub capital: Option<String>,
    pub region: Option<String>,
    pub population: Option<i64>,
    pub currency_code: Option<String>,
    pub exchange_rate: Option<f64>,
    pub estimated_gdp: Option<f64>,
    pub flag_url: Option<String>,
    /// Decode-time faults carried over from the source record.
    pub malformed: BTreeMap<String, String>,
}

/// Case-insensitive lookup key for country names.
pub fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Record-level validation failure: which record, and why per field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationFault {
    pub subject: String,
    pub fields: BTreeMap<String, String>,
}

/// Read-side sort orders accepted by `GET /countries`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountrySort {
    GdpDesc,
    GdpAsc,
    PopulationDesc,
    PopulationAsc,
}

impl CountrySort {
    /// Parse a query-string value; unknown values yield `None` and are ignored.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "gdp_desc" => Some(Self::GdpDesc),
            "gdp_asc" => Some(Self::GdpAsc),
            "population_desc" => Some(Self::PopulationDesc),
            "population_asc" => Some(Self::PopulationAsc),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CountryQuery {
    pub region: Option<String>,
    pub currency: Option<String>,
    pub sort: Option<CountrySort>,
}

/// `GET /status` view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreStatus {
    pub total_countries: u64,
    pub last_refreshed_at: Option<DateTime<Utc>>,
}
