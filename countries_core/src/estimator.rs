//! Estimated GDP derivation.
//!
//! Policy per record:
//! - no currency code: `0`
//! - code with a positive rate: `population * multiplier / rate`, rounded to 2 decimals
//! - code without a rate: unknown (`None`), never `0`

use crate::models::ExchangeRateTable;
use rand::Rng;

pub const MULTIPLIER_MIN: u32 = 1000;
pub const MULTIPLIER_MAX: u32 = 2000;

/// Supplies the per-record volatility multiplier in `[MULTIPLIER_MIN, MULTIPLIER_MAX]`.
pub trait MultiplierSource: Send + Sync {
    fn sample(&self) -> u32;
}

/// Uniform multiplier drawn from the thread-local RNG on every call.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomMultiplier;

impl MultiplierSource for RandomMultiplier {
    fn sample(&self) -> u32 {
        rand::thread_rng().gen_range(MULTIPLIER_MIN..=MULTIPLIER_MAX)
    }
}

/// Always returns the same multiplier (clamped into range).
#[derive(Debug, Clone, Copy)]
pub struct FixedMultiplier(pub u32);

impl MultiplierSource for FixedMultiplier {
    fn sample(&self) -> u32 {
        self.0.clamp(MULTIPLIER_MIN, MULTIPLIER_MAX)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate {
    /// Rate used for the derivation; `None` when no code or no rate.
    pub exchange_rate: Option<f64>,
    pub estimated_gdp: Option<f64>,
}

pub fn estimate(
    population: i64,
    currency_code: Option<&str>,
    rates: &ExchangeRateTable,
    multipliers: &dyn MultiplierSource,
) -> Estimate {
    let Some(code) = currency_code.map(str::trim).filter(|c| !c.is_empty()) else {
        return Estimate {
            exchange_rate: None,
            estimated_gdp: Some(0.0),
        };
    };

    match rates.rate(code) {
        Some(rate) => {
            let multiplier = f64::from(multipliers.sample());
            Estimate {
                exchange_rate: Some(rate),
                estimated_gdp: Some(round2(population as f64 * multiplier / rate)),
            }
        }
        None => Estimate {
            exchange_rate: None,
            estimated_gdp: None,
        },
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
