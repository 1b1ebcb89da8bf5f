//! Per-market aggregate statistics.
//!
//! Statistics are keyed by `City_ST`. When none are stored for a user's
//! markets they can be computed from a sample of listings; when the sample
//! is too thin the crate falls back to fixed multifamily defaults.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::candidate::Property;

/// Fewer usable listings than this and [`MarketStatistics::from_sample`]
/// returns the fallback.
pub const MIN_SAMPLE_SIZE: usize = 10;

/// Median and IQR of price-per-unit, units, and vintage for one market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketStatistics {
    pub market_key: String,
    pub price_per_unit_median: Option<f64>,
    pub price_per_unit_iqr: Option<f64>,
    pub units_median: Option<f64>,
    pub units_iqr: Option<f64>,
    pub vintage_median: Option<f64>,
    pub vintage_iqr: Option<f64>,
    pub geo_diversity_scale_km: Option<f64>,
    pub property_count: usize,
}

impl MarketStatistics {
    /// Defaults used when no market data is available.
    #[must_use]
    pub fn fallback() -> Self {
        Self {
            market_key: "default".to_string(),
            price_per_unit_median: Some(100_000.0),
            price_per_unit_iqr: Some(50_000.0),
            units_median: Some(20.0),
            units_iqr: Some(15.0),
            vintage_median: Some(1990.0),
            vintage_iqr: Some(25.0),
            geo_diversity_scale_km: Some(5.0),
            property_count: 0,
        }
    }

    /// Compute statistics from listings with a positive estimated value,
    /// positive units, and a year built after 1900.
    #[must_use]
    pub fn from_sample(market_key: impl Into<String>, properties: &[Property]) -> Self {
        let usable: Vec<(f64, u32, i32)> = properties
            .iter()
            .filter_map(|p| {
                let value = p.estimated_value.filter(|v| *v > 0.0)?;
                let units = p.units_count.filter(|u| *u > 0)?;
                let year = p.year_built.filter(|y| *y > 1900)?;
                Some((value, units, year))
            })
            .collect();

        if usable.len() < MIN_SAMPLE_SIZE {
            debug!(
                usable = usable.len(),
                "market sample too small, using fallback statistics"
            );
            return Self::fallback();
        }

        let mut ppu: Vec<f64> = usable
            .iter()
            .map(|&(value, units, _)| value / f64::from(units))
            .collect();
        let mut units: Vec<f64> = usable.iter().map(|&(_, u, _)| f64::from(u)).collect();
        let mut vintages: Vec<f64> = usable.iter().map(|&(_, _, y)| f64::from(y)).collect();
        for values in [&mut ppu, &mut units, &mut vintages] {
            values.sort_by(f64::total_cmp);
        }

        Self {
            market_key: market_key.into(),
            price_per_unit_median: Some(median(&ppu)),
            price_per_unit_iqr: Some(iqr(&ppu)),
            units_median: Some(median(&units)),
            units_iqr: Some(iqr(&units)),
            vintage_median: Some(median(&vintages)),
            vintage_iqr: Some(iqr(&vintages)),
            geo_diversity_scale_km: Some(5.0),
            property_count: usable.len(),
        }
    }
}

/// Upper median of a sorted, non-empty slice.
fn median(sorted: &[f64]) -> f64 {
    sorted[sorted.len() / 2]
}

/// `q3 - q1` of a sorted, non-empty slice, by nearest-rank index.
fn iqr(sorted: &[f64]) -> f64 {
    let n = sorted.len();
    sorted[n * 3 / 4] - sorted[n / 4]
}

/// Normalize a market identifier to a statistics key.
///
/// `"Austin, TX"` becomes `"Austin_TX"`; keys already containing `_` are
/// kept as given.
#[must_use]
pub fn market_key(market: &str) -> String {
    if market.contains('_') {
        return market.to_string();
    }
    market
        .split(',')
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("_")
}

fn eq_field(field: &Option<String>, expected: &str) -> bool {
    field
        .as_deref()
        .is_some_and(|f| f.trim().eq_ignore_ascii_case(expected.trim()))
}

/// Whether a single market identifier covers a listing.
///
/// Accepts `"City, ST"`, a `City_ST` key, an all-digit ZIP, or a bare city.
pub(crate) fn market_matches(market: &str, property: &Property) -> bool {
    let market = market.trim();
    if market.is_empty() {
        return false;
    }
    let city_state = market
        .split_once(',')
        .or_else(|| market.rsplit_once('_'));
    if let Some((city, state)) = city_state {
        return eq_field(&property.address_city, city) && eq_field(&property.address_state, state);
    }
    if market.chars().all(|c| c.is_ascii_digit()) {
        return eq_field(&property.address_zip, market);
    }
    eq_field(&property.address_city, market)
}

/// Pick the statistics for a user's markets.
///
/// First stored entry whose key matches one of the markets, else computed
/// from the listings in `sample` that lie in one of the markets, else the
/// fallback. No markets means fallback.
#[must_use]
pub fn resolve_market_stats(
    markets: &[String],
    known: &[MarketStatistics],
    sample: &[Property],
) -> MarketStatistics {
    if markets.is_empty() {
        return MarketStatistics::fallback();
    }

    let keys: Vec<String> = markets.iter().map(|m| market_key(m)).collect();
    if let Some(found) = known
        .iter()
        .find(|s| keys.iter().any(|k| k.eq_ignore_ascii_case(&s.market_key)))
    {
        return found.clone();
    }

    let in_market: Vec<Property> = sample
        .iter()
        .filter(|p| markets.iter().any(|m| market_matches(m, p)))
        .cloned()
        .collect();
    debug!(
        markets = ?keys,
        sampled = in_market.len(),
        "no stored market statistics, computing from sample"
    );
    MarketStatistics::from_sample(keys.join("_"), &in_market)
}
