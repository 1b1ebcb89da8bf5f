//! Relevance scoring against a user's buy box.
//!
//! # Overview
//!
//! Relevance is computed per listing, independently of every other listing,
//! which is what lets the selector sort the whole pool once before the
//! diversity pass. The score combines six bounded components:
//!
//! | Component | Weight | Neutral | Driven by |
//! |-----------|--------|---------|-----------|
//! | `price_fit` | 0.35 | 0.5 | Buy-box price range, market price/unit |
//! | `units_fit` | 0.20 | 0.6 | Buy-box unit range |
//! | `vintage_fit` | 0.10 | 0.6 | Buy-box year range, construction era |
//! | `deal_signals` | 0.25 | n/a | Distress, tenure, equity |
//! | `market_fit` | 0.05 | 0.5 | Listed for sale |
//! | `owner_fit` | 0.05 | n/a | Absentee / corporate owner |
//!
//! Missing inputs resolve to the neutral value instead of zero, so an
//! incomplete listing is ranked as "unknown", not "bad". Every non-trivial
//! contribution also yields a reason string for the end user.
//!
//! # Example
//!
//! ```rust
//! use rank_listings::candidate::Property;
//! use rank_listings::market::MarketStatistics;
//! use rank_listings::scoring::{BuyBox, BuyBoxScorer, RelevanceModel};
//!
//! let buy_box = BuyBox {
//!     units_min: Some(5),
//!     units_max: Some(20),
//!     ..BuyBox::default()
//! };
//! let property = Property {
//!     units_count: Some(12),
//!     mls_active: true,
//!     ..Property::new("p1")
//! };
//!
//! let scorer = BuyBoxScorer::new(2025);
//! let result = scorer.score(&property, &buy_box, &MarketStatistics::fallback());
//! assert!((0.0..=1.0).contains(&result.score));
//! assert_eq!(result.reasoning[0], "12 units in 5-20 target range");
//! ```

use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::candidate::{estimate_units, price_anchor, price_per_unit, MmrCandidate, Property};
use crate::market::MarketStatistics;

/// Reasons kept per listing for display.
pub const MAX_REASONS: usize = 3;

const PRICE_WEIGHT: f64 = 0.35;
const UNITS_WEIGHT: f64 = 0.20;
const VINTAGE_WEIGHT: f64 = 0.10;
const DEAL_WEIGHT: f64 = 0.25;
const MARKET_WEIGHT: f64 = 0.05;
const OWNER_WEIGHT: f64 = 0.05;

const NEUTRAL_PRICE_FIT: f64 = 0.5;
const NEUTRAL_UNITS_FIT: f64 = 0.6;
const NEUTRAL_VINTAGE_FIT: f64 = 0.6;

// ─────────────────────────────────────────────────────────────────────────────
// Types
// ─────────────────────────────────────────────────────────────────────────────

/// A user's investment targeting criteria.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuyBox {
    /// Market identifiers: a city, `"City, ST"`, a `City_ST` key, or a ZIP.
    pub markets: Vec<String>,
    pub price_min: Option<f64>,
    pub price_max: Option<f64>,
    pub units_min: Option<u32>,
    pub units_max: Option<u32>,
    pub year_min: Option<i32>,
    pub year_max: Option<i32>,
}

/// Per-component scores, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RelevanceComponents {
    pub price_fit: f64,
    pub units_fit: f64,
    pub vintage_fit: f64,
    pub deal_signals: f64,
    pub market_fit: f64,
    pub owner_fit: f64,
}

impl RelevanceComponents {
    /// Weighted combination, before penalties.
    #[must_use]
    pub fn weighted_sum(&self) -> f64 {
        PRICE_WEIGHT * self.price_fit
            + UNITS_WEIGHT * self.units_fit
            + VINTAGE_WEIGHT * self.vintage_fit
            + DEAL_WEIGHT * self.deal_signals
            + MARKET_WEIGHT * self.market_fit
            + OWNER_WEIGHT * self.owner_fit
    }
}

/// Result of scoring one listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelevanceScore {
    /// Final score in `[0, 1]`.
    pub score: f64,
    /// At most [`MAX_REASONS`] reasons, in the order they were found.
    pub reasoning: Vec<String>,
    pub components: RelevanceComponents,
    /// Total penalty subtracted from the weighted sum.
    pub penalties: f64,
}

// ─────────────────────────────────────────────────────────────────────────────
// RelevanceModel trait
// ─────────────────────────────────────────────────────────────────────────────

/// Scores a listing for one user.
///
/// Implementations must be pure: the same inputs give the same score, and
/// no listing's score depends on any other listing.
pub trait RelevanceModel {
    fn score(&self, property: &Property, buy_box: &BuyBox, stats: &MarketStatistics)
        -> RelevanceScore;

    /// Score a listing and wrap it as a selection candidate.
    fn candidate(
        &self,
        property: &Property,
        buy_box: &BuyBox,
        stats: &MarketStatistics,
    ) -> MmrCandidate {
        MmrCandidate::from_scored(property, self.score(property, buy_box, stats))
    }

    /// Score a whole pool, preserving input order.
    fn candidates(
        &self,
        properties: &[Property],
        buy_box: &BuyBox,
        stats: &MarketStatistics,
    ) -> Vec<MmrCandidate> {
        properties
            .iter()
            .map(|p| self.candidate(p, buy_box, stats))
            .collect()
    }
}

/// The default multifamily relevance model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuyBoxScorer {
    /// Year that building age is measured against.
    pub reference_year: i32,
}

impl Default for BuyBoxScorer {
    fn default() -> Self {
        Self {
            reference_year: Utc::now().year(),
        }
    }
}

impl BuyBoxScorer {
    #[must_use]
    pub const fn new(reference_year: i32) -> Self {
        Self { reference_year }
    }

    fn vintage_fit(&self, year: Option<i32>, buy_box: &BuyBox, reasons: &mut Vec<String>) -> f64 {
        let Some(year) = year else {
            return NEUTRAL_VINTAGE_FIT;
        };

        let mut fit = NEUTRAL_VINTAGE_FIT;
        if let (Some(lo), Some(hi)) = (buy_box.year_min, buy_box.year_max) {
            if (lo..=hi).contains(&year) {
                let mid = (f64::from(lo) + f64::from(hi)) / 2.0;
                fit = robust(f64::from(year), mid, (f64::from(hi) - f64::from(lo)) / 2.0);
            } else {
                let age = i64::from(self.reference_year) - i64::from(year);
                fit = if age > 100 {
                    0.2
                } else if age < 5 {
                    0.8
                } else {
                    0.5
                };
            }
        }

        if (1980..=2000).contains(&year) {
            fit = (fit * 1.1).min(1.0);
            reasons.push(format!("{year} built - good rehab/maintenance balance"));
        } else if year >= 2001 {
            reasons.push(format!("{year} built - modern construction"));
        } else {
            reasons.push(format!("{year} built - character property"));
        }
        fit
    }
}

impl RelevanceModel for BuyBoxScorer {
    fn score(
        &self,
        property: &Property,
        buy_box: &BuyBox,
        stats: &MarketStatistics,
    ) -> RelevanceScore {
        let price = price_anchor(property);
        let estimate = estimate_units(property);
        let units = estimate.units;
        let ppu = price_per_unit(property, units);

        let mut reasons = estimate.reasons;
        let components = RelevanceComponents {
            price_fit: price_fit(price, ppu, buy_box, stats, &mut reasons),
            units_fit: units_fit(units, buy_box, &mut reasons),
            vintage_fit: self.vintage_fit(property.year_built, buy_box, &mut reasons),
            deal_signals: deal_signals(property, price, &mut reasons),
            market_fit: market_fit(property, &mut reasons),
            owner_fit: owner_fit(property, &mut reasons),
        };

        let penalties = estimate.penalty;
        reasons.truncate(MAX_REASONS);

        RelevanceScore {
            score: clamp01(components.weighted_sum() - penalties),
            reasoning: reasons,
            components,
            penalties,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Components
// ─────────────────────────────────────────────────────────────────────────────

fn price_fit(
    price: Option<f64>,
    ppu: Option<f64>,
    buy_box: &BuyBox,
    stats: &MarketStatistics,
    reasons: &mut Vec<String>,
) -> f64 {
    let (Some(price), Some(lo), Some(hi)) = (price, buy_box.price_min, buy_box.price_max) else {
        return NEUTRAL_PRICE_FIT;
    };
    let mid = (lo + hi) / 2.0;

    if price < lo || price > hi {
        if price < lo {
            reasons.push("Below target price range - potential value play".to_string());
        } else {
            reasons.push("Above target price range - premium property".to_string());
        }
        return 0.3 * robust(price, mid, hi - lo);
    }

    let mut fit = robust(price, mid, (hi - lo) / 2.0);
    if let (Some(ppu), Some(median)) = (ppu, stats.price_per_unit_median.filter(|m| truthy(*m))) {
        let iqr = stats
            .price_per_unit_iqr
            .filter(|v| truthy(*v))
            .unwrap_or(median * 0.5);
        fit = 0.6 * fit + 0.4 * robust(ppu, median, iqr);
        reasons.push(format!(
            "${}/unit vs ${} market median",
            format_thousands(ppu),
            format_thousands(median)
        ));
    }
    fit
}

fn units_fit(units: Option<u32>, buy_box: &BuyBox, reasons: &mut Vec<String>) -> f64 {
    match (units, buy_box.units_min, buy_box.units_max) {
        (Some(u), Some(lo), Some(hi)) => {
            if (lo..=hi).contains(&u) {
                reasons.push(format!("{u} units in {lo}-{hi} target range"));
                let mid = (f64::from(lo) + f64::from(hi)) / 2.0;
                robust(f64::from(u), mid, f64::from(hi - lo) / 2.0)
            } else if u >= 2 {
                if u < lo {
                    reasons.push(format!("{u} units - smaller than target but manageable"));
                } else {
                    reasons.push(format!("{u} units - larger scale opportunity"));
                }
                0.4
            } else {
                reasons.push("Single-family property - outside multifamily focus".to_string());
                0.1
            }
        }
        (Some(u), _, _) if u >= 2 => {
            reasons.push(format!("{u}-unit multifamily property"));
            0.7
        }
        _ => NEUTRAL_UNITS_FIT,
    }
}

fn deal_signals(property: &Property, price: Option<f64>, reasons: &mut Vec<String>) -> f64 {
    let distress: Vec<&str> = [
        (property.pre_foreclosure, "pre-foreclosure"),
        (property.auction, "auction"),
        (property.reo, "REO"),
        (property.tax_lien, "tax lien"),
    ]
    .into_iter()
    .filter_map(|(flag, label)| flag.then_some(label))
    .collect();

    let years_owned = property.years_owned.unwrap_or(0.0);
    let equity = property.estimated_equity.unwrap_or(0.0);
    let price = price.filter(|p| truthy(*p));

    let distress_fit = clamp01(distress.len() as f64 / 2.0);
    let tenure_fit = clamp01(years_owned / 10.0);
    let equity_fit = price.map_or(0.0, |p| clamp01(equity / p));

    if !distress.is_empty() {
        reasons.push(format!("Distressed: {}", distress.join(", ")));
    }
    if years_owned >= 7.0 {
        reasons.push(format!("{years_owned} years owned - potential seller motivation"));
    }
    if let Some(p) = price {
        let ratio = equity / p;
        if truthy(equity) && ratio > 0.4 {
            reasons.push(format!(
                "{}% equity - refinancing opportunity",
                (ratio * 100.0).round()
            ));
        }
    }

    clamp01(0.5 * distress_fit + 0.3 * tenure_fit + 0.2 * equity_fit)
}

fn market_fit(property: &Property, reasons: &mut Vec<String>) -> f64 {
    if property.is_listed() {
        reasons.push("Currently for sale - immediate opportunity".to_string());
        1.0
    } else {
        0.5
    }
}

fn owner_fit(property: &Property, reasons: &mut Vec<String>) -> f64 {
    let absentee = if property.is_absentee_owned() { 1.0 } else { 0.6 };
    let corporate = if property.corporate_owned { 0.8 } else { 1.0 };

    if property.out_of_state_absentee_owner {
        reasons.push("Out-of-state owner - motivated seller".to_string());
    } else if property.in_state_absentee_owner {
        reasons.push("Absentee owner - investor property".to_string());
    }

    clamp01(0.7 * absentee + 0.3 * corporate)
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Clamp into `[0, 1]`. NaN maps to 0.
#[inline]
#[must_use]
pub fn clamp01(x: f64) -> f64 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(0.0, 1.0)
    }
}

/// Non-zero and not NaN.
#[inline]
fn truthy(x: f64) -> bool {
    x != 0.0 && !x.is_nan()
}

/// Robust closeness of `x` to `median`, scaled by a spread.
///
/// `1 - |x - median| / max(1, spread)`, clamped to `[0, 1]`, where spread is
/// `iqr`, or `median` when `iqr` is zero, or 1 when both are.
#[must_use]
pub fn robust(x: f64, median: f64, iqr: f64) -> f64 {
    let spread = if truthy(iqr) {
        iqr
    } else if truthy(median) {
        median
    } else {
        1.0
    };
    clamp01(1.0 - (x - median).abs() / spread.max(1.0))
}

/// Round to a whole number and group digits with commas.
#[must_use]
pub fn format_thousands(value: f64) -> String {
    let rounded = value.round();
    let digits = format!("{:.0}", rounded.abs());
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if rounded < 0.0 {
        grouped.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    grouped
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
