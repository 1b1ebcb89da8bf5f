//! Pairwise similarity between two listings.
//!
//! Five dimensions, each scored in `[0, 1]` and combined with
//! [`SimilarityWeights`]:
//!
//! | Dimension | Signal | Missing data |
//! |-----------|--------|--------------|
//! | Geographic | Same ZIP → 1, else haversine decay, else same city/state → 0.7 | 0.2 |
//! | Price per unit | Relative difference, 30% decay scale | 0.5 |
//! | Units | Relative difference, 40% scale, ×1.2 within a size band | 0.6 |
//! | Vintage | Year difference, 20-year scale | 0.6 |
//! | Property type | Exact → 1, same category → 0.8, else 0.4 | 0.7 |
//!
//! Missing geography defaults low (0.2) so listings without location data
//! are not treated as far apart and boosted for diversity.
//!
//! All branches are symmetric in their arguments, which the selector relies
//! on when it takes the max similarity against already-selected picks.
//!
//! # Example
//!
//! ```rust
//! use rank_listings::candidate::PropertyFeatures;
//! use rank_listings::similarity::{similarity, SimilarityWeights};
//!
//! let a = PropertyFeatures {
//!     zip: Some("78701".into()),
//!     units: Some(12),
//!     vintage: Some(1985),
//!     ..PropertyFeatures::default()
//! };
//! let b = PropertyFeatures { vintage: Some(2015), ..a.clone() };
//!
//! let s = similarity(&a, &b, 5.0, &SimilarityWeights::default());
//! assert!(s > 0.0 && s < 1.0);
//! ```

use serde::{Deserialize, Serialize};

use crate::candidate::PropertyFeatures;
use crate::geo::{exp_decay, haversine_km, relative_difference};
use crate::scoring::clamp01;
use crate::{RecommendError, Result};

/// Neutral scores used when either side lacks the data for a dimension.
pub mod neutral {
    pub const GEOGRAPHIC: f64 = 0.2;
    pub const PRICE_PER_UNIT: f64 = 0.5;
    pub const UNITS: f64 = 0.6;
    pub const VINTAGE: f64 = 0.6;
    pub const PROPERTY_TYPE: f64 = 0.7;
}

/// Geographic score for two listings in the same city and state but without
/// a shared ZIP or coordinates.
pub const SAME_CITY_SIMILARITY: f64 = 0.7;

/// Relative price-per-unit difference at which similarity falls to `1/e`.
pub const PRICE_PER_UNIT_SCALE: f64 = 0.3;

/// Relative unit-count difference at which similarity falls to `1/e`.
pub const UNITS_SCALE: f64 = 0.4;

/// Multiplier for two listings in the same [`UnitBand`].
pub const SAME_BAND_BOOST: f64 = 1.2;

/// Year difference at which similarity falls to `1/e`.
pub const VINTAGE_SCALE_YEARS: f64 = 20.0;

// ─────────────────────────────────────────────────────────────────────────────
// Weights
// ─────────────────────────────────────────────────────────────────────────────

/// Per-dimension weights. Expected to sum to 1; never re-normalized.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityWeights {
    pub geographic: f64,
    pub price_per_unit: f64,
    pub units: f64,
    pub vintage: f64,
    pub property_type: f64,
}

impl SimilarityWeights {
    pub const DEFAULT: Self = Self {
        geographic: 0.35,
        price_per_unit: 0.25,
        units: 0.20,
        vintage: 0.15,
        property_type: 0.05,
    };

    #[must_use]
    pub fn sum(&self) -> f64 {
        self.geographic + self.price_per_unit + self.units + self.vintage + self.property_type
    }

    /// `(name, weight)` pairs in dimension order.
    #[must_use]
    pub fn named(&self) -> [(&'static str, f64); 5] {
        [
            ("geographic", self.geographic),
            ("price_per_unit", self.price_per_unit),
            ("units", self.units),
            ("vintage", self.vintage),
            ("property_type", self.property_type),
        ]
    }

    /// Check that weights are non-negative and sum to 1 (within 1e-6).
    ///
    /// # Errors
    ///
    /// [`RecommendError::InvalidWeight`] for a negative or non-finite weight,
    /// [`RecommendError::WeightsNotNormalized`] when the sum is off.
    pub fn validate(&self) -> Result<()> {
        for (dimension, value) in self.named() {
            if !value.is_finite() || value < 0.0 {
                return Err(RecommendError::InvalidWeight { dimension, value });
            }
        }
        let sum = self.sum();
        if (sum - 1.0).abs() > 1e-6 {
            return Err(RecommendError::WeightsNotNormalized { sum });
        }
        Ok(())
    }
}

impl Default for SimilarityWeights {
    fn default() -> Self {
        Self::DEFAULT
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Categories
// ─────────────────────────────────────────────────────────────────────────────

/// Coarse property-type category used when type strings differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyCategory {
    /// Duplex, triplex, fourplex.
    SmallMultifamily,
    /// Apartment buildings and complexes.
    Apartment,
    CondoTownhouse,
    /// Anything else; the pool is overwhelmingly multifamily.
    GenericMultifamily,
}

impl PropertyCategory {
    #[must_use]
    pub fn classify(property_type: &str) -> Self {
        let t = property_type.to_lowercase();
        if ["duplex", "triplex", "fourplex"].iter().any(|k| t.contains(k)) {
            Self::SmallMultifamily
        } else if t.contains("apartment") || t.contains("complex") {
            Self::Apartment
        } else if t.contains("condo") || t.contains("townhouse") {
            Self::CondoTownhouse
        } else {
            Self::GenericMultifamily
        }
    }
}

/// Multifamily size band by unit count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitBand {
    /// 1–4 units.
    Small,
    /// 5–19 units.
    Medium,
    /// 20–49 units.
    Large,
    /// 50+ units.
    ApartmentComplex,
}

impl UnitBand {
    #[must_use]
    pub const fn from_units(units: u32) -> Self {
        match units {
            0..=4 => Self::Small,
            5..=19 => Self::Medium,
            20..=49 => Self::Large,
            _ => Self::ApartmentComplex,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Dimensions
// ─────────────────────────────────────────────────────────────────────────────

/// Geographic similarity.
#[must_use]
pub fn geographic_similarity(a: &PropertyFeatures, b: &PropertyFeatures, scale_km: f64) -> f64 {
    if let (Some(za), Some(zb)) = (a.zip(), b.zip()) {
        if za == zb {
            return 1.0;
        }
    }
    if let (Some(pa), Some(pb)) = (a.coordinates(), b.coordinates()) {
        return exp_decay(haversine_km(pa, pb), scale_km);
    }
    match (a.city(), a.state(), b.city(), b.state()) {
        (Some(ca), Some(sa), Some(cb), Some(sb))
            if ca.to_lowercase() == cb.to_lowercase() && sa.to_lowercase() == sb.to_lowercase() =>
        {
            SAME_CITY_SIMILARITY
        }
        _ => neutral::GEOGRAPHIC,
    }
}

#[must_use]
pub fn price_per_unit_similarity(a: &PropertyFeatures, b: &PropertyFeatures) -> f64 {
    match (a.price_per_unit(), b.price_per_unit()) {
        (Some(pa), Some(pb)) => exp_decay(relative_difference(pa, pb), PRICE_PER_UNIT_SCALE),
        _ => neutral::PRICE_PER_UNIT,
    }
}

#[must_use]
pub fn units_similarity(a: &PropertyFeatures, b: &PropertyFeatures) -> f64 {
    let (Some(ua), Some(ub)) = (a.units(), b.units()) else {
        return neutral::UNITS;
    };
    let sim = exp_decay(relative_difference(f64::from(ua), f64::from(ub)), UNITS_SCALE);
    if UnitBand::from_units(ua) == UnitBand::from_units(ub) {
        (sim * SAME_BAND_BOOST).min(1.0)
    } else {
        sim
    }
}

#[must_use]
pub fn vintage_similarity(a: &PropertyFeatures, b: &PropertyFeatures) -> f64 {
    match (a.vintage(), b.vintage()) {
        (Some(ya), Some(yb)) => exp_decay(f64::from(ya - yb), VINTAGE_SCALE_YEARS),
        _ => neutral::VINTAGE,
    }
}

#[must_use]
pub fn property_type_similarity(a: &PropertyFeatures, b: &PropertyFeatures) -> f64 {
    let (Some(ta), Some(tb)) = (a.property_type(), b.property_type()) else {
        return neutral::PROPERTY_TYPE;
    };
    if ta.to_lowercase() == tb.to_lowercase() {
        1.0
    } else if PropertyCategory::classify(ta) == PropertyCategory::classify(tb) {
        0.8
    } else {
        0.4
    }
}

/// The five dimension scores for one pair, before weighting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DimensionScores {
    pub geographic: f64,
    pub price_per_unit: f64,
    pub units: f64,
    pub vintage: f64,
    pub property_type: f64,
}

impl DimensionScores {
    /// Score every dimension, each clamped to `[0, 1]`.
    #[must_use]
    pub fn between(a: &PropertyFeatures, b: &PropertyFeatures, geo_scale_km: f64) -> Self {
        Self {
            geographic: clamp01(geographic_similarity(a, b, geo_scale_km)),
            price_per_unit: clamp01(price_per_unit_similarity(a, b)),
            units: clamp01(units_similarity(a, b)),
            vintage: clamp01(vintage_similarity(a, b)),
            property_type: clamp01(property_type_similarity(a, b)),
        }
    }

    /// `(name, score)` pairs in the same order as [`SimilarityWeights::named`].
    #[must_use]
    pub fn named(&self) -> [(&'static str, f64); 5] {
        [
            ("geographic", self.geographic),
            ("price_per_unit", self.price_per_unit),
            ("units", self.units),
            ("vintage", self.vintage),
            ("property_type", self.property_type),
        ]
    }

    /// Weighted sum, clamped to `[0, 1]`.
    #[must_use]
    pub fn combine(&self, weights: &SimilarityWeights) -> f64 {
        clamp01(
            weights.geographic * self.geographic
                + weights.price_per_unit * self.price_per_unit
                + weights.units * self.units
                + weights.vintage * self.vintage
                + weights.property_type * self.property_type,
        )
    }
}

/// Similarity between two listings, in `[0, 1]`.
///
/// Accepts anything that exposes [`PropertyFeatures`], including
/// [`MmrCandidate`](crate::candidate::MmrCandidate).
#[must_use]
pub fn similarity<A, B>(a: &A, b: &B, geo_scale_km: f64, weights: &SimilarityWeights) -> f64
where
    A: AsRef<PropertyFeatures> + ?Sized,
    B: AsRef<PropertyFeatures> + ?Sized,
{
    DimensionScores::between(a.as_ref(), b.as_ref(), geo_scale_km).combine(weights)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::GeoPoint;

    const EPS: f64 = 1e-9;
    const KM_PER_DEGREE_LAT: f64 = std::f64::consts::PI * crate::geo::EARTH_RADIUS_KM / 180.0;

    fn full(zip: &str) -> PropertyFeatures {
        PropertyFeatures {
            zip: Some(zip.into()),
            city: Some("Austin".into()),
            state: Some("TX".into()),
            coordinates: Some(GeoPoint::new(30.2672, -97.7431)),
            price_per_unit: Some(120_000.0),
            units: Some(12),
            vintage: Some(1988),
            property_type: Some("Multi-Family".into()),
        }
    }

    fn at(lat: f64, lon: f64) -> PropertyFeatures {
        PropertyFeatures {
            coordinates: Some(GeoPoint::new(lat, lon)),
            ..PropertyFeatures::default()
        }
    }

    #[test]
    fn default_weights_sum_to_one() {
        assert!((SimilarityWeights::default().sum() - 1.0).abs() < 1e-12);
        assert!(SimilarityWeights::default().validate().is_ok());
    }

    #[test]
    fn invalid_weights_rejected() {
        let negative = SimilarityWeights {
            units: -0.1,
            ..SimilarityWeights::DEFAULT
        };
        assert!(matches!(
            negative.validate(),
            Err(RecommendError::InvalidWeight { dimension: "units", .. })
        ));

        let unnormalized = SimilarityWeights {
            geographic: 0.9,
            ..SimilarityWeights::DEFAULT
        };
        assert!(matches!(
            unnormalized.validate(),
            Err(RecommendError::WeightsNotNormalized { .. })
        ));
    }

    #[test]
    fn identical_listing_is_fully_similar() {
        let a = full("78701");
        let s = similarity(&a, &a, 5.0, &SimilarityWeights::default());
        assert!((s - 1.0).abs() < 1e-12, "got {s}");
    }

    #[test]
    fn all_missing_uses_neutral_defaults() {
        let a = PropertyFeatures::default();
        let dims = DimensionScores::between(&a, &a, 5.0);
        assert_eq!(dims.geographic, neutral::GEOGRAPHIC);
        assert_eq!(dims.price_per_unit, neutral::PRICE_PER_UNIT);
        assert_eq!(dims.units, neutral::UNITS);
        assert_eq!(dims.vintage, neutral::VINTAGE);
        assert_eq!(dims.property_type, neutral::PROPERTY_TYPE);
        let s = similarity(&a, &a, 5.0, &SimilarityWeights::default());
        assert!((s - 0.44).abs() < EPS);
    }

    #[test]
    fn same_zip_beats_distance() {
        let mut a = full("78701");
        let mut b = full("78701");
        a.coordinates = Some(GeoPoint::new(30.0, -97.0));
        b.coordinates = Some(GeoPoint::new(31.0, -97.0));
        assert_eq!(geographic_similarity(&a, &b, 5.0), 1.0);
    }

    #[test]
    fn geographic_decay_with_distance() {
        let origin = at(30.0, -97.0);
        let one_km = at(30.0 + 1.0 / KM_PER_DEGREE_LAT, -97.0);
        let fifty_km = at(30.0 + 50.0 / KM_PER_DEGREE_LAT, -97.0);

        let near = geographic_similarity(&origin, &one_km, 5.0);
        let far = geographic_similarity(&origin, &fifty_km, 5.0);
        assert!((near - (-0.2f64).exp()).abs() < 1e-6);
        assert!((far - (-10.0f64).exp()).abs() < 1e-6);
        assert!(near > far);

        // a wider scale keeps distant listings similar longer
        assert!(geographic_similarity(&origin, &fifty_km, 50.0) > far);
    }

    #[test]
    fn city_state_match_is_case_insensitive() {
        let a = PropertyFeatures {
            city: Some("Austin".into()),
            state: Some("TX".into()),
            ..PropertyFeatures::default()
        };
        let b = PropertyFeatures {
            city: Some("AUSTIN".into()),
            state: Some("tx".into()),
            ..PropertyFeatures::default()
        };
        assert_eq!(geographic_similarity(&a, &b, 5.0), SAME_CITY_SIMILARITY);

        let c = PropertyFeatures {
            city: Some("Dallas".into()),
            ..b
        };
        assert_eq!(geographic_similarity(&a, &c, 5.0), neutral::GEOGRAPHIC);
    }

    #[test]
    fn price_per_unit_relative_decay() {
        let a = PropertyFeatures {
            price_per_unit: Some(100_000.0),
            ..PropertyFeatures::default()
        };
        let b = PropertyFeatures {
            price_per_unit: Some(70_000.0),
            ..PropertyFeatures::default()
        };
        // 30% relative difference → 1/e
        assert!((price_per_unit_similarity(&a, &b) - (-1.0f64).exp()).abs() < EPS);
        assert_eq!(
            price_per_unit_similarity(&a, &PropertyFeatures::default()),
            neutral::PRICE_PER_UNIT
        );
    }

    #[test]
    fn units_band_boost() {
        let units = |u| PropertyFeatures {
            units: Some(u),
            ..PropertyFeatures::default()
        };
        // same band (medium): boosted
        let same = units_similarity(&units(10), &units(12));
        assert!((same - (-(2.0 / 12.0) / 0.4f64).exp() * 1.2).abs() < EPS);
        // across bands (small vs medium): not boosted
        let across = units_similarity(&units(4), &units(5));
        assert!((across - (-0.5f64).exp()).abs() < EPS);
        // boost is capped
        assert_eq!(units_similarity(&units(8), &units(8)), 1.0);
    }

    #[test]
    fn unit_bands() {
        assert_eq!(UnitBand::from_units(4), UnitBand::Small);
        assert_eq!(UnitBand::from_units(5), UnitBand::Medium);
        assert_eq!(UnitBand::from_units(19), UnitBand::Medium);
        assert_eq!(UnitBand::from_units(20), UnitBand::Large);
        assert_eq!(UnitBand::from_units(49), UnitBand::Large);
        assert_eq!(UnitBand::from_units(50), UnitBand::ApartmentComplex);
    }

    #[test]
    fn vintage_twenty_year_scale() {
        let year = |y| PropertyFeatures {
            vintage: Some(y),
            ..PropertyFeatures::default()
        };
        assert!((vintage_similarity(&year(1960), &year(1980)) - (-1.0f64).exp()).abs() < EPS);
        assert_eq!(vintage_similarity(&year(1960), &PropertyFeatures::default()), 0.6);
    }

    #[test]
    fn property_type_categories() {
        let ty = |t: &str| PropertyFeatures {
            property_type: Some(t.into()),
            ..PropertyFeatures::default()
        };
        assert_eq!(property_type_similarity(&ty("Multi-Family"), &ty("multi-family")), 1.0);
        assert_eq!(property_type_similarity(&ty("Duplex"), &ty("Triplex")), 0.8);
        assert_eq!(property_type_similarity(&ty("Apartment"), &ty("Condo")), 0.4);
        assert_eq!(property_type_similarity(&ty("5+ Units"), &ty("Multifamily")), 0.8);
        assert_eq!(
            property_type_similarity(&ty("Duplex"), &PropertyFeatures::default()),
            neutral::PROPERTY_TYPE
        );
    }

    #[test]
    fn classify_categories() {
        assert_eq!(PropertyCategory::classify("FOURPLEX"), PropertyCategory::SmallMultifamily);
        assert_eq!(PropertyCategory::classify("Garden Complex"), PropertyCategory::Apartment);
        assert_eq!(PropertyCategory::classify("Townhouse"), PropertyCategory::CondoTownhouse);
        assert_eq!(PropertyCategory::classify("Mixed Use"), PropertyCategory::GenericMultifamily);
    }

    #[test]
    fn similarity_accepts_candidates() {
        use crate::candidate::MmrCandidate;
        let a = MmrCandidate::new("a", 0.9, full("78701"));
        let b = MmrCandidate::new("b", 0.8, full("78702"));
        let s = similarity(&a, &b, 5.0, &SimilarityWeights::default());
        assert!((0.0..=1.0).contains(&s));
        assert!((s - similarity(&a.features, &b.features, 5.0, &SimilarityWeights::default())).abs() < EPS);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn features() -> impl Strategy<Value = PropertyFeatures> {
            (
                proptest::option::of(prop_oneof!["7870[0-3]", "9021[0-1]", ""]),
                proptest::option::of(prop_oneof!["Austin", "austin", "Dallas"]),
                proptest::option::of(prop_oneof!["TX", "tx"]),
                proptest::option::of((25.0f64..49.0, -124.0f64..-67.0)),
                proptest::option::of(-1_000.0f64..500_000.0),
                proptest::option::of(0u32..300),
                proptest::option::of(1850i32..2030),
                proptest::option::of(prop_oneof![
                    "Duplex", "Triplex", "Apartment", "Condo", "Multi-Family", "Townhouse"
                ]),
            )
                .prop_map(|(zip, city, state, coords, ppu, units, vintage, ty)| PropertyFeatures {
                    zip,
                    city,
                    state,
                    coordinates: coords.map(|(lat, lon)| GeoPoint::new(lat, lon)),
                    price_per_unit: ppu,
                    units,
                    vintage,
                    property_type: ty,
                })
        }

        fn weights() -> impl Strategy<Value = SimilarityWeights> {
            proptest::collection::vec(0.0f64..1.0, 5).prop_filter_map("non-zero", |w| {
                let sum: f64 = w.iter().sum();
                (sum > 1e-6).then(|| SimilarityWeights {
                    geographic: w[0] / sum,
                    price_per_unit: w[1] / sum,
                    units: w[2] / sum,
                    vintage: w[3] / sum,
                    property_type: w[4] / sum,
                })
            })
        }

        proptest! {
            #[test]
            fn similarity_bounded(a in features(), b in features(), w in weights(), scale in 0.1f64..100.0) {
                let s = similarity(&a, &b, scale, &w);
                prop_assert!((0.0..=1.0).contains(&s), "out of range: {}", s);
            }

            #[test]
            fn similarity_symmetric(a in features(), b in features(), w in weights(), scale in 0.1f64..100.0) {
                let ab = similarity(&a, &b, scale, &w);
                let ba = similarity(&b, &a, scale, &w);
                prop_assert!((ab - ba).abs() < 1e-12, "{} != {}", ab, ba);
            }

            #[test]
            fn every_dimension_bounded(a in features(), b in features()) {
                for (name, v) in DimensionScores::between(&a, &b, 5.0).named() {
                    prop_assert!((0.0..=1.0).contains(&v), "{} out of range: {}", name, v);
                }
            }
        }
    }
}
