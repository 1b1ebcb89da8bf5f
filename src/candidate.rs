//! Listing records and the working candidates derived from them.
//!
//! A [`Property`] is a read-only snapshot from the listing source. Scoring
//! turns it into an [`MmrCandidate`]: an id, a relevance score, the reasons
//! behind that score, and the [`PropertyFeatures`] the similarity engine
//! compares.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::GeoPoint;
use crate::scoring::{format_thousands, RelevanceComponents, RelevanceScore};

/// Average multifamily unit size used to estimate a missing unit count.
pub const SQFT_PER_ESTIMATED_UNIT: f64 = 900.0;

/// Penalty applied when units are estimated from square footage.
pub const ESTIMATED_UNITS_PENALTY: f64 = 0.02;

/// Penalty applied when units are unknown.
pub const MISSING_UNITS_PENALTY: f64 = 0.08;

/// One listing as delivered by the data source.
///
/// Every attribute except the id is optional; deal-signal flags default to
/// `false`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Property {
    pub property_id: String,

    pub address_street: Option<String>,
    pub address_city: Option<String>,
    pub address_state: Option<String>,
    pub address_zip: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,

    pub property_type: Option<String>,
    pub units_count: Option<u32>,
    pub year_built: Option<i32>,
    pub square_feet: Option<f64>,

    pub assessed_value: Option<f64>,
    pub estimated_value: Option<f64>,
    pub estimated_equity: Option<f64>,
    pub listing_price: Option<f64>,

    pub mls_active: bool,
    pub for_sale: bool,
    pub auction: bool,
    pub reo: bool,
    pub pre_foreclosure: bool,
    pub tax_lien: bool,
    pub private_lender: bool,
    pub last_sale_arms_length: bool,
    pub years_owned: Option<f64>,

    pub out_of_state_absentee_owner: bool,
    pub in_state_absentee_owner: bool,
    pub corporate_owned: bool,

    /// user id → when this listing was last shown to that user.
    pub last_shown_to_users: HashMap<String, DateTime<Utc>>,
}

impl Property {
    /// A bare record with only an id; handy as a struct-update base.
    #[must_use]
    pub fn new(property_id: impl Into<String>) -> Self {
        Self {
            property_id: property_id.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn coordinates(&self) -> Option<GeoPoint> {
        GeoPoint::from_parts(self.latitude, self.longitude)
    }

    #[must_use]
    pub fn is_absentee_owned(&self) -> bool {
        self.out_of_state_absentee_owner || self.in_state_absentee_owner
    }

    #[must_use]
    pub fn is_listed(&self) -> bool {
        self.mls_active || self.for_sale
    }
}

/// The price used for fit and price-per-unit: listing, else estimated,
/// else assessed value.
#[must_use]
pub fn price_anchor(property: &Property) -> Option<f64> {
    property
        .listing_price
        .or(property.estimated_value)
        .or(property.assessed_value)
}

/// Unit count with provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitEstimate {
    pub units: Option<u32>,
    /// Subtracted from the final relevance score.
    pub penalty: f64,
    pub reasons: Vec<String>,
}

/// Resolve a property's unit count, estimating it from square footage for
/// multifamily listings that lack one.
#[must_use]
pub fn estimate_units(property: &Property) -> UnitEstimate {
    if let Some(units) = property.units_count.filter(|&u| u > 0) {
        return UnitEstimate {
            units: Some(units),
            penalty: 0.0,
            reasons: Vec::new(),
        };
    }

    let is_multi = property
        .property_type
        .as_deref()
        .is_some_and(|t| t.to_lowercase().contains("multi"));
    let sqft = property.square_feet.unwrap_or(0.0);

    if is_multi && sqft > 0.0 {
        let estimated = ((sqft / SQFT_PER_ESTIMATED_UNIT).round() as u32).max(2);
        return UnitEstimate {
            units: Some(estimated),
            penalty: ESTIMATED_UNITS_PENALTY,
            reasons: vec![format!(
                "Estimated {estimated} units from {} sq ft",
                format_thousands(sqft)
            )],
        };
    }

    UnitEstimate {
        units: None,
        penalty: MISSING_UNITS_PENALTY,
        reasons: vec!["Unit count unavailable".to_string()],
    }
}

/// Price anchor divided by units, when both are positive.
#[must_use]
pub fn price_per_unit(property: &Property, units: Option<u32>) -> Option<f64> {
    let price = price_anchor(property).filter(|p| p.is_finite() && *p > 0.0)?;
    let units = units.filter(|&u| u > 0)?;
    Some(price / f64::from(units))
}

/// The fields the similarity engine compares.
///
/// Accessors apply the missing-data rules: blank strings, non-positive
/// numbers, and half-present coordinates all read as `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyFeatures {
    pub zip: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub coordinates: Option<GeoPoint>,
    pub price_per_unit: Option<f64>,
    pub units: Option<u32>,
    pub vintage: Option<i32>,
    pub property_type: Option<String>,
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.trim().is_empty())
}

impl PropertyFeatures {
    /// Derive features from a listing with an already-resolved unit count.
    #[must_use]
    pub fn from_property(property: &Property, units: Option<u32>) -> Self {
        Self {
            zip: property.address_zip.clone(),
            city: property.address_city.clone(),
            state: property.address_state.clone(),
            coordinates: property.coordinates(),
            price_per_unit: price_per_unit(property, units),
            units,
            vintage: property.year_built,
            property_type: property.property_type.clone(),
        }
    }

    #[must_use]
    pub fn zip(&self) -> Option<&str> {
        non_blank(&self.zip)
    }

    #[must_use]
    pub fn city(&self) -> Option<&str> {
        non_blank(&self.city)
    }

    #[must_use]
    pub fn state(&self) -> Option<&str> {
        non_blank(&self.state)
    }

    #[must_use]
    pub fn property_type(&self) -> Option<&str> {
        non_blank(&self.property_type)
    }

    #[must_use]
    pub fn coordinates(&self) -> Option<GeoPoint> {
        self.coordinates
            .filter(|p| p.lat.is_finite() && p.lon.is_finite())
    }

    #[must_use]
    pub fn price_per_unit(&self) -> Option<f64> {
        self.price_per_unit.filter(|p| p.is_finite() && *p > 0.0)
    }

    #[must_use]
    pub fn units(&self) -> Option<u32> {
        self.units.filter(|&u| u > 0)
    }

    #[must_use]
    pub fn vintage(&self) -> Option<i32> {
        self.vintage.filter(|&y| y > 0)
    }
}

impl AsRef<PropertyFeatures> for PropertyFeatures {
    fn as_ref(&self) -> &PropertyFeatures {
        self
    }
}

/// A scored listing, ready for MMR selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MmrCandidate {
    pub property_id: String,
    /// Relevance to the user, in `[0, 1]` for the default scorer.
    pub relevance: f64,
    pub price: Option<f64>,
    pub features: PropertyFeatures,
    /// Human-readable justification, most important first.
    pub why_recommended: Vec<String>,
    /// Component breakdown, when produced by a relevance model.
    pub components: Option<RelevanceComponents>,
}

impl MmrCandidate {
    #[must_use]
    pub fn new(property_id: impl Into<String>, relevance: f64, features: PropertyFeatures) -> Self {
        Self {
            property_id: property_id.into(),
            relevance,
            price: None,
            features,
            why_recommended: Vec::new(),
            components: None,
        }
    }

    #[must_use]
    pub fn with_reasons(mut self, reasons: Vec<String>) -> Self {
        self.why_recommended = reasons;
        self
    }

    /// Attach a relevance result to the listing it was computed for.
    #[must_use]
    pub fn from_scored(property: &Property, score: RelevanceScore) -> Self {
        let units = estimate_units(property).units;
        Self {
            property_id: property.property_id.clone(),
            relevance: score.score,
            price: price_anchor(property),
            features: PropertyFeatures::from_property(property, units),
            why_recommended: score.reasoning,
            components: Some(score.components),
        }
    }

    #[must_use]
    pub fn zip(&self) -> Option<&str> {
        self.features.zip()
    }
}

impl AsRef<PropertyFeatures> for MmrCandidate {
    fn as_ref(&self) -> &PropertyFeatures {
        &self.features
    }
}
