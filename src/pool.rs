//! Candidate-pool preparation.
//!
//! Runs before relevance scoring: drops listings the user already saved,
//! listings outside the buy box, and listings shown too recently. After
//! scoring, [`cap_pool`] keeps the most relevant slice for selection.

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::batch::UserRequest;
use crate::candidate::{MmrCandidate, Property};
use crate::diversity::MmrConfig;
use crate::market::market_matches;
use crate::scoring::BuyBox;
use crate::sort_by_relevance_desc;

fn within<T: PartialOrd>(value: Option<T>, min: Option<T>, max: Option<T>) -> bool {
    if min.is_none() && max.is_none() {
        return true;
    }
    let Some(value) = value else {
        return false;
    };
    min.map_or(true, |lo| value >= lo) && max.map_or(true, |hi| value <= hi)
}

impl BuyBox {
    /// Range filters applied when building the candidate pool.
    ///
    /// A bound is only checked when set; a listing missing the attribute
    /// fails any set bound. Price is checked against estimated value.
    #[must_use]
    pub fn admits(&self, property: &Property) -> bool {
        if !self.markets.is_empty() && !self.markets.iter().any(|m| market_matches(m, property)) {
            return false;
        }
        within(property.estimated_value, self.price_min, self.price_max)
            && within(property.units_count, self.units_min, self.units_max)
            && within(property.year_built, self.year_min, self.year_max)
    }
}

/// False when the listing was shown to `user_id` within the last
/// `window_weeks` weeks.
#[must_use]
pub fn is_resurfaceable(
    property: &Property,
    user_id: &str,
    now: DateTime<Utc>,
    window_weeks: u32,
) -> bool {
    match property.last_shown_to_users.get(user_id) {
        None => true,
        Some(&shown) => now - shown >= Duration::weeks(i64::from(window_weeks)),
    }
}

/// Filter the raw listings down to those eligible for this user.
#[must_use]
pub fn prepare_pool<'a>(
    properties: &'a [Property],
    request: &UserRequest,
    config: &MmrConfig,
    now: DateTime<Utc>,
) -> Vec<&'a Property> {
    let (mut saved, mut outside, mut cooling) = (0usize, 0usize, 0usize);

    let pool: Vec<&Property> = properties
        .iter()
        .filter(|p| {
            if request.saved_property_ids.contains(&p.property_id) {
                saved += 1;
                false
            } else if !request.buy_box.admits(p) {
                outside += 1;
                false
            } else if !is_resurfaceable(p, &request.user_id, now, config.resurface_window_weeks) {
                cooling += 1;
                false
            } else {
                true
            }
        })
        .collect();

    debug!(
        user_id = %request.user_id,
        total = properties.len(),
        eligible = pool.len(),
        saved,
        outside_buy_box = outside,
        in_cooldown = cooling,
        "prepared candidate pool"
    );
    pool
}

/// Keep the `size` most relevant candidates, stable on ties.
#[must_use]
pub fn cap_pool(mut candidates: Vec<MmrCandidate>, size: usize) -> Vec<MmrCandidate> {
    sort_by_relevance_desc(&mut candidates);
    candidates.truncate(size);
    candidates
}
