//! Greedy MMR selection with a per-ZIP cap.
//!
//! Picks a slate that balances relevance against redundancy. Each round
//! takes the candidate maximizing
//!
//! ```text
//! λ · relevance − (1 − λ) · max_{s ∈ selected} similarity(candidate, s)
//! ```
//!
//! among candidates whose ZIP has not yet hit `max_per_zip`.
//!
//! # Lambda Guide
//!
//! | Value | Behavior |
//! |-------|----------|
//! | 1.0 | Plain top-k by relevance |
//! | 0.7 | Default: mostly relevance, penalize near-duplicates |
//! | 0.5 | Balanced; used once a user shows a taste for variety |
//! | 0.0 | Pure spread; first pick is still the most relevant |
//!
//! # The Clustering Problem
//!
//! A good buy box in a hot market often yields a dozen fourplexes on the
//! same few blocks. Without a penalty the slate is nine variations on one
//! listing:
//!
//! ```text
//! Top-k (λ=1.0):              MMR (λ=0.7, max 2/ZIP):
//! 1. 12u 1984  78704          1. 12u 1984  78704
//! 2. 12u 1986  78704          2. 24u 2005  78745
//! 3. 10u 1985  78704          3. 12u 1986  78704
//! 4. 12u 1983  78704          4. 6u  1962  78702
//! ```
//!
//! # Determinism
//!
//! Candidates are stable-sorted by relevance first and compared with a strict
//! `>`, so the earliest candidate wins ties. Same input, same slate.
//!
//! # Example
//!
//! ```rust
//! use rank_listings::candidate::{MmrCandidate, PropertyFeatures};
//! use rank_listings::diversity::{select_mmr_recommendations, MmrConfig};
//! use rank_listings::similarity::SimilarityWeights;
//!
//! let in_zip = |zip: &str| PropertyFeatures { zip: Some(zip.into()), ..Default::default() };
//! let pool = vec![
//!     MmrCandidate::new("a", 0.95, in_zip("90210")),
//!     MmrCandidate::new("b", 0.94, in_zip("90210")),
//!     MmrCandidate::new("c", 0.93, in_zip("90210")),
//!     MmrCandidate::new("d", 0.50, in_zip("10001")),
//! ];
//!
//! let config = MmrConfig::default().with_k(3).with_max_per_zip(2);
//! let slate = select_mmr_recommendations(&pool, &config, &SimilarityWeights::default());
//!
//! let ids: Vec<_> = slate.iter().map(|c| c.property_id.as_str()).collect();
//! assert_eq!(ids, ["a", "b", "d"]); // "c" is blocked by the ZIP cap
//! ```

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::candidate::MmrCandidate;
use crate::similarity::{similarity, SimilarityWeights};
use crate::{sort_by_relevance_desc, RecommendError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Selection parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MmrConfig {
    /// Slate size.
    pub k: usize,
    /// Relevance/diversity trade-off in `[0, 1]`. 1 is pure relevance.
    pub lambda: f64,
    /// Maximum picks sharing a ZIP. Listings without a ZIP are never capped.
    pub max_per_zip: usize,
    /// Distance at which geographic similarity falls to `1/e`.
    pub geo_diversity_scale_km: f64,
    /// Weeks before a listing shown to a user may be shown again.
    pub resurface_window_weeks: u32,
    /// Candidates kept (by relevance) before selection.
    pub candidate_pool_size: usize,
}

impl MmrConfig {
    pub const DEFAULT: Self = Self {
        k: 9,
        lambda: 0.7,
        max_per_zip: 2,
        geo_diversity_scale_km: 5.0,
        resurface_window_weeks: 8,
        candidate_pool_size: 200,
    };

    #[must_use]
    pub const fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    #[must_use]
    pub const fn with_lambda(mut self, lambda: f64) -> Self {
        self.lambda = lambda;
        self
    }

    #[must_use]
    pub const fn with_max_per_zip(mut self, max_per_zip: usize) -> Self {
        self.max_per_zip = max_per_zip;
        self
    }

    #[must_use]
    pub const fn with_geo_scale_km(mut self, scale_km: f64) -> Self {
        self.geo_diversity_scale_km = scale_km;
        self
    }

    #[must_use]
    pub const fn with_resurface_window_weeks(mut self, weeks: u32) -> Self {
        self.resurface_window_weeks = weeks;
        self
    }

    #[must_use]
    pub const fn with_candidate_pool_size(mut self, size: usize) -> Self {
        self.candidate_pool_size = size;
        self
    }

    /// # Errors
    ///
    /// [`RecommendError::InvalidLambda`] when `lambda` is outside `[0, 1]`,
    /// [`RecommendError::InvalidGeoScale`] when the scale is not a positive
    /// finite number.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.lambda) {
            return Err(RecommendError::InvalidLambda {
                lambda: self.lambda,
            });
        }
        if !self.geo_diversity_scale_km.is_finite() || self.geo_diversity_scale_km <= 0.0 {
            return Err(RecommendError::InvalidGeoScale {
                scale_km: self.geo_diversity_scale_km,
            });
        }
        Ok(())
    }
}

impl Default for MmrConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Selection
// ─────────────────────────────────────────────────────────────────────────────

/// One pick with the scores it was chosen on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub candidate: MmrCandidate,
    /// `λ · relevance − (1 − λ) · max_similarity` at the time of the pick.
    pub mmr_score: f64,
    /// Highest similarity to any earlier pick; 0 for the first.
    pub max_similarity: f64,
}

impl Selection {
    /// `1 − max_similarity`.
    #[must_use]
    pub fn diversity(&self) -> f64 {
        1.0 - self.max_similarity
    }
}

#[inline]
fn mmr_score(lambda: f64, relevance: f64, max_similarity: f64) -> f64 {
    lambda * relevance - (1.0 - lambda) * max_similarity
}

/// Select a diverse slate of at most `config.k` candidates.
///
/// A pool no larger than `k` is returned as-is, in input order, with no
/// ZIP filtering. Otherwise candidates whose objective is NaN or `-inf`
/// are never picked, so such a pool can yield a short slate.
///
/// # Complexity
///
/// O(k × n) similarity evaluations: each candidate's max similarity is
/// updated against the latest pick only.
#[must_use]
pub fn select_mmr_recommendations(
    candidates: &[MmrCandidate],
    config: &MmrConfig,
    weights: &SimilarityWeights,
) -> Vec<MmrCandidate> {
    select_scored(candidates, config, weights)
        .into_iter()
        .map(|s| s.candidate)
        .collect()
}

/// Fallible version of [`select_mmr_recommendations`]: validates the config
/// and weights first.
///
/// # Errors
///
/// Whatever [`MmrConfig::validate`] or [`SimilarityWeights::validate`]
/// reports.
pub fn try_select(
    candidates: &[MmrCandidate],
    config: &MmrConfig,
    weights: &SimilarityWeights,
) -> Result<Vec<MmrCandidate>> {
    config.validate()?;
    weights.validate()?;
    Ok(select_mmr_recommendations(candidates, config, weights))
}

/// Like [`select_mmr_recommendations`] but keeps each pick's scores.
///
/// For a pool no larger than `k`, scores are computed over the input order.
#[must_use]
pub fn select_scored(
    candidates: &[MmrCandidate],
    config: &MmrConfig,
    weights: &SimilarityWeights,
) -> Vec<Selection> {
    let lambda = config.lambda;
    let scale = config.geo_diversity_scale_km;

    if candidates.len() <= config.k {
        debug!(
            pool = candidates.len(),
            k = config.k,
            "pool within slate size, returning as-is"
        );
        return candidates
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let max_similarity = candidates[..i]
                    .iter()
                    .map(|prev| similarity(c, prev, scale, weights))
                    .fold(0.0, f64::max);
                Selection {
                    candidate: c.clone(),
                    mmr_score: mmr_score(lambda, c.relevance, max_similarity),
                    max_similarity,
                }
            })
            .collect();
    }

    let mut remaining = candidates.to_vec();
    sort_by_relevance_desc(&mut remaining);
    // running max similarity to the slate, parallel to `remaining`
    let mut max_sims = vec![0.0_f64; remaining.len()];

    let mut selected: Vec<Selection> = Vec::with_capacity(config.k);
    let mut zip_counts: HashMap<String, usize> = HashMap::new();

    debug!(
        pool = remaining.len(),
        k = config.k,
        lambda,
        max_per_zip = config.max_per_zip,
        "running MMR selection"
    );

    while selected.len() < config.k {
        // strict `>` from -inf: NaN and -inf objectives never win
        let mut best: Option<usize> = None;
        let mut best_score = f64::NEG_INFINITY;

        for (pos, cand) in remaining.iter().enumerate() {
            if let Some(zip) = cand.zip() {
                if zip_counts.get(zip).copied().unwrap_or(0) >= config.max_per_zip {
                    continue;
                }
            }
            let score = mmr_score(lambda, cand.relevance, max_sims[pos]);
            if score > best_score {
                best = Some(pos);
                best_score = score;
            }
        }

        let Some(pos) = best else {
            debug!(
                selected = selected.len(),
                "no eligible candidates left, returning short slate"
            );
            break;
        };

        // `remove` keeps relevance order for tie-breaking
        let chosen = remaining.remove(pos);
        let chosen_sim = max_sims.remove(pos);
        if let Some(zip) = chosen.zip() {
            *zip_counts.entry(zip.to_string()).or_insert(0) += 1;
        }

        for (cand, max_sim) in remaining.iter().zip(max_sims.iter_mut()) {
            let s = similarity(cand, &chosen, scale, weights);
            if s > *max_sim {
                *max_sim = s;
            }
        }

        trace!(
            property_id = %chosen.property_id,
            relevance = chosen.relevance,
            max_similarity = chosen_sim,
            mmr_score = best_score,
            "selected"
        );
        selected.push(Selection {
            candidate: chosen,
            mmr_score: best_score,
            max_similarity: chosen_sim,
        });
    }

    selected
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────


// ─────────────────────────────────────────────────────────────────────────────
// Property Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod proptests {
    use super::*;
    use crate::candidate::PropertyFeatures;
    use proptest::prelude::*;
    use std::collections::HashSet;

    fn pool() -> impl Strategy<Value = Vec<MmrCandidate>> {
        proptest::collection::vec(
            (
                0.0f64..1.0,
                proptest::option::of(prop_oneof!["78701", "78702", "78703"]),
                proptest::option::of(1u32..100),
                proptest::option::of(1900i32..2025),
            ),
            0..40,
        )
        .prop_map(|rows| {
            rows.into_iter()
                .enumerate()
                .map(|(i, (relevance, zip, units, vintage))| {
                    MmrCandidate::new(
                        format!("p{i}"),
                        relevance,
                        PropertyFeatures {
                            zip,
                            units,
                            vintage,
                            ..PropertyFeatures::default()
                        },
                    )
                })
                .collect()
        })
    }

    proptest! {
        /// Slate never exceeds k
        #[test]
        fn slate_size_bounded(pool in pool(), k in 0usize..15, lambda in 0.0f64..=1.0) {
            let config = MmrConfig::default().with_k(k).with_lambda(lambda);
            let slate = select_mmr_recommendations(&pool, &config, &SimilarityWeights::default());
            prop_assert!(slate.len() <= k);
            prop_assert!(slate.len() <= pool.len());
        }

        /// No listing picked twice, every pick comes from the pool
        #[test]
        fn no_duplicates(pool in pool(), k in 0usize..15) {
            let config = MmrConfig::default().with_k(k);
            let slate = select_mmr_recommendations(&pool, &config, &SimilarityWeights::default());
            let input: HashSet<&str> = pool.iter().map(|c| c.property_id.as_str()).collect();
            let mut seen = HashSet::new();
            for c in &slate {
                prop_assert!(seen.insert(c.property_id.as_str()), "duplicate {}", c.property_id);
                prop_assert!(input.contains(c.property_id.as_str()));
            }
        }

        /// Per-ZIP cap holds whenever selection actually runs
        #[test]
        fn zip_cap_respected(pool in pool(), k in 0usize..15, cap in 0usize..4) {
            prop_assume!(pool.len() > k);
            let config = MmrConfig::default().with_k(k).with_max_per_zip(cap);
            let slate = select_mmr_recommendations(&pool, &config, &SimilarityWeights::default());
            let mut counts: HashMap<&str, usize> = HashMap::new();
            for c in &slate {
                if let Some(zip) = c.zip() {
                    *counts.entry(zip).or_insert(0) += 1;
                }
            }
            for (zip, n) in counts {
                prop_assert!(n <= cap, "{} picks in {} (cap {})", n, zip, cap);
            }
        }

        /// λ=0: each later pick is the remaining candidate least similar to the slate
        #[test]
        fn lambda_zero_minimizes_max_similarity(pool in pool(), k in 2usize..10) {
            prop_assume!(pool.len() > k);
            let weights = SimilarityWeights::default();
            let config = MmrConfig::default()
                .with_k(k)
                .with_lambda(0.0)
                .with_max_per_zip(usize::MAX);
            let scale = config.geo_diversity_scale_km;
            let picks = select_scored(&pool, &config, &weights);
            prop_assert_eq!(picks.len(), k);

            let max_sim_to = |c: &MmrCandidate, slate: &[Selection]| {
                slate
                    .iter()
                    .map(|s| similarity(c, &s.candidate, scale, &weights))
                    .fold(0.0, f64::max)
            };
            for i in 1..picks.len() {
                let (earlier, rest) = picks.split_at(i);
                let chosen = max_sim_to(&rest[0].candidate, earlier);
                prop_assert!((chosen - rest[0].max_similarity).abs() < 1e-12);

                let taken: HashSet<&str> = earlier
                    .iter()
                    .map(|s| s.candidate.property_id.as_str())
                    .collect();
                for c in pool.iter().filter(|c| !taken.contains(c.property_id.as_str())) {
                    let other = max_sim_to(c, earlier);
                    prop_assert!(
                        chosen <= other + 1e-12,
                        "pick {} ({}) has max sim {} but {} has {}",
                        i, rest[0].candidate.property_id, chosen, c.property_id, other
                    );
                }
            }
        }

        /// λ=1 reduces to relevance order
        #[test]
        fn lambda_one_sorted(pool in pool(), k in 0usize..15) {
            prop_assume!(pool.len() > k);
            let config = MmrConfig::default().with_k(k).with_lambda(1.0).with_max_per_zip(usize::MAX);
            let slate = select_mmr_recommendations(&pool, &config, &SimilarityWeights::default());
            prop_assert_eq!(slate.len(), k);
            for w in slate.windows(2) {
                prop_assert!(w[0].relevance >= w[1].relevance);
            }
        }
    }
}
