//! Explainability for similarity and selection.
//!
//! Shows which dimensions make two listings alike, and for each pick in a
//! slate, which earlier pick it is closest to and how it still differs.

use serde::Serialize;

use crate::candidate::PropertyFeatures;
use crate::diversity::Selection;
use crate::similarity::{DimensionScores, SimilarityWeights};

/// Per-dimension view of one similarity computation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SimilarityBreakdown {
    pub scores: DimensionScores,
    pub weights: SimilarityWeights,
    /// Same value [`similarity`](crate::similarity::similarity) returns.
    pub total: f64,
}

impl SimilarityBreakdown {
    /// `weight × score` per dimension.
    #[must_use]
    pub fn contributions(&self) -> [(&'static str, f64); 5] {
        let scores = self.scores.named();
        let weights = self.weights.named();
        std::array::from_fn(|i| (scores[i].0, scores[i].1 * weights[i].1))
    }

    /// Dimension with the largest weighted dissimilarity, `weight × (1 − score)`.
    ///
    /// Ties go to the earlier dimension in [`DimensionScores::named`] order.
    #[must_use]
    pub fn most_different(&self) -> (&'static str, f64) {
        let scores = self.scores.named();
        let weights = self.weights.named();
        let mut best = (scores[0].0, weights[0].1 * (1.0 - scores[0].1));
        for i in 1..scores.len() {
            let gap = weights[i].1 * (1.0 - scores[i].1);
            if gap > best.1 {
                best = (scores[i].0, gap);
            }
        }
        best
    }
}

/// Compute similarity with a per-dimension breakdown.
///
/// # Example
///
/// ```rust
/// use rank_listings::candidate::PropertyFeatures;
/// use rank_listings::explain::similarity_explained;
/// use rank_listings::similarity::{similarity, SimilarityWeights};
///
/// let a = PropertyFeatures { zip: Some("78701".into()), units: Some(8), ..Default::default() };
/// let b = PropertyFeatures { zip: Some("78745".into()), units: Some(8), ..Default::default() };
/// let w = SimilarityWeights::default();
///
/// let explained = similarity_explained(&a, &b, 5.0, &w);
/// assert_eq!(explained.total, similarity(&a, &b, 5.0, &w));
/// assert_eq!(explained.most_different().0, "geographic");
/// ```
#[must_use]
pub fn similarity_explained<A, B>(
    a: &A,
    b: &B,
    geo_scale_km: f64,
    weights: &SimilarityWeights,
) -> SimilarityBreakdown
where
    A: AsRef<PropertyFeatures> + ?Sized,
    B: AsRef<PropertyFeatures> + ?Sized,
{
    let scores = DimensionScores::between(a.as_ref(), b.as_ref(), geo_scale_km);
    SimilarityBreakdown {
        scores,
        weights: *weights,
        total: scores.combine(weights),
    }
}

/// Why one pick earned its place in the slate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PickExplanation {
    pub property_id: String,
    /// 0-based position in the slate.
    pub position: usize,
    /// Most similar earlier pick, if any.
    pub nearest: Option<String>,
    /// Breakdown against `nearest`.
    pub breakdown: Option<SimilarityBreakdown>,
    /// Dimension that most separates this pick from `nearest`.
    pub most_different: Option<&'static str>,
    pub reason: String,
}

fn dimension_phrase(dimension: &str) -> &'static str {
    match dimension {
        "geographic" => "Different area",
        "price_per_unit" => "Different price point",
        "units" => "Different building size",
        "vintage" => "Different construction era",
        _ => "Different property type",
    }
}

/// Explain each pick of a slate against the picks before it.
#[must_use]
pub fn explain_selection(
    selections: &[Selection],
    geo_scale_km: f64,
    weights: &SimilarityWeights,
) -> Vec<PickExplanation> {
    selections
        .iter()
        .enumerate()
        .map(|(position, pick)| {
            let current = &pick.candidate;
            let mut nearest: Option<(&Selection, SimilarityBreakdown)> = None;
            for earlier in &selections[..position] {
                let b = similarity_explained(current, &earlier.candidate, geo_scale_km, weights);
                if nearest.map_or(true, |(_, kept)| b.total > kept.total) {
                    nearest = Some((earlier, b));
                }
            }

            match nearest {
                None => PickExplanation {
                    property_id: current.property_id.clone(),
                    position,
                    nearest: None,
                    breakdown: None,
                    most_different: None,
                    reason: "Strongest match for your buy box".to_string(),
                },
                Some((earlier, breakdown)) => {
                    let (dimension, _) = breakdown.most_different();
                    PickExplanation {
                        property_id: current.property_id.clone(),
                        position,
                        nearest: Some(earlier.candidate.property_id.clone()),
                        breakdown: Some(breakdown),
                        most_different: Some(dimension),
                        reason: format!(
                            "{} from {} ({:.0}% similar)",
                            dimension_phrase(dimension),
                            earlier.candidate.property_id,
                            breakdown.total * 100.0
                        ),
                    }
                }
            }
        })
        .collect()
}
