//! # rank-listings
//!
//! Weekly property recommendations: score every listing against a user's
//! buy box, then pick a small slate that is relevant but not redundant.
//!
//! ## Modules
//!
//! | Module | Purpose | Notes |
//! |--------|---------|-------|
//! | [`geo`] | Haversine distance, decay kernel | Pure math |
//! | [`candidate`] | Listing records, derived fields | Read-only snapshots |
//! | [`scoring`] | Buy-box relevance + reasons | Trait-based, swappable |
//! | [`market`] | Median/IQR market statistics | Fallback defaults |
//! | [`similarity`] | Five-dimension pairwise similarity | Always in \[0, 1\] |
//! | [`diversity`] | Greedy MMR with a per-ZIP cap | Deterministic |
//! | [`explain`] | Why a pick diversifies the slate | Per-dimension |
//! | [`pool`] | Buy-box and cooldown filtering | Runs before scoring |
//! | [`batch`] | Per-user weekly batches | Parallel across users |
//! | [`config`] | TOML configuration | Validated on load |
//!
//! ## Pipeline
//!
//! ```text
//! Listings → Pool filter → Relevance → Cap → MMR + ZIP cap → Batch
//! ```
//!
//! ## Quick Example
//!
//! ```rust
//! use rank_listings::candidate::{MmrCandidate, PropertyFeatures};
//! use rank_listings::diversity::{select_mmr_recommendations, MmrConfig};
//! use rank_listings::similarity::SimilarityWeights;
//!
//! let pool: Vec<MmrCandidate> = (0..12)
//!     .map(|i| {
//!         let features = PropertyFeatures {
//!             zip: Some(format!("787{:02}", i % 4)),
//!             units: Some(4 + i),
//!             ..PropertyFeatures::default()
//!         };
//!         MmrCandidate::new(format!("p{i}"), 1.0 - f64::from(i) * 0.05, features)
//!     })
//!     .collect();
//!
//! let slate = select_mmr_recommendations(&pool, &MmrConfig::default(), &SimilarityWeights::default());
//! assert_eq!(slate.len(), 8); // four ZIPs, at most two picks each
//! ```

pub mod batch;
pub mod candidate;
pub mod config;
pub mod diversity;
pub mod explain;
pub mod geo;
pub mod market;
pub mod pool;
pub mod scoring;
pub mod similarity;

pub use batch::{
    BatchOutcome, Recommendation, RecommendationBatch, RecommendationEngine, UserRequest,
};
pub use candidate::{MmrCandidate, Property, PropertyFeatures};
pub use config::EngineConfig;
pub use diversity::{select_mmr_recommendations, MmrConfig, Selection};
pub use market::MarketStatistics;
pub use scoring::{BuyBox, BuyBoxScorer, RelevanceModel, RelevanceScore};
pub use similarity::{similarity, SimilarityWeights};

/// Errors raised at the configuration boundary.
///
/// The selection and similarity paths themselves are infallible; these only
/// surface from `try_*` entry points and config loading.
#[derive(Debug, thiserror::Error)]
pub enum RecommendError {
    /// Lambda must lie in `[0, 1]`.
    #[error("lambda must be within [0, 1], got {lambda}")]
    InvalidLambda { lambda: f64 },

    /// Geographic scale must be positive and finite.
    #[error("geo diversity scale must be positive and finite, got {scale_km} km")]
    InvalidGeoScale { scale_km: f64 },

    /// A similarity weight is negative or not finite.
    #[error("similarity weight `{dimension}` must be non-negative, got {value}")]
    InvalidWeight { dimension: &'static str, value: f64 },

    /// Similarity weights do not sum to 1.
    #[error("similarity weights must sum to 1.0, got {sum}")]
    WeightsNotNormalized { sum: f64 },

    /// Config file could not be read.
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid TOML for [`config::EngineConfig`].
    #[error("failed to parse config TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// Config could not be rendered as TOML.
    #[error("failed to serialize config TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// Result alias for fallible operations in this crate.
pub type Result<T> = std::result::Result<T, RecommendError>;

/// Sort candidates by relevance, descending. Stable, so equal scores keep
/// their input order. NaN ranks with `-inf`, after every real score.
pub(crate) fn sort_by_relevance_desc(candidates: &mut [MmrCandidate]) {
    fn key(relevance: f64) -> f64 {
        if relevance.is_nan() {
            f64::NEG_INFINITY
        } else {
            relevance
        }
    }
    candidates.sort_by(|a, b| key(b.relevance).total_cmp(&key(a.relevance)));
}
