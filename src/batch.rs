//! Weekly per-user recommendation batches.
//!
//! [`RecommendationEngine`] wires the pipeline together for one user:
//!
//! ```text
//! listings ─► prepare_pool ─► RelevanceModel ─► cap_pool ─► select_scored ─► batch
//!                 │                                              ▲
//!                 └── saved ids, buy box, cooldown        user λ ┘
//! ```
//!
//! Nothing here touches storage. The caller persists the batch, the
//! adapted lambda, and the "last shown" timestamps.

use std::collections::HashSet;

use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::candidate::Property;
use crate::config::EngineConfig;
use crate::diversity::{select_scored, MmrConfig, Selection};
use crate::market::{resolve_market_stats, MarketStatistics};
use crate::pool::{cap_pool, prepare_pool};
use crate::scoring::{BuyBox, BuyBoxScorer, RelevanceModel};
use crate::similarity::SimilarityWeights;
use crate::Result;

/// Saves older than this are ignored by [`adapt_lambda`].
pub const LAMBDA_LOOKBACK_DAYS: i64 = 30;
/// At most this many recent saves are considered.
pub const LAMBDA_MAX_SAVES: usize = 20;
/// Fewer saves than this leave lambda alone.
pub const LAMBDA_MIN_SAVES: usize = 3;
pub const LAMBDA_STEP: f64 = 0.1;
pub const LAMBDA_FLOOR: f64 = 0.5;
pub const LAMBDA_CEILING: f64 = 0.9;

// ─────────────────────────────────────────────────────────────────────────────
// Batch types
// ─────────────────────────────────────────────────────────────────────────────

/// One slot in a weekly batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub property_id: String,
    /// Relevance to the user.
    pub fit_score: f64,
    /// `1 − max similarity` to earlier picks; 1 for the first pick.
    pub diversity_score: f64,
    /// `λ · fit + (1 − λ) · diversity`.
    pub total_score: f64,
    pub selection_reasons: Vec<String>,
    /// 0-based slot.
    pub position: usize,
}

impl Recommendation {
    fn from_selection(selection: Selection, lambda: f64, position: usize) -> Self {
        let fit_score = selection.candidate.relevance;
        let diversity_score = selection.diversity();
        Self {
            property_id: selection.candidate.property_id,
            fit_score,
            diversity_score,
            total_score: lambda * fit_score + (1.0 - lambda) * diversity_score,
            selection_reasons: selection.candidate.why_recommended,
            position,
        }
    }
}

/// A user's recommendations for one week.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationBatch {
    pub batch_id: Uuid,
    pub user_id: String,
    pub week_start: DateTime<Utc>,
    pub lambda: f64,
    /// Eligible listings before the pool cap; 0 for an empty batch.
    pub total_candidates: usize,
    pub recommendations: Vec<Recommendation>,
}

impl RecommendationBatch {
    fn empty(user_id: &str, week_start: DateTime<Utc>, lambda: f64) -> Self {
        Self {
            batch_id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            week_start,
            lambda,
            total_candidates: 0,
            recommendations: Vec::new(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.recommendations.is_empty()
    }

    /// Stamp every recommended listing as shown to this batch's user.
    ///
    /// Feeds the resurface cooldown on the next run.
    pub fn mark_shown(&self, properties: &mut [Property], now: DateTime<Utc>) {
        let ids: HashSet<&str> = self
            .recommendations
            .iter()
            .map(|r| r.property_id.as_str())
            .collect();
        for p in properties
            .iter_mut()
            .filter(|p| ids.contains(p.property_id.as_str()))
        {
            p.last_shown_to_users.insert(self.user_id.clone(), now);
        }
    }
}

/// Start of the week containing `now`: the preceding Sunday, 00:00 UTC.
#[must_use]
pub fn week_start(now: DateTime<Utc>) -> DateTime<Utc> {
    let back = i64::from(now.weekday().num_days_from_sunday());
    (now.date_naive() - Duration::days(back))
        .and_time(NaiveTime::MIN)
        .and_utc()
}

// ─────────────────────────────────────────────────────────────────────────────
// Lambda adaptation
// ─────────────────────────────────────────────────────────────────────────────

/// How a listing ended up in the user's saves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveSource {
    /// Saved from a weekly batch.
    Algorithm,
    /// Found and saved by the user.
    Manual,
}

/// A saved listing, as recorded by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveRecord {
    pub property_id: String,
    pub source: SaveSource,
    /// Diversity score of the recommendation, for algorithm saves.
    pub diversity_score: Option<f64>,
    pub saved_at: DateTime<Utc>,
    pub is_active: bool,
}

/// Nudge a user's lambda from their recent saves.
///
/// Users who mostly save diverse algorithmic picks get more exploration
/// (lower λ); users who mostly save their own finds get more relevance
/// (higher λ). `None` when there are too few recent saves to judge.
#[must_use]
pub fn adapt_lambda(base: f64, saves: &[SaveRecord], now: DateTime<Utc>) -> Option<f64> {
    let cutoff = now - Duration::days(LAMBDA_LOOKBACK_DAYS);
    let mut recent: Vec<&SaveRecord> = saves
        .iter()
        .filter(|s| s.is_active && s.saved_at >= cutoff)
        .collect();
    recent.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));
    recent.truncate(LAMBDA_MAX_SAVES);

    if recent.len() < LAMBDA_MIN_SAVES {
        return None;
    }

    let algorithmic: Vec<&SaveRecord> = recent
        .iter()
        .copied()
        .filter(|s| s.source == SaveSource::Algorithm)
        .collect();
    let ratio = algorithmic.len() as f64 / recent.len() as f64;

    let scored: Vec<f64> = algorithmic.iter().filter_map(|s| s.diversity_score).collect();
    let avg_diversity = scored.iter().sum::<f64>() / scored.len().max(1) as f64;

    let adapted = if ratio > 0.7 && avg_diversity > 0.6 {
        (base - LAMBDA_STEP).max(LAMBDA_FLOOR)
    } else if ratio < 0.3 {
        (base + LAMBDA_STEP).min(LAMBDA_CEILING)
    } else {
        base
    };
    debug!(
        saves = recent.len(),
        algorithm_ratio = ratio,
        avg_diversity,
        base,
        adapted,
        "adapted lambda"
    );
    Some(adapted)
}

// ─────────────────────────────────────────────────────────────────────────────
// Engine
// ─────────────────────────────────────────────────────────────────────────────

/// One user's inputs for a weekly run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserRequest {
    pub user_id: String,
    pub buy_box: BuyBox,
    /// Per-user lambda; the engine's configured lambda when absent.
    pub lambda: Option<f64>,
    pub weekly_enabled: bool,
    pub saved_property_ids: HashSet<String>,
    pub recent_saves: Vec<SaveRecord>,
}

impl Default for UserRequest {
    fn default() -> Self {
        Self {
            user_id: String::new(),
            buy_box: BuyBox::default(),
            lambda: None,
            weekly_enabled: true,
            saved_property_ids: HashSet::new(),
            recent_saves: Vec::new(),
        }
    }
}

impl UserRequest {
    #[must_use]
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Self::default()
        }
    }
}

/// A produced batch plus the lambda the caller should store for next time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub batch: RecommendationBatch,
    pub adapted_lambda: Option<f64>,
}

/// Runs the weekly pipeline with a pluggable relevance model.
#[derive(Debug, Clone, Default)]
pub struct RecommendationEngine<M = BuyBoxScorer> {
    pub config: MmrConfig,
    pub weights: SimilarityWeights,
    pub model: M,
}

impl RecommendationEngine<BuyBoxScorer> {
    /// Engine with the default scorer.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self::with_model(config, BuyBoxScorer::default())
    }

    /// [`Self::new`], rejecting an invalid config.
    ///
    /// # Errors
    ///
    /// Whatever [`EngineConfig::validate`] reports.
    pub fn try_new(config: EngineConfig) -> Result<Self> {
        Self::try_with_model(config, BuyBoxScorer::default())
    }
}

impl<M: RelevanceModel> RecommendationEngine<M> {
    /// Engine with a custom model.
    ///
    /// `config` is taken as given. Configs built in code rather than loaded
    /// from TOML should go through [`Self::try_with_model`] or
    /// [`EngineConfig::validate`] first.
    #[must_use]
    pub fn with_model(config: EngineConfig, model: M) -> Self {
        Self {
            config: config.mmr,
            weights: config.weights,
            model,
        }
    }

    /// [`Self::with_model`], rejecting an invalid config.
    ///
    /// # Errors
    ///
    /// Whatever [`EngineConfig::validate`] reports.
    pub fn try_with_model(config: EngineConfig, model: M) -> Result<Self> {
        config.validate()?;
        Ok(Self::with_model(config, model))
    }

    fn effective_lambda(&self, request: &UserRequest) -> f64 {
        match request.lambda {
            Some(lambda) if (0.0..=1.0).contains(&lambda) => lambda,
            Some(lambda) => {
                warn!(
                    user_id = %request.user_id,
                    lambda,
                    "user lambda out of range, using configured lambda"
                );
                self.config.lambda
            }
            None => self.config.lambda,
        }
    }

    /// Build this week's batch for one user.
    ///
    /// `None` when the user has weekly recommendations turned off.
    /// `market_stats` are the stored statistics; when none match the user's
    /// markets they are computed from the `properties` in those markets.
    #[must_use]
    pub fn recommend(
        &self,
        request: &UserRequest,
        properties: &[Property],
        market_stats: &[MarketStatistics],
        now: DateTime<Utc>,
    ) -> Option<BatchOutcome> {
        if !request.weekly_enabled {
            debug!(user_id = %request.user_id, "weekly recommendations disabled");
            return None;
        }

        let lambda = self.effective_lambda(request);
        let week = week_start(now);
        let adapted_lambda = adapt_lambda(self.config.lambda, &request.recent_saves, now);

        let eligible = prepare_pool(properties, request, &self.config, now);
        if eligible.is_empty() {
            info!(user_id = %request.user_id, "no eligible listings, empty batch");
            return Some(BatchOutcome {
                batch: RecommendationBatch::empty(&request.user_id, week, lambda),
                adapted_lambda,
            });
        }

        let stats = resolve_market_stats(&request.buy_box.markets, market_stats, properties);
        let scored = eligible
            .iter()
            .map(|p| self.model.candidate(p, &request.buy_box, &stats))
            .collect();
        let pool = cap_pool(scored, self.config.candidate_pool_size);

        let config = self.config.with_lambda(lambda);
        let selections = select_scored(&pool, &config, &self.weights);
        if selections.is_empty() {
            info!(user_id = %request.user_id, "selection came back empty");
            return Some(BatchOutcome {
                batch: RecommendationBatch::empty(&request.user_id, week, lambda),
                adapted_lambda,
            });
        }

        let recommendations: Vec<Recommendation> = selections
            .into_iter()
            .enumerate()
            .map(|(position, s)| Recommendation::from_selection(s, lambda, position))
            .collect();

        let batch = RecommendationBatch {
            batch_id: Uuid::new_v4(),
            user_id: request.user_id.clone(),
            week_start: week,
            lambda,
            total_candidates: eligible.len(),
            recommendations,
        };
        info!(
            user_id = %batch.user_id,
            batch_id = %batch.batch_id,
            eligible = batch.total_candidates,
            picked = batch.recommendations.len(),
            lambda,
            "built weekly batch"
        );
        Some(BatchOutcome {
            batch,
            adapted_lambda,
        })
    }

    /// Run [`recommend`](Self::recommend) for every user. Output order
    /// matches `requests`.
    #[must_use]
    pub fn recommend_all(
        &self,
        requests: &[UserRequest],
        properties: &[Property],
        market_stats: &[MarketStatistics],
        now: DateTime<Utc>,
    ) -> Vec<Option<BatchOutcome>>
    where
        M: Sync,
    {
        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            requests
                .par_iter()
                .map(|r| self.recommend(r, properties, market_stats, now))
                .collect()
        }
        #[cfg(not(feature = "parallel"))]
        {
            requests
                .iter()
                .map(|r| self.recommend(r, properties, market_stats, now))
                .collect()
        }
    }
}
