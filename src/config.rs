//! TOML configuration.
//!
//! ```toml
//! [mmr]
//! k = 9
//! lambda = 0.7
//! max_per_zip = 2
//! geo_diversity_scale_km = 5.0
//! resurface_window_weeks = 8
//! candidate_pool_size = 200
//!
//! [weights]
//! geographic = 0.35
//! price_per_unit = 0.25
//! units = 0.20
//! vintage = 0.15
//! property_type = 0.05
//! ```
//!
//! Every key is optional and falls back to its default. A missing file
//! loads as [`EngineConfig::default`].

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::diversity::MmrConfig;
use crate::similarity::SimilarityWeights;
use crate::Result;

/// Selection and similarity settings for [`RecommendationEngine`](crate::RecommendationEngine).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub mmr: MmrConfig,
    pub weights: SimilarityWeights,
}

impl EngineConfig {
    /// Parse and validate.
    ///
    /// # Errors
    ///
    /// [`RecommendError::TomlParse`](crate::RecommendError::TomlParse) on
    /// malformed input, or any validation error from [`Self::validate`].
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`; a missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// I/O errors other than a missing file, plus everything
    /// [`Self::from_toml_str`] reports.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Load `path`, writing the defaults there first if it does not exist.
    ///
    /// # Errors
    ///
    /// I/O and TOML errors.
    pub fn ensure(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Self::load(path);
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let config = Self::default();
        fs::write(path, config.to_toml_string()?)?;
        Ok(config)
    }

    /// # Errors
    ///
    /// [`RecommendError::TomlSerialize`](crate::RecommendError::TomlSerialize)
    /// if serialization fails.
    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// # Errors
    ///
    /// The first failure from [`MmrConfig::validate`] or
    /// [`SimilarityWeights::validate`].
    pub fn validate(&self) -> Result<()> {
        self.mmr.validate()?;
        self.weights.validate()
    }
}
