//! Configuration for the forecast engine
//!
//! Loaded from a TOML file; every field has a serde default so a partial
//! (or empty) config file is valid.

use crate::error::{ForecastError, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub features: FeatureConfig,
    #[serde(default)]
    pub ensemble: EnsembleConfig,
    #[serde(default)]
    pub models: ModelConfig,
    #[serde(default)]
    pub bounds: BoundsConfig,
    #[serde(default)]
    pub confidence: ConfidenceConfig,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| ForecastError::Config(e.to_string()))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeatureConfig {
    /// Minimum usable rows after NaN handling
    #[serde(default = "default_min_bars")]
    pub min_bars: usize,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            min_bars: default_min_bars(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnsembleConfig {
    /// Contiguous time-series folds for cross-validation
    #[serde(default = "default_cv_folds")]
    pub cv_folds: usize,
    /// Conservative score for models that cannot be cross-validated
    #[serde(default = "default_score")]
    pub default_score: f64,
    /// Super-linear exponent rewarding better-scoring models
    #[serde(default = "default_weight_power")]
    pub weight_power: f64,
    /// Floor weight for untrained / non-positive-score models
    #[serde(default = "default_epsilon_weight")]
    pub epsilon_weight: f64,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            cv_folds: default_cv_folds(),
            default_score: default_score(),
            weight_power: default_weight_power(),
            epsilon_weight: default_epsilon_weight(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_true")]
    pub use_ar: bool,
    #[serde(default = "default_true")]
    pub use_boosted: bool,
    #[serde(default = "default_true")]
    pub use_lstm: bool,
    #[serde(default = "default_true")]
    pub use_seasonal: bool,
    /// Day-2 factor for models without native multistep support
    #[serde(default = "default_day2_extrapolation")]
    pub day2_extrapolation: f64,
    #[serde(default = "default_lstm_window")]
    pub lstm_window: usize,
    #[serde(default = "default_lstm_hidden")]
    pub lstm_hidden: usize,
    #[serde(default = "default_lstm_epochs")]
    pub lstm_epochs: usize,
    #[serde(default = "default_lstm_seed")]
    pub lstm_seed: u64,
    #[serde(default = "default_boost_rounds")]
    pub boost_rounds: usize,
    #[serde(default = "default_boost_depth")]
    pub boost_depth: usize,
    #[serde(default = "default_boost_learning_rate")]
    pub boost_learning_rate: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            use_ar: true,
            use_boosted: true,
            use_lstm: true,
            use_seasonal: true,
            day2_extrapolation: default_day2_extrapolation(),
            lstm_window: default_lstm_window(),
            lstm_hidden: default_lstm_hidden(),
            lstm_epochs: default_lstm_epochs(),
            lstm_seed: default_lstm_seed(),
            boost_rounds: default_boost_rounds(),
            boost_depth: default_boost_depth(),
            boost_learning_rate: default_boost_learning_rate(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BoundsConfig {
    /// Max day-1 move relative to current price
    #[serde(default = "default_max_day1_move")]
    pub max_day1_move_pct: f64,
    /// Max day-2 move relative to current price
    #[serde(default = "default_max_day2_move")]
    pub max_day2_move_pct: f64,
    /// Drift applied when a model emits a non-positive price
    #[serde(default = "default_fallback_drift")]
    pub fallback_drift: f64,
}

impl Default for BoundsConfig {
    fn default() -> Self {
        Self {
            max_day1_move_pct: default_max_day1_move(),
            max_day2_move_pct: default_max_day2_move(),
            fallback_drift: default_fallback_drift(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfidenceConfig {
    /// Reproduce the legacy always-high band ([0.80, 0.98]); off by default
    /// so low-information forecasts can report honestly low confidence.
    #[serde(default)]
    pub optimistic_mode: bool,
    #[serde(default = "default_confidence_floor")]
    pub floor: f64,
    #[serde(default = "default_confidence_ceiling")]
    pub ceiling: f64,
    /// Confidence attached to fallback (too-little-data) results
    #[serde(default = "default_fallback_confidence")]
    pub fallback_confidence: f64,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            optimistic_mode: false,
            floor: default_confidence_floor(),
            ceiling: default_confidence_ceiling(),
            fallback_confidence: default_fallback_confidence(),
        }
    }
}

impl ConfidenceConfig {
    /// Effective clamp band; optimistic mode overrides the floor.
    pub fn band(&self) -> (f64, f64) {
        if self.optimistic_mode {
            (0.80, 0.98)
        } else {
            (self.floor, self.ceiling)
        }
    }

    /// Confidence reported for fallback results.
    pub fn effective_fallback_confidence(&self) -> f64 {
        if self.optimistic_mode {
            0.85
        } else {
            self.fallback_confidence
        }
    }
}

fn default_min_bars() -> usize {
    30
}
fn default_cv_folds() -> usize {
    3
}
fn default_score() -> f64 {
    0.35
}
fn default_weight_power() -> f64 {
    1.5
}
fn default_epsilon_weight() -> f64 {
    1e-4
}
fn default_true() -> bool {
    true
}
fn default_day2_extrapolation() -> f64 {
    1.001
}
fn default_lstm_window() -> usize {
    10
}
fn default_lstm_hidden() -> usize {
    16
}
fn default_lstm_epochs() -> usize {
    60
}
fn default_lstm_seed() -> u64 {
    42
}
fn default_boost_rounds() -> usize {
    60
}
fn default_boost_depth() -> usize {
    3
}
fn default_boost_learning_rate() -> f64 {
    0.1
}
fn default_max_day1_move() -> f64 {
    0.10
}
fn default_max_day2_move() -> f64 {
    0.15
}
fn default_fallback_drift() -> f64 {
    0.001
}
fn default_confidence_floor() -> f64 {
    0.0
}
fn default_confidence_ceiling() -> f64 {
    0.98
}
fn default_fallback_confidence() -> f64 {
    0.5
}
