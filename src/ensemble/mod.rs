//! Ensemble combiner: fit, cross-validate, weight, blend
//!
//! Every model is fitted independently; a fit failure costs that model its
//! weight, never the pipeline. Scores come from walk-forward cross-validation
//! over contiguous folds (temporal order is never shuffled), and weights are
//! derived super-linearly from the scores so better models are rewarded
//! disproportionately.

use crate::config::{Config, EnsembleConfig};
use crate::features::FeatureTable;
use crate::models::{
    AutoRegressiveModel, BoostedTreesModel, ForecastModel, LstmModel, SeasonalTrendModel,
};
use crate::types::ModelPrediction;
use serde::Serialize;
use std::collections::BTreeMap;

/// Result of one blended prediction pass
#[derive(Debug, Clone, Serialize)]
pub struct EnsembleOutcome {
    pub blended: ModelPrediction,
    /// Predictions of trained models only; untrained models are excluded
    /// from both the blend and the agreement statistics.
    pub model_predictions: BTreeMap<String, ModelPrediction>,
    pub weights: BTreeMap<String, f64>,
    pub scores: BTreeMap<String, f64>,
    pub trained_models: usize,
    /// True when zero models were trained and the blend is a last-close
    /// pass-through.
    pub fallback: bool,
}

/// Training summary returned by `train`
#[derive(Debug, Clone, Serialize)]
pub struct TrainReport {
    pub trained: Vec<String>,
    pub failed: Vec<String>,
    pub scores: BTreeMap<String, f64>,
    pub weights: BTreeMap<String, f64>,
}

pub struct EnsembleCombiner {
    config: EnsembleConfig,
    models: Vec<Box<dyn ForecastModel>>,
    scores: BTreeMap<String, f64>,
    weights: BTreeMap<String, f64>,
}

impl EnsembleCombiner {
    pub fn new(config: &Config) -> Self {
        let m = &config.models;
        let mut models: Vec<Box<dyn ForecastModel>> = Vec::new();
        if m.use_ar {
            models.push(Box::new(AutoRegressiveModel::new()));
        }
        if m.use_boosted {
            models.push(Box::new(BoostedTreesModel::new(m)));
        }
        if m.use_lstm {
            models.push(Box::new(LstmModel::new(m)));
        }
        if m.use_seasonal {
            models.push(Box::new(SeasonalTrendModel::new()));
        }
        Self::with_models(models, config.ensemble.clone())
    }

    /// Combiner over an explicit model set; test seams and custom stacks.
    pub fn with_models(models: Vec<Box<dyn ForecastModel>>, config: EnsembleConfig) -> Self {
        Self {
            config,
            models,
            scores: BTreeMap::new(),
            weights: BTreeMap::new(),
        }
    }

    pub fn weights(&self) -> &BTreeMap<String, f64> {
        &self.weights
    }

    pub fn scores(&self) -> &BTreeMap<String, f64> {
        &self.scores
    }

    pub fn trained_count(&self) -> usize {
        self.models.iter().filter(|m| m.is_trained()).count()
    }

    /// Fit every model, score it by walk-forward CV, derive weights.
    pub fn train(&mut self, table: &FeatureTable) -> TrainReport {
        let mut trained = Vec::new();
        let mut failed = Vec::new();

        for model in &mut self.models {
            match model.fit(table) {
                Ok(()) => trained.push(model.name().to_string()),
                Err(e) => {
                    tracing::warn!("Model {} failed to fit: {}", model.name(), e);
                    failed.push(model.name().to_string());
                }
            }
        }

        self.scores.clear();
        for model in &self.models {
            let score = if model.is_trained() {
                match cross_validate(model.as_ref(), table, self.config.cv_folds) {
                    Some(r2) => r2.clamp(-1.0, 1.0),
                    None => self.config.default_score,
                }
            } else {
                0.0
            };
            tracing::debug!(model = model.name(), score, "cross-validation score");
            self.scores.insert(model.name().to_string(), score);
        }

        let trained_names: Vec<&str> = self
            .models
            .iter()
            .filter(|m| m.is_trained())
            .map(|m| m.name())
            .collect();
        self.weights = derive_weights(&self.scores, &trained_names, &self.config);

        tracing::info!(
            trained = trained.len(),
            failed = failed.len(),
            "ensemble trained"
        );
        TrainReport {
            trained,
            failed,
            scores: self.scores.clone(),
            weights: self.weights.clone(),
        }
    }

    /// Weighted blend across trained models, renormalizing so untrained
    /// models drop out of both numerator and denominator.
    pub fn predict(&self, table: &FeatureTable) -> EnsembleOutcome {
        let mut model_predictions = BTreeMap::new();
        let mut weighted_day1 = 0.0;
        let mut weighted_day2 = 0.0;
        let mut total_weight = 0.0;

        for model in &self.models {
            if !model.is_trained() {
                continue;
            }
            let prediction = match model.predict(table) {
                Ok(p) if p.is_finite() => p,
                Ok(_) | Err(_) => {
                    tracing::warn!("Model {} returned unusable prediction", model.name());
                    continue;
                }
            };
            let weight = self
                .weights
                .get(model.name())
                .copied()
                .unwrap_or(self.config.epsilon_weight);
            weighted_day1 += prediction.day1 * weight;
            weighted_day2 += prediction.day2 * weight;
            total_weight += weight;
            model_predictions.insert(model.name().to_string(), prediction);
        }

        let trained_models = model_predictions.len();
        let (blended, fallback) = if trained_models == 0 || total_weight <= 0.0 {
            (ModelPrediction::flat(table.last_close()), true)
        } else {
            (
                ModelPrediction {
                    day1: weighted_day1 / total_weight,
                    day2: weighted_day2 / total_weight,
                },
                false,
            )
        };

        EnsembleOutcome {
            blended,
            model_predictions,
            weights: self.weights.clone(),
            scores: self.scores.clone(),
            trained_models,
            fallback,
        }
    }
}

/// Super-linear score→weight mapping: `w_i ∝ (score_i / Σ scores)^power`
/// over positive-score trained models; everything else gets the epsilon
/// floor. Weights always sum to 1.
fn derive_weights(
    scores: &BTreeMap<String, f64>,
    trained: &[&str],
    config: &EnsembleConfig,
) -> BTreeMap<String, f64> {
    let positive_sum: f64 = trained
        .iter()
        .filter_map(|name| scores.get(*name))
        .filter(|s| **s > 0.0)
        .sum();

    let mut weights = BTreeMap::new();
    for (name, score) in scores {
        let is_trained = trained.contains(&name.as_str());
        let raw = if is_trained && *score > 0.0 && positive_sum > 0.0 {
            (score / positive_sum).powf(config.weight_power)
        } else {
            config.epsilon_weight
        };
        weights.insert(name.clone(), raw);
    }

    let total: f64 = weights.values().sum();
    if total > 0.0 {
        for w in weights.values_mut() {
            *w /= total;
        }
    }
    weights
}

/// Walk-forward R² over contiguous folds in the second half of the table.
/// Returns None when no evaluation points could be produced.
fn cross_validate(model: &dyn ForecastModel, table: &FeatureTable, folds: usize) -> Option<f64> {
    let n = table.n_rows();
    let folds = folds.max(1);
    let fold_size = (n / 2) / folds;
    if fold_size == 0 {
        return None;
    }

    let mut predicted = Vec::new();
    let mut actual = Vec::new();
    let closes = table.closes();

    for fold in 0..folds {
        let train_end = n / 2 + fold * fold_size;
        let mut candidate = model.fresh();
        if candidate.fit(&table.truncated(train_end)).is_err() {
            continue;
        }
        let eval_end = (train_end + fold_size).min(n);
        for j in train_end..eval_end {
            // History through bar j-1 predicts the close of bar j.
            if let Ok(p) = candidate.predict(&table.truncated(j)) {
                if p.day1.is_finite() {
                    predicted.push(p.day1);
                    actual.push(closes[j]);
                }
            }
        }
    }

    if predicted.len() < 3 {
        return None;
    }
    Some(r_squared(&actual, &predicted))
}

fn r_squared(actual: &[f64], predicted: &[f64]) -> f64 {
    let n = actual.len() as f64;
    let mean = actual.iter().sum::<f64>() / n;
    let sst: f64 = actual.iter().map(|y| (y - mean).powi(2)).sum();
    let sse: f64 = actual
        .iter()
        .zip(predicted.iter())
        .map(|(y, p)| (y - p).powi(2))
        .sum();
    if sst <= 1e-12 {
        // Zero-variance target: perfect pass-through scores 1, else 0.
        return if sse <= 1e-12 { 1.0 } else { 0.0 };
    }
    1.0 - sse / sst
}
