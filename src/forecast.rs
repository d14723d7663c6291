//! Forecast orchestrator: the public two-day prediction entry point
//!
//! Ties the feature builder, combiner and confidence engine together and
//! guarantees the caller always gets a structurally valid result. Too little
//! data degrades to a flagged fallback, pathological model output is clamped
//! to a plausible band around the current price, and direction is derived
//! from the bounded price so the two never disagree.

use crate::config::Config;
use crate::confidence::{ConfidenceBreakdown, ConfidenceEngine};
use crate::ensemble::{EnsembleCombiner, EnsembleOutcome, TrainReport};
use crate::error::{ForecastError, Result};
use crate::features::{FeatureBuilder, FeatureTable};
use crate::models::seasonal::next_trading_day;
use crate::providers::{MacroSignalProvider, NeutralMacro, NeutralSentiment, SentimentProvider};
use crate::types::{Direction, ModelPrediction, PriceSeries};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

/// Minimum usable feature rows before the pipeline attempts a real forecast.
const MIN_USABLE_ROWS: usize = 5;
/// Day-2 records carry slightly less confidence than day-1.
const DAY2_CONFIDENCE_DECAY: f64 = 0.95;

#[derive(Debug, Clone, Serialize)]
pub struct PredictionDay {
    pub date: NaiveDate,
    pub direction: Direction,
    pub predicted_price: f64,
    pub predicted_change_points: f64,
    pub predicted_change_pct: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct EnsembleDetails {
    pub model_predictions: BTreeMap<String, ModelPrediction>,
    pub weights: BTreeMap<String, f64>,
    pub scores: BTreeMap<String, f64>,
    pub agreement_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendSeverity {
    Mild,
    Moderate,
    Severe,
}

impl TrendSeverity {
    fn from_decline_pct(decline_pct: f64) -> Self {
        if decline_pct >= 5.0 {
            TrendSeverity::Severe
        } else if decline_pct >= 2.0 {
            TrendSeverity::Moderate
        } else {
            TrendSeverity::Mild
        }
    }
}

/// Extra scrutiny attached to any downward-pointing day.
#[derive(Debug, Clone, Serialize)]
pub struct DownwardTrendAnalysis {
    pub expected_decline_pct: f64,
    pub severity: TrendSeverity,
    /// Weighted fraction of models predicting below the current price,
    /// day 2 counted at half weight.
    pub consensus_ratio: f64,
    pub recent_trend_pct: f64,
    pub accelerating: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ForecastResult {
    pub symbol: String,
    pub forecast_date: NaiveDate,
    pub current_price: f64,
    pub predictions: Vec<PredictionDay>,
    pub ensemble: EnsembleDetails,
    pub confidence: ConfidenceBreakdown,
    pub downward_trend: Option<DownwardTrendAnalysis>,
    pub fallback: bool,
}

pub struct Forecaster {
    config: Config,
    builder: FeatureBuilder,
    combiner: EnsembleCombiner,
    confidence: ConfidenceEngine,
    macro_provider: Box<dyn MacroSignalProvider>,
    sentiment_provider: Box<dyn SentimentProvider>,
    trained: bool,
}

impl Forecaster {
    pub fn new(config: Config) -> Self {
        Self::with_providers(config, Box::new(NeutralMacro), Box::new(NeutralSentiment))
    }

    pub fn with_providers(
        config: Config,
        macro_provider: Box<dyn MacroSignalProvider>,
        sentiment_provider: Box<dyn SentimentProvider>,
    ) -> Self {
        let combiner = EnsembleCombiner::new(&config);
        let mut forecaster = Self::with_combiner(config, combiner);
        forecaster.macro_provider = macro_provider;
        forecaster.sentiment_provider = sentiment_provider;
        forecaster
    }

    /// Orchestrator over a custom model stack.
    pub fn with_combiner(config: Config, combiner: EnsembleCombiner) -> Self {
        let builder = FeatureBuilder::new(config.features.clone());
        let confidence = ConfidenceEngine::new(config.confidence.clone());
        Self {
            config,
            builder,
            combiner,
            confidence,
            macro_provider: Box::new(NeutralMacro),
            sentiment_provider: Box::new(NeutralSentiment),
            trained: false,
        }
    }

    /// Last training report is implicit in the combiner; expose weights for
    /// inspection tooling.
    pub fn weights(&self) -> &BTreeMap<String, f64> {
        self.combiner.weights()
    }

    pub fn build_features(&self, series: &PriceSeries) -> Result<FeatureTable> {
        self.builder.build(
            series,
            self.macro_provider.as_ref(),
            self.sentiment_provider.as_ref(),
        )
    }

    /// Two-day-ahead forecast. Models are trained lazily on the first call
    /// and cached for the process lifetime; every call rebuilds features.
    pub fn predict_next_two_days(&mut self, series: &PriceSeries) -> Result<ForecastResult> {
        let current_price = series
            .last_close()
            .ok_or(ForecastError::MissingCloses)?;
        let last_date = series.last_date().ok_or(ForecastError::MissingCloses)?;

        let table = match self.build_features(series) {
            Ok(table) => table,
            Err(ForecastError::InsufficientData { rows, required }) => {
                tracing::warn!(rows, required, symbol = series.symbol(), "fallback forecast");
                return Ok(self.fallback_result(series.symbol(), last_date, current_price));
            }
            Err(e) => return Err(e),
        };
        if table.n_rows() < MIN_USABLE_ROWS {
            tracing::warn!(
                rows = table.n_rows(),
                symbol = series.symbol(),
                "fallback forecast"
            );
            return Ok(self.fallback_result(series.symbol(), last_date, current_price));
        }

        if !self.trained {
            let report = self.combiner.train(&table);
            log_train_report(series.symbol(), &report);
            self.trained = true;
        }

        let outcome = self.combiner.predict(&table);
        let current = table.last_close();
        let breakdown = self.confidence.evaluate(&outcome, &table, current);

        let bounds = &self.config.bounds;
        let day1_price = bound_price(outcome.blended.day1, current, bounds.max_day1_move_pct, bounds.fallback_drift);
        let day2_price = bound_price(outcome.blended.day2, current, bounds.max_day2_move_pct, bounds.fallback_drift);

        let date1 = next_trading_day(table.last_date());
        let date2 = next_trading_day(date1);

        let (floor, ceiling) = self.config.confidence.band();
        let day2_confidence = (breakdown.overall * DAY2_CONFIDENCE_DECAY).clamp(floor, ceiling);
        let predictions = vec![
            prediction_day(date1, day1_price, current, breakdown.overall),
            prediction_day(date2, day2_price, current, day2_confidence),
        ];

        let downward_trend = if predictions.iter().any(|p| p.direction == Direction::Down) {
            Some(analyze_downtrend(&outcome, &table, current, &predictions))
        } else {
            None
        };

        Ok(ForecastResult {
            symbol: series.symbol().to_string(),
            forecast_date: table.last_date(),
            current_price: current,
            predictions,
            ensemble: EnsembleDetails {
                model_predictions: outcome.model_predictions.clone(),
                weights: outcome.weights.clone(),
                scores: outcome.scores.clone(),
                agreement_score: breakdown.agreement,
            },
            confidence: breakdown,
            downward_trend,
            fallback: outcome.fallback,
        })
    }

    /// Structurally valid low-information result: last price, neutral
    /// direction, configured fallback confidence.
    fn fallback_result(
        &self,
        symbol: &str,
        last_date: NaiveDate,
        current_price: f64,
    ) -> ForecastResult {
        let confidence = self.config.confidence.effective_fallback_confidence();
        let date1 = next_trading_day(last_date);
        let date2 = next_trading_day(date1);
        let predictions = vec![
            prediction_day(date1, current_price, current_price, confidence),
            prediction_day(date2, current_price, current_price, confidence),
        ];
        ForecastResult {
            symbol: symbol.to_string(),
            forecast_date: last_date,
            current_price,
            predictions,
            ensemble: EnsembleDetails {
                model_predictions: BTreeMap::new(),
                weights: BTreeMap::new(),
                scores: BTreeMap::new(),
                agreement_score: 0.5,
            },
            confidence: ConfidenceBreakdown::neutral(confidence),
            downward_trend: None,
            fallback: true,
        }
    }
}

fn prediction_day(date: NaiveDate, predicted: f64, current: f64, confidence: f64) -> PredictionDay {
    PredictionDay {
        date,
        direction: Direction::from_prices(predicted, current),
        predicted_price: predicted,
        predicted_change_points: predicted - current,
        predicted_change_pct: if current > 0.0 {
            (predicted / current - 1.0) * 100.0
        } else {
            0.0
        },
        confidence,
    }
}

/// Price sanity: non-positive or non-finite output is replaced by a small
/// positive drift, then the move is clamped to the allowed band around the
/// current price.
fn bound_price(predicted: f64, current: f64, max_move_pct: f64, fallback_drift: f64) -> f64 {
    let candidate = if predicted.is_finite() && predicted > 0.0 {
        predicted
    } else {
        current * (1.0 + fallback_drift)
    };
    candidate.clamp(current * (1.0 - max_move_pct), current * (1.0 + max_move_pct))
}

fn analyze_downtrend(
    outcome: &EnsembleOutcome,
    table: &FeatureTable,
    current: f64,
    predictions: &[PredictionDay],
) -> DownwardTrendAnalysis {
    // Deepest bounded decline across the two days.
    let expected_decline_pct = predictions
        .iter()
        .map(|p| -p.predicted_change_pct)
        .fold(0.0f64, f64::max);

    let mut below = 0.0;
    let mut total = 0.0;
    for prediction in outcome.model_predictions.values() {
        total += 1.5;
        if prediction.day1 < current {
            below += 1.0;
        }
        if prediction.day2 < current {
            below += 0.5;
        }
    }
    let consensus_ratio = if total > 0.0 { below / total } else { 0.0 };

    let closes = table.closes();
    let n = closes.len();
    let (recent_trend_pct, accelerating) = if n >= 7 {
        let recent = closes[n - 1] / closes[n - 4] - 1.0;
        let prior = closes[n - 4] / closes[n - 7] - 1.0;
        (recent * 100.0, recent < 0.0 && recent < prior)
    } else {
        (0.0, false)
    };

    DownwardTrendAnalysis {
        expected_decline_pct,
        severity: TrendSeverity::from_decline_pct(expected_decline_pct),
        consensus_ratio,
        recent_trend_pct,
        accelerating,
    }
}

fn log_train_report(symbol: &str, report: &TrainReport) {
    tracing::info!(
        symbol,
        trained = report.trained.len(),
        failed = report.failed.len(),
        "models trained"
    );
    for (name, weight) in &report.weights {
        tracing::debug!(model = name.as_str(), weight, "ensemble weight");
    }
}
