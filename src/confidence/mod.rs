//! Confidence engine: five corroborating factors, one composite score
//!
//! Consumes the combiner's per-model predictions plus the feature table and
//! scores how much the forecast deserves to be believed. Each factor lands in
//! [0, 1]; the composite is a fixed-weight sum with a multi-factor boost and
//! a configurable clamp band. The legacy always-high band survives behind
//! `optimistic_mode`.

use crate::config::ConfidenceConfig;
use crate::ensemble::EnsembleOutcome;
use crate::features::FeatureTable;
use serde::Serialize;

/// Factor weights: agreement, quality, market, technical, downtrend.
const FACTOR_WEIGHTS: [f64; 5] = [0.30, 0.25, 0.20, 0.15, 0.10];
/// Factors above this level count toward the multi-factor boost.
const BOOST_THRESHOLD: f64 = 0.85;
const BOOST_AMOUNT: f64 = 0.05;
const BOOST_CAP: f64 = 0.98;

#[derive(Debug, Clone, Serialize)]
pub struct ConfidenceBreakdown {
    pub agreement: f64,
    pub quality: f64,
    pub market_conditions: f64,
    pub technical_signals: f64,
    pub downtrend_validation: f64,
    pub overall: f64,
    pub tier: String,
}

impl ConfidenceBreakdown {
    /// Breakdown for fallback results: every factor pinned to neutral and
    /// the overall score supplied by the caller.
    pub fn neutral(overall: f64) -> Self {
        Self {
            agreement: 0.5,
            quality: 0.5,
            market_conditions: 0.5,
            technical_signals: 0.5,
            downtrend_validation: 0.5,
            overall,
            tier: tier(overall).to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConfidenceEngine {
    config: ConfidenceConfig,
}

impl ConfidenceEngine {
    pub fn new(config: ConfidenceConfig) -> Self {
        Self { config }
    }

    pub fn evaluate(
        &self,
        outcome: &EnsembleOutcome,
        table: &FeatureTable,
        current_price: f64,
    ) -> ConfidenceBreakdown {
        let agreement = agreement_factor(outcome);
        let quality = quality_factor(outcome);
        let market_conditions = market_conditions_factor(table);
        let technical_signals = technical_factor(table);
        let downtrend_validation = downtrend_factor(outcome, table, current_price);

        let factors = [
            agreement,
            quality,
            market_conditions,
            technical_signals,
            downtrend_validation,
        ];
        let mut overall: f64 = factors
            .iter()
            .zip(FACTOR_WEIGHTS.iter())
            .map(|(f, w)| f * w)
            .sum();

        // Three or more independently strong factors escalate toward
        // near-certainty; a deliberate rule, not hidden rounding.
        let strong = factors.iter().filter(|f| **f > BOOST_THRESHOLD).count();
        if strong >= 3 {
            overall = (overall + BOOST_AMOUNT).min(BOOST_CAP);
        }

        let (floor, ceiling) = self.config.band();
        let overall = overall.clamp(floor, ceiling);

        tracing::debug!(
            agreement,
            quality,
            market_conditions,
            technical_signals,
            downtrend_validation,
            overall,
            "confidence evaluated"
        );
        ConfidenceBreakdown {
            agreement,
            quality,
            market_conditions,
            technical_signals,
            downtrend_validation,
            overall,
            tier: tier(overall).to_string(),
        }
    }
}

fn tier(overall: f64) -> &'static str {
    if overall >= 0.9 {
        "very_high"
    } else if overall >= 0.8 {
        "high"
    } else if overall >= 0.65 {
        "moderate"
    } else {
        "low"
    }
}

/// Dispersion of per-model predictions, scored through a step function on the
/// coefficient of variation. Day 1 and day 2 are scored separately and
/// averaged.
fn agreement_factor(outcome: &EnsembleOutcome) -> f64 {
    let day1: Vec<f64> = outcome.model_predictions.values().map(|p| p.day1).collect();
    let day2: Vec<f64> = outcome.model_predictions.values().map(|p| p.day2).collect();
    (agreement_from_values(&day1) + agreement_from_values(&day2)) / 2.0
}

fn agreement_from_values(values: &[f64]) -> f64 {
    if values.len() < 2 {
        // A single model cannot corroborate itself.
        return 0.5;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if mean.abs() < 1e-12 {
        return 0.3;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let cv = variance.sqrt() / mean.abs();

    if cv < 0.01 {
        0.95
    } else if cv < 0.02 {
        0.90
    } else if cv < 0.05 {
        0.85
    } else {
        // Linear decay past 5% dispersion, floored at 0.3.
        (0.85 - (cv - 0.05) * 5.0).max(0.3)
    }
}

/// Mean cross-validation score of the contributing models plus a small
/// ensemble bonus; several decent models are themselves evidence.
fn quality_factor(outcome: &EnsembleOutcome) -> f64 {
    let contributors: Vec<f64> = outcome
        .model_predictions
        .keys()
        .filter_map(|name| outcome.scores.get(name))
        .map(|s| s.clamp(0.0, 1.0))
        .collect();
    if contributors.is_empty() {
        return 0.2;
    }
    let mean = contributors.iter().sum::<f64>() / contributors.len() as f64;
    let bonus = 0.03 * (contributors.len().saturating_sub(1)) as f64;
    (mean + bonus).min(0.95)
}

/// Volume corroboration, recent-vs-historical volatility, and the injected
/// sentiment score.
fn market_conditions_factor(table: &FeatureTable) -> f64 {
    let mut score: f64 = 0.5;

    if let Some(volume_ratio) = last_finite(table, "volume_ratio_5_20") {
        if volume_ratio > 1.2 {
            score += 0.15;
        } else if volume_ratio > 1.0 {
            score += 0.08;
        } else if volume_ratio < 0.7 {
            score -= 0.10;
        }
    }

    // Calm recent tape relative to history favors the point forecast.
    if let Ok(returns) = table.column("return_1") {
        let finite: Vec<f64> = returns.iter().copied().filter(|r| r.is_finite()).collect();
        if finite.len() >= 15 {
            let recent = std_dev(&finite[finite.len() - 5..]);
            let historical = std_dev(&finite);
            if historical > 1e-12 {
                let ratio = recent / historical;
                if ratio < 0.8 {
                    score += 0.15;
                } else if ratio < 1.0 {
                    score += 0.08;
                } else if ratio > 1.5 {
                    score -= 0.15;
                } else if ratio > 1.2 {
                    score -= 0.08;
                }
            }
        }
    }

    if let Some(sentiment) = last_finite(table, "sentiment_sentiment_score") {
        // Sentiment sits on a [0, 1] scale with 0.5 neutral.
        score += (sentiment - 0.5) * 0.2;
    }

    score.clamp(0.0, 1.0)
}

/// RSI extremity, MACD line-vs-signal separation, Bollinger edge proximity.
/// Extremes count as directional corroboration, not noise.
fn technical_factor(table: &FeatureTable) -> f64 {
    let mut score: f64 = 0.5;

    if let Some(rsi) = last_finite(table, "rsi_14") {
        if !(30.0..=70.0).contains(&rsi) {
            score += 0.20;
        } else if !(40.0..=60.0).contains(&rsi) {
            score += 0.10;
        }
    }

    if let (Some(line), Some(signal)) = (
        last_finite(table, "macd_12_26"),
        last_finite(table, "macd_signal_12_26_9"),
    ) {
        let close = table.last_close();
        if close > 0.0 && (line - signal).abs() / close > 0.001 {
            score += 0.10;
        }
    }

    if let Some(position) = last_finite(table, "bb_position_20") {
        if !(0.05..=0.95).contains(&position) {
            score += 0.15;
        } else if !(0.2..=0.8).contains(&position) {
            score += 0.07;
        }
    }

    score.clamp(0.0, 1.0)
}

/// Bearish forecasts get extra scrutiny: weighted below-price consensus
/// (day 2 at half weight) corroborated by a realized negative and
/// accelerating short-term trend. Neutral 0.5 when the blend points up.
fn downtrend_factor(outcome: &EnsembleOutcome, table: &FeatureTable, current_price: f64) -> f64 {
    if outcome.model_predictions.is_empty() || outcome.blended.day1 >= current_price {
        return 0.5;
    }

    let mut below = 0.0;
    let mut total = 0.0;
    for prediction in outcome.model_predictions.values() {
        total += 1.5;
        if prediction.day1 < current_price {
            below += 1.0;
        }
        if prediction.day2 < current_price {
            below += 0.5;
        }
    }
    let consensus = if total > 0.0 { below / total } else { 0.0 };
    let mut score: f64 = 0.4 + 0.4 * consensus;

    let closes = table.closes();
    if closes.len() >= 7 {
        let n = closes.len();
        let recent = closes[n - 1] / closes[n - 4] - 1.0;
        let prior = closes[n - 4] / closes[n - 7] - 1.0;
        if recent < 0.0 {
            score += 0.1;
            if recent < prior {
                // Decline is speeding up.
                score += 0.1;
            }
        }
    }

    score.clamp(0.0, 1.0)
}

fn last_finite(table: &FeatureTable, name: &str) -> Option<f64> {
    table
        .column(name)
        .ok()?
        .iter()
        .rev()
        .copied()
        .find(|v| v.is_finite())
}

fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeatureConfig;
    use crate::features::FeatureBuilder;
    use crate::providers::{NeutralMacro, NeutralSentiment};
    use crate::types::{ModelPrediction, PriceBar, PriceSeries};
    use chrono::{Days, NaiveDate};
    use std::collections::BTreeMap;

    fn outcome_with(predictions: &[(&str, f64, f64)]) -> EnsembleOutcome {
        let model_predictions: BTreeMap<String, ModelPrediction> = predictions
            .iter()
            .map(|(name, day1, day2)| {
                (
                    name.to_string(),
                    ModelPrediction {
                        day1: *day1,
                        day2: *day2,
                    },
                )
            })
            .collect();
        let scores = model_predictions.keys().map(|k| (k.clone(), 0.5)).collect();
        let weights = model_predictions
            .keys()
            .map(|k| (k.clone(), 1.0 / predictions.len() as f64))
            .collect();
        let n = predictions.len() as f64;
        let blended = ModelPrediction {
            day1: predictions.iter().map(|(_, d1, _)| d1).sum::<f64>() / n,
            day2: predictions.iter().map(|(_, _, d2)| d2).sum::<f64>() / n,
        };
        let trained_models = predictions.len();
        EnsembleOutcome {
            blended,
            model_predictions,
            weights,
            scores,
            trained_models,
            fallback: false,
        }
    }

    fn table(n: usize) -> FeatureTable {
        let start: NaiveDate = "2024-01-01".parse().unwrap();
        let bars: Vec<PriceBar> = (0..n)
            .map(|i| {
                let close = 100.0 + (i as f64 * 0.3).sin() * 1.2;
                PriceBar {
                    date: start.checked_add_days(Days::new(i as u64)).unwrap(),
                    open: close,
                    high: close * 1.01,
                    low: close * 0.99,
                    close,
                    volume: 18_000.0,
                }
            })
            .collect();
        let series = PriceSeries::new("TEST", bars).unwrap();
        FeatureBuilder::new(FeatureConfig::default())
            .build(&series, &NeutralMacro, &NeutralSentiment)
            .unwrap()
    }

    #[test]
    fn perfect_agreement_scores_higher_than_dispersed() {
        let tight = outcome_with(&[("a", 100.0, 100.5), ("b", 100.0, 100.5), ("c", 100.0, 100.5)]);
        let wide = outcome_with(&[("a", 80.0, 80.0), ("b", 100.0, 100.0), ("c", 120.0, 120.0)]);
        assert!(agreement_factor(&tight) > agreement_factor(&wide));
        assert!(agreement_factor(&tight) >= 0.95);
    }

    #[test]
    fn agreement_step_function_thresholds() {
        // CV of [100, 101] is about 0.5%, inside the top band.
        assert!((agreement_from_values(&[100.0, 101.0]) - 0.95).abs() < 1e-9);
        // CV of [100, 103] is about 1.5%.
        assert!((agreement_from_values(&[100.0, 103.0]) - 0.90).abs() < 1e-9);
        // CV of [100, 108] is about 3.8%.
        assert!((agreement_from_values(&[100.0, 108.0]) - 0.85).abs() < 1e-9);
        // Heavy dispersion decays but never below 0.3.
        assert!(agreement_from_values(&[50.0, 150.0]) >= 0.3);
        assert!(agreement_from_values(&[50.0, 150.0]) < 0.85);
    }

    #[test]
    fn single_model_agreement_is_neutral() {
        let outcome = outcome_with(&[("solo", 100.0, 101.0)]);
        assert!((agreement_factor(&outcome) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn quality_rewards_more_contributors() {
        let few = outcome_with(&[("a", 100.0, 100.0)]);
        let many = outcome_with(&[("a", 100.0, 100.0), ("b", 100.0, 100.0), ("c", 100.0, 100.0)]);
        assert!(quality_factor(&many) > quality_factor(&few));
        assert!(quality_factor(&many) <= 0.95);
    }

    #[test]
    fn downtrend_factor_neutral_when_blend_points_up() {
        let table = table(80);
        let outcome = outcome_with(&[("a", 105.0, 106.0), ("b", 104.0, 105.0)]);
        assert!((downtrend_factor(&outcome, &table, 100.0) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn downtrend_factor_saturates_inside_unit_interval() {
        // Accelerating slide plus unanimous below-price consensus pushes the
        // raw score to its maximum; the clamp must hold it at 1.0.
        let start: NaiveDate = "2024-01-01".parse().unwrap();
        let bars: Vec<PriceBar> = (0..120)
            .map(|i| {
                let close = 150.0 - (i as f64).powf(1.5) * 0.01;
                PriceBar {
                    date: start.checked_add_days(Days::new(i as u64)).unwrap(),
                    open: close,
                    high: close * 1.01,
                    low: close * 0.99,
                    close,
                    volume: 18_000.0,
                }
            })
            .collect();
        let series = PriceSeries::new("TEST", bars).unwrap();
        let sliding = FeatureBuilder::new(FeatureConfig::default())
            .build(&series, &NeutralMacro, &NeutralSentiment)
            .unwrap();

        let current = sliding.last_close();
        let outcome = outcome_with(&[
            ("a", current * 0.97, current * 0.95),
            ("b", current * 0.98, current * 0.96),
            ("c", current * 0.96, current * 0.94),
        ]);
        let factor = downtrend_factor(&outcome, &sliding, current);
        assert!((0.0..=1.0).contains(&factor));
        assert!(factor >= 0.9);
    }

    #[test]
    fn downtrend_consensus_raises_factor() {
        let table = table(80);
        let unanimous = outcome_with(&[("a", 95.0, 94.0), ("b", 96.0, 95.0)]);
        let split = outcome_with(&[("a", 95.0, 101.0), ("b", 99.0, 102.0)]);
        let current = 100.0;
        assert!(
            downtrend_factor(&unanimous, &table, current)
                > downtrend_factor(&split, &table, current)
        );
    }

    #[test]
    fn factors_and_overall_stay_in_unit_range() {
        let table = table(90);
        let outcome = outcome_with(&[("a", 100.5, 100.8), ("b", 100.4, 100.9), ("c", 100.6, 100.7)]);
        let engine = ConfidenceEngine::new(ConfidenceConfig::default());
        let breakdown = engine.evaluate(&outcome, &table, 100.0);
        for factor in [
            breakdown.agreement,
            breakdown.quality,
            breakdown.market_conditions,
            breakdown.technical_signals,
            breakdown.downtrend_validation,
            breakdown.overall,
        ] {
            assert!((0.0..=1.0).contains(&factor), "factor {} out of range", factor);
        }
    }

    #[test]
    fn optimistic_mode_enforces_legacy_band() {
        let table = table(90);
        // No contributing models at all, so honest confidence is low.
        let outcome = outcome_with(&[]);
        let honest = ConfidenceEngine::new(ConfidenceConfig::default());
        let low = honest.evaluate(&outcome, &table, 100.0);
        assert!(low.overall < 0.80);

        let legacy = ConfidenceEngine::new(ConfidenceConfig {
            optimistic_mode: true,
            ..ConfidenceConfig::default()
        });
        let clamped = legacy.evaluate(&outcome, &table, 100.0);
        assert!((0.80..=0.98).contains(&clamped.overall));
    }

    #[test]
    fn tier_thresholds() {
        assert_eq!(tier(0.95), "very_high");
        assert_eq!(tier(0.85), "high");
        assert_eq!(tier(0.70), "moderate");
        assert_eq!(tier(0.40), "low");
    }
}
