//! Feature engineering: PriceSeries → flat numeric FeatureTable
//!
//! The builder is a pure function of its inputs: identical price history and
//! identical provider scalars always produce the identical table. Macro and
//! sentiment scalars are point-in-time values repeated down their columns, a
//! deliberate simplification until richer signal history is available.

pub mod indicators;

use crate::config::FeatureConfig;
use crate::error::{ForecastError, Result};
use crate::providers::{MacroSignalProvider, SentimentProvider};
use crate::types::PriceSeries;
use chrono::NaiveDate;

use indicators as ind;

/// Ordered numeric feature columns aligned with price history rows.
///
/// The last row always corresponds to the most recent available bar and is
/// the one used for live prediction. A `close` column is guaranteed.
#[derive(Debug, Clone)]
pub struct FeatureTable {
    names: Vec<String>,
    columns: Vec<Vec<f64>>,
    dates: Vec<NaiveDate>,
}

impl FeatureTable {
    pub fn n_rows(&self) -> usize {
        self.dates.len()
    }

    pub fn n_cols(&self) -> usize {
        self.names.len()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn column(&self, name: &str) -> Result<&[f64]> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|i| self.columns[i].as_slice())
            .ok_or_else(|| ForecastError::MissingColumn(name.to_string()))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn closes(&self) -> &[f64] {
        self.column("close").expect("close column is guaranteed")
    }

    pub fn last_close(&self) -> f64 {
        *self.closes().last().expect("table is never empty")
    }

    pub fn last_date(&self) -> NaiveDate {
        *self.dates.last().expect("table is never empty")
    }

    /// Single row as a dense vector, column order matching `names()`.
    pub fn row(&self, index: usize) -> Vec<f64> {
        self.columns.iter().map(|c| c[index]).collect()
    }

    /// Prefix copy with the first `len` rows; used for walk-forward scoring.
    pub fn truncated(&self, len: usize) -> FeatureTable {
        let len = len.min(self.n_rows());
        FeatureTable {
            names: self.names.clone(),
            columns: self.columns.iter().map(|c| c[..len].to_vec()).collect(),
            dates: self.dates[..len].to_vec(),
        }
    }
}

/// Deterministic FeatureTable builder
pub struct FeatureBuilder {
    config: FeatureConfig,
}

impl FeatureBuilder {
    pub fn new(config: FeatureConfig) -> Self {
        Self { config }
    }

    pub fn build(
        &self,
        series: &PriceSeries,
        macro_provider: &dyn MacroSignalProvider,
        sentiment_provider: &dyn SentimentProvider,
    ) -> Result<FeatureTable> {
        if series.is_empty() {
            return Err(ForecastError::MissingCloses);
        }

        let closes = series.closes();
        let highs: Vec<f64> = series.bars().iter().map(|b| b.high).collect();
        let lows: Vec<f64> = series.bars().iter().map(|b| b.low).collect();
        let volumes: Vec<f64> = series.bars().iter().map(|b| b.volume).collect();
        let dates: Vec<NaiveDate> = series.bars().iter().map(|b| b.date).collect();

        let mut names: Vec<String> = Vec::new();
        let mut columns: Vec<Vec<f64>> = Vec::new();
        let push = |name: &str, col: Vec<f64>, names: &mut Vec<String>, columns: &mut Vec<Vec<f64>>| {
            names.push(name.to_string());
            columns.push(col);
        };

        push("close", closes.clone(), &mut names, &mut columns);
        push("volume", volumes.clone(), &mut names, &mut columns);

        let rsi_14 = ind::rsi(&closes, 14);
        for window in [7usize, 14, 21] {
            let col = if window == 14 {
                rsi_14.clone()
            } else {
                ind::rsi(&closes, window)
            };
            push(&format!("rsi_{window}"), col, &mut names, &mut columns);
        }

        for window in [5usize, 10, 20, 50] {
            let sma = ind::sma(&closes, window);
            let ratio: Vec<f64> = closes
                .iter()
                .zip(sma.iter())
                .map(|(c, s)| if *s != 0.0 { c / s - 1.0 } else { f64::NAN })
                .collect();
            push(&format!("sma_{window}"), sma, &mut names, &mut columns);
            push(&format!("price_sma_{window}_ratio"), ratio, &mut names, &mut columns);
        }

        for (fast, slow, signal) in [(12usize, 26usize, 9usize), (5, 35, 5)] {
            let (line, signal_line, hist) = ind::macd(&closes, fast, slow, signal);
            push(&format!("macd_{fast}_{slow}"), line, &mut names, &mut columns);
            push(
                &format!("macd_signal_{fast}_{slow}_{signal}"),
                signal_line,
                &mut names,
                &mut columns,
            );
            push(
                &format!("macd_hist_{fast}_{slow}_{signal}"),
                hist,
                &mut names,
                &mut columns,
            );
        }

        for window in [20usize, 10] {
            let (position, width) = ind::bollinger(&closes, window, 2.0);
            push(&format!("bb_position_{window}"), position, &mut names, &mut columns);
            push(&format!("bb_width_{window}"), width, &mut names, &mut columns);
        }

        let atr = ind::atr(&highs, &lows, &closes, 14);
        let atr_ratio: Vec<f64> = atr
            .iter()
            .zip(closes.iter())
            .map(|(a, c)| if *c != 0.0 { a / c } else { f64::NAN })
            .collect();
        push("atr_14_ratio", atr_ratio, &mut names, &mut columns);

        let support = ind::rolling_min(&lows, 20);
        let resistance = ind::rolling_max(&highs, 20);
        let support_dist: Vec<f64> = closes
            .iter()
            .zip(support.iter())
            .map(|(c, s)| if *c != 0.0 { (c - s) / c } else { f64::NAN })
            .collect();
        let resistance_dist: Vec<f64> = closes
            .iter()
            .zip(resistance.iter())
            .map(|(c, r)| if *c != 0.0 { (r - c) / c } else { f64::NAN })
            .collect();
        push("support_dist_20", support_dist, &mut names, &mut columns);
        push("resistance_dist_20", resistance_dist, &mut names, &mut columns);

        let return_1 = ind::returns(&closes, 1);
        for horizon in [1usize, 2, 5, 10] {
            let col = if horizon == 1 {
                return_1.clone()
            } else {
                ind::returns(&closes, horizon)
            };
            push(&format!("return_{horizon}"), col, &mut names, &mut columns);
            push(
                &format!("log_return_{horizon}"),
                ind::log_returns(&closes, horizon),
                &mut names,
                &mut columns,
            );
        }

        let vol_sma5 = ind::sma(&volumes, 5);
        let vol_sma20 = ind::sma(&volumes, 20);
        let volume_ratio: Vec<f64> = vol_sma5
            .iter()
            .zip(vol_sma20.iter())
            .map(|(a, b)| if *b != 0.0 { a / b } else { f64::NAN })
            .collect();
        let vol_sma10 = ind::sma(&volumes, 10);
        let volume_trend: Vec<f64> = vol_sma5
            .iter()
            .zip(vol_sma10.iter())
            .map(|(a, b)| if *b != 0.0 { a / b - 1.0 } else { f64::NAN })
            .collect();
        push("volume_ratio_5_20", volume_ratio.clone(), &mut names, &mut columns);
        push("volume_trend", volume_trend, &mut names, &mut columns);

        // Point-in-time auxiliary scalars, repeated down the column.
        let n = closes.len();
        let macro_signals = macro_provider.macro_signals(series.symbol());
        for (key, value) in &macro_signals {
            push(&format!("macro_{key}"), vec![*value; n], &mut names, &mut columns);
        }
        let sentiment_signals = sentiment_provider.sentiment_signals(series.symbol());
        for (key, value) in &sentiment_signals {
            push(&format!("sentiment_{key}"), vec![*value; n], &mut names, &mut columns);
        }

        // Shallow interactions between technical and auxiliary signals.
        if let Some(score) = macro_signals.get("economic_score") {
            let interaction: Vec<f64> = rsi_14.iter().map(|r| r / 100.0 * score).collect();
            push("rsi14_x_economic", interaction, &mut names, &mut columns);
        }
        if let Some(score) = sentiment_signals.get("sentiment_score") {
            let interaction: Vec<f64> = volume_ratio.iter().map(|v| v * score).collect();
            push("volume_x_sentiment", interaction, &mut names, &mut columns);
        }

        // Short lags and rolling stats for local momentum.
        for k in [1usize, 2] {
            push(&format!("return_1_lag{k}"), ind::lag(&return_1, k), &mut names, &mut columns);
            push(&format!("rsi_14_lag{k}"), ind::lag(&rsi_14, k), &mut names, &mut columns);
        }
        push("return_mean_5", ind::rolling_mean(&return_1, 5), &mut names, &mut columns);
        push("return_std_5", ind::rolling_std(&return_1, 5), &mut names, &mut columns);

        let (names, columns, dates) = clean(names, columns, dates);

        if dates.len() < self.config.min_bars {
            return Err(ForecastError::InsufficientData {
                rows: dates.len(),
                required: self.config.min_bars,
            });
        }

        Ok(FeatureTable {
            names,
            columns,
            dates,
        })
    }
}

/// Missing-value policy: drop rows that are mostly NaN, forward-fill then
/// back-fill each column, impute any residual NaN with the column median.
fn clean(
    names: Vec<String>,
    columns: Vec<Vec<f64>>,
    dates: Vec<NaiveDate>,
) -> (Vec<String>, Vec<Vec<f64>>, Vec<NaiveDate>) {
    let n_rows = dates.len();
    let n_cols = columns.len();

    let keep: Vec<bool> = (0..n_rows)
        .map(|i| {
            let nan_count = columns.iter().filter(|c| !c[i].is_finite()).count();
            (nan_count as f64) <= (n_cols as f64) * 0.5
        })
        .collect();

    let dates: Vec<NaiveDate> = dates
        .into_iter()
        .zip(keep.iter())
        .filter(|(_, k)| **k)
        .map(|(d, _)| d)
        .collect();

    let mut columns: Vec<Vec<f64>> = columns
        .into_iter()
        .map(|col| {
            col.into_iter()
                .zip(keep.iter())
                .filter(|(_, k)| **k)
                .map(|(v, _)| v)
                .collect()
        })
        .collect();

    for col in &mut columns {
        // Forward fill
        let mut last = f64::NAN;
        for v in col.iter_mut() {
            if v.is_finite() {
                last = *v;
            } else if last.is_finite() {
                *v = last;
            }
        }
        // Back fill the leading gap
        let mut next = f64::NAN;
        for v in col.iter_mut().rev() {
            if v.is_finite() {
                next = *v;
            } else if next.is_finite() {
                *v = next;
            }
        }
        // Median impute anything still missing
        if col.iter().any(|v| !v.is_finite()) {
            let mut finite: Vec<f64> = col.iter().copied().filter(|v| v.is_finite()).collect();
            let median = if finite.is_empty() {
                0.0
            } else {
                finite.sort_by(|a, b| a.partial_cmp(b).unwrap());
                finite[finite.len() / 2]
            };
            for v in col.iter_mut() {
                if !v.is_finite() {
                    *v = median;
                }
            }
        }
    }

    (names, columns, dates)
}
