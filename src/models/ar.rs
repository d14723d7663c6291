//! Auto-order autoregressive model on log-returns
//!
//! Works on log-returns of the closing price for stationarity, selects the
//! AR order by AIC over 1..=5, and converts the predicted returns back to
//! price via cumulative exponentiation from the last known close.

use super::{passthrough, ForecastModel};
use crate::error::{ForecastError, Result};
use crate::features::FeatureTable;
use crate::types::ModelPrediction;

const MAX_ORDER: usize = 5;
/// Returns needed beyond the candidate order before a fit is attempted
const MIN_EXTRA_OBS: usize = 10;

#[derive(Debug, Clone, Default)]
pub struct AutoRegressiveModel {
    /// AR coefficients, lag 1 first, with the intercept last
    coefficients: Option<Vec<f64>>,
    order: usize,
}

impl AutoRegressiveModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn order(&self) -> usize {
        self.order
    }

    fn log_returns(table: &FeatureTable) -> Vec<f64> {
        table
            .closes()
            .windows(2)
            .filter(|w| w[0] > 0.0 && w[1] > 0.0)
            .map(|w| (w[1] / w[0]).ln())
            .collect()
    }

    /// One-step-ahead forecast given trailing returns (most recent last).
    fn step(&self, history: &[f64]) -> f64 {
        let coefficients = self.coefficients.as_ref().expect("checked by caller");
        let p = self.order;
        let mut value = coefficients[p]; // intercept
        for lag in 1..=p {
            value += coefficients[lag - 1] * history[history.len() - lag];
        }
        value
    }
}

impl ForecastModel for AutoRegressiveModel {
    fn name(&self) -> &'static str {
        "ar"
    }

    fn supports_multistep(&self) -> bool {
        true
    }

    fn is_trained(&self) -> bool {
        self.coefficients.is_some()
    }

    fn fresh(&self) -> Box<dyn ForecastModel> {
        Box::new(Self::new())
    }

    fn fit(&mut self, table: &FeatureTable) -> Result<()> {
        let returns = Self::log_returns(table);
        if returns.len() < MAX_ORDER + MIN_EXTRA_OBS {
            return Err(ForecastError::ModelUnavailable {
                model: "ar",
                reason: format!("{} returns, need {}", returns.len(), MAX_ORDER + MIN_EXTRA_OBS),
            });
        }

        let mut best: Option<(f64, usize, Vec<f64>)> = None;
        for p in 1..=MAX_ORDER {
            if let Some((coefficients, aic)) = fit_ar(&returns, p) {
                if best.as_ref().map(|(a, _, _)| aic < *a).unwrap_or(true) {
                    best = Some((aic, p, coefficients));
                }
            }
        }

        match best {
            Some((_, p, coefficients)) => {
                tracing::debug!(order = p, "ar model fitted");
                self.order = p;
                self.coefficients = Some(coefficients);
                Ok(())
            }
            None => Err(ForecastError::ModelUnavailable {
                model: "ar",
                reason: "no AR order produced a solvable system".to_string(),
            }),
        }
    }

    fn predict(&self, table: &FeatureTable) -> Result<ModelPrediction> {
        if !self.is_trained() {
            return Ok(passthrough(table));
        }
        let returns = Self::log_returns(table);
        if returns.len() < self.order {
            return Ok(passthrough(table));
        }

        let mut history = returns;
        let r1 = self.step(&history);
        history.push(r1);
        let r2 = self.step(&history);

        let last_close = table.last_close();
        let day1 = last_close * r1.exp();
        let day2 = day1 * r2.exp();
        if !day1.is_finite() || !day2.is_finite() {
            return Ok(passthrough(table));
        }
        Ok(ModelPrediction { day1, day2 })
    }
}

/// Least-squares AR(p) fit; returns (coefficients ++ intercept, AIC).
fn fit_ar(returns: &[f64], p: usize) -> Option<(Vec<f64>, f64)> {
    let n = returns.len() - p;
    if n < MIN_EXTRA_OBS {
        return None;
    }

    // Normal equations for the design [r_{t-1} .. r_{t-p}, 1].
    let dim = p + 1;
    let mut xtx = vec![vec![0.0; dim]; dim];
    let mut xty = vec![0.0; dim];
    for t in p..returns.len() {
        let mut row = Vec::with_capacity(dim);
        for lag in 1..=p {
            row.push(returns[t - lag]);
        }
        row.push(1.0);
        for i in 0..dim {
            xty[i] += row[i] * returns[t];
            for j in 0..dim {
                xtx[i][j] += row[i] * row[j];
            }
        }
    }

    let coefficients = solve(xtx, xty)?;

    let mut sse = 0.0;
    for t in p..returns.len() {
        let mut fitted = coefficients[p];
        for lag in 1..=p {
            fitted += coefficients[lag - 1] * returns[t - lag];
        }
        sse += (returns[t] - fitted).powi(2);
    }
    let sse = sse.max(1e-12);
    let aic = n as f64 * (sse / n as f64).ln() + 2.0 * dim as f64;
    Some((coefficients, aic))
}

/// Gaussian elimination with partial pivoting.
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| {
            a[i][col].abs().partial_cmp(&a[j][col].abs()).unwrap()
        })?;
        if a[pivot][col].abs() < 1e-12 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);
        for row in (col + 1)..n {
            let factor = a[row][col] / a[col][col];
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }
    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let mut sum = b[row];
        for k in (row + 1)..n {
            sum -= a[row][k] * x[k];
        }
        x[row] = sum / a[row][row];
    }
    Some(x)
}
