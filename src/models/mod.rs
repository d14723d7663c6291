//! Forecasting models
//!
//! Four independently fittable models share one contract: fit on a
//! FeatureTable, predict a 2-step-ahead close. A model that could not be
//! trained answers `predict` with the last observed close for both days
//! instead of raising; the ensemble combiner turns that into an epsilon
//! weight rather than a pipeline failure.

pub mod ar;
pub mod boosted;
pub mod lstm;
pub mod seasonal;

pub use ar::AutoRegressiveModel;
pub use boosted::BoostedTreesModel;
pub use lstm::LstmModel;
pub use seasonal::SeasonalTrendModel;

use crate::error::Result;
use crate::features::FeatureTable;
use crate::types::ModelPrediction;

pub trait ForecastModel {
    fn name(&self) -> &'static str;

    /// Whether the model natively forecasts both days. Models answering
    /// false extrapolate day 2 from day 1 by a configured factor.
    fn supports_multistep(&self) -> bool {
        false
    }

    fn is_trained(&self) -> bool;

    /// Fresh untrained copy with the same hyperparameters, used for
    /// walk-forward cross-validation refits.
    fn fresh(&self) -> Box<dyn ForecastModel>;

    fn fit(&mut self, table: &FeatureTable) -> Result<()>;

    fn predict(&self, table: &FeatureTable) -> Result<ModelPrediction>;
}

/// Last-close pass-through used by every untrained model.
pub fn passthrough(table: &FeatureTable) -> ModelPrediction {
    ModelPrediction::flat(table.last_close())
}

/// Column-wise min-max scaler fit on the training matrix.
#[derive(Debug, Clone)]
pub struct MinMaxScaler {
    mins: Vec<f64>,
    ranges: Vec<f64>,
}

impl MinMaxScaler {
    pub fn fit(rows: &[Vec<f64>]) -> Self {
        let n_cols = rows.first().map(|r| r.len()).unwrap_or(0);
        let mut mins = vec![f64::INFINITY; n_cols];
        let mut maxs = vec![f64::NEG_INFINITY; n_cols];
        for row in rows {
            for (j, v) in row.iter().enumerate() {
                mins[j] = mins[j].min(*v);
                maxs[j] = maxs[j].max(*v);
            }
        }
        let ranges = mins
            .iter()
            .zip(maxs.iter())
            .map(|(lo, hi)| {
                let r = hi - lo;
                if r > 0.0 { r } else { 1.0 }
            })
            .collect();
        Self { mins, ranges }
    }

    pub fn transform(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .enumerate()
            .map(|(j, v)| (v - self.mins[j]) / self.ranges[j])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaler_maps_training_rows_into_unit_cube() {
        let rows = vec![vec![0.0, 10.0], vec![5.0, 20.0], vec![10.0, 30.0]];
        let scaler = MinMaxScaler::fit(&rows);
        let mid = scaler.transform(&rows[1]);
        assert!((mid[0] - 0.5).abs() < 1e-12);
        assert!((mid[1] - 0.5).abs() < 1e-12);
        let lo = scaler.transform(&rows[0]);
        assert_eq!(lo, vec![0.0, 0.0]);
    }

    #[test]
    fn scaler_tolerates_constant_columns() {
        let rows = vec![vec![3.0], vec![3.0]];
        let scaler = MinMaxScaler::fit(&rows);
        assert_eq!(scaler.transform(&[3.0]), vec![0.0]);
    }
}
