//! Gradient-boosted shallow regression trees over the feature matrix
//!
//! Predicts the next-day close directly from the scaled feature row. Day 2
//! is a configured extrapolation of day 1 rather than a second independent
//! fit; the model reports `supports_multistep() == false` so the combiner
//! knows this is an explicit simplification.

use super::{passthrough, ForecastModel, MinMaxScaler};
use crate::config::ModelConfig;
use crate::error::{ForecastError, Result};
use crate::features::FeatureTable;
use crate::types::ModelPrediction;

const MIN_SAMPLES: usize = 20;
const MIN_LEAF: usize = 5;
const SPLIT_CANDIDATES: usize = 8;

#[derive(Debug, Clone)]
pub struct BoostedTreesModel {
    rounds: usize,
    depth: usize,
    learning_rate: f64,
    day2_extrapolation: f64,
    trained: Option<Trained>,
}

#[derive(Debug, Clone)]
struct Trained {
    scaler: MinMaxScaler,
    base: f64,
    trees: Vec<Tree>,
}

#[derive(Debug, Clone)]
enum Tree {
    Leaf(f64),
    Node {
        feature: usize,
        threshold: f64,
        left: Box<Tree>,
        right: Box<Tree>,
    },
}

impl Tree {
    fn eval(&self, row: &[f64]) -> f64 {
        match self {
            Tree::Leaf(value) => *value,
            Tree::Node {
                feature,
                threshold,
                left,
                right,
            } => {
                if row[*feature] <= *threshold {
                    left.eval(row)
                } else {
                    right.eval(row)
                }
            }
        }
    }
}

impl BoostedTreesModel {
    pub fn new(config: &ModelConfig) -> Self {
        Self {
            rounds: config.boost_rounds,
            depth: config.boost_depth,
            learning_rate: config.boost_learning_rate,
            day2_extrapolation: config.day2_extrapolation,
            trained: None,
        }
    }
}

impl ForecastModel for BoostedTreesModel {
    fn name(&self) -> &'static str {
        "boosted_trees"
    }

    fn is_trained(&self) -> bool {
        self.trained.is_some()
    }

    fn fresh(&self) -> Box<dyn ForecastModel> {
        Box::new(Self {
            trained: None,
            ..self.clone()
        })
    }

    fn fit(&mut self, table: &FeatureTable) -> Result<()> {
        let n = table.n_rows();
        if n < MIN_SAMPLES + 1 {
            return Err(ForecastError::ModelUnavailable {
                model: "boosted_trees",
                reason: format!("{} rows, need {}", n, MIN_SAMPLES + 1),
            });
        }

        // Row i predicts close[i + 1].
        let raw_rows: Vec<Vec<f64>> = (0..n - 1).map(|i| table.row(i)).collect();
        let scaler = MinMaxScaler::fit(&raw_rows);
        let rows: Vec<Vec<f64>> = raw_rows.iter().map(|r| scaler.transform(r)).collect();
        let targets: Vec<f64> = table.closes()[1..].to_vec();

        let base = targets.iter().sum::<f64>() / targets.len() as f64;
        let mut predictions = vec![base; targets.len()];
        let mut trees = Vec::with_capacity(self.rounds);

        for _ in 0..self.rounds {
            let residuals: Vec<f64> = targets
                .iter()
                .zip(predictions.iter())
                .map(|(y, p)| y - p)
                .collect();
            let indices: Vec<usize> = (0..rows.len()).collect();
            let tree = grow(&rows, &residuals, &indices, self.depth);
            for (i, row) in rows.iter().enumerate() {
                predictions[i] += self.learning_rate * tree.eval(row);
            }
            trees.push(tree);
        }

        tracing::debug!(rounds = trees.len(), "boosted trees fitted");
        self.trained = Some(Trained { scaler, base, trees });
        Ok(())
    }

    fn predict(&self, table: &FeatureTable) -> Result<ModelPrediction> {
        let Some(trained) = &self.trained else {
            return Ok(passthrough(table));
        };
        let row = trained.scaler.transform(&table.row(table.n_rows() - 1));
        let mut day1 = trained.base;
        for tree in &trained.trees {
            day1 += self.learning_rate * tree.eval(&row);
        }
        if !day1.is_finite() {
            return Ok(passthrough(table));
        }
        let day2 = day1 * self.day2_extrapolation;
        Ok(ModelPrediction { day1, day2 })
    }
}

fn grow(rows: &[Vec<f64>], residuals: &[f64], indices: &[usize], depth: usize) -> Tree {
    let mean = indices.iter().map(|&i| residuals[i]).sum::<f64>() / indices.len() as f64;
    if depth == 0 || indices.len() < 2 * MIN_LEAF {
        return Tree::Leaf(mean);
    }

    let Some((feature, threshold)) = best_split(rows, residuals, indices) else {
        return Tree::Leaf(mean);
    };

    let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
        .iter()
        .partition(|&&i| rows[i][feature] <= threshold);
    if left_idx.len() < MIN_LEAF || right_idx.len() < MIN_LEAF {
        return Tree::Leaf(mean);
    }

    Tree::Node {
        feature,
        threshold,
        left: Box::new(grow(rows, residuals, &left_idx, depth - 1)),
        right: Box::new(grow(rows, residuals, &right_idx, depth - 1)),
    }
}

/// Exhaustive split search over quantile candidates, minimizing SSE.
fn best_split(rows: &[Vec<f64>], residuals: &[f64], indices: &[usize]) -> Option<(usize, f64)> {
    let n_features = rows[0].len();
    let total: f64 = indices.iter().map(|&i| residuals[i]).sum();
    let total_sq: f64 = indices.iter().map(|&i| residuals[i] * residuals[i]).sum();
    let n = indices.len() as f64;
    let base_sse = total_sq - total * total / n;

    let mut best: Option<(f64, usize, f64)> = None;
    for feature in 0..n_features {
        let mut values: Vec<f64> = indices.iter().map(|&i| rows[i][feature]).collect();
        values.sort_by(|a, b| a.partial_cmp(b).unwrap());
        values.dedup();
        if values.len() < 2 {
            continue;
        }

        for k in 1..=SPLIT_CANDIDATES {
            let pos = k * (values.len() - 1) / (SPLIT_CANDIDATES + 1);
            let threshold = values[pos.min(values.len() - 2)];

            let mut left_sum = 0.0;
            let mut left_sq = 0.0;
            let mut left_n = 0.0;
            for &i in indices {
                if rows[i][feature] <= threshold {
                    left_sum += residuals[i];
                    left_sq += residuals[i] * residuals[i];
                    left_n += 1.0;
                }
            }
            let right_n = n - left_n;
            if left_n < MIN_LEAF as f64 || right_n < MIN_LEAF as f64 {
                continue;
            }
            let right_sum = total - left_sum;
            let right_sq = total_sq - left_sq;
            let sse = (left_sq - left_sum * left_sum / left_n)
                + (right_sq - right_sum * right_sum / right_n);

            if sse < base_sse && best.as_ref().map(|(s, _, _)| sse < *s).unwrap_or(true) {
                best = Some((sse, feature, threshold));
            }
        }
    }
    best.map(|(_, feature, threshold)| (feature, threshold))
}
