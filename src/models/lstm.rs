//! Recurrent sequence model over sliding feature windows
//!
//! A single LSTM cell (input/forget/cell/output gates on plain `Vec<f64>`
//! math) encodes a trailing window of curated features; a linear readout on
//! the final hidden state predicts the next scaled close. Gate weights are
//! Xavier-initialized from a seeded RNG and kept fixed; the readout is
//! trained by gradient descent with early stopping on a held-out validation
//! tail. With a fixed seed the whole model is reproducible bit for bit.

use super::{passthrough, ForecastModel, MinMaxScaler};
use crate::config::ModelConfig;
use crate::error::{ForecastError, Result};
use crate::features::FeatureTable;
use crate::types::ModelPrediction;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Curated input columns; missing ones are skipped at fit time.
const INPUT_COLUMNS: &[&str] = &[
    "return_1",
    "rsi_14",
    "macd_hist_12_26_9",
    "bb_position_20",
    "volume_ratio_5_20",
];

const MIN_TRAIN_SAMPLES: usize = 20;
const VALIDATION_FRACTION: f64 = 0.2;
const LEARNING_RATE: f64 = 0.05;
const PATIENCE: usize = 5;

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn mat_vec_mul(w: &[Vec<f64>], x: &[f64]) -> Vec<f64> {
    w.iter()
        .map(|row| row.iter().zip(x.iter()).map(|(a, b)| a * b).sum())
        .collect()
}

fn xavier_init(rows: usize, cols: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
    let scale = (2.0 / (rows + cols) as f64).sqrt();
    (0..rows)
        .map(|_| (0..cols).map(|_| rng.random_range(-scale..scale)).collect())
        .collect()
}

#[derive(Debug, Clone)]
struct LstmCell {
    hidden_size: usize,
    w_input: Vec<Vec<f64>>,
    w_forget: Vec<Vec<f64>>,
    w_cell: Vec<Vec<f64>>,
    w_output: Vec<Vec<f64>>,
    b_input: Vec<f64>,
    b_forget: Vec<f64>,
    b_cell: Vec<f64>,
    b_output: Vec<f64>,
}

impl LstmCell {
    fn new(input_size: usize, hidden_size: usize, rng: &mut StdRng) -> Self {
        let cols = input_size + hidden_size;
        Self {
            hidden_size,
            w_input: xavier_init(hidden_size, cols, rng),
            w_forget: xavier_init(hidden_size, cols, rng),
            w_cell: xavier_init(hidden_size, cols, rng),
            w_output: xavier_init(hidden_size, cols, rng),
            b_input: vec![0.0; hidden_size],
            // Forget-gate bias starts at 1 so early training retains state.
            b_forget: vec![1.0; hidden_size],
            b_cell: vec![0.0; hidden_size],
            b_output: vec![0.0; hidden_size],
        }
    }

    /// One step; `h` and `c` are updated in place.
    fn step(&self, x: &[f64], h: &mut Vec<f64>, c: &mut Vec<f64>) {
        let mut z = Vec::with_capacity(x.len() + h.len());
        z.extend_from_slice(x);
        z.extend_from_slice(h);

        let i_gate: Vec<f64> = mat_vec_mul(&self.w_input, &z)
            .iter()
            .zip(&self.b_input)
            .map(|(v, b)| sigmoid(v + b))
            .collect();
        let f_gate: Vec<f64> = mat_vec_mul(&self.w_forget, &z)
            .iter()
            .zip(&self.b_forget)
            .map(|(v, b)| sigmoid(v + b))
            .collect();
        let g_gate: Vec<f64> = mat_vec_mul(&self.w_cell, &z)
            .iter()
            .zip(&self.b_cell)
            .map(|(v, b)| (v + b).tanh())
            .collect();
        let o_gate: Vec<f64> = mat_vec_mul(&self.w_output, &z)
            .iter()
            .zip(&self.b_output)
            .map(|(v, b)| sigmoid(v + b))
            .collect();

        for k in 0..self.hidden_size {
            c[k] = f_gate[k] * c[k] + i_gate[k] * g_gate[k];
            h[k] = o_gate[k] * c[k].tanh();
        }
    }

    fn encode(&self, window: &[Vec<f64>]) -> Vec<f64> {
        let mut h = vec![0.0; self.hidden_size];
        let mut c = vec![0.0; self.hidden_size];
        for x in window {
            self.step(x, &mut h, &mut c);
        }
        h
    }
}

#[derive(Debug, Clone)]
struct Trained {
    cell: LstmCell,
    readout_w: Vec<f64>,
    readout_b: f64,
    feature_scaler: MinMaxScaler,
    close_min: f64,
    close_range: f64,
    columns: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct LstmModel {
    window: usize,
    hidden: usize,
    epochs: usize,
    seed: u64,
    day2_extrapolation: f64,
    trained: Option<Trained>,
}

impl LstmModel {
    pub fn new(config: &ModelConfig) -> Self {
        Self {
            window: config.lstm_window.max(10),
            hidden: config.lstm_hidden,
            epochs: config.lstm_epochs,
            seed: config.lstm_seed,
            day2_extrapolation: config.day2_extrapolation,
            trained: None,
        }
    }

    fn input_rows(table: &FeatureTable, columns: &[String]) -> Vec<Vec<f64>> {
        let cols: Vec<&[f64]> = columns
            .iter()
            .map(|name| table.column(name).expect("validated at fit"))
            .collect();
        (0..table.n_rows())
            .map(|i| cols.iter().map(|c| c[i]).collect())
            .collect()
    }
}

impl ForecastModel for LstmModel {
    fn name(&self) -> &'static str {
        "lstm"
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
        let columns: Vec<String> = INPUT_COLUMNS
            .iter()
            .filter(|name| table.has_column(name))
            .map(|name| name.to_string())
            .collect();
        if columns.is_empty() {
            return Err(ForecastError::ModelUnavailable {
                model: "lstm",
                reason: "no curated input columns in feature table".to_string(),
            });
        }

        let n = table.n_rows();
        if n < self.window + MIN_TRAIN_SAMPLES {
            return Err(ForecastError::ModelUnavailable {
                model: "lstm",
                reason: format!("{} rows, need {}", n, self.window + MIN_TRAIN_SAMPLES),
            });
        }

        let raw_rows = Self::input_rows(table, &columns);
        let feature_scaler = MinMaxScaler::fit(&raw_rows);
        let rows: Vec<Vec<f64>> = raw_rows.iter().map(|r| feature_scaler.transform(r)).collect();

        let closes = table.closes();
        let close_min = closes.iter().cloned().fold(f64::INFINITY, f64::min);
        let close_max = closes.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let close_range = if close_max > close_min {
            close_max - close_min
        } else {
            1.0
        };

        // Sample t encodes rows [t-window, t) and targets scaled close[t].
        let samples: Vec<(usize, f64)> = (self.window..n)
            .map(|t| (t, (closes[t] - close_min) / close_range))
            .collect();
        let split = samples.len()
            - ((samples.len() as f64 * VALIDATION_FRACTION) as usize).clamp(1, samples.len() - 1);
        let (train, validation) = samples.split_at(split);

        let mut rng = StdRng::seed_from_u64(self.seed);
        let cell = LstmCell::new(columns.len(), self.hidden, &mut rng);

        // Hidden states are fixed once the gates are frozen, so encode each
        // sample once and train the readout on the cached states.
        let encode = |t: usize| cell.encode(&rows[t - self.window..t]);
        let train_states: Vec<(Vec<f64>, f64)> =
            train.iter().map(|&(t, y)| (encode(t), y)).collect();
        let val_states: Vec<(Vec<f64>, f64)> =
            validation.iter().map(|&(t, y)| (encode(t), y)).collect();

        let mut w: Vec<f64> = (0..self.hidden).map(|_| rng.random_range(-0.1..0.1)).collect();
        let mut b = 0.0;
        let mut best = (f64::INFINITY, w.clone(), b);
        let mut stale = 0usize;

        for epoch in 0..self.epochs {
            for (h, y) in &train_states {
                let y_hat: f64 = w.iter().zip(h.iter()).map(|(a, b)| a * b).sum::<f64>() + b;
                let err = y_hat - y;
                for (wk, hk) in w.iter_mut().zip(h.iter()) {
                    *wk -= LEARNING_RATE * err * hk;
                }
                b -= LEARNING_RATE * err;
            }

            let val_loss: f64 = val_states
                .iter()
                .map(|(h, y)| {
                    let y_hat: f64 =
                        w.iter().zip(h.iter()).map(|(a, b)| a * b).sum::<f64>() + b;
                    (y_hat - y).powi(2)
                })
                .sum::<f64>()
                / val_states.len() as f64;

            if val_loss < best.0 {
                best = (val_loss, w.clone(), b);
                stale = 0;
            } else {
                stale += 1;
                if stale >= PATIENCE {
                    tracing::debug!(epoch, val_loss, "lstm early stop");
                    break;
                }
            }
        }

        let (_, readout_w, readout_b) = best;
        self.trained = Some(Trained {
            cell,
            readout_w,
            readout_b,
            feature_scaler,
            close_min,
            close_range,
            columns,
        });
        Ok(())
    }

    fn predict(&self, table: &FeatureTable) -> Result<ModelPrediction> {
        let Some(trained) = &self.trained else {
            return Ok(passthrough(table));
        };
        if table.n_rows() < self.window || trained.columns.iter().any(|c| !table.has_column(c)) {
            return Ok(passthrough(table));
        }

        let raw_rows = Self::input_rows(table, &trained.columns);
        let window: Vec<Vec<f64>> = raw_rows[raw_rows.len() - self.window..]
            .iter()
            .map(|r| trained.feature_scaler.transform(r))
            .collect();
        let h = trained.cell.encode(&window);
        let y_hat: f64 = trained
            .readout_w
            .iter()
            .zip(h.iter())
            .map(|(a, b)| a * b)
            .sum::<f64>()
            + trained.readout_b;

        let day1 = y_hat * trained.close_range + trained.close_min;
        if !day1.is_finite() {
            return Ok(passthrough(table));
        }
        let day2 = day1 * self.day2_extrapolation;
        Ok(ModelPrediction { day1, day2 })
    }
}
