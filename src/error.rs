//! Error types for the forecast engine
//!
//! Per-model failures are contained by the ensemble combiner (the failing
//! model simply gets an epsilon weight), so most of these variants never
//! cross the public API. Only a series with no usable price data at all
//! surfaces to the caller.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ForecastError>;

#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("insufficient data: {rows} usable rows, need at least {required}")]
    InsufficientData { rows: usize, required: usize },

    #[error("price series has no usable closing prices")]
    MissingCloses,

    #[error("invalid price series: {0}")]
    InvalidSeries(String),

    #[error("model {model} unavailable: {reason}")]
    ModelUnavailable { model: &'static str, reason: String },

    #[error("no model in the ensemble could be trained")]
    DegenerateEnsemble,

    #[error("feature table has no column named {0}")]
    MissingColumn(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
