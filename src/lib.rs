//! Multi-Model Stock Forecast Engine
//!
//! A two-day-ahead price forecasting pipeline for Vietnamese equities.
//!
//! ## Architecture
//!
//! ```text
//! PriceSeries → FeatureBuilder → [AR | Boosted Trees | LSTM | Seasonal]
//!                                         ↓
//!                        EnsembleCombiner (CV scores → weights → blend)
//!                                         ↓
//!                  ConfidenceEngine (agreement, quality, market, technical,
//!                                    downtrend validation)
//!                                         ↓
//!                  Forecaster (bounds, direction, fallback) → ForecastResult
//! ```

pub mod confidence;
pub mod config;
pub mod data;
pub mod ensemble;
pub mod error;
pub mod features;
pub mod forecast;
pub mod models;
pub mod providers;
pub mod types;

#[cfg(test)]
mod pipeline_tests;
