//! Core data types shared across the forecast pipeline

use crate::error::{ForecastError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Single daily OHLCV bar
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Chronologically ordered daily price history for one symbol
///
/// The constructor validates ordering, date uniqueness and basic price
/// sanity; everything downstream reads the bars as an immutable view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSeries {
    symbol: String,
    bars: Vec<PriceBar>,
}

impl PriceSeries {
    pub fn new(symbol: impl Into<String>, bars: Vec<PriceBar>) -> Result<Self> {
        for pair in bars.windows(2) {
            if pair[1].date <= pair[0].date {
                return Err(ForecastError::InvalidSeries(format!(
                    "bars out of order at {}",
                    pair[1].date
                )));
            }
        }
        for bar in &bars {
            if !bar.close.is_finite() || bar.close <= 0.0 {
                return Err(ForecastError::InvalidSeries(format!(
                    "non-positive close at {}",
                    bar.date
                )));
            }
            if bar.high < bar.low {
                return Err(ForecastError::InvalidSeries(format!(
                    "high below low at {}",
                    bar.date
                )));
            }
        }
        Ok(Self {
            symbol: symbol.into(),
            bars,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn bars(&self) -> &[PriceBar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last_close(&self) -> Option<f64> {
        self.bars.last().map(|b| b.close)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.bars.last().map(|b| b.date)
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }
}

/// Two-step-ahead point forecast from a single model
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ModelPrediction {
    pub day1: f64,
    pub day2: f64,
}

impl ModelPrediction {
    pub fn flat(price: f64) -> Self {
        Self {
            day1: price,
            day2: price,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.day1.is_finite() && self.day2.is_finite()
    }
}

/// Forecast direction relative to the current price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Neutral,
}

impl Direction {
    /// Direction from a bounded predicted price, never from raw model
    /// output, so price and direction stay mutually consistent.
    pub fn from_prices(predicted: f64, current: f64) -> Self {
        if predicted > current {
            Direction::Up
        } else if predicted < current {
            Direction::Down
        } else {
            Direction::Neutral
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(date: &str, close: f64) -> PriceBar {
        PriceBar {
            date: date.parse().unwrap(),
            open: close,
            high: close * 1.01,
            low: close * 0.99,
            close,
            volume: 10_000.0,
        }
    }

    #[test]
    fn series_accepts_ordered_bars() {
        let series = PriceSeries::new(
            "VNM",
            vec![bar("2024-01-02", 70.0), bar("2024-01-03", 71.0)],
        )
        .unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.last_close(), Some(71.0));
    }

    #[test]
    fn series_rejects_out_of_order_bars() {
        let err = PriceSeries::new(
            "VNM",
            vec![bar("2024-01-03", 70.0), bar("2024-01-02", 71.0)],
        );
        assert!(err.is_err());
    }

    #[test]
    fn series_rejects_duplicate_dates() {
        let err = PriceSeries::new(
            "VNM",
            vec![bar("2024-01-02", 70.0), bar("2024-01-02", 71.0)],
        );
        assert!(err.is_err());
    }

    #[test]
    fn series_rejects_non_positive_close() {
        let mut b = bar("2024-01-02", 70.0);
        b.close = 0.0;
        assert!(PriceSeries::new("VNM", vec![b]).is_err());
    }

    #[test]
    fn series_rejects_high_below_low() {
        let mut b = bar("2024-01-02", 70.0);
        b.high = 60.0;
        b.low = 65.0;
        assert!(PriceSeries::new("VNM", vec![b]).is_err());
    }

    #[test]
    fn direction_follows_price_sign() {
        assert_eq!(Direction::from_prices(101.0, 100.0), Direction::Up);
        assert_eq!(Direction::from_prices(99.0, 100.0), Direction::Down);
        assert_eq!(Direction::from_prices(100.0, 100.0), Direction::Neutral);
    }

    #[test]
    fn direction_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Direction::Up).unwrap(), "\"up\"");
        assert_eq!(
            serde_json::to_string(&Direction::Neutral).unwrap(),
            "\"neutral\""
        );
    }
}
