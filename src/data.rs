//! Price history loading
//!
//! Expects a CSV with a `date,open,high,low,close,volume` header, one bar per
//! row, oldest first. Validation (ordering, positive closes) happens in
//! `PriceSeries::new`.

use crate::error::Result;
use crate::types::{PriceBar, PriceSeries};
use chrono::NaiveDate;
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct CsvBar {
    date: NaiveDate,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: f64,
}

impl From<CsvBar> for PriceBar {
    fn from(row: CsvBar) -> Self {
        PriceBar {
            date: row.date,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume,
        }
    }
}

pub fn load_csv(path: impl AsRef<Path>, symbol: &str) -> Result<PriceSeries> {
    let mut reader = csv::Reader::from_path(path.as_ref())?;
    let mut bars = Vec::new();
    for record in reader.deserialize::<CsvBar>() {
        bars.push(record?.into());
    }
    tracing::debug!(symbol, bars = bars.len(), "price history loaded");
    PriceSeries::new(symbol, bars)
}
