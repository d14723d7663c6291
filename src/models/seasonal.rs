//! Additive trend + weekday seasonality model on (date, close)
//!
//! Ordinary least squares gives the linear trend over bar index; the mean
//! residual per weekday gives the seasonal offsets. The model natively
//! forecasts the next two trading dates, so it needs no day-2 extrapolation.

use super::{passthrough, ForecastModel};
use crate::error::{ForecastError, Result};
use crate::features::FeatureTable;
use crate::types::ModelPrediction;
use chrono::{Datelike, Days, NaiveDate, Weekday};

const MIN_BARS: usize = 15;

/// Next weekday after `date`, skipping Saturday and Sunday.
pub fn next_trading_day(date: NaiveDate) -> NaiveDate {
    let mut next = date + Days::new(1);
    while matches!(next.weekday(), Weekday::Sat | Weekday::Sun) {
        next = next + Days::new(1);
    }
    next
}

#[derive(Debug, Clone)]
struct Trained {
    slope: f64,
    intercept: f64,
    weekday_offsets: [f64; 7],
    dates: Vec<NaiveDate>,
}

#[derive(Debug, Clone, Default)]
pub struct SeasonalTrendModel {
    trained: Option<Trained>,
}

impl SeasonalTrendModel {
    pub fn new() -> Self {
        Self::default()
    }

    fn value_at(trained: &Trained, t: f64, date: NaiveDate) -> f64 {
        trained.intercept
            + trained.slope * t
            + trained.weekday_offsets[date.weekday().num_days_from_monday() as usize]
    }
}

impl ForecastModel for SeasonalTrendModel {
    fn name(&self) -> &'static str {
        "seasonal_trend"
    }

    fn supports_multistep(&self) -> bool {
        true
    }

    fn is_trained(&self) -> bool {
        self.trained.is_some()
    }

    fn fresh(&self) -> Box<dyn ForecastModel> {
        Box::new(Self::new())
    }

    fn fit(&mut self, table: &FeatureTable) -> Result<()> {
        let closes = table.closes();
        let n = closes.len();
        if n < MIN_BARS {
            return Err(ForecastError::ModelUnavailable {
                model: "seasonal_trend",
                reason: format!("{} rows, need {}", n, MIN_BARS),
            });
        }

        // OLS of close against bar index.
        let nf = n as f64;
        let mean_t = (nf - 1.0) / 2.0;
        let mean_y = closes.iter().sum::<f64>() / nf;
        let mut cov = 0.0;
        let mut var = 0.0;
        for (i, y) in closes.iter().enumerate() {
            let dt = i as f64 - mean_t;
            cov += dt * (y - mean_y);
            var += dt * dt;
        }
        let slope = if var > 0.0 { cov / var } else { 0.0 };
        let intercept = mean_y - slope * mean_t;

        // Mean residual per weekday.
        let mut sums = [0.0f64; 7];
        let mut counts = [0usize; 7];
        for (i, (y, date)) in closes.iter().zip(table.dates().iter()).enumerate() {
            let residual = y - (intercept + slope * i as f64);
            let w = date.weekday().num_days_from_monday() as usize;
            sums[w] += residual;
            counts[w] += 1;
        }
        let mut weekday_offsets = [0.0f64; 7];
        for w in 0..7 {
            if counts[w] > 0 {
                weekday_offsets[w] = sums[w] / counts[w] as f64;
            }
        }

        self.trained = Some(Trained {
            slope,
            intercept,
            weekday_offsets,
            dates: table.dates().to_vec(),
        });
        Ok(())
    }

    fn predict(&self, table: &FeatureTable) -> Result<ModelPrediction> {
        let Some(trained) = &self.trained else {
            return Ok(passthrough(table));
        };
        let last_date = table.last_date();

        // Map the last given date onto the fitted index axis; predictions at
        // mid-history dates are what walk-forward scoring asks for. A table
        // that extends past the fitted window shares its bar axis with the
        // fitted prefix, so the bar count is the index, whatever the calendar
        // gaps between bars look like.
        let t0 = match trained.dates.iter().position(|d| *d == last_date) {
            Some(i) => i as f64,
            None if trained.dates.last().is_some_and(|d| last_date > *d) => {
                (table.n_rows() - 1) as f64
            }
            None => return Ok(passthrough(table)),
        };

        let d1 = next_trading_day(last_date);
        let d2 = next_trading_day(d1);
        let day1 = Self::value_at(trained, t0 + 1.0, d1);
        let day2 = Self::value_at(trained, t0 + 2.0, d2);
        if !day1.is_finite() || !day2.is_finite() {
            return Ok(passthrough(table));
        }
        Ok(ModelPrediction { day1, day2 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FeatureConfig;
    use crate::features::FeatureBuilder;
    use crate::providers::{NeutralMacro, NeutralSentiment};
    use crate::types::{PriceBar, PriceSeries};

    fn table_with_trend(n: usize, slope: f64) -> FeatureTable {
        let start: NaiveDate = "2024-01-01".parse().unwrap();
        let bars: Vec<PriceBar> = (0..n)
            .map(|i| {
                let close = 100.0 + slope * i as f64 + (i as f64 * 0.8).sin() * 0.3;
                PriceBar {
                    date: start.checked_add_days(Days::new(i as u64)).unwrap(),
                    open: close,
                    high: close * 1.01,
                    low: close * 0.99,
                    close,
                    volume: 15_000.0,
                }
            })
            .collect();
        let series = PriceSeries::new("TEST", bars).unwrap();
        FeatureBuilder::new(FeatureConfig::default())
            .build(&series, &NeutralMacro, &NeutralSentiment)
            .unwrap()
    }

    #[test]
    fn next_trading_day_skips_weekends() {
        let friday: NaiveDate = "2024-01-05".parse().unwrap();
        let monday: NaiveDate = "2024-01-08".parse().unwrap();
        assert_eq!(next_trading_day(friday), monday);
        let wednesday: NaiveDate = "2024-01-03".parse().unwrap();
        assert_eq!(next_trading_day(wednesday), "2024-01-04".parse().unwrap());
    }

    #[test]
    fn captures_linear_trend() {
        let table = table_with_trend(120, 0.5);
        let mut model = SeasonalTrendModel::new();
        model.fit(&table).unwrap();
        let pred = model.predict(&table).unwrap();
        let last = table.last_close();
        // An 0.5/day trend should push both days clearly above spot.
        assert!(pred.day1 > last);
        assert!(pred.day2 > pred.day1 * 0.999);
    }

    #[test]
    fn multistep_is_native() {
        let model = SeasonalTrendModel::new();
        assert!(model.supports_multistep());
    }

    #[test]
    fn untrained_model_passes_through() {
        let table = table_with_trend(80, 0.1);
        let model = SeasonalTrendModel::new();
        assert_eq!(
            model.predict(&table).unwrap(),
            ModelPrediction::flat(table.last_close())
        );
    }

    #[test]
    fn predicts_from_truncated_history() {
        let table = table_with_trend(120, 0.2);
        let mut model = SeasonalTrendModel::new();
        model.fit(&table).unwrap();
        let prefix = table.truncated(50);
        let pred = model.predict(&prefix).unwrap();
        assert!(pred.is_finite());
        // Mid-history forecast should sit near the mid-history level, not
        // the end-of-history level.
        assert!(pred.day1 < table.last_close());
    }

    #[test]
    fn extended_history_stays_on_the_bar_axis() {
        // The helper emits one bar per calendar day, weekends included, so a
        // calendar-driven step count would lag the true bar index and drag
        // the forecast below the trend line.
        let table = table_with_trend(120, 0.5);
        let mut model = SeasonalTrendModel::new();
        model.fit(&table.truncated(60)).unwrap();
        let extended = table.truncated(90);
        let pred = model.predict(&extended).unwrap();
        let expected = extended.last_close() + 0.5;
        assert!(
            (pred.day1 - expected).abs() < 1.5,
            "day1 {} drifted from {}",
            pred.day1,
            expected
        );
    }

    #[test]
    fn rejects_tiny_table() {
        let table = table_with_trend(120, 0.2).truncated(5);
        let mut model = SeasonalTrendModel::new();
        assert!(model.fit(&table).is_err());
    }
}
