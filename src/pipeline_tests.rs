//! End-to-end pipeline tests

#[cfg(test)]
mod tests {
    use crate::config::Config;
    use crate::ensemble::EnsembleCombiner;
    use crate::error::Result;
    use crate::features::FeatureTable;
    use crate::forecast::Forecaster;
    use crate::models::ForecastModel;
    use crate::types::{Direction, ModelPrediction, PriceBar, PriceSeries};
    use chrono::{Days, NaiveDate};

    fn series(closes: &[f64]) -> PriceSeries {
        let start: NaiveDate = "2024-01-01".parse().unwrap();
        let bars: Vec<PriceBar> = closes
            .iter()
            .enumerate()
            .map(|(i, c)| PriceBar {
                date: start.checked_add_days(Days::new(i as u64)).unwrap(),
                open: *c,
                high: c * 1.01,
                low: c * 0.99,
                close: *c,
                volume: 20_000.0 + (i % 5) as f64 * 500.0,
            })
            .collect();
        PriceSeries::new("HPG", bars).unwrap()
    }

    fn wavy(n: usize, drift: f64) -> PriceSeries {
        let closes: Vec<f64> = (0..n)
            .map(|i| 100.0 + (i as f64 * 0.35).sin() * 2.0 + i as f64 * drift)
            .collect();
        series(&closes)
    }

    /// Always predicts a fixed multiple of the current price.
    struct RunawayModel {
        name: &'static str,
        factor: f64,
        trainable: bool,
        trained: bool,
    }

    impl RunawayModel {
        fn boxed(name: &'static str, factor: f64) -> Box<dyn ForecastModel> {
            Box::new(Self {
                name,
                factor,
                trainable: true,
                trained: false,
            })
        }

        fn broken(name: &'static str) -> Box<dyn ForecastModel> {
            Box::new(Self {
                name,
                factor: 1.0,
                trainable: false,
                trained: false,
            })
        }
    }

    impl ForecastModel for RunawayModel {
        fn name(&self) -> &'static str {
            self.name
        }

        fn is_trained(&self) -> bool {
            self.trained
        }

        fn fresh(&self) -> Box<dyn ForecastModel> {
            Box::new(Self {
                name: self.name,
                factor: self.factor,
                trainable: self.trainable,
                trained: false,
            })
        }

        fn fit(&mut self, _table: &FeatureTable) -> Result<()> {
            if self.trainable {
                self.trained = true;
                Ok(())
            } else {
                Err(crate::error::ForecastError::ModelUnavailable {
                    model: self.name,
                    reason: "configured untrainable".to_string(),
                })
            }
        }

        fn predict(&self, table: &FeatureTable) -> Result<ModelPrediction> {
            Ok(ModelPrediction::flat(table.last_close() * self.factor))
        }
    }

    #[test]
    fn flat_prices_forecast_flat_with_high_agreement() {
        let mut forecaster = Forecaster::new(Config::default());
        let result = forecaster
            .predict_next_two_days(&series(&vec![50.0; 60]))
            .unwrap();
        assert!(!result.fallback);
        for day in &result.predictions {
            assert!(
                (day.predicted_price / 50.0 - 1.0).abs() < 1e-3,
                "flat series should forecast the flat price, got {}",
                day.predicted_price
            );
        }
        assert!(result.ensemble.agreement_score >= 0.85);
    }

    #[test]
    fn three_bar_series_returns_neutral_fallback() {
        let mut forecaster = Forecaster::new(Config::default());
        let result = forecaster
            .predict_next_two_days(&series(&[25.0, 25.1, 25.2]))
            .unwrap();
        assert!(result.fallback);
        assert_eq!(result.predictions.len(), 2);
        for day in &result.predictions {
            assert_eq!(day.direction, Direction::Neutral);
            assert!((day.predicted_price - 25.2).abs() < 1e-12);
        }
    }

    #[test]
    fn runaway_predictions_are_clamped_to_bounds() {
        // Every model calls for a 20% jump; bounds cap day 1 at 10% and
        // day 2 at 15%, and direction comes from the clamped price.
        let config = Config::default();
        let combiner = EnsembleCombiner::with_models(
            vec![
                RunawayModel::boxed("m1", 1.2),
                RunawayModel::boxed("m2", 1.2),
                RunawayModel::boxed("m3", 1.2),
                RunawayModel::boxed("m4", 1.2),
            ],
            config.ensemble.clone(),
        );
        let mut forecaster = Forecaster::with_combiner(config, combiner);
        let result = forecaster.predict_next_two_days(&wavy(90, 0.02)).unwrap();
        let current = result.current_price;
        let day1 = &result.predictions[0];
        let day2 = &result.predictions[1];
        assert!((day1.predicted_price - current * 1.10).abs() < 1e-9);
        assert!((day2.predicted_price - current * 1.15).abs() < 1e-9);
        assert_eq!(day1.direction, Direction::Up);
        assert_eq!(day2.direction, Direction::Up);
    }

    #[test]
    fn one_trained_model_carries_the_whole_blend() {
        let config = Config::default();
        let combiner = EnsembleCombiner::with_models(
            vec![
                RunawayModel::boxed("only", 1.0),
                RunawayModel::broken("b1"),
                RunawayModel::broken("b2"),
                RunawayModel::broken("b3"),
            ],
            config.ensemble.clone(),
        );
        let mut forecaster = Forecaster::with_combiner(config, combiner);
        let result = forecaster.predict_next_two_days(&wavy(110, 0.02)).unwrap();
        assert!(!result.fallback);
        assert!(result.ensemble.weights["only"] > 0.99);
        for name in ["b1", "b2", "b3"] {
            assert!(result.ensemble.weights[name] < 0.01);
        }
        // Blend equals the one surviving model's (bounded) prediction.
        assert!(
            (result.predictions[0].predicted_price - result.current_price).abs()
                < result.current_price * 1e-9
        );
    }

    #[test]
    fn tight_predictions_agree_more_than_dispersed_ones() {
        let history = wavy(110, 0.02);
        let config = Config::default();

        let tight = EnsembleCombiner::with_models(
            vec![
                RunawayModel::boxed("a", 1.0),
                RunawayModel::boxed("b", 1.0),
                RunawayModel::boxed("c", 1.0),
            ],
            config.ensemble.clone(),
        );
        let mut forecaster = Forecaster::with_combiner(config.clone(), tight);
        let tight_result = forecaster.predict_next_two_days(&history).unwrap();

        let dispersed = EnsembleCombiner::with_models(
            vec![
                RunawayModel::boxed("a", 0.8),
                RunawayModel::boxed("b", 1.0),
                RunawayModel::boxed("c", 1.2),
            ],
            config.ensemble.clone(),
        );
        let mut forecaster = Forecaster::with_combiner(config, dispersed);
        let dispersed_result = forecaster.predict_next_two_days(&history).unwrap();

        assert!(
            tight_result.ensemble.agreement_score > dispersed_result.ensemble.agreement_score
        );
    }

    #[test]
    fn ensemble_weights_are_normalized_and_non_negative() {
        let mut forecaster = Forecaster::new(Config::default());
        let result = forecaster.predict_next_two_days(&wavy(140, 0.03)).unwrap();
        let sum: f64 = result.ensemble.weights.values().sum();
        assert!((sum - 1.0).abs() < 1e-9);
        assert!(result.ensemble.weights.values().all(|w| *w >= 0.0));
    }

    #[test]
    fn direction_always_matches_bounded_price() {
        for drift in [0.05, -0.05, 0.0] {
            let mut forecaster = Forecaster::new(Config::default());
            let result = forecaster.predict_next_two_days(&wavy(120, drift)).unwrap();
            let current = result.current_price;
            let day1 = &result.predictions[0];
            let day2 = &result.predictions[1];
            assert!((day1.predicted_price / current - 1.0).abs() <= 0.10 + 1e-9);
            assert!((day2.predicted_price / current - 1.0).abs() <= 0.15 + 1e-9);
            for day in &result.predictions {
                assert_eq!(
                    day.direction,
                    Direction::from_prices(day.predicted_price, current)
                );
            }
        }
    }

    #[test]
    fn confidence_breakdown_stays_in_unit_range() {
        let mut forecaster = Forecaster::new(Config::default());
        let result = forecaster.predict_next_two_days(&wavy(130, 0.04)).unwrap();
        let breakdown = &result.confidence;
        for factor in [
            breakdown.agreement,
            breakdown.quality,
            breakdown.market_conditions,
            breakdown.technical_signals,
            breakdown.downtrend_validation,
            breakdown.overall,
        ] {
            assert!((0.0..=1.0).contains(&factor));
        }
        for day in &result.predictions {
            assert!((0.0..=1.0).contains(&day.confidence));
        }
    }

    #[test]
    fn identical_inputs_give_identical_forecasts() {
        let history = wavy(140, 0.03);
        let mut first = Forecaster::new(Config::default());
        let mut second = Forecaster::new(Config::default());
        let a = first.predict_next_two_days(&history).unwrap();
        let b = second.predict_next_two_days(&history).unwrap();
        assert_eq!(
            a.predictions[0].predicted_price,
            b.predictions[0].predicted_price
        );
        assert_eq!(
            a.predictions[1].predicted_price,
            b.predictions[1].predicted_price
        );
        assert_eq!(a.confidence.overall, b.confidence.overall);
    }

    #[test]
    fn forecast_result_serializes_to_json() {
        let mut forecaster = Forecaster::new(Config::default());
        let result = forecaster.predict_next_two_days(&wavy(120, 0.02)).unwrap();
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"predictions\""));
        assert!(json.contains("\"confidence\""));
        assert!(json.contains("\"weights\""));
    }
}
