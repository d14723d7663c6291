//! Injected providers for macro-economic and sentiment scalars
//!
//! The feature builder takes these as explicit dependencies rather than
//! reaching for shared globals. Scalars are point-in-time values repeated
//! across all feature rows; callers with richer history can supply their
//! own implementations.

use std::collections::BTreeMap;

/// Macro-economic context scalars (e.g. economic_score, interest_trend)
pub trait MacroSignalProvider {
    fn macro_signals(&self, symbol: &str) -> BTreeMap<String, f64>;
}

/// Market/news sentiment scalars (e.g. sentiment_score, news_volume)
pub trait SentimentProvider {
    fn sentiment_signals(&self, symbol: &str) -> BTreeMap<String, f64>;
}

/// Stub returning fixed neutral macro values. Deliberately not randomized:
/// a missing provider must never masquerade as analysis.
#[derive(Debug, Clone, Default)]
pub struct NeutralMacro;

impl MacroSignalProvider for NeutralMacro {
    fn macro_signals(&self, _symbol: &str) -> BTreeMap<String, f64> {
        let mut signals = BTreeMap::new();
        signals.insert("economic_score".to_string(), 0.5);
        signals.insert("interest_trend".to_string(), 0.0);
        signals
    }
}

/// Stub returning fixed neutral sentiment values.
#[derive(Debug, Clone, Default)]
pub struct NeutralSentiment;

impl SentimentProvider for NeutralSentiment {
    fn sentiment_signals(&self, _symbol: &str) -> BTreeMap<String, f64> {
        let mut signals = BTreeMap::new();
        signals.insert("sentiment_score".to_string(), 0.5);
        signals.insert("news_volume".to_string(), 50.0);
        signals
    }
}
