//! Full-series technical indicator math
//!
//! Every function returns a vector aligned 1:1 with the input bars, with
//! NaN in the warm-up region; the feature builder owns the NaN policy.

/// Simple moving average
pub fn sma(values: &[f64], window: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if window == 0 || values.len() < window {
        return out;
    }
    let mut sum: f64 = values[..window].iter().sum();
    out[window - 1] = sum / window as f64;
    for i in window..values.len() {
        sum += values[i] - values[i - window];
        out[i] = sum / window as f64;
    }
    out
}

/// Exponential moving average, seeded with the SMA of the first window
pub fn ema(values: &[f64], window: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if window == 0 || values.len() < window {
        return out;
    }
    let multiplier = 2.0 / (window as f64 + 1.0);
    let mut current: f64 = values[..window].iter().sum::<f64>() / window as f64;
    out[window - 1] = current;
    for i in window..values.len() {
        current = (values[i] - current) * multiplier + current;
        out[i] = current;
    }
    out
}

/// Wilder-smoothed RSI in [0, 100]
pub fn rsi(closes: &[f64], window: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; closes.len()];
    if window == 0 || closes.len() <= window {
        return out;
    }
    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for i in 1..=window {
        let change = closes[i] - closes[i - 1];
        if change > 0.0 {
            avg_gain += change;
        } else {
            avg_loss += change.abs();
        }
    }
    avg_gain /= window as f64;
    avg_loss /= window as f64;
    out[window] = rsi_value(avg_gain, avg_loss);
    for i in (window + 1)..closes.len() {
        let change = closes[i] - closes[i - 1];
        let (gain, loss) = if change > 0.0 {
            (change, 0.0)
        } else {
            (0.0, change.abs())
        };
        avg_gain = (avg_gain * (window as f64 - 1.0) + gain) / window as f64;
        avg_loss = (avg_loss * (window as f64 - 1.0) + loss) / window as f64;
        out[i] = rsi_value(avg_gain, avg_loss);
    }
    out
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return if avg_gain == 0.0 { 50.0 } else { 100.0 };
    }
    100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
}

/// MACD line, signal line and histogram for one (fast, slow, signal) triple
pub fn macd(closes: &[f64], fast: usize, slow: usize, signal: usize) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let fast_ema = ema(closes, fast);
    let slow_ema = ema(closes, slow);
    let line: Vec<f64> = fast_ema
        .iter()
        .zip(slow_ema.iter())
        .map(|(f, s)| f - s)
        .collect();

    // Signal line is an EMA over the defined part of the MACD line.
    let start = line.iter().position(|v| v.is_finite()).unwrap_or(line.len());
    let mut signal_line = vec![f64::NAN; closes.len()];
    if line.len() - start >= signal {
        let tail = ema(&line[start..], signal);
        for (i, v) in tail.into_iter().enumerate() {
            signal_line[start + i] = v;
        }
    }
    let hist: Vec<f64> = line
        .iter()
        .zip(signal_line.iter())
        .map(|(l, s)| l - s)
        .collect();
    (line, signal_line, hist)
}

/// Bollinger position in [0, 1] and band width relative to the middle band
pub fn bollinger(closes: &[f64], window: usize, k: f64) -> (Vec<f64>, Vec<f64>) {
    let mut position = vec![f64::NAN; closes.len()];
    let mut width = vec![f64::NAN; closes.len()];
    if window == 0 || closes.len() < window {
        return (position, width);
    }
    for i in (window - 1)..closes.len() {
        let slice = &closes[i + 1 - window..=i];
        let mean = slice.iter().sum::<f64>() / window as f64;
        let variance = slice.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / window as f64;
        let std_dev = variance.sqrt();
        let upper = mean + k * std_dev;
        let lower = mean - k * std_dev;
        if upper > lower {
            position[i] = ((closes[i] - lower) / (upper - lower)).clamp(0.0, 1.0);
        } else {
            position[i] = 0.5;
        }
        width[i] = if mean != 0.0 { (upper - lower) / mean } else { 0.0 };
    }
    (position, width)
}

/// Average true range (simple mean of true ranges over the window)
pub fn atr(highs: &[f64], lows: &[f64], closes: &[f64], window: usize) -> Vec<f64> {
    let n = closes.len();
    let mut out = vec![f64::NAN; n];
    if window == 0 || n <= window {
        return out;
    }
    let mut true_ranges = vec![f64::NAN; n];
    for i in 1..n {
        true_ranges[i] = (highs[i] - lows[i])
            .max((highs[i] - closes[i - 1]).abs())
            .max((lows[i] - closes[i - 1]).abs());
    }
    for i in window..n {
        out[i] = true_ranges[i + 1 - window..=i].iter().sum::<f64>() / window as f64;
    }
    out
}

/// Rolling maximum (resistance) over the trailing window
pub fn rolling_max(values: &[f64], window: usize) -> Vec<f64> {
    rolling(values, window, |slice| {
        slice.iter().cloned().fold(f64::NEG_INFINITY, f64::max)
    })
}

/// Rolling minimum (support) over the trailing window
pub fn rolling_min(values: &[f64], window: usize) -> Vec<f64> {
    rolling(values, window, |slice| {
        slice.iter().cloned().fold(f64::INFINITY, f64::min)
    })
}

/// Rolling mean over the trailing window
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    rolling(values, window, |slice| {
        slice.iter().sum::<f64>() / slice.len() as f64
    })
}

/// Rolling population standard deviation over the trailing window
pub fn rolling_std(values: &[f64], window: usize) -> Vec<f64> {
    rolling(values, window, |slice| {
        let mean = slice.iter().sum::<f64>() / slice.len() as f64;
        (slice.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / slice.len() as f64).sqrt()
    })
}

fn rolling(values: &[f64], window: usize, f: impl Fn(&[f64]) -> f64) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if window == 0 || values.len() < window {
        return out;
    }
    for i in (window - 1)..values.len() {
        let slice = &values[i + 1 - window..=i];
        if slice.iter().all(|v| v.is_finite()) {
            out[i] = f(slice);
        }
    }
    out
}

/// Percentage return over a horizon
pub fn returns(closes: &[f64], horizon: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; closes.len()];
    for i in horizon..closes.len() {
        if closes[i - horizon] != 0.0 {
            out[i] = closes[i] / closes[i - horizon] - 1.0;
        }
    }
    out
}

/// Log return over a horizon
pub fn log_returns(closes: &[f64], horizon: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; closes.len()];
    for i in horizon..closes.len() {
        if closes[i - horizon] > 0.0 && closes[i] > 0.0 {
            out[i] = (closes[i] / closes[i - horizon]).ln();
        }
    }
    out
}

/// Lag a series by `k` steps
pub fn lag(values: &[f64], k: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    for i in k..values.len() {
        out[i] = values[i - k];
    }
    out
}
