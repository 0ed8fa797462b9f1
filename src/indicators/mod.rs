//! Technical indicators over ordered close/volume slices.
//!
//! Every function returns a vector aligned to its input; positions where
//! the indicator is not yet defined carry `f64::NAN`. A strategy needing a
//! `period`-length window therefore produces nothing actionable until the
//! index reaches `period`.

/// Simple moving average.
pub fn sma(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }
    let mut sum: f64 = values[..period].iter().sum();
    out[period - 1] = sum / period as f64;
    for i in period..values.len() {
        sum += values[i] - values[i - period];
        out[i] = sum / period as f64;
    }
    out
}

/// Exponential moving average, alpha = 2/(period+1), seeded at the first
/// value (no warm-up NaNs, matching span-style smoothing).
pub fn ema(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if values.is_empty() || period == 0 {
        return out;
    }
    let alpha = 2.0 / (period as f64 + 1.0);
    let mut prev = values[0];
    out[0] = prev;
    for i in 1..values.len() {
        prev = alpha * values[i] + (1.0 - alpha) * prev;
        out[i] = prev;
    }
    out
}

/// Wilder-smoothed mean: alpha = 1/period, undefined before `period`
/// samples, seeded with the plain average of the first window.
pub fn wilder_ema(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }
    let mut prev: f64 = values[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = prev;
    let alpha = 1.0 / period as f64;
    for i in period..values.len() {
        prev = alpha * values[i] + (1.0 - alpha) * prev;
        out[i] = prev;
    }
    out
}

/// Rolling population standard deviation.
pub fn rolling_std(values: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; values.len()];
    if period == 0 || values.len() < period {
        return out;
    }
    for i in (period - 1)..values.len() {
        let window = &values[i + 1 - period..=i];
        let mean = window.iter().sum::<f64>() / period as f64;
        let var = window.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / period as f64;
        out[i] = var.sqrt();
    }
    out
}

/// Relative Strength Index with Wilder smoothing, 0..100.
pub fn rsi(closes: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; closes.len()];
    if closes.len() < 2 || period == 0 {
        return out;
    }

    let mut gains = vec![0.0; closes.len()];
    let mut losses = vec![0.0; closes.len()];
    for i in 1..closes.len() {
        let delta = closes[i] - closes[i - 1];
        gains[i] = delta.max(0.0);
        losses[i] = (-delta).max(0.0);
    }

    let avg_gain = wilder_ema(&gains[1..], period);
    let avg_loss = wilder_ema(&losses[1..], period);

    for i in 0..avg_gain.len() {
        if avg_gain[i].is_nan() || avg_loss[i].is_nan() {
            continue;
        }
        let value = if avg_loss[i] == 0.0 {
            100.0
        } else {
            let rs = avg_gain[i] / avg_loss[i];
            100.0 - 100.0 / (1.0 + rs)
        };
        out[i + 1] = value;
    }
    out
}

/// MACD: (macd line, signal line, histogram).
pub fn macd(
    closes: &[f64],
    fast: usize,
    slow: usize,
    signal_period: usize,
) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let ema_fast = ema(closes, fast);
    let ema_slow = ema(closes, slow);
    let line: Vec<f64> = ema_fast
        .iter()
        .zip(&ema_slow)
        .map(|(f, s)| f - s)
        .collect();
    let signal = ema(&line, signal_period);
    let hist: Vec<f64> = line.iter().zip(&signal).map(|(l, s)| l - s).collect();
    (line, signal, hist)
}

/// Bollinger bands: (middle, upper, lower) at `num_std` deviations.
pub fn bollinger(closes: &[f64], period: usize, num_std: f64) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let mid = sma(closes, period);
    let std = rolling_std(closes, period);
    let upper: Vec<f64> = mid.iter().zip(&std).map(|(m, s)| m + num_std * s).collect();
    let lower: Vec<f64> = mid.iter().zip(&std).map(|(m, s)| m - num_std * s).collect();
    (mid, upper, lower)
}

/// Average True Range: rolling mean of the true range.
pub fn atr(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Vec<f64> {
    let n = closes.len();
    let mut tr = vec![f64::NAN; n];
    for i in 0..n {
        let hl = highs[i] - lows[i];
        tr[i] = if i == 0 {
            hl
        } else {
            let hc = (highs[i] - closes[i - 1]).abs();
            let lc = (lows[i] - closes[i - 1]).abs();
            hl.max(hc).max(lc)
        };
    }
    sma(&tr, period)
}

/// Rate of change over `period` bars, in percent.
pub fn roc(closes: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; closes.len()];
    for i in period..closes.len() {
        let base = closes[i - period];
        if base != 0.0 {
            out[i] = (closes[i] - base) / base * 100.0;
        }
    }
    out
}

/// Rolling z-score of a value against its own trailing window.
pub fn zscore(values: &[f64], period: usize) -> Vec<f64> {
    let mean = sma(values, period);
    let std = rolling_std(values, period);
    values
        .iter()
        .zip(mean.iter().zip(&std))
        .map(|(v, (m, s))| if *s > 0.0 { (v - m) / s } else { f64::NAN })
        .collect()
}

/// Log returns, length `closes.len() - 1`.
pub fn log_returns(closes: &[f64]) -> Vec<f64> {
    closes
        .windows(2)
        .filter(|w| w[0] > 0.0 && w[1] > 0.0)
        .map(|w| (w[1] / w[0]).ln())
        .collect()
}

/// Annualized volatility of the trailing `window` returns (decimal).
pub fn annualized_vol(returns: &[f64], window: usize) -> f64 {
    if returns.is_empty() {
        return 0.0;
    }
    let w = window.min(returns.len());
    let tail = &returns[returns.len() - w..];
    let mean = tail.iter().sum::<f64>() / w as f64;
    let var = tail.iter().map(|r| (r - mean) * (r - mean)).sum::<f64>() / w as f64;
    var.sqrt() * crate::pricing::DAYS_PER_YEAR.sqrt()
}

/// Historical-volatility rank: percentile position of the most recent
/// rolling-window vol within all rolling windows of the sample, 0..100.
/// Used as the IV-rank proxy when no implied-vol history exists.
pub fn hv_rank(returns: &[f64], window: usize) -> f64 {
    if returns.len() < 2 {
        return 50.0;
    }
    let w = window.min(returns.len());
    let recent = annualized_vol(returns, w) * 100.0;

    if returns.len() >= 2 * w {
        let mut hvs = Vec::with_capacity(returns.len() - w + 1);
        for i in 0..=(returns.len() - w) {
            hvs.push(annualized_vol(&returns[i..i + w], w) * 100.0);
        }
        let min = hvs.iter().copied().fold(f64::INFINITY, f64::min);
        let max = hvs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if max > min {
            return ((recent - min) / (max - min) * 100.0).clamp(0.0, 100.0);
        }
    }

    // Short sample: ratio against the full-period vol, centered at 50.
    let full = annualized_vol(returns, returns.len()) * 100.0;
    (recent / full.max(0.001) * 50.0).clamp(0.0, 100.0)
}

/// Percentile of `value` within `samples`, 0..100.
pub fn percentile_rank(value: f64, samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 50.0;
    }
    let below = samples.iter().filter(|&&s| s < value).count();
    below as f64 / samples.len() as f64 * 100.0
}
