//! Spot signal strategies.
//!
//! Each strategy maps an OHLCV series to a per-bar signal column in
//! {-1, 0, +1} plus the indicator columns it derived. Signals fire only on
//! crossover events; between crossings the column stays 0.

use std::collections::BTreeMap;

use crate::indicators as ind;
use crate::model::Series;

/// Result of running a spot strategy over a series. `indicators` holds the
/// named columns aligned to the input bars.
#[derive(Debug, Clone, Default)]
pub struct StrategyOutput {
    pub signals: Vec<i8>,
    pub indicators: BTreeMap<String, Vec<f64>>,
    /// Set when a pairs strategy ran without its secondary series.
    pub degraded: bool,
}

impl StrategyOutput {
    pub fn last_signal(&self) -> i8 {
        self.signals.last().copied().unwrap_or(0).clamp(-1, 1)
    }

    /// Last defined value of each indicator column.
    pub fn last_indicators(&self) -> BTreeMap<String, f64> {
        self.indicators
            .iter()
            .filter_map(|(name, col)| {
                col.last()
                    .filter(|v| v.is_finite())
                    .map(|v| (name.clone(), *v))
            })
            .collect()
    }
}

/// Closed set of spot strategies with typed parameters. The string name is
/// kept for the CLI and alert surfaces only.
#[derive(Debug, Clone, PartialEq)]
pub enum SpotStrategy {
    SmaCrossover { fast_period: usize, slow_period: usize },
    EmaCrossover { fast_period: usize, slow_period: usize },
    Rsi { period: usize, overbought: f64, oversold: f64 },
    BollingerBands { period: usize, num_std: f64 },
    Macd { fast_period: usize, slow_period: usize, signal_period: usize },
    MeanReversion { lookback: usize, entry_std: f64, exit_std: f64 },
    Momentum { roc_period: usize, threshold: f64 },
    VolumeWeighted { sma_period: usize, vol_multiplier: f64 },
    TripleEma { short_period: usize, mid_period: usize, long_period: usize },
    RsiMacdCombo {
        rsi_period: usize,
        macd_fast: usize,
        macd_slow: usize,
        macd_signal: usize,
    },
    PairsSpread { lookback: usize, entry_z: f64, exit_z: f64 },
}

impl SpotStrategy {
    pub const NAMES: [&'static str; 11] = [
        "sma_crossover",
        "ema_crossover",
        "rsi",
        "bollinger_bands",
        "macd",
        "mean_reversion",
        "momentum",
        "volume_weighted",
        "triple_ema",
        "rsi_macd_combo",
        "pairs_spread",
    ];

    /// Construct by name with default parameters.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "sma_crossover" => Self::SmaCrossover { fast_period: 20, slow_period: 50 },
            "ema_crossover" => Self::EmaCrossover { fast_period: 12, slow_period: 26 },
            "rsi" => Self::Rsi { period: 14, overbought: 70.0, oversold: 30.0 },
            "bollinger_bands" => Self::BollingerBands { period: 20, num_std: 2.0 },
            "macd" => Self::Macd { fast_period: 12, slow_period: 26, signal_period: 9 },
            "mean_reversion" => Self::MeanReversion { lookback: 30, entry_std: 1.5, exit_std: 0.5 },
            "momentum" => Self::Momentum { roc_period: 14, threshold: 5.0 },
            "volume_weighted" => Self::VolumeWeighted { sma_period: 20, vol_multiplier: 1.5 },
            "triple_ema" => Self::TripleEma { short_period: 8, mid_period: 21, long_period: 55 },
            "rsi_macd_combo" => Self::RsiMacdCombo {
                rsi_period: 14,
                macd_fast: 12,
                macd_slow: 26,
                macd_signal: 9,
            },
            "pairs_spread" => Self::PairsSpread { lookback: 30, entry_z: 2.0, exit_z: 0.5 },
            _ => return None,
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::SmaCrossover { .. } => "sma_crossover",
            Self::EmaCrossover { .. } => "ema_crossover",
            Self::Rsi { .. } => "rsi",
            Self::BollingerBands { .. } => "bollinger_bands",
            Self::Macd { .. } => "macd",
            Self::MeanReversion { .. } => "mean_reversion",
            Self::Momentum { .. } => "momentum",
            Self::VolumeWeighted { .. } => "volume_weighted",
            Self::TripleEma { .. } => "triple_ema",
            Self::RsiMacdCombo { .. } => "rsi_macd_combo",
            Self::PairsSpread { .. } => "pairs_spread",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::SmaCrossover { .. } => "SMA crossover — buy when fast SMA crosses above slow SMA",
            Self::EmaCrossover { .. } => "EMA crossover — faster response than SMA crossover",
            Self::Rsi { .. } => "RSI — buy at oversold recovery, sell at overbought breakdown",
            Self::BollingerBands { .. } => "Bollinger bands — mean reversion at band re-entries",
            Self::Macd { .. } => "MACD — buy/sell on MACD line crossing its signal line",
            Self::MeanReversion { .. } => "Mean reversion — trade z-score extremes of price",
            Self::Momentum { .. } => "Momentum — ROC threshold crossings",
            Self::VolumeWeighted { .. } => "Volume-weighted — SMA crossings confirmed by volume",
            Self::TripleEma { .. } => "Triple EMA — short/mid/long alignment changes",
            Self::RsiMacdCombo { .. } => "RSI+MACD combo — MACD cross gated by RSI regime",
            Self::PairsSpread { .. } => "Pairs spread — z-score of the price ratio of two assets",
        }
    }

    /// Minimum bars before any signal can be defined.
    pub fn min_bars(&self) -> usize {
        match self {
            Self::SmaCrossover { slow_period, .. } => *slow_period,
            Self::EmaCrossover { slow_period, .. } => *slow_period,
            Self::Rsi { period, .. } => period + 1,
            Self::BollingerBands { period, .. } => *period,
            Self::Macd { slow_period, signal_period, .. } => slow_period + signal_period,
            Self::MeanReversion { lookback, .. } => *lookback,
            Self::Momentum { roc_period, .. } => roc_period + 1,
            Self::VolumeWeighted { sma_period, .. } => *sma_period,
            Self::TripleEma { long_period, .. } => *long_period,
            Self::RsiMacdCombo { macd_slow, macd_signal, .. } => macd_slow + macd_signal,
            Self::PairsSpread { lookback, .. } => *lookback,
        }
    }

    /// Evaluate over a series. `series_b` feeds the pairs strategy; every
    /// other strategy ignores it.
    pub fn evaluate(&self, series: &Series, closes_b: Option<&[f64]>) -> StrategyOutput {
        let closes = series.closes();
        match self {
            Self::SmaCrossover { fast_period, slow_period } => {
                let fast = ind::sma(&closes, *fast_period);
                let slow = ind::sma(&closes, *slow_period);
                let signals = position_diff(&fast, &slow);
                output(signals, [("sma_fast", fast), ("sma_slow", slow)])
            }
            Self::EmaCrossover { fast_period, slow_period } => {
                let fast = ind::ema(&closes, *fast_period);
                let slow = ind::ema(&closes, *slow_period);
                let signals = position_diff(&fast, &slow);
                output(signals, [("ema_fast", fast), ("ema_slow", slow)])
            }
            Self::Rsi { period, overbought, oversold } => {
                let rsi = ind::rsi(&closes, *period);
                let mut signals = vec![0i8; closes.len()];
                for i in 1..rsi.len() {
                    if crossed_above_level(rsi[i - 1], rsi[i], *oversold) {
                        signals[i] = 1;
                    } else if crossed_below_level(rsi[i - 1], rsi[i], *overbought) {
                        signals[i] = -1;
                    }
                }
                output(signals, [("rsi", rsi)])
            }
            Self::BollingerBands { period, num_std } => {
                let (mid, upper, lower) = ind::bollinger(&closes, *period, *num_std);
                let mut signals = vec![0i8; closes.len()];
                for i in 1..closes.len() {
                    if defined(&[lower[i], lower[i - 1]])
                        && closes[i] > lower[i]
                        && closes[i - 1] <= lower[i - 1]
                    {
                        signals[i] = 1;
                    } else if defined(&[upper[i], upper[i - 1]])
                        && closes[i] < upper[i]
                        && closes[i - 1] >= upper[i - 1]
                    {
                        signals[i] = -1;
                    }
                }
                output(
                    signals,
                    [("bb_middle", mid), ("bb_upper", upper), ("bb_lower", lower)],
                )
            }
            Self::Macd { fast_period, slow_period, signal_period } => {
                let (line, signal, hist) =
                    ind::macd(&closes, *fast_period, *slow_period, *signal_period);
                let signals = position_diff(&line, &signal);
                output(
                    signals,
                    [("macd_line", line), ("macd_signal", signal), ("macd_hist", hist)],
                )
            }
            Self::MeanReversion { lookback, entry_std, exit_std } => {
                let z = ind::zscore(&closes, *lookback);
                let mut signals = vec![0i8; closes.len()];
                for i in 1..z.len() {
                    if crossed_above_level(z[i - 1], z[i], -entry_std) {
                        signals[i] = 1;
                    } else if crossed_below_level(z[i - 1], z[i], *exit_std) {
                        signals[i] = -1;
                    }
                }
                output(signals, [("z_score", z)])
            }
            Self::Momentum { roc_period, threshold } => {
                let roc = ind::roc(&closes, *roc_period);
                let mut signals = vec![0i8; closes.len()];
                for i in 1..roc.len() {
                    if crossed_above_level(roc[i - 1], roc[i], *threshold) {
                        signals[i] = 1;
                    } else if crossed_below_level(roc[i - 1], roc[i], -threshold) {
                        signals[i] = -1;
                    }
                }
                output(signals, [("roc", roc)])
            }
            Self::VolumeWeighted { sma_period, vol_multiplier } => {
                let volumes = series.volumes();
                let price_sma = ind::sma(&closes, *sma_period);
                let vol_sma = ind::sma(&volumes, *sma_period);
                let mut signals = vec![0i8; closes.len()];
                for i in 1..closes.len() {
                    let high_volume =
                        vol_sma[i].is_finite() && volumes[i] > vol_sma[i] * vol_multiplier;
                    if !high_volume {
                        continue;
                    }
                    if defined(&[price_sma[i], price_sma[i - 1]]) {
                        if closes[i] > price_sma[i] && closes[i - 1] <= price_sma[i - 1] {
                            signals[i] = 1;
                        } else if closes[i] < price_sma[i] && closes[i - 1] >= price_sma[i - 1] {
                            signals[i] = -1;
                        }
                    }
                }
                output(signals, [("price_sma", price_sma), ("vol_sma", vol_sma)])
            }
            Self::TripleEma { short_period, mid_period, long_period } => {
                let short = ind::ema(&closes, *short_period);
                let mid = ind::ema(&closes, *mid_period);
                let long = ind::ema(&closes, *long_period);
                let mut position = vec![0i8; closes.len()];
                for i in 0..closes.len() {
                    if short[i] > mid[i] && mid[i] > long[i] {
                        position[i] = 1;
                    }
                }
                let signals = diff(&position);
                output(
                    signals,
                    [("ema_short", short), ("ema_mid", mid), ("ema_long", long)],
                )
            }
            Self::RsiMacdCombo { rsi_period, macd_fast, macd_slow, macd_signal } => {
                let rsi = ind::rsi(&closes, *rsi_period);
                let (line, signal, _) = ind::macd(&closes, *macd_fast, *macd_slow, *macd_signal);
                let mut signals = vec![0i8; closes.len()];
                for i in 1..closes.len() {
                    if !defined(&[line[i], line[i - 1], signal[i], signal[i - 1], rsi[i]]) {
                        continue;
                    }
                    let bull_cross = line[i] > signal[i] && line[i - 1] <= signal[i - 1];
                    let bear_cross = line[i] < signal[i] && line[i - 1] >= signal[i - 1];
                    if bull_cross && rsi[i] < 50.0 {
                        signals[i] = 1;
                    } else if bear_cross && rsi[i] > 50.0 {
                        signals[i] = -1;
                    }
                }
                output(
                    signals,
                    [("rsi", rsi), ("macd_line", line), ("macd_signal_line", signal)],
                )
            }
            Self::PairsSpread { lookback, entry_z, exit_z } => {
                let degraded = closes_b.is_none();
                let spread: Vec<f64> = match closes_b {
                    Some(b) => closes
                        .iter()
                        .zip(b)
                        .map(|(a, b)| if *b != 0.0 { a / b } else { f64::NAN })
                        .collect(),
                    // Without a second leg the ratio degenerates to the price
                    // itself: plain self-mean-reversion.
                    None => closes.clone(),
                };
                let z = ind::zscore(&spread, *lookback);
                let mut signals = vec![0i8; spread.len()];
                for i in 1..z.len() {
                    if crossed_above_level(z[i - 1], z[i], -entry_z) {
                        signals[i] = 1;
                    } else if crossed_below_level(z[i - 1], z[i], *exit_z) {
                        signals[i] = -1;
                    }
                }
                let mut out = output(signals, [("spread", spread), ("z_score", z)]);
                out.degraded = degraded;
                out
            }
        }
    }
}

fn defined(values: &[f64]) -> bool {
    values.iter().all(|v| v.is_finite())
}

/// `prev <= level < cur`, both sides defined.
fn crossed_above_level(prev: f64, cur: f64, level: f64) -> bool {
    prev.is_finite() && cur.is_finite() && cur > level && prev <= level
}

/// `prev >= level > cur`, both sides defined.
fn crossed_below_level(prev: f64, cur: f64, level: f64) -> bool {
    prev.is_finite() && cur.is_finite() && cur < level && prev >= level
}

/// Edge signals from the sign of `a - b`: +1 the bar `a` first exceeds `b`,
/// -1 the bar it stops, 0 elsewhere. Undefined bars count as "not above".
fn position_diff(a: &[f64], b: &[f64]) -> Vec<i8> {
    let position: Vec<i8> = a
        .iter()
        .zip(b)
        .map(|(x, y)| (x.is_finite() && y.is_finite() && x > y) as i8)
        .collect();
    diff(&position)
}

fn diff(position: &[i8]) -> Vec<i8> {
    let mut out = vec![0i8; position.len()];
    for i in 1..position.len() {
        out[i] = position[i] - position[i - 1];
    }
    out
}

fn output<const N: usize>(signals: Vec<i8>, columns: [(&str, Vec<f64>); N]) -> StrategyOutput {
    StrategyOutput {
        signals,
        indicators: columns
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
        degraded: false,
    }
}
