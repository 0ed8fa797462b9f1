use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

/// One OHLCV candle. Timestamps are unix milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OhlcvBar {
    pub timestamp_ms: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// An ordered run of candles for one (symbol, timeframe).
///
/// Bars are immutable once appended; `validate` enforces strictly
/// increasing timestamps and sane high/low bounds.
#[derive(Debug, Clone, Default)]
pub struct Series {
    pub bars: Vec<OhlcvBar>,
}

impl Series {
    pub fn new(bars: Vec<OhlcvBar>) -> Self {
        Self { bars }
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.close).collect()
    }

    pub fn volumes(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.volume).collect()
    }

    pub fn highs(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.high).collect()
    }

    pub fn lows(&self) -> Vec<f64> {
        self.bars.iter().map(|b| b.low).collect()
    }

    pub fn last(&self) -> Option<&OhlcvBar> {
        self.bars.last()
    }

    /// Simple close-over-close returns, length `len() - 1`.
    pub fn returns(&self) -> Vec<f64> {
        self.bars
            .windows(2)
            .map(|w| {
                if w[0].close != 0.0 {
                    (w[1].close - w[0].close) / w[0].close
                } else {
                    0.0
                }
            })
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        for (i, bar) in self.bars.iter().enumerate() {
            if i > 0 && bar.timestamp_ms <= self.bars[i - 1].timestamp_ms {
                bail!(
                    "bar {} timestamp {} not after previous {}",
                    i,
                    bar.timestamp_ms,
                    self.bars[i - 1].timestamp_ms
                );
            }
            if bar.low > bar.open.min(bar.close) || bar.high < bar.open.max(bar.close) {
                bail!("bar {} violates low <= open,close <= high", i);
            }
            if bar.volume < 0.0 {
                bail!("bar {} has negative volume", i);
            }
        }
        Ok(())
    }

    /// Inner-join two series on timestamp, keeping only aligned bars.
    /// Returns (aligned primary, secondary closes).
    pub fn align_with(&self, other: &Series) -> (Series, Vec<f64>) {
        let mut by_ts = std::collections::HashMap::with_capacity(other.len());
        for b in &other.bars {
            by_ts.insert(b.timestamp_ms, b.close);
        }

        let mut bars = Vec::new();
        let mut closes_b = Vec::new();
        for b in &self.bars {
            if let Some(&cb) = by_ts.get(&b.timestamp_ms) {
                bars.push(*b);
                closes_b.push(cb);
            }
        }
        (Series::new(bars), closes_b)
    }
}
