//! OHLCV retrieval from a venue's public candle API.
//!
//! One page for live signal generation, paginated full-history pulls for
//! the cache. Network and rate-limit errors retry up to five times before
//! surfacing.

use std::sync::Arc;

use anyhow::{Result, bail};
use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use thiserror::Error;

use crate::model::{OhlcvBar, Series};
use crate::venues::base_asset;

use super::store::Store;

const HYPERLIQUID_INFO_URL: &str = "https://api.hyperliquid.xyz/info";
const HTTP_TIMEOUT_SECS: u64 = 10;
const MAX_CANDLES_PER_REQUEST: usize = 500;
const MAX_RETRIES: u32 = 5;
const RATE_LIMIT_SLEEP_SECS: u64 = 10;
const NETWORK_SLEEP_SECS: u64 = 5;

/// Millisecond step for a timeframe string.
pub fn timeframe_ms(timeframe: &str) -> i64 {
    match timeframe {
        "1m" => 60_000,
        "3m" => 180_000,
        "5m" => 300_000,
        "15m" => 900_000,
        "30m" => 1_800_000,
        "1h" => 3_600_000,
        "2h" => 7_200_000,
        "4h" => 14_400_000,
        "8h" => 28_800_000,
        "12h" => 43_200_000,
        "1w" => 604_800_000,
        _ => 86_400_000,
    }
}

/// Anything that can serve candles. Strategies and check runners consume
/// this; tests inject a canned series.
#[async_trait]
pub trait BarSource: Send + Sync {
    async fn bars(&self, symbol: &str, timeframe: &str, limit: usize) -> Result<Series>;
}

/// How a single candle request failed. Rate limits and transport faults
/// retry on different clocks, so the retry loop matches on this instead
/// of guessing from error text.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("rate limited by the venue")]
    RateLimited,
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

// ── Hyperliquid candle API ──────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CandleRow {
    #[serde(rename = "t")]
    open_time: i64,
    #[serde(rename = "o")]
    open: String,
    #[serde(rename = "h")]
    high: String,
    #[serde(rename = "l")]
    low: String,
    #[serde(rename = "c")]
    close: String,
    #[serde(rename = "v")]
    volume: String,
}

impl CandleRow {
    fn to_bar(&self) -> OhlcvBar {
        let close: f64 = self.close.parse().unwrap_or(0.0);
        OhlcvBar {
            timestamp_ms: self.open_time,
            open: self.open.parse().unwrap_or(close),
            high: self.high.parse().unwrap_or(close),
            low: self.low.parse().unwrap_or(close),
            close,
            volume: self.volume.parse().unwrap_or(0.0),
        }
    }
}

pub struct DataFetcher {
    client: reqwest::Client,
    url: String,
    exchange: String,
    store: Option<Arc<Store>>,
}

impl DataFetcher {
    pub fn new(exchange: &str) -> Self {
        Self::with_url(exchange, HYPERLIQUID_INFO_URL)
    }

    pub fn with_url(exchange: &str, url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self {
            client,
            url: url.to_string(),
            exchange: exchange.to_string(),
            store: None,
        }
    }

    /// Persist every fetched page into the OHLCV cache.
    pub fn with_store(mut self, store: Arc<Store>) -> Self {
        self.store = Some(store);
        self
    }

    async fn fetch_page(
        &self,
        coin: &str,
        timeframe: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<CandleRow>> {
        let body = serde_json::json!({
            "type": "candleSnapshot",
            "req": {
                "coin": coin,
                "interval": timeframe,
                "startTime": start_ms,
                "endTime": end_ms,
            }
        });

        let mut rate_limit_retries = 0u32;
        let mut network_retries = 0u32;
        loop {
            let attempt = async {
                let resp = self.client.post(&self.url).json(&body).send().await?;
                if resp.status().as_u16() == 429 {
                    return Err(FetchError::RateLimited);
                }
                let rows = resp
                    .error_for_status()?
                    .json::<Vec<CandleRow>>()
                    .await?;
                Ok::<_, FetchError>(rows)
            };

            match attempt.await {
                Ok(rows) => return Ok(rows),
                Err(FetchError::RateLimited) => {
                    rate_limit_retries += 1;
                    if rate_limit_retries >= MAX_RETRIES {
                        bail!("rate limit exceeded {rate_limit_retries} times");
                    }
                    eprintln!(
                        "Rate limited, sleeping {RATE_LIMIT_SLEEP_SECS}s... ({rate_limit_retries}/{MAX_RETRIES})"
                    );
                    tokio::time::sleep(std::time::Duration::from_secs(RATE_LIMIT_SLEEP_SECS))
                        .await;
                }
                Err(e @ FetchError::Transport(_)) => {
                    network_retries += 1;
                    if network_retries >= MAX_RETRIES {
                        return Err(anyhow::Error::new(e)
                            .context(format!("candle fetch after {network_retries} retries")));
                    }
                    eprintln!(
                        "Network error: {e}, retrying in {NETWORK_SLEEP_SECS}s... ({network_retries}/{MAX_RETRIES})"
                    );
                    tokio::time::sleep(std::time::Duration::from_secs(NETWORK_SLEEP_SECS)).await;
                }
            }
        }
    }

    /// Most recent `limit` candles, newest last.
    pub async fn fetch_ohlcv(
        &self,
        symbol: &str,
        timeframe: &str,
        limit: usize,
    ) -> Result<Series> {
        let coin = base_asset(symbol);
        let step = timeframe_ms(timeframe);
        let end_ms = chrono::Utc::now().timestamp_millis();
        let start_ms = end_ms - step * limit as i64;

        let rows = self.fetch_page(coin, timeframe, start_ms, end_ms).await?;
        let bars: Vec<OhlcvBar> = rows.iter().map(CandleRow::to_bar).collect();

        if let Some(store) = &self.store {
            store.store_ohlcv(&self.exchange, symbol, timeframe, &bars)?;
        }
        Ok(Series::new(bars))
    }

    /// Walk the full history from `since_ms`, page by page, deduped and
    /// sorted, persisting as it goes.
    pub async fn fetch_full_history(
        &self,
        symbol: &str,
        timeframe: &str,
        since_ms: i64,
    ) -> Result<Series> {
        let coin = base_asset(symbol);
        let step = timeframe_ms(timeframe);
        let now_ms = chrono::Utc::now().timestamp_millis();
        let total_pages =
            (((now_ms - since_ms) / step) as usize).div_ceil(MAX_CANDLES_PER_REQUEST);

        let bar = ProgressBar::new(total_pages.max(1) as u64);
        bar.set_style(
            ProgressStyle::with_template("{msg} [{bar:30}] {pos}/{len} pages")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar.set_message(format!("{symbol} {timeframe}"));

        let mut all: Vec<OhlcvBar> = Vec::new();
        let mut cursor = since_ms;

        while cursor < now_ms {
            let rows = self.fetch_page(coin, timeframe, cursor, now_ms).await?;
            if rows.is_empty() {
                break;
            }

            let last_ts = rows.last().map(|r| r.open_time).unwrap_or(cursor);
            all.extend(rows.iter().map(CandleRow::to_bar));
            bar.inc(1);

            if last_ts <= cursor {
                break;
            }
            cursor = last_ts + step;

            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        }
        bar.finish_and_clear();

        all.sort_by_key(|b| b.timestamp_ms);
        all.dedup_by_key(|b| b.timestamp_ms);

        if let Some(store) = &self.store {
            store.store_ohlcv(&self.exchange, symbol, timeframe, &all)?;
        }

        println!("Fetched {} candles for {symbol} {timeframe}", all.len());
        Ok(Series::new(all))
    }

    /// Cache first; fall back to a network pull when the cache is empty.
    pub async fn load_cached(
        &self,
        symbol: &str,
        timeframe: &str,
        start_ms: Option<i64>,
        end_ms: Option<i64>,
    ) -> Result<Series> {
        if let Some(store) = &self.store {
            let cached = store.load_ohlcv(&self.exchange, symbol, timeframe, start_ms, end_ms)?;
            if !cached.is_empty() {
                return Ok(cached);
            }
        }
        let since = start_ms.unwrap_or_else(|| {
            chrono::Utc::now().timestamp_millis() - 365 * 86_400_000
        });
        self.fetch_full_history(symbol, timeframe, since).await
    }
}

#[async_trait]
impl BarSource for DataFetcher {
    async fn bars(&self, symbol: &str, timeframe: &str, limit: usize) -> Result<Series> {
        self.fetch_ohlcv(symbol, timeframe, limit).await
    }
}

/// Canned candles for tests and offline evaluation.
pub struct FixedBars {
    pub series: Series,
}

#[async_trait]
impl BarSource for FixedBars {
    async fn bars(&self, _symbol: &str, _timeframe: &str, limit: usize) -> Result<Series> {
        let bars = &self.series.bars;
        let start = bars.len().saturating_sub(limit);
        Ok(Series::new(bars[start..].to_vec()))
    }
}
