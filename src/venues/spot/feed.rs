//! Live quote sources for the paper adapter.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::Deserialize;

use crate::venues::{Ticker, base_asset};

const HYPERLIQUID_INFO_URL: &str = "https://api.hyperliquid.xyz/info";
const HTTP_TIMEOUT_SECS: u64 = 10;

/// Where the paper adapter reads prices from. Tests inject a fixture;
/// production uses a venue's public endpoint.
#[async_trait]
pub trait MarketFeed: Send + Sync {
    fn name(&self) -> &str;

    async fn get_ticker(&self, symbol: &str) -> Result<Ticker>;
}

// ── Hyperliquid public info API ─────────────────────────────────────

#[derive(Debug, Deserialize)]
struct L2Level {
    px: String,
    #[serde(rename = "sz")]
    _sz: String,
    #[serde(rename = "n")]
    _n: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct L2Book {
    levels: Vec<Vec<L2Level>>,
}

/// Order-book top-of-book quotes from the Hyperliquid public info API.
pub struct HyperliquidFeed {
    client: reqwest::Client,
    url: String,
}

impl Default for HyperliquidFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl HyperliquidFeed {
    pub fn new() -> Self {
        Self::with_url(HYPERLIQUID_INFO_URL)
    }

    pub fn with_url(url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self {
            client,
            url: url.to_string(),
        }
    }
}

#[async_trait]
impl MarketFeed for HyperliquidFeed {
    fn name(&self) -> &str {
        "hyperliquid"
    }

    async fn get_ticker(&self, symbol: &str) -> Result<Ticker> {
        let coin = base_asset(symbol);
        let body = serde_json::json!({ "type": "l2Book", "coin": coin });

        let book: L2Book = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .context("l2Book request")?
            .error_for_status()
            .context("l2Book status")?
            .json()
            .await
            .context("l2Book decode")?;

        let bid = book
            .levels
            .first()
            .and_then(|side| side.first())
            .and_then(|l| l.px.parse::<f64>().ok())
            .unwrap_or(0.0);
        let ask = book
            .levels
            .get(1)
            .and_then(|side| side.first())
            .and_then(|l| l.px.parse::<f64>().ok())
            .unwrap_or(0.0);

        if bid <= 0.0 && ask <= 0.0 {
            bail!("no book for {coin}");
        }

        let last = if bid > 0.0 && ask > 0.0 {
            (bid + ask) / 2.0
        } else {
            bid.max(ask)
        };

        Ok(Ticker { bid, ask, last })
    }
}

// ── Fixed feed (tests, offline runs) ────────────────────────────────

/// Serves a fixed price per symbol. The price can be swapped at runtime so
/// tests can walk the market.
pub struct FixedFeed {
    prices: std::sync::Mutex<std::collections::HashMap<String, f64>>,
    /// Half-spread applied around the fixed price.
    spread: f64,
}

impl FixedFeed {
    pub fn new(prices: &[(&str, f64)]) -> Self {
        Self {
            prices: std::sync::Mutex::new(
                prices
                    .iter()
                    .map(|(s, p)| (s.to_string(), *p))
                    .collect(),
            ),
            spread: 0.0,
        }
    }

    pub fn set_price(&self, symbol: &str, price: f64) {
        self.prices
            .lock()
            .expect("feed prices poisoned")
            .insert(symbol.to_string(), price);
    }
}

#[async_trait]
impl MarketFeed for FixedFeed {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn get_ticker(&self, symbol: &str) -> Result<Ticker> {
        let prices = self.prices.lock().expect("feed prices poisoned");
        match prices.get(symbol).or_else(|| prices.get(base_asset(symbol))) {
            Some(&last) => Ok(Ticker {
                bid: last - self.spread,
                ask: last + self.spread,
                last,
            }),
            None => bail!("no fixture price for {symbol}"),
        }
    }
}
