//! Options market data sources.
//!
//! The paper adapter consumes the `OptionsMarketData` trait; production
//! binds it to the Deribit public REST API, tests to an in-memory fixture.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

use crate::model::{OptionContract, OptionType};

const DERIBIT_BASE_URL: &str = "https://www.deribit.com/api/v2";
const HTTP_TIMEOUT_SECS: u64 = 10;

/// A raw option quote, in underlying terms.
#[derive(Debug, Clone, Copy, Default)]
pub struct OptionQuote {
    pub bid: f64,
    pub ask: f64,
    pub last: f64,
    pub open_interest: f64,
}

#[async_trait]
pub trait OptionsMarketData: Send + Sync {
    fn name(&self) -> &str;

    /// Active option instruments for an underlying (identity only; quote
    /// fields stay zero until enrichment).
    async fn instruments(&self, underlying: &str) -> Result<Vec<OptionContract>>;

    async fn ticker(&self, instrument: &str) -> Result<OptionQuote>;

    /// Index (spot) price of the underlying in USD.
    async fn index_price(&self, underlying: &str) -> Result<f64>;
}

// ── Deribit public REST ─────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RpcEnvelope<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
struct Instrument {
    instrument_name: String,
    base_currency: String,
    option_type: Option<String>,
    strike: Option<f64>,
    expiration_timestamp: Option<i64>,
    #[serde(default)]
    is_active: bool,
}

#[derive(Debug, Deserialize)]
struct TickerResult {
    #[serde(default)]
    best_bid_price: Option<f64>,
    #[serde(default)]
    best_ask_price: Option<f64>,
    #[serde(default)]
    last_price: Option<f64>,
    #[serde(default)]
    open_interest: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct IndexResult {
    index_price: f64,
}

pub struct DeribitClient {
    client: reqwest::Client,
    base_url: String,
}

impl Default for DeribitClient {
    fn default() -> Self {
        Self::new()
    }
}

impl DeribitClient {
    pub fn new() -> Self {
        Self::with_base_url(DERIBIT_BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{path}", self.base_url);
        let envelope: RpcEnvelope<T> = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {path}"))?
            .error_for_status()
            .with_context(|| format!("GET {path} status"))?
            .json()
            .await
            .with_context(|| format!("GET {path} decode"))?;
        Ok(envelope.result)
    }
}

#[async_trait]
impl OptionsMarketData for DeribitClient {
    fn name(&self) -> &str {
        "deribit"
    }

    async fn instruments(&self, underlying: &str) -> Result<Vec<OptionContract>> {
        let raw: Vec<Instrument> = self
            .get(&format!(
                "/public/get_instruments?currency={underlying}&kind=option&expired=false"
            ))
            .await?;

        let contracts = raw
            .into_iter()
            .filter(|i| i.is_active && i.base_currency.starts_with(underlying))
            .filter_map(|i| {
                let strike = i.strike?;
                let expiry_ms = i.expiration_timestamp?;
                let option_type = match i.option_type.as_deref() {
                    Some("call") => OptionType::Call,
                    Some("put") => OptionType::Put,
                    _ => return None,
                };
                let expiry: DateTime<Utc> = Utc.timestamp_millis_opt(expiry_ms).single()?;
                Some(OptionContract {
                    symbol: i.instrument_name,
                    underlying: underlying.to_string(),
                    strike,
                    expiry,
                    option_type,
                    bid: 0.0,
                    ask: 0.0,
                    last: 0.0,
                    open_interest: 0.0,
                    spot_price: 0.0,
                    greeks: Default::default(),
                })
            })
            .collect();

        Ok(contracts)
    }

    async fn ticker(&self, instrument: &str) -> Result<OptionQuote> {
        let t: TickerResult = self
            .get(&format!("/public/ticker?instrument_name={instrument}"))
            .await?;
        Ok(OptionQuote {
            bid: t.best_bid_price.unwrap_or(0.0),
            ask: t.best_ask_price.unwrap_or(0.0),
            last: t.last_price.unwrap_or(0.0),
            open_interest: t.open_interest.unwrap_or(0.0),
        })
    }

    async fn index_price(&self, underlying: &str) -> Result<f64> {
        let index_name = format!("{}_usd", underlying.to_lowercase());
        let r: IndexResult = self
            .get(&format!("/public/get_index_price?index_name={index_name}"))
            .await?;
        Ok(r.index_price)
    }
}

// ── In-memory fixture ───────────────────────────────────────────────

/// Static market for tests and offline evaluation: a fixed instrument
/// universe, per-instrument quotes, and a movable spot price.
pub struct StaticMarket {
    instruments: Vec<OptionContract>,
    quotes: std::sync::Mutex<std::collections::HashMap<String, OptionQuote>>,
    spot: std::sync::Mutex<std::collections::HashMap<String, f64>>,
}

impl StaticMarket {
    pub fn new(spot: &[(&str, f64)]) -> Self {
        Self {
            instruments: Vec::new(),
            quotes: std::sync::Mutex::new(Default::default()),
            spot: std::sync::Mutex::new(
                spot.iter().map(|(u, p)| (u.to_string(), *p)).collect(),
            ),
        }
    }

    pub fn with_instruments(mut self, instruments: Vec<OptionContract>) -> Self {
        self.instruments = instruments;
        self
    }

    pub fn set_quote(&self, instrument: &str, quote: OptionQuote) {
        self.quotes
            .lock()
            .expect("quotes poisoned")
            .insert(instrument.to_string(), quote);
    }

    pub fn set_spot(&self, underlying: &str, price: f64) {
        self.spot
            .lock()
            .expect("spot poisoned")
            .insert(underlying.to_string(), price);
    }
}

#[async_trait]
impl OptionsMarketData for StaticMarket {
    fn name(&self) -> &str {
        "static"
    }

    async fn instruments(&self, underlying: &str) -> Result<Vec<OptionContract>> {
        Ok(self
            .instruments
            .iter()
            .filter(|c| c.underlying == underlying)
            .cloned()
            .collect())
    }

    async fn ticker(&self, instrument: &str) -> Result<OptionQuote> {
        match self.quotes.lock().expect("quotes poisoned").get(instrument) {
            Some(q) => Ok(*q),
            None => bail!("no quote for {instrument}"),
        }
    }

    async fn index_price(&self, underlying: &str) -> Result<f64> {
        match self.spot.lock().expect("spot poisoned").get(underlying) {
            Some(p) => Ok(*p),
            None => bail!("no spot for {underlying}"),
        }
    }
}
