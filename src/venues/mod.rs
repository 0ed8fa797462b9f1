pub mod options;
pub mod spot;

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Order, OrderSide, OrderType};

/// Paper adapters simulate fills against live quotes; live adapters place
/// real orders and are only ever constructed behind explicit credentials
/// plus an explicit live flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Paper,
    Live,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Paper => "PAPER",
            Mode::Live => "LIVE",
        }
    }
}

/// Top-of-book quote.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Ticker {
    pub bid: f64,
    pub ask: f64,
    pub last: f64,
}

/// Unified spot/perp venue contract. One implementation per (venue, mode);
/// the scheduler only ever talks to this trait.
///
/// Failure contract: a venue fault during order placement yields an `Order`
/// with `status == Failed` and no balance side effects; transport errors on
/// read paths surface as `Err`.
#[async_trait]
pub trait SpotAdapter: Send + Sync {
    fn name(&self) -> &str;

    fn mode(&self) -> Mode;

    async fn get_ticker(&self, symbol: &str) -> Result<Ticker>;

    async fn get_price(&self, symbol: &str) -> Result<f64> {
        Ok(self.get_ticker(symbol).await?.last)
    }

    /// Free balances per asset.
    async fn get_balance(&self) -> Result<HashMap<String, f64>>;

    /// Non-zero base-asset holdings.
    async fn get_positions(&self) -> Result<HashMap<String, f64>>;

    async fn place_order(
        &self,
        symbol: &str,
        side: OrderSide,
        order_type: OrderType,
        quantity: f64,
        price: Option<f64>,
        stop_price: Option<f64>,
    ) -> Order;

    async fn cancel_order(&self, order_id: &str) -> Result<bool>;

    async fn get_open_orders(&self, symbol: Option<&str>) -> Result<Vec<Order>>;

    async fn get_trade_history(&self) -> Result<Vec<Order>>;

    /// Cash plus mark-to-market of every holding, in `quote`.
    async fn get_portfolio_value(&self, quote: &str) -> Result<f64>;

    /// Trigger resting stop orders and re-check resting limits against the
    /// given price. Returns the orders that filled.
    async fn check_pending_orders(&self, symbol: &str, current_price: f64) -> Result<Vec<Order>>;

    /// Thin polling price stream, no push transport. `max_updates == 0`
    /// streams until the callback returns `false`.
    async fn stream_prices(
        &self,
        symbol: &str,
        mut callback: Box<dyn for<'a> FnMut(&'a str, f64, DateTime<Utc>) -> bool + Send + 'static>,
        interval_secs: f64,
        max_updates: usize,
    ) -> Result<()> {
        let mut count = 0usize;
        loop {
            match self.get_price(symbol).await {
                Ok(price) => {
                    if !callback(symbol, price, Utc::now()) {
                        break;
                    }
                    count += 1;
                    if max_updates > 0 && count >= max_updates {
                        break;
                    }
                }
                Err(e) => eprintln!("stream error for {symbol}: {e:#}"),
            }
            tokio::time::sleep(std::time::Duration::from_secs_f64(interval_secs)).await;
        }
        Ok(())
    }
}

/// Base asset of a `BASE/QUOTE` pair (`"BTC/USDT"` → `"BTC"`).
pub fn base_asset(symbol: &str) -> &str {
    symbol.split('/').next().unwrap_or(symbol)
}

/// Quote asset of a `BASE/QUOTE` pair, defaulting to USDT.
pub fn quote_asset(symbol: &str) -> &str {
    symbol.split('/').nth(1).unwrap_or("USDT")
}
