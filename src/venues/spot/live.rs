//! Live spot adapter: signed REST against a Binance-style venue.
//!
//! Only ever constructed with explicit credentials and the explicit live
//! flag; the CLI refuses `--live` without both.

use std::collections::HashMap;

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use crate::model::{Order, OrderSide, OrderStatus, OrderType};
use crate::venues::{Mode, SpotAdapter, Ticker};

const DEFAULT_BASE_URL: &str = "https://api.binance.us";
const HTTP_TIMEOUT_SECS: u64 = 10;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Deserialize)]
struct BookTicker {
    #[serde(rename = "bidPrice")]
    bid_price: String,
    #[serde(rename = "askPrice")]
    ask_price: String,
}

#[derive(Debug, Deserialize)]
struct AccountBalance {
    asset: String,
    free: String,
}

#[derive(Debug, Deserialize)]
struct AccountInfo {
    balances: Vec<AccountBalance>,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    #[serde(rename = "orderId")]
    order_id: u64,
    status: String,
    #[serde(rename = "executedQty", default)]
    executed_qty: String,
    #[serde(default)]
    fills: Vec<Fill>,
}

#[derive(Debug, Deserialize)]
struct Fill {
    price: String,
    qty: String,
    commission: String,
}

pub struct LiveSpotAdapter {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    api_secret: String,
    /// Venue order id -> symbol, needed to cancel (the venue requires both).
    order_symbols: std::sync::Mutex<std::collections::HashMap<String, String>>,
}

impl LiveSpotAdapter {
    pub fn new(api_key: &str, api_secret: &str) -> Self {
        Self::with_base_url(api_key, api_secret, DEFAULT_BASE_URL)
    }

    pub fn with_base_url(api_key: &str, api_secret: &str, base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            api_secret: api_secret.to_string(),
            order_symbols: std::sync::Mutex::new(std::collections::HashMap::new()),
        }
    }

    fn venue_symbol(symbol: &str) -> String {
        symbol.replace('/', "")
    }

    /// HMAC-SHA256 over the query string, hex-encoded.
    fn sign(&self, query: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .expect("hmac accepts any key length");
        mac.update(query.as_bytes());
        mac.finalize()
            .into_bytes()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect()
    }

    fn signed_query(&self, mut params: Vec<(String, String)>) -> String {
        params.push(("timestamp".into(), Utc::now().timestamp_millis().to_string()));
        let query: String = params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        let signature = self.sign(&query);
        format!("{query}&signature={signature}")
    }

    async fn place_live(
        &self,
        symbol: &str,
        side: OrderSide,
        order_type: OrderType,
        quantity: f64,
        price: Option<f64>,
        stop_price: Option<f64>,
    ) -> Result<OrderResponse> {
        let mut params: Vec<(String, String)> = vec![
            ("symbol".into(), Self::venue_symbol(symbol)),
            (
                "side".into(),
                match side {
                    OrderSide::Buy => "BUY".into(),
                    OrderSide::Sell => "SELL".into(),
                },
            ),
            ("quantity".into(), format!("{quantity}")),
        ];

        match order_type {
            OrderType::Market => params.push(("type".into(), "MARKET".into())),
            OrderType::Limit => {
                let p = price.ok_or_else(|| anyhow!("limit order requires a price"))?;
                params.push(("type".into(), "LIMIT".into()));
                params.push(("timeInForce".into(), "GTC".into()));
                params.push(("price".into(), format!("{p}")));
            }
            OrderType::StopLoss => {
                let stop = stop_price.ok_or_else(|| anyhow!("stop order requires a trigger"))?;
                params.push(("type".into(), "STOP_LOSS".into()));
                params.push(("stopPrice".into(), format!("{stop}")));
            }
            OrderType::StopLimit => {
                let p = price.ok_or_else(|| anyhow!("stop-limit order requires a price"))?;
                let stop = stop_price.ok_or_else(|| anyhow!("stop order requires a trigger"))?;
                params.push(("type".into(), "STOP_LOSS_LIMIT".into()));
                params.push(("timeInForce".into(), "GTC".into()));
                params.push(("price".into(), format!("{p}")));
                params.push(("stopPrice".into(), format!("{stop}")));
            }
        }

        let url = format!("{}/api/v3/order?{}", self.base_url, self.signed_query(params));
        let resp = self
            .client
            .post(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .context("order request")?
            .error_for_status()
            .context("order rejected")?
            .json::<OrderResponse>()
            .await
            .context("order decode")?;
        Ok(resp)
    }
}

#[async_trait]
impl SpotAdapter for LiveSpotAdapter {
    fn name(&self) -> &str {
        "binanceus"
    }

    fn mode(&self) -> Mode {
        Mode::Live
    }

    async fn get_ticker(&self, symbol: &str) -> Result<Ticker> {
        let url = format!(
            "{}/api/v3/ticker/bookTicker?symbol={}",
            self.base_url,
            Self::venue_symbol(symbol)
        );
        let book: BookTicker = self
            .client
            .get(&url)
            .send()
            .await
            .context("bookTicker request")?
            .error_for_status()?
            .json()
            .await
            .context("bookTicker decode")?;

        let bid: f64 = book.bid_price.parse().unwrap_or(0.0);
        let ask: f64 = book.ask_price.parse().unwrap_or(0.0);
        Ok(Ticker {
            bid,
            ask,
            last: (bid + ask) / 2.0,
        })
    }

    async fn get_balance(&self) -> Result<HashMap<String, f64>> {
        let url = format!(
            "{}/api/v3/account?{}",
            self.base_url,
            self.signed_query(Vec::new())
        );
        let account: AccountInfo = self
            .client
            .get(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .context("account request")?
            .error_for_status()?
            .json()
            .await
            .context("account decode")?;

        Ok(account
            .balances
            .iter()
            .filter_map(|b| {
                let free: f64 = b.free.parse().ok()?;
                (free > 0.0).then(|| (b.asset.clone(), free))
            })
            .collect())
    }

    async fn get_positions(&self) -> Result<HashMap<String, f64>> {
        // Spot positions are just non-quote balances.
        let mut balances = self.get_balance().await?;
        balances.retain(|asset, qty| asset != "USDT" && asset != "USD" && *qty > 0.0);
        Ok(balances)
    }

    async fn place_order(
        &self,
        symbol: &str,
        side: OrderSide,
        order_type: OrderType,
        quantity: f64,
        price: Option<f64>,
        stop_price: Option<f64>,
    ) -> Order {
        let mut order = Order::new(symbol, side, order_type, quantity, price, stop_price);

        match self
            .place_live(symbol, side, order_type, quantity, price, stop_price)
            .await
        {
            Ok(resp) => {
                order.exchange_order_id = Some(resp.order_id.to_string());
                self.order_symbols
                    .lock()
                    .expect("order symbols poisoned")
                    .insert(resp.order_id.to_string(), symbol.to_string());
                order.status = match resp.status.as_str() {
                    "FILLED" => OrderStatus::Filled,
                    "NEW" | "PARTIALLY_FILLED" => OrderStatus::Open,
                    "CANCELED" => OrderStatus::Cancelled,
                    _ => OrderStatus::Failed,
                };
                order.filled_quantity = resp.executed_qty.parse().unwrap_or(0.0);
                if !resp.fills.is_empty() {
                    let mut notional = 0.0;
                    let mut qty = 0.0;
                    let mut commission = 0.0;
                    for f in &resp.fills {
                        let fp: f64 = f.price.parse().unwrap_or(0.0);
                        let fq: f64 = f.qty.parse().unwrap_or(0.0);
                        notional += fp * fq;
                        qty += fq;
                        commission += f.commission.parse().unwrap_or(0.0);
                    }
                    if qty > 0.0 {
                        order.filled_price = Some(notional / qty);
                    }
                    order.commission = commission;
                }
                if order.status == OrderStatus::Filled {
                    order.filled_at = Some(Utc::now());
                }
            }
            Err(e) => {
                eprintln!("[LIVE] order failed: {e:#}");
                order.status = OrderStatus::Failed;
            }
        }

        order
    }

    async fn cancel_order(&self, order_id: &str) -> Result<bool> {
        let symbol = self
            .order_symbols
            .lock()
            .expect("order symbols poisoned")
            .get(order_id)
            .cloned();
        let Some(symbol) = symbol else {
            return Ok(false);
        };

        let params = vec![
            ("symbol".to_string(), Self::venue_symbol(&symbol)),
            ("orderId".to_string(), order_id.to_string()),
        ];
        let url = format!("{}/api/v3/order?{}", self.base_url, self.signed_query(params));
        let resp = self
            .client
            .delete(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .context("cancel request")?;
        Ok(resp.status().is_success())
    }

    async fn get_open_orders(&self, symbol: Option<&str>) -> Result<Vec<Order>> {
        let mut params = Vec::new();
        if let Some(s) = symbol {
            params.push(("symbol".to_string(), Self::venue_symbol(s)));
        }
        let url = format!(
            "{}/api/v3/openOrders?{}",
            self.base_url,
            self.signed_query(params)
        );
        // The venue returns its own order schema; only ids and status are
        // mapped back.
        let raw: Vec<serde_json::Value> = self
            .client
            .get(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .context("openOrders request")?
            .error_for_status()?
            .json()
            .await?;

        Ok(raw
            .iter()
            .filter_map(|v| {
                let sym = v.get("symbol")?.as_str()?.to_string();
                let side = match v.get("side")?.as_str()? {
                    "BUY" => OrderSide::Buy,
                    _ => OrderSide::Sell,
                };
                let qty = v.get("origQty")?.as_str()?.parse().ok()?;
                let mut order = Order::new(&sym, side, OrderType::Limit, qty, None, None);
                order.status = OrderStatus::Open;
                order.exchange_order_id = v.get("orderId").map(|id| id.to_string());
                Some(order)
            })
            .collect())
    }

    async fn get_trade_history(&self) -> Result<Vec<Order>> {
        // Live history stays at the venue; the engine keeps its own log.
        Ok(Vec::new())
    }

    async fn get_portfolio_value(&self, quote: &str) -> Result<f64> {
        let balances = self.get_balance().await?;
        let mut total = balances.get(quote).copied().unwrap_or(0.0);
        for (asset, qty) in &balances {
            if asset == quote || *qty <= 0.0 {
                continue;
            }
            if let Ok(price) = self.get_price(&format!("{asset}/{quote}")).await {
                total += qty * price;
            }
        }
        Ok(total)
    }

    async fn check_pending_orders(&self, _symbol: &str, _current_price: f64) -> Result<Vec<Order>> {
        // The venue triggers its own resting orders.
        Ok(Vec::new())
    }
}
