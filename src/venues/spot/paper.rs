//! Paper spot adapter: simulated fills against live quotes.
//!
//! The whole paper book (balances, positions, resting orders, trade log)
//! sits behind one mutex; the lock is taken after every network read so it
//! is never held across an await point.

use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;

use crate::model::{Order, OrderSide, OrderStatus, OrderType};
use crate::venues::{Mode, SpotAdapter, Ticker, base_asset, quote_asset};

use super::feed::MarketFeed;

/// Default market-order slippage, basis points of the last price.
pub const DEFAULT_SLIPPAGE_BPS: f64 = 5.0;
/// Default taker commission, basis points of notional.
pub const DEFAULT_COMMISSION_BPS: f64 = 10.0;

#[derive(Default)]
struct PaperBook {
    balances: HashMap<String, f64>,
    positions: HashMap<String, f64>,
    open_orders: Vec<Order>,
    trades: Vec<Order>,
}

pub struct PaperSpotAdapter {
    feed: Box<dyn MarketFeed>,
    book: Mutex<PaperBook>,
    pub initial_balance: f64,
    slippage: f64,
    commission_rate: f64,
}

impl PaperSpotAdapter {
    pub fn new(feed: Box<dyn MarketFeed>, initial_balance: f64) -> Self {
        Self::with_fill_model(
            feed,
            initial_balance,
            DEFAULT_SLIPPAGE_BPS,
            DEFAULT_COMMISSION_BPS,
        )
    }

    /// Venues disagree on fill quality; slippage and commission are
    /// per-adapter parameters.
    pub fn with_fill_model(
        feed: Box<dyn MarketFeed>,
        initial_balance: f64,
        slippage_bps: f64,
        commission_bps: f64,
    ) -> Self {
        let mut balances = HashMap::new();
        balances.insert("USDT".to_string(), initial_balance);
        Self {
            feed,
            book: Mutex::new(PaperBook {
                balances,
                ..PaperBook::default()
            }),
            initial_balance,
            slippage: slippage_bps / 10_000.0,
            commission_rate: commission_bps / 10_000.0,
        }
    }

    /// Fill a marketable order against the book. Returns the updated order;
    /// non-marketable limit/stop orders rest as `Open`.
    fn fill(&self, book: &mut PaperBook, mut order: Order, last: f64) -> Order {
        let fill_price = match order.order_type {
            OrderType::Market => match order.side {
                OrderSide::Buy => last * (1.0 + self.slippage),
                OrderSide::Sell => last * (1.0 - self.slippage),
            },
            OrderType::Limit => {
                let Some(limit) = order.price else {
                    order.status = OrderStatus::Failed;
                    return order;
                };
                // Fills immediately only when the book is already through
                // the limit; otherwise the order rests.
                match order.side {
                    OrderSide::Buy if limit >= last => limit.min(last),
                    OrderSide::Sell if limit <= last => limit.max(last),
                    _ => {
                        order.status = OrderStatus::Open;
                        book.open_orders.push(order.clone());
                        return order;
                    }
                }
            }
            OrderType::StopLoss | OrderType::StopLimit => {
                if order.stop_price.is_none() {
                    order.status = OrderStatus::Failed;
                    return order;
                }
                order.status = OrderStatus::Open;
                book.open_orders.push(order.clone());
                return order;
            }
        };

        let base = base_asset(&order.symbol).to_string();
        let quote = quote_asset(&order.symbol).to_string();

        match order.side {
            OrderSide::Buy => {
                let cost = order.quantity * fill_price;
                let commission = cost * self.commission_rate;
                let total = cost + commission;
                let cash = book.balances.get(&quote).copied().unwrap_or(0.0);
                if cash < total {
                    order.status = OrderStatus::Failed;
                    return order;
                }
                *book.balances.entry(quote).or_insert(0.0) -= total;
                *book.positions.entry(base).or_insert(0.0) += order.quantity;
                order.commission = commission;
            }
            OrderSide::Sell => {
                let held = book.positions.get(&base).copied().unwrap_or(0.0);
                if held < order.quantity {
                    order.status = OrderStatus::Failed;
                    return order;
                }
                let proceeds = order.quantity * fill_price;
                let commission = proceeds * self.commission_rate;
                *book.positions.entry(base).or_insert(0.0) -= order.quantity;
                *book.balances.entry(quote).or_insert(0.0) += proceeds - commission;
                order.commission = commission;
            }
        }

        order.filled_price = Some(fill_price);
        order.filled_quantity = order.quantity;
        order.status = OrderStatus::Filled;
        order.filled_at = Some(Utc::now());
        book.trades.push(order.clone());
        order
    }
}

#[async_trait]
impl SpotAdapter for PaperSpotAdapter {
    fn name(&self) -> &str {
        self.feed.name()
    }

    fn mode(&self) -> Mode {
        Mode::Paper
    }

    async fn get_ticker(&self, symbol: &str) -> Result<Ticker> {
        self.feed.get_ticker(symbol).await
    }

    async fn get_balance(&self) -> Result<HashMap<String, f64>> {
        let book = self.book.lock().expect("paper book poisoned");
        Ok(book
            .balances
            .iter()
            .filter(|(_, v)| **v > 0.0)
            .map(|(k, v)| (k.clone(), *v))
            .collect())
    }

    async fn get_positions(&self) -> Result<HashMap<String, f64>> {
        let book = self.book.lock().expect("paper book poisoned");
        Ok(book
            .positions
            .iter()
            .filter(|(_, v)| **v > 0.0)
            .map(|(k, v)| (k.clone(), *v))
            .collect())
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

        let last = match self.feed.get_ticker(symbol).await {
            Ok(t) if t.last > 0.0 => t.last,
            _ => {
                order.status = OrderStatus::Failed;
                return order;
            }
        };

        let mut book = self.book.lock().expect("paper book poisoned");
        self.fill(&mut book, order, last)
    }

    async fn cancel_order(&self, order_id: &str) -> Result<bool> {
        let mut book = self.book.lock().expect("paper book poisoned");
        for order in book.open_orders.iter_mut() {
            if order.id == order_id && order.status == OrderStatus::Open {
                order.status = OrderStatus::Cancelled;
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn get_open_orders(&self, symbol: Option<&str>) -> Result<Vec<Order>> {
        let book = self.book.lock().expect("paper book poisoned");
        Ok(book
            .open_orders
            .iter()
            .filter(|o| o.status == OrderStatus::Open)
            .filter(|o| symbol.is_none_or(|s| o.symbol == s))
            .cloned()
            .collect())
    }

    async fn get_trade_history(&self) -> Result<Vec<Order>> {
        let book = self.book.lock().expect("paper book poisoned");
        Ok(book.trades.clone())
    }

    async fn get_portfolio_value(&self, quote: &str) -> Result<f64> {
        let (mut total, positions) = {
            let book = self.book.lock().expect("paper book poisoned");
            (
                book.balances.get(quote).copied().unwrap_or(0.0),
                book.positions.clone(),
            )
        };

        for (asset, qty) in positions {
            if qty <= 0.0 {
                continue;
            }
            if let Ok(price) = self.get_price(&format!("{asset}/{quote}")).await {
                total += qty * price;
            }
        }
        Ok(total)
    }

    async fn check_pending_orders(&self, symbol: &str, current_price: f64) -> Result<Vec<Order>> {
        let mut book = self.book.lock().expect("paper book poisoned");

        let mut triggered: Vec<Order> = Vec::new();
        let mut remaining: Vec<Order> = Vec::new();

        for order in std::mem::take(&mut book.open_orders) {
            if order.status != OrderStatus::Open || order.symbol != symbol {
                remaining.push(order);
                continue;
            }

            let fire = match order.order_type {
                OrderType::StopLoss | OrderType::StopLimit => match (order.side, order.stop_price)
                {
                    (OrderSide::Sell, Some(stop)) => current_price <= stop,
                    (OrderSide::Buy, Some(stop)) => current_price >= stop,
                    _ => false,
                },
                OrderType::Limit => match (order.side, order.price) {
                    (OrderSide::Buy, Some(limit)) => current_price <= limit,
                    (OrderSide::Sell, Some(limit)) => current_price >= limit,
                    _ => false,
                },
                OrderType::Market => false,
            };

            if fire {
                triggered.push(order);
            } else {
                remaining.push(order);
            }
        }
        book.open_orders = remaining;

        let mut filled = Vec::new();
        for mut order in triggered {
            // A touched stop converts: stop-loss to market, stop-limit to
            // its limit leg.
            order.order_type = match order.order_type {
                OrderType::StopLoss => OrderType::Market,
                OrderType::StopLimit => OrderType::Limit,
                other => other,
            };
            order.status = OrderStatus::Pending;
            let result = self.fill(&mut book, order, current_price);
            if result.status == OrderStatus::Filled {
                filled.push(result);
            }
        }

        Ok(filled)
    }
}
