use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    Market,
    Limit,
    StopLoss,
    StopLimit,
}

/// Order lifecycle: `Pending -> {Open, Filled, Failed}`; resting orders end
/// as `Filled` or `Cancelled`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Open,
    Filled,
    Cancelled,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub quantity: f64,
    /// Limit price, for limit and stop-limit orders.
    pub price: Option<f64>,
    /// Trigger price, for stop orders.
    pub stop_price: Option<f64>,
    pub status: OrderStatus,
    pub filled_price: Option<f64>,
    pub filled_quantity: f64,
    pub commission: f64,
    pub created_at: DateTime<Utc>,
    pub filled_at: Option<DateTime<Utc>>,
    /// Venue-side id when placed live.
    pub exchange_order_id: Option<String>,
}

impl Order {
    pub fn new(
        symbol: &str,
        side: OrderSide,
        order_type: OrderType,
        quantity: f64,
        price: Option<f64>,
        stop_price: Option<f64>,
    ) -> Self {
        Self {
            id: format!("order_{}", uuid::Uuid::new_v4().simple()),
            symbol: symbol.to_string(),
            side,
            order_type,
            quantity,
            price,
            stop_price,
            status: OrderStatus::Pending,
            filled_price: None,
            filled_quantity: 0.0,
            commission: 0.0,
            created_at: Utc::now(),
            filled_at: None,
            exchange_order_id: None,
        }
    }
}

/// A spot holding. Paper mode tracks these in-process; live mode mirrors
/// the venue's balances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotPosition {
    pub symbol: String,
    /// "long" or "short" (spot is long-only; perps may short).
    pub side: String,
    pub quantity: f64,
    pub avg_entry_price: f64,
}
