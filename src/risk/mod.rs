//! Risk discipline shared by the spot and options engines.

pub mod options;
pub mod spot;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub use options::{OptionsRiskConfig, OptionsRiskManager};
pub use spot::{RiskConfig, RiskManager};

/// Outcome of a risk check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskVerdict {
    pub allowed: bool,
    pub reason: String,
}

impl RiskVerdict {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: "OK".into(),
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeLogEntry {
    pub pnl: f64,
    pub timestamp: DateTime<Utc>,
    pub consecutive_losses: u32,
}

/// Mutable bookkeeping common to both managers: daily window, peak value,
/// loss streak, and the circuit-breaker latch. Owned by exactly one
/// manager; mutated only through these methods.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiskState {
    pub peak_portfolio_value: f64,
    pub daily_start_value: f64,
    pub daily_pnl: f64,
    pub consecutive_losses: u32,
    pub circuit_break_active: bool,
    pub circuit_break_until: Option<DateTime<Utc>>,
    pub trade_log: Vec<TradeLogEntry>,
    day_stamp: String,
}

impl RiskState {
    /// Roll the daily window when the UTC day changes.
    pub fn reset_daily(&mut self, portfolio_value: f64) {
        let today = Utc::now().format("%Y-%m-%d").to_string();
        if today != self.day_stamp {
            self.day_stamp = today;
            self.daily_start_value = portfolio_value;
            self.daily_pnl = 0.0;
        }
    }

    /// Peak is a monotonic max.
    pub fn update_peak(&mut self, portfolio_value: f64) {
        if portfolio_value > self.peak_portfolio_value {
            self.peak_portfolio_value = portfolio_value;
        }
    }

    pub fn record_trade_result(&mut self, pnl: f64) {
        self.daily_pnl += pnl;
        if pnl < 0.0 {
            self.consecutive_losses += 1;
        } else {
            self.consecutive_losses = 0;
        }
        self.trade_log.push(TradeLogEntry {
            pnl,
            timestamp: Utc::now(),
            consecutive_losses: self.consecutive_losses,
        });
    }

    pub fn trigger_circuit_break(&mut self, cooldown_minutes: i64) {
        self.circuit_break_active = true;
        self.circuit_break_until = Some(Utc::now() + Duration::minutes(cooldown_minutes));
    }

    /// While latched, denies with the remaining cooldown; the first check
    /// past `until` clears both the latch and the loss streak.
    pub fn circuit_break_verdict(&mut self) -> Option<RiskVerdict> {
        if !self.circuit_break_active {
            return None;
        }
        if let Some(until) = self.circuit_break_until {
            let now = Utc::now();
            if now < until {
                let remaining = (until - now).num_minutes();
                return Some(RiskVerdict::deny(format!(
                    "Circuit breaker active. Cooldown: {remaining}min remaining"
                )));
            }
        }
        self.circuit_break_active = false;
        self.circuit_break_until = None;
        self.consecutive_losses = 0;
        None
    }

    pub fn drawdown_pct(&self, portfolio_value: f64) -> f64 {
        if self.peak_portfolio_value > 0.0 {
            (portfolio_value - self.peak_portfolio_value) / self.peak_portfolio_value * 100.0
        } else {
            0.0
        }
    }

    pub fn daily_pnl_pct(&self) -> f64 {
        if self.daily_start_value > 0.0 {
            self.daily_pnl / self.daily_start_value * 100.0
        } else {
            0.0
        }
    }
}
