//! Spot risk rules: notional caps, exposure, loss limits, circuit breaker.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{RiskState, RiskVerdict};
use crate::venues::base_asset;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Max % of portfolio per position.
    pub max_position_size_pct: f64,
    /// Hard USD cap per position.
    pub max_position_size_usd: f64,
    pub max_num_positions: usize,

    /// Max % of portfolio deployed across all positions.
    pub max_total_exposure_pct: f64,
    pub max_single_asset_pct: f64,

    /// Daily loss % that stops trading for the day.
    pub daily_loss_limit_pct: f64,
    /// Drawdown % from peak that kills all trading.
    pub max_drawdown_pct: f64,
    pub per_trade_stop_loss_pct: f64,

    pub max_consecutive_losses: u32,
    pub cooldown_minutes: i64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_position_size_pct: 20.0,
            max_position_size_usd: 5_000.0,
            max_num_positions: 5,
            max_total_exposure_pct: 80.0,
            max_single_asset_pct: 30.0,
            daily_loss_limit_pct: 5.0,
            max_drawdown_pct: 15.0,
            per_trade_stop_loss_pct: 3.0,
            max_consecutive_losses: 5,
            cooldown_minutes: 60,
        }
    }
}

pub struct RiskManager {
    pub config: RiskConfig,
    pub state: RiskState,
}

impl RiskManager {
    pub fn new(config: RiskConfig) -> Self {
        Self {
            config,
            state: RiskState::default(),
        }
    }

    pub fn reset_daily(&mut self, portfolio_value: f64) {
        self.state.reset_daily(portfolio_value);
    }

    pub fn update_peak(&mut self, portfolio_value: f64) {
        self.state.update_peak(portfolio_value);
    }

    pub fn record_trade_result(&mut self, pnl: f64) {
        self.state.record_trade_result(pnl);
    }

    /// Run every rule in order; the first failure short-circuits.
    /// `current_positions` maps base asset to current USD value.
    pub fn check_can_trade(
        &mut self,
        portfolio_value: f64,
        proposed_trade_usd: f64,
        symbol: &str,
        current_positions: &HashMap<String, f64>,
    ) -> RiskVerdict {
        self.state.reset_daily(portfolio_value);

        if let Some(verdict) = self.state.circuit_break_verdict() {
            return verdict;
        }

        if self.state.consecutive_losses >= self.config.max_consecutive_losses {
            self.state.trigger_circuit_break(self.config.cooldown_minutes);
            return RiskVerdict::deny(format!(
                "Circuit breaker: {} consecutive losses",
                self.state.consecutive_losses
            ));
        }

        let daily_pct = self.state.daily_pnl_pct();
        if self.state.daily_start_value > 0.0 && daily_pct <= -self.config.daily_loss_limit_pct {
            self.state.trigger_circuit_break(self.config.cooldown_minutes);
            return RiskVerdict::deny(format!(
                "Daily loss limit hit: {daily_pct:.2}% (limit: -{}%)",
                self.config.daily_loss_limit_pct
            ));
        }

        let drawdown = self.state.drawdown_pct(portfolio_value);
        if self.state.peak_portfolio_value > 0.0 && drawdown <= -self.config.max_drawdown_pct {
            self.state.trigger_circuit_break(self.config.cooldown_minutes);
            return RiskVerdict::deny(format!(
                "KILL SWITCH: Max drawdown {drawdown:.2}% (limit: -{}%)",
                self.config.max_drawdown_pct
            ));
        }

        if proposed_trade_usd > 0.0 {
            let max_allowed = self.notional_cap(portfolio_value);
            if proposed_trade_usd > max_allowed {
                return RiskVerdict::deny(format!(
                    "Position too large: ${proposed_trade_usd:.2} > limit ${max_allowed:.2}"
                ));
            }
        }

        let active: HashMap<&String, f64> = current_positions
            .iter()
            .filter(|(_, v)| **v > 0.0)
            .map(|(k, v)| (k, *v))
            .collect();
        if active.len() >= self.config.max_num_positions
            && !active.keys().any(|k| k.as_str() == base_asset(symbol))
        {
            return RiskVerdict::deny(format!(
                "Max positions reached: {}/{}",
                active.len(),
                self.config.max_num_positions
            ));
        }

        if portfolio_value > 0.0 && !active.is_empty() {
            let exposure: f64 = active.values().sum();
            let after_pct = (exposure + proposed_trade_usd) / portfolio_value * 100.0;
            if after_pct > self.config.max_total_exposure_pct {
                return RiskVerdict::deny(format!(
                    "Total exposure would exceed {}%",
                    self.config.max_total_exposure_pct
                ));
            }
        }

        RiskVerdict::allow()
    }

    /// Per-trade notional cap: min of the percent cap and the USD cap.
    pub fn notional_cap(&self, portfolio_value: f64) -> f64 {
        (portfolio_value * self.config.max_position_size_pct / 100.0)
            .min(self.config.max_position_size_usd)
    }

    /// Stop-based sizing when a stop is given, otherwise the cap. Never
    /// exceeds the cap.
    pub fn calculate_position_size(
        &self,
        portfolio_value: f64,
        entry_price: f64,
        stop_loss_price: Option<f64>,
    ) -> f64 {
        let max_allowed = self.notional_cap(portfolio_value);

        if let Some(stop) = stop_loss_price {
            if entry_price > 0.0 {
                let risk_per_trade =
                    portfolio_value * self.config.per_trade_stop_loss_pct / 100.0;
                let price_risk = (entry_price - stop).abs() / entry_price;
                if price_risk > 0.0 {
                    return (risk_per_trade / price_risk).min(max_allowed);
                }
            }
        }
        max_allowed
    }

    pub fn get_stop_loss_price(&self, entry_price: f64, long: bool) -> f64 {
        let stop_pct = self.config.per_trade_stop_loss_pct / 100.0;
        if long {
            entry_price * (1.0 - stop_pct)
        } else {
            entry_price * (1.0 + stop_pct)
        }
    }

    pub fn format_status(&self) -> String {
        let divider = "─".repeat(50);
        let breaker = if self.state.circuit_break_active {
            "🔴 ACTIVE"
        } else {
            "🟢 OK"
        };
        [
            format!("\n{divider}"),
            "  RISK MANAGER STATUS".to_string(),
            divider.clone(),
            format!("  Circuit Breaker:    {breaker}"),
            format!(
                "  Consecutive Losses: {}/{}",
                self.state.consecutive_losses, self.config.max_consecutive_losses
            ),
            format!("  Daily PnL:          ${:+.2}", self.state.daily_pnl),
            format!("  Peak Portfolio:     ${:.2}", self.state.peak_portfolio_value),
            format!(
                "  Max Position Size:  {}% / ${:.0}",
                self.config.max_position_size_pct, self.config.max_position_size_usd
            ),
            format!("  Daily Loss Limit:   -{}%", self.config.daily_loss_limit_pct),
            format!("  Max Drawdown:       -{}%", self.config.max_drawdown_pct),
            divider,
        ]
        .join("\n")
    }
}
