//! Options risk rules: premium limits, per-underlying caps, portfolio
//! Greeks bounds, and the monthly hedge budget, on top of the shared
//! circuit-breaker spine.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{RiskState, RiskVerdict};
use crate::model::{Greeks, OptionSide, OptionType};
use crate::venues::options::OptionsAdapter;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionsRiskConfig {
    /// Max % of portfolio tied up in long premium.
    pub max_premium_at_risk_pct: f64,
    /// Max % of portfolio per single option trade.
    pub max_single_trade_premium_pct: f64,
    /// Monthly budget for hedging premium (protective puts).
    pub max_monthly_hedge_cost_pct: f64,

    pub max_positions: usize,
    pub max_positions_per_underlying: usize,

    pub max_portfolio_delta: f64,
    pub min_portfolio_delta: f64,
    pub max_portfolio_gamma: f64,
    /// USD per 1% IV.
    pub max_portfolio_vega: f64,

    pub max_drawdown_pct: f64,
    pub daily_loss_limit_pct: f64,
    pub per_trade_stop_loss_pct: f64,

    pub max_consecutive_losses: u32,
    pub cooldown_minutes: i64,
}

impl Default for OptionsRiskConfig {
    fn default() -> Self {
        Self {
            max_premium_at_risk_pct: 30.0,
            max_single_trade_premium_pct: 5.0,
            max_monthly_hedge_cost_pct: 2.0,
            max_positions: 10,
            max_positions_per_underlying: 5,
            max_portfolio_delta: 5.0,
            min_portfolio_delta: -5.0,
            max_portfolio_gamma: 2.0,
            max_portfolio_vega: 500.0,
            max_drawdown_pct: 20.0,
            daily_loss_limit_pct: 5.0,
            per_trade_stop_loss_pct: 30.0,
            max_consecutive_losses: 4,
            cooldown_minutes: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GreeksCheck {
    pub within_limits: bool,
    pub violations: Vec<String>,
    pub greeks: Greeks,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarginEstimate {
    pub estimated_margin: f64,
    pub margin_pct: f64,
    pub portfolio_value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StressScenario {
    pub spot_move_pct: f64,
    pub pnl_if_up: f64,
    pub pnl_if_down: f64,
    pub worst_case: f64,
}

pub struct OptionsRiskManager {
    pub config: OptionsRiskConfig,
    pub state: RiskState,
    pub monthly_hedge_spend: f64,
    monthly_hedge_reset: Option<DateTime<Utc>>,
}

impl OptionsRiskManager {
    pub fn new(config: OptionsRiskConfig) -> Self {
        Self {
            config,
            state: RiskState::default(),
            monthly_hedge_spend: 0.0,
            monthly_hedge_reset: None,
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

    /// Rules in order, first failure wins: circuit breaker, loss streak,
    /// daily loss, drawdown, position counts, single-trade premium, and
    /// (for buys) total premium at risk.
    pub fn check_can_trade(
        &mut self,
        adapter: &OptionsAdapter,
        proposed_premium_usd: f64,
        proposed_side: OptionSide,
        underlying: &str,
    ) -> RiskVerdict {
        let portfolio_value = adapter.get_portfolio_value();
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
            return RiskVerdict::deny(format!("Daily loss limit: {daily_pct:.1}%"));
        }

        let drawdown = self.state.drawdown_pct(portfolio_value);
        if self.state.peak_portfolio_value > 0.0 && drawdown <= -self.config.max_drawdown_pct {
            self.state.trigger_circuit_break(self.config.cooldown_minutes);
            return RiskVerdict::deny(format!("Max drawdown hit: {drawdown:.1}%"));
        }

        let positions = adapter.get_positions();
        if positions.len() >= self.config.max_positions {
            return RiskVerdict::deny(format!(
                "Max positions ({}) reached",
                self.config.max_positions
            ));
        }

        if !underlying.is_empty() {
            let count = positions
                .values()
                .filter(|p| p.underlying == underlying)
                .count();
            if count >= self.config.max_positions_per_underlying {
                return RiskVerdict::deny(format!(
                    "Max positions for {underlying} ({}) reached",
                    self.config.max_positions_per_underlying
                ));
            }
        }

        if proposed_premium_usd > 0.0 && portfolio_value > 0.0 {
            let trade_pct = proposed_premium_usd / portfolio_value * 100.0;
            if trade_pct > self.config.max_single_trade_premium_pct {
                return RiskVerdict::deny(format!(
                    "Trade premium {trade_pct:.1}% > limit {}%",
                    self.config.max_single_trade_premium_pct
                ));
            }
        }

        if proposed_side == OptionSide::Buy && portfolio_value > 0.0 {
            let total = adapter.get_premium_at_risk() + proposed_premium_usd;
            let pct = total / portfolio_value * 100.0;
            if pct > self.config.max_premium_at_risk_pct {
                return RiskVerdict::deny(format!(
                    "Premium at risk would be {pct:.1}% > limit {}%",
                    self.config.max_premium_at_risk_pct
                ));
            }
        }

        RiskVerdict::allow()
    }

    /// Portfolio Greeks against configured bounds. Informative for the
    /// status surface, gating for delta-aware entries in the scheduler.
    pub fn check_greeks_limits(&self, adapter: &OptionsAdapter) -> GreeksCheck {
        let greeks = adapter.get_portfolio_greeks();
        let mut violations = Vec::new();

        if greeks.delta > self.config.max_portfolio_delta {
            violations.push(format!(
                "Delta {:.2} > max {}",
                greeks.delta, self.config.max_portfolio_delta
            ));
        }
        if greeks.delta < self.config.min_portfolio_delta {
            violations.push(format!(
                "Delta {:.2} < min {}",
                greeks.delta, self.config.min_portfolio_delta
            ));
        }
        if greeks.gamma.abs() > self.config.max_portfolio_gamma {
            violations.push(format!(
                "|Gamma| {:.4} > max {}",
                greeks.gamma.abs(),
                self.config.max_portfolio_gamma
            ));
        }
        if greeks.vega.abs() > self.config.max_portfolio_vega {
            violations.push(format!(
                "|Vega| {:.2} > max {}",
                greeks.vega.abs(),
                self.config.max_portfolio_vega
            ));
        }

        GreeksCheck {
            within_limits: violations.is_empty(),
            violations,
            greeks,
        }
    }

    /// Zero the rolling hedge window every 30 days.
    fn reset_monthly_hedge(&mut self) {
        let now = Utc::now();
        let stale = self
            .monthly_hedge_reset
            .is_none_or(|at| now - at >= Duration::days(30));
        if stale {
            self.monthly_hedge_spend = 0.0;
            self.monthly_hedge_reset = Some(now);
        }
    }

    pub fn check_hedge_budget(&mut self, cost_usd: f64, portfolio_value: f64) -> bool {
        self.reset_monthly_hedge();
        let max_spend = portfolio_value * self.config.max_monthly_hedge_cost_pct / 100.0;
        self.monthly_hedge_spend + cost_usd <= max_spend
    }

    pub fn record_hedge_spend(&mut self, cost_usd: f64) {
        self.reset_monthly_hedge();
        self.monthly_hedge_spend += cost_usd;
    }

    /// Rough short-side margin: premium plus OTM distance, floored at 10%
    /// of spot per contract.
    pub fn estimate_margin(&self, adapter: &OptionsAdapter) -> MarginEstimate {
        let mut total = 0.0;
        for pos in adapter.get_positions().values() {
            if pos.side != OptionSide::Sell {
                continue;
            }
            let spot = if pos.current_spot > 0.0 {
                pos.current_spot
            } else {
                pos.entry_spot
            };
            let otm_amount = match pos.option_type {
                OptionType::Call => (spot - pos.strike).max(0.0),
                OptionType::Put => (pos.strike - spot).max(0.0),
            };
            let premium_margin = (pos.current_price * spot + otm_amount) * pos.quantity;
            let min_margin = 0.10 * spot * pos.quantity;
            total += premium_margin.max(min_margin);
        }

        let portfolio_value = adapter.get_portfolio_value();
        MarginEstimate {
            estimated_margin: total,
            margin_pct: if portfolio_value > 0.0 {
                total / portfolio_value * 100.0
            } else {
                0.0
            },
            portfolio_value,
        }
    }

    /// Hypothetical P&L with every option revalued to intrinsic at
    /// spot ± move%. Informative, not gating.
    pub fn max_loss_scenario(&self, adapter: &OptionsAdapter, spot_move_pct: f64) -> StressScenario {
        let positions = adapter.get_positions();
        let mut scenario = |mult: f64| -> f64 {
            let mut total = 0.0;
            for pos in positions.values() {
                let spot = if pos.current_spot > 0.0 {
                    pos.current_spot
                } else {
                    pos.entry_spot
                };
                let new_value = pos.intrinsic(spot * mult);
                let current_value = pos.current_price * spot;
                total += pos.side.sign() * (new_value - current_value) * pos.quantity;
            }
            total
        };

        let up = scenario(1.0 + spot_move_pct / 100.0);
        let down = scenario(1.0 - spot_move_pct / 100.0);
        StressScenario {
            spot_move_pct,
            pnl_if_up: up,
            pnl_if_down: down,
            worst_case: up.min(down),
        }
    }

    pub fn format_status(&self, adapter: &OptionsAdapter) -> String {
        let divider = "─".repeat(55);
        let portfolio_value = adapter.get_portfolio_value();
        [
            format!("\n{divider}"),
            "  OPTIONS RISK MANAGER STATUS".to_string(),
            divider.clone(),
            format!(
                "  Consecutive Losses: {}/{}",
                self.state.consecutive_losses, self.config.max_consecutive_losses
            ),
            format!("  Daily PnL:          ${:+.2}", self.state.daily_pnl),
            format!(
                "  Drawdown:           {:.1}% (max: -{}%)",
                self.state.drawdown_pct(portfolio_value),
                self.config.max_drawdown_pct
            ),
            format!(
                "  Positions:          {}/{}",
                adapter.position_count(),
                self.config.max_positions
            ),
            format!(
                "  Hedge Spend:        ${:.2}/month",
                self.monthly_hedge_spend
            ),
            divider,
        ]
        .join("\n")
    }
}
