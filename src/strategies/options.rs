//! Options strategies: stateful objects bound at construction to the
//! adapter, the shared risk manager, and a candle source.
//!
//! `evaluate` proposes entries; `manage_positions` proposes exits and
//! rolls. Neither executes anything; the scheduler owns dispatch. Market
//! trouble never raises: it comes back as a `none` action with a reason.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::data::BarSource;
use crate::model::{
    Action, ActionKind, Moneyness, OptionSide, OptionType, SpotPosition,
};
use crate::risk::OptionsRiskManager;
use crate::venues::options::OptionsAdapter;

pub const OPTIONS_STRATEGY_NAMES: [&str; 6] = [
    "momentum_options",
    "vol_mean_reversion",
    "protective_puts",
    "covered_calls",
    "wheel",
    "butterfly",
];

pub fn options_strategy_description(name: &str) -> Option<&'static str> {
    Some(match name {
        "momentum_options" => "Momentum options — ROC momentum buys 30-45 DTE ATM calls/puts",
        "vol_mean_reversion" => "Vol mean reversion — sell strangles at high IV rank, buy straddles at low",
        "protective_puts" => "Protective puts — hedge spot with ~12% OTM puts under a monthly budget",
        "covered_calls" => "Covered calls — sell ~12% OTM calls against holdings for income",
        "wheel" => "Wheel — cash-secured puts, then covered calls after assignment",
        "butterfly" => "Butterfly — 30 DTE call butterfly at ±5% wings in mid IV regimes",
        _ => return None,
    })
}

/// Collaborators every options strategy captures at construction.
#[derive(Clone)]
pub struct StrategyCtx {
    pub adapter: Arc<OptionsAdapter>,
    pub risk: Arc<Mutex<OptionsRiskManager>>,
    pub bars: Arc<dyn BarSource>,
}

impl StrategyCtx {
    fn risk_check(
        &self,
        premium_usd: f64,
        side: OptionSide,
        underlying: &str,
    ) -> crate::risk::RiskVerdict {
        self.risk
            .lock()
            .expect("risk manager poisoned")
            .check_can_trade(&self.adapter, premium_usd, side, underlying)
    }
}

#[async_trait]
pub trait OptionsStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Propose new entries for one underlying.
    async fn evaluate(&self, underlying: &str) -> Vec<Action>;

    /// Propose exits/rolls for existing positions of one underlying.
    async fn manage_positions(&self, underlying: &str) -> Vec<Action> {
        let _ = underlying;
        Vec::new()
    }

    /// Spot holdings context, used by strategies whose phase depends on
    /// assignment (the wheel). Default: ignored.
    fn set_spot_positions(&self, positions: Vec<SpotPosition>) {
        let _ = positions;
    }
}

pub fn build_options_strategy(
    name: &str,
    ctx: StrategyCtx,
) -> Option<Box<dyn OptionsStrategy>> {
    Some(match name {
        "momentum_options" => Box::new(MomentumOptions::new(ctx)),
        "vol_mean_reversion" => Box::new(VolMeanReversion::new(ctx)),
        "protective_puts" => Box::new(ProtectivePuts::new(ctx)),
        "covered_calls" => Box::new(CoveredCalls::new(ctx)),
        "wheel" => Box::new(Wheel::new(ctx)),
        "butterfly" => Box::new(Butterfly::new(ctx)),
        _ => return None,
    })
}

fn short_tag(prefix: &str) -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("{prefix}_{}", &id[..8])
}

// ── Momentum options ────────────────────────────────────────────────

pub struct MomentumOptions {
    ctx: StrategyCtx,
    pub roc_period: usize,
    pub threshold: f64,
    pub profit_target_pct: f64,
    pub stop_loss_pct: f64,
    pub position_size_pct: f64,
}

impl MomentumOptions {
    pub fn new(ctx: StrategyCtx) -> Self {
        Self {
            ctx,
            roc_period: 14,
            threshold: 5.0,
            profit_target_pct: 50.0,
            stop_loss_pct: 30.0,
            position_size_pct: 3.0,
        }
    }

    /// ROC crossover on 4h candles, same edge rule as the spot momentum
    /// strategy.
    async fn momentum_signal(&self, underlying: &str) -> i8 {
        let series = match self
            .ctx
            .bars
            .bars(&format!("{underlying}/USDT"), "4h", 100)
            .await
        {
            Ok(s) => s,
            Err(_) => return 0,
        };
        let closes = series.closes();
        if closes.len() < self.roc_period + 2 {
            return 0;
        }

        let n = closes.len();
        let p = self.roc_period;
        let current = (closes[n - 1] - closes[n - 1 - p]) / closes[n - 1 - p] * 100.0;
        let prev = (closes[n - 2] - closes[n - 2 - p]) / closes[n - 2 - p] * 100.0;

        if current > self.threshold && prev <= self.threshold {
            1
        } else if current < -self.threshold && prev >= -self.threshold {
            -1
        } else {
            0
        }
    }
}

#[async_trait]
impl OptionsStrategy for MomentumOptions {
    fn name(&self) -> &'static str {
        "momentum_options"
    }

    async fn evaluate(&self, underlying: &str) -> Vec<Action> {
        let signal = self.momentum_signal(underlying).await;
        if signal == 0 {
            return vec![Action::none("No momentum signal")];
        }

        let existing = self.ctx.adapter.positions_for(underlying);
        if !existing.is_empty() {
            return vec![Action::none(format!(
                "Already have {} positions in {underlying}",
                existing.len()
            ))];
        }

        let option_type = if signal == 1 {
            OptionType::Call
        } else {
            OptionType::Put
        };
        let found = match self
            .ctx
            .adapter
            .find_options(underlying, option_type, 25.0, 50.0, Moneyness::Atm, 3)
            .await
        {
            Ok(f) => f,
            Err(e) => return vec![Action::none(format!("Chain lookup failed: {e:#}"))],
        };
        let Some(candidate) = found.first() else {
            return vec![Action::none(format!(
                "No suitable {}s found",
                option_type.as_str()
            ))];
        };

        let contract = match self.ctx.adapter.enrich_contract(candidate).await {
            Ok(c) => c,
            Err(e) => return vec![Action::none(format!("Quote fetch failed: {e:#}"))],
        };
        let est_cost = contract.usd_price();
        if est_cost <= 0.0 {
            return vec![Action::none("Cannot price contract")];
        }

        let budget =
            self.ctx.adapter.get_portfolio_value() * self.position_size_pct / 100.0;
        let quantity = ((budget / est_cost).max(0.1) * 100.0).round() / 100.0;

        let verdict = self
            .ctx
            .risk_check(est_cost * quantity, OptionSide::Buy, underlying);
        if !verdict.allowed {
            return vec![Action::none(format!("Risk blocked: {}", verdict.reason))];
        }

        let now = chrono::Utc::now();
        let (kind, word) = if signal == 1 {
            (ActionKind::BuyCall, "BUY")
        } else {
            (ActionKind::BuyPut, "SELL")
        };
        let reason = format!(
            "Momentum {word} signal → {} {} ({:.0} DTE) ~${:.0}",
            option_type.as_str(),
            contract.strike,
            contract.dte(now),
            est_cost * quantity
        );
        vec![Action::contract_order(kind, contract, quantity, reason)]
    }

    async fn manage_positions(&self, underlying: &str) -> Vec<Action> {
        let now = chrono::Utc::now();
        let mut actions = Vec::new();

        for pos in self.ctx.adapter.positions_for(underlying) {
            if pos.side != OptionSide::Buy {
                continue;
            }
            let pnl_pct = pos.pnl_pct();
            if pnl_pct >= self.profit_target_pct {
                actions.push(Action::close(
                    &pos.id,
                    format!(
                        "Profit target hit: {pnl_pct:.1}% >= {}%",
                        self.profit_target_pct
                    ),
                ));
            } else if pnl_pct <= -self.stop_loss_pct {
                actions.push(Action::close(
                    &pos.id,
                    format!("Stop loss hit: {pnl_pct:.1}% <= -{}%", self.stop_loss_pct),
                ));
            } else if pos.dte(now) < 5.0 {
                actions.push(Action::close(
                    &pos.id,
                    format!("Approaching expiry: {:.1} DTE", pos.dte(now)),
                ));
            }
        }
        actions
    }
}

// ── Volatility mean reversion ───────────────────────────────────────

pub struct VolMeanReversion {
    ctx: StrategyCtx,
    pub high_iv_threshold: f64,
    pub low_iv_threshold: f64,
    pub target_dte: f64,
    pub iv_lookback_days: i64,
    pub strangle_otm_pct: f64,
    pub position_size_pct: f64,
}

impl VolMeanReversion {
    pub fn new(ctx: StrategyCtx) -> Self {
        Self {
            ctx,
            high_iv_threshold: 75.0,
            low_iv_threshold: 25.0,
            target_dte: 30.0,
            iv_lookback_days: 60,
            strangle_otm_pct: 0.10,
            position_size_pct: 5.0,
        }
    }

    fn is_vol_group(group: &Option<String>) -> bool {
        group
            .as_deref()
            .is_some_and(|g| g.contains("straddle") || g.contains("strangle"))
    }
}

#[async_trait]
impl OptionsStrategy for VolMeanReversion {
    fn name(&self) -> &'static str {
        "vol_mean_reversion"
    }

    async fn evaluate(&self, underlying: &str) -> Vec<Action> {
        let iv_rank = match self
            .ctx
            .adapter
            .get_iv_rank(underlying, self.iv_lookback_days)
            .await
        {
            Ok(r) => r,
            Err(e) => return vec![Action::none(format!("IV rank unavailable: {e:#}"))],
        };

        let in_vol_trade = self
            .ctx
            .adapter
            .positions_for(underlying)
            .iter()
            .any(|p| Self::is_vol_group(&p.leg_group));
        if in_vol_trade {
            return vec![Action::none(format!(
                "Already in vol trade for {underlying} (IV rank: {iv_rank:.0})"
            ))];
        }

        let budget =
            self.ctx.adapter.get_portfolio_value() * self.position_size_pct / 100.0;

        if iv_rank > self.high_iv_threshold {
            let verdict = self.ctx.risk_check(budget, OptionSide::Sell, underlying);
            if !verdict.allowed {
                return vec![Action::none(format!("Risk blocked: {}", verdict.reason))];
            }
            let mut action = Action::structure(
                ActionKind::SellStrangle,
                underlying,
                self.target_dte,
                1.0,
                format!(
                    "IV rank {iv_rank:.0}% > {}% → sell strangle",
                    self.high_iv_threshold
                ),
            );
            action.otm_pct = Some(self.strangle_otm_pct);
            vec![action]
        } else if iv_rank < self.low_iv_threshold {
            let verdict = self.ctx.risk_check(budget, OptionSide::Buy, underlying);
            if !verdict.allowed {
                return vec![Action::none(format!("Risk blocked: {}", verdict.reason))];
            }
            vec![Action::structure(
                ActionKind::BuyStraddle,
                underlying,
                self.target_dte,
                1.0,
                format!(
                    "IV rank {iv_rank:.0}% < {}% → buy straddle",
                    self.low_iv_threshold
                ),
            )]
        } else {
            vec![Action::none(format!(
                "IV rank {iv_rank:.0}% — neutral zone ({}-{})",
                self.low_iv_threshold, self.high_iv_threshold
            ))]
        }
    }

    async fn manage_positions(&self, underlying: &str) -> Vec<Action> {
        let now = chrono::Utc::now();
        let mut actions: Vec<Action> = Vec::new();
        let mut seen_groups = std::collections::HashSet::new();

        for pos in self.ctx.adapter.positions_for(underlying) {
            if !Self::is_vol_group(&pos.leg_group) {
                continue;
            }
            let Some(group) = pos.leg_group.clone() else {
                continue;
            };
            if !seen_groups.insert(group.clone()) {
                continue;
            }

            let pnl_pct = pos.pnl_pct();
            let exit_reason = if pos.side == OptionSide::Sell && pnl_pct >= 50.0 {
                Some(format!("Vol sell profit target: {pnl_pct:.1}%"))
            } else if pos.side == OptionSide::Buy && pnl_pct >= 50.0 {
                Some(format!("Vol buy profit target: {pnl_pct:.1}%"))
            } else if pnl_pct <= -30.0 {
                Some(format!("Vol trade stop loss: {pnl_pct:.1}%"))
            } else if pos.dte(now) < 7.0 {
                Some(format!(
                    "Vol trade expiry approaching: {:.0} DTE",
                    pos.dte(now)
                ))
            } else {
                None
            };

            if let Some(reason) = exit_reason {
                actions.push(Action::close_group(&group, reason));
            }
        }
        actions
    }
}

// ── Protective puts ─────────────────────────────────────────────────

pub struct ProtectivePuts {
    ctx: StrategyCtx,
    pub otm_pct: f64,
    pub target_dte: f64,
    pub roll_dte: f64,
    pub spot_holding_usd: f64,
}

impl ProtectivePuts {
    pub fn new(ctx: StrategyCtx) -> Self {
        Self {
            ctx,
            otm_pct: 12.0,
            target_dte: 45.0,
            roll_dte: 10.0,
            spot_holding_usd: 5_000.0,
        }
    }
}

#[async_trait]
impl OptionsStrategy for ProtectivePuts {
    fn name(&self) -> &'static str {
        "protective_puts"
    }

    async fn evaluate(&self, underlying: &str) -> Vec<Action> {
        let has_puts = self
            .ctx
            .adapter
            .positions_for(underlying)
            .iter()
            .any(|p| p.option_type == OptionType::Put && p.side == OptionSide::Buy);
        if has_puts {
            return vec![Action::none(format!(
                "Already have protective puts for {underlying}"
            ))];
        }

        let spot = match self.ctx.adapter.get_spot_price(underlying).await {
            Ok(s) if s > 0.0 => s,
            _ => return vec![Action::none("Spot price unavailable")],
        };
        let target_strike = spot * (1.0 - self.otm_pct / 100.0);

        let puts = match self
            .ctx
            .adapter
            .find_options(underlying, OptionType::Put, 25.0, 65.0, Moneyness::Otm, 10)
            .await
        {
            Ok(p) => p,
            Err(e) => return vec![Action::none(format!("Chain lookup failed: {e:#}"))],
        };
        let now = chrono::Utc::now();
        let best = puts.iter().min_by(|a, b| {
            let da = (a.strike - target_strike).abs() + (a.dte(now) - self.target_dte).abs();
            let db = (b.strike - target_strike).abs() + (b.dte(now) - self.target_dte).abs();
            da.total_cmp(&db)
        });
        let Some(best) = best else {
            return vec![Action::none("No suitable puts found")];
        };

        let contract = match self.ctx.adapter.enrich_contract(best).await {
            Ok(c) => c,
            Err(e) => return vec![Action::none(format!("Quote fetch failed: {e:#}"))],
        };
        let est_cost = contract.usd_price();
        if est_cost <= 0.0 {
            return vec![Action::none("Cannot price protective put")];
        }

        let quantity = (self.spot_holding_usd / spot).max(0.01);
        let total_cost = est_cost * quantity;

        let portfolio_value = self.ctx.adapter.get_portfolio_value();
        {
            let mut risk = self.ctx.risk.lock().expect("risk manager poisoned");
            if !risk.check_hedge_budget(total_cost, portfolio_value) {
                let spent = risk.monthly_hedge_spend;
                return vec![Action::none(format!(
                    "Hedge budget exceeded (${spent:.0} + ${total_cost:.0})"
                ))];
            }
        }

        let verdict = self.ctx.risk_check(total_cost, OptionSide::Buy, underlying);
        if !verdict.allowed {
            return vec![Action::none(format!("Risk blocked: {}", verdict.reason))];
        }

        let reason = format!(
            "Protective put: {:.0} strike ({:.0} DTE, {}% OTM) ~${total_cost:.0}",
            contract.strike,
            contract.dte(now),
            self.otm_pct
        );
        vec![
            Action::contract_order(ActionKind::BuyPut, contract, quantity, reason).hedged(),
        ]
    }

    async fn manage_positions(&self, underlying: &str) -> Vec<Action> {
        let now = chrono::Utc::now();
        self.ctx
            .adapter
            .positions_for(underlying)
            .iter()
            .filter(|p| {
                p.option_type == OptionType::Put
                    && p.side == OptionSide::Buy
                    && p.dte(now) < self.roll_dte
            })
            .map(|p| {
                Action::roll(
                    &p.id,
                    format!(
                        "Rolling protective put: {:.0} DTE < {}",
                        p.dte(now),
                        self.roll_dte
                    ),
                )
            })
            .collect()
    }
}

// ── Covered calls ───────────────────────────────────────────────────

pub struct CoveredCalls {
    ctx: StrategyCtx,
    pub otm_pct: f64,
    pub target_dte: f64,
    pub roll_dte: f64,
    pub itm_roll_threshold_pct: f64,
    pub spot_holding_usd: f64,
}

impl CoveredCalls {
    pub fn new(ctx: StrategyCtx) -> Self {
        Self {
            ctx,
            otm_pct: 12.0,
            target_dte: 21.0,
            roll_dte: 5.0,
            itm_roll_threshold_pct: 2.0,
            spot_holding_usd: 5_000.0,
        }
    }
}

#[async_trait]
impl OptionsStrategy for CoveredCalls {
    fn name(&self) -> &'static str {
        "covered_calls"
    }

    async fn evaluate(&self, underlying: &str) -> Vec<Action> {
        let has_calls = self
            .ctx
            .adapter
            .positions_for(underlying)
            .iter()
            .any(|p| p.option_type == OptionType::Call && p.side == OptionSide::Sell);
        if has_calls {
            return vec![Action::none(format!(
                "Already have covered calls for {underlying}"
            ))];
        }

        let spot = match self.ctx.adapter.get_spot_price(underlying).await {
            Ok(s) if s > 0.0 => s,
            _ => return vec![Action::none("Spot price unavailable")],
        };
        let target_strike = spot * (1.0 + self.otm_pct / 100.0);

        let calls = match self
            .ctx
            .adapter
            .find_options(underlying, OptionType::Call, 10.0, 35.0, Moneyness::Otm, 10)
            .await
        {
            Ok(c) => c,
            Err(e) => return vec![Action::none(format!("Chain lookup failed: {e:#}"))],
        };
        let now = chrono::Utc::now();
        let best = calls.iter().min_by(|a, b| {
            let da = (a.strike - target_strike).abs() + (a.dte(now) - self.target_dte).abs();
            let db = (b.strike - target_strike).abs() + (b.dte(now) - self.target_dte).abs();
            da.total_cmp(&db)
        });
        let Some(best) = best else {
            return vec![Action::none("No suitable calls found")];
        };

        let contract = match self.ctx.adapter.enrich_contract(best).await {
            Ok(c) => c,
            Err(e) => return vec![Action::none(format!("Quote fetch failed: {e:#}"))],
        };
        let est_premium = contract.usd_price();
        if est_premium <= 0.0 {
            return vec![Action::none("Cannot price covered call")];
        }

        let quantity = (self.spot_holding_usd / spot).max(0.01);
        let verdict = self
            .ctx
            .risk_check(est_premium * quantity, OptionSide::Sell, underlying);
        if !verdict.allowed {
            return vec![Action::none(format!("Risk blocked: {}", verdict.reason))];
        }

        let dte = contract.dte(now);
        let monthly_yield = if dte > 0.0 {
            est_premium / spot * (30.0 / dte) * 100.0
        } else {
            0.0
        };
        let reason = format!(
            "Covered call: {:.0} strike ({dte:.0} DTE, {}% OTM) ~{monthly_yield:.1}%/month yield",
            contract.strike, self.otm_pct
        );
        vec![Action::contract_order(
            ActionKind::SellCall,
            contract,
            quantity,
            reason,
        )]
    }

    async fn manage_positions(&self, underlying: &str) -> Vec<Action> {
        let now = chrono::Utc::now();
        let mut actions = Vec::new();

        for pos in self.ctx.adapter.positions_for(underlying) {
            if pos.option_type != OptionType::Call || pos.side != OptionSide::Sell {
                continue;
            }
            let spot = if pos.current_spot > 0.0 {
                pos.current_spot
            } else {
                pos.entry_spot
            };
            let distance_pct = (pos.strike - spot) / spot * 100.0;

            if distance_pct < self.itm_roll_threshold_pct {
                actions.push(Action::roll(
                    &pos.id,
                    format!("Roll covered call: spot within {distance_pct:.1}% of strike"),
                ));
            } else if pos.dte(now) < self.roll_dte {
                actions.push(Action::roll(
                    &pos.id,
                    format!(
                        "Roll covered call: {:.0} DTE < {}",
                        pos.dte(now),
                        self.roll_dte
                    ),
                ));
            }
        }
        actions
    }
}

// ── Wheel ───────────────────────────────────────────────────────────

pub struct Wheel {
    ctx: StrategyCtx,
    pub put_otm_pct: f64,
    pub call_otm_pct: f64,
    pub put_target_dte: f64,
    pub call_target_dte: f64,
    spot_positions: Mutex<Vec<SpotPosition>>,
}

impl Wheel {
    pub fn new(ctx: StrategyCtx) -> Self {
        Self {
            ctx,
            put_otm_pct: 6.0,
            call_otm_pct: 10.0,
            put_target_dte: 37.0,
            call_target_dte: 21.0,
            spot_positions: Mutex::new(Vec::new()),
        }
    }

    fn has_assigned_spot(&self, underlying: &str) -> bool {
        self.spot_positions
            .lock()
            .expect("spot positions poisoned")
            .iter()
            .any(|p| {
                p.symbol.eq_ignore_ascii_case(underlying) && p.side == "long" && p.quantity > 0.0
            })
    }

    async fn pick_contract(
        &self,
        underlying: &str,
        option_type: OptionType,
        otm_pct: f64,
        target_dte: f64,
    ) -> Result<crate::model::OptionContract, String> {
        let spot = self
            .ctx
            .adapter
            .get_spot_price(underlying)
            .await
            .map_err(|e| format!("Spot price unavailable: {e:#}"))?;
        let target_strike = match option_type {
            OptionType::Call => spot * (1.0 + otm_pct / 100.0),
            OptionType::Put => spot * (1.0 - otm_pct / 100.0),
        };

        let found = self
            .ctx
            .adapter
            .find_options(
                underlying,
                option_type,
                (target_dte - 14.0).max(1.0),
                target_dte + 14.0,
                Moneyness::Otm,
                10,
            )
            .await
            .map_err(|e| format!("Chain lookup failed: {e:#}"))?;

        let now = chrono::Utc::now();
        found
            .iter()
            .min_by(|a, b| {
                let da = (a.strike - target_strike).abs() + (a.dte(now) - target_dte).abs();
                let db = (b.strike - target_strike).abs() + (b.dte(now) - target_dte).abs();
                da.total_cmp(&db)
            })
            .cloned()
            .ok_or_else(|| format!("No suitable {}s found", option_type.as_str()))
    }
}

#[async_trait]
impl OptionsStrategy for Wheel {
    fn name(&self) -> &'static str {
        "wheel"
    }

    fn set_spot_positions(&self, positions: Vec<SpotPosition>) {
        *self.spot_positions.lock().expect("spot positions poisoned") = positions;
    }

    async fn evaluate(&self, underlying: &str) -> Vec<Action> {
        let positions = self.ctx.adapter.positions_for(underlying);

        if self.has_assigned_spot(underlying) {
            // Phase 2: income calls against the assigned spot.
            let has_call = positions
                .iter()
                .any(|p| p.option_type == OptionType::Call && p.side == OptionSide::Sell);
            if has_call {
                return vec![Action::none(format!(
                    "Wheel phase 2: covered call already active for {underlying}"
                ))];
            }

            let contract = match self
                .pick_contract(
                    underlying,
                    OptionType::Call,
                    self.call_otm_pct,
                    self.call_target_dte,
                )
                .await
            {
                Ok(c) => c,
                Err(reason) => return vec![Action::none(reason)],
            };
            let contract = match self.ctx.adapter.enrich_contract(&contract).await {
                Ok(c) => c,
                Err(e) => return vec![Action::none(format!("Quote fetch failed: {e:#}"))],
            };

            let verdict =
                self.ctx
                    .risk_check(contract.usd_price(), OptionSide::Sell, underlying);
            if !verdict.allowed {
                return vec![Action::none(format!("Risk blocked: {}", verdict.reason))];
            }

            let now = chrono::Utc::now();
            let reason = format!(
                "Wheel phase 2: sell call {:.0} ({:.0} DTE, {}% OTM)",
                contract.strike,
                contract.dte(now),
                self.call_otm_pct
            );
            let mut action = Action::contract_order(ActionKind::SellCall, contract, 1.0, reason);
            action.wheel_phase = Some(2);
            vec![action]
        } else {
            // Phase 1: cash-secured put.
            let has_put = positions
                .iter()
                .any(|p| p.option_type == OptionType::Put && p.side == OptionSide::Sell);
            if has_put {
                return vec![Action::none(format!(
                    "Wheel phase 1: cash-secured put already active for {underlying}"
                ))];
            }

            let contract = match self
                .pick_contract(
                    underlying,
                    OptionType::Put,
                    self.put_otm_pct,
                    self.put_target_dte,
                )
                .await
            {
                Ok(c) => c,
                Err(reason) => return vec![Action::none(reason)],
            };
            let contract = match self.ctx.adapter.enrich_contract(&contract).await {
                Ok(c) => c,
                Err(e) => return vec![Action::none(format!("Quote fetch failed: {e:#}"))],
            };

            let verdict =
                self.ctx
                    .risk_check(contract.usd_price(), OptionSide::Sell, underlying);
            if !verdict.allowed {
                return vec![Action::none(format!("Risk blocked: {}", verdict.reason))];
            }

            let now = chrono::Utc::now();
            let reason = format!(
                "Wheel phase 1: sell put {:.0} ({:.0} DTE, {}% OTM)",
                contract.strike,
                contract.dte(now),
                self.put_otm_pct
            );
            let mut action = Action::contract_order(ActionKind::SellPut, contract, 1.0, reason);
            action.wheel_phase = Some(1);
            vec![action]
        }
    }
}

// ── Butterfly ───────────────────────────────────────────────────────

pub struct Butterfly {
    ctx: StrategyCtx,
    pub wing_pct: f64,
    pub target_dte: f64,
    pub min_iv_rank: f64,
    pub max_iv_rank: f64,
}

impl Butterfly {
    pub fn new(ctx: StrategyCtx) -> Self {
        Self {
            ctx,
            wing_pct: 5.0,
            target_dte: 30.0,
            min_iv_rank: 30.0,
            max_iv_rank: 70.0,
        }
    }
}

#[async_trait]
impl OptionsStrategy for Butterfly {
    fn name(&self) -> &'static str {
        "butterfly"
    }

    async fn evaluate(&self, underlying: &str) -> Vec<Action> {
        let has_butterfly = self
            .ctx
            .adapter
            .positions_for(underlying)
            .iter()
            .any(|p| p.leg_group.as_deref().is_some_and(|g| g.starts_with("butterfly")));
        if has_butterfly {
            return vec![Action::none(format!(
                "Butterfly already open for {underlying}"
            ))];
        }

        let iv_rank = match self.ctx.adapter.get_iv_rank(underlying, 60).await {
            Ok(r) => r,
            Err(e) => return vec![Action::none(format!("IV rank unavailable: {e:#}"))],
        };
        if iv_rank < self.min_iv_rank || iv_rank > self.max_iv_rank {
            return vec![Action::none(format!(
                "IV rank {iv_rank:.0}% outside butterfly band ({}-{})",
                self.min_iv_rank, self.max_iv_rank
            ))];
        }

        let spot = match self.ctx.adapter.get_spot_price(underlying).await {
            Ok(s) if s > 0.0 => s,
            _ => return vec![Action::none("Spot price unavailable")],
        };

        let chain = match self
            .ctx
            .adapter
            .get_option_chain(
                underlying,
                (self.target_dte - 7.0).max(1.0),
                self.target_dte + 7.0,
                usize::MAX,
            )
            .await
        {
            Ok(c) => c,
            Err(e) => return vec![Action::none(format!("Chain lookup failed: {e:#}"))],
        };
        let calls: Vec<_> = chain
            .into_iter()
            .filter(|c| c.option_type == OptionType::Call)
            .collect();
        if calls.is_empty() {
            return vec![Action::none("No calls in the butterfly window")];
        }

        let pick = |target: f64| {
            calls
                .iter()
                .min_by(|a, b| {
                    (a.strike - target).abs().total_cmp(&(b.strike - target).abs())
                })
                .cloned()
        };
        let wing = self.wing_pct / 100.0;
        let (Some(lower), Some(middle), Some(upper)) = (
            pick(spot * (1.0 - wing)),
            pick(spot),
            pick(spot * (1.0 + wing)),
        ) else {
            return vec![Action::none("Could not assemble butterfly strikes")];
        };
        if lower.strike >= middle.strike || middle.strike >= upper.strike {
            return vec![Action::none("Chain too sparse for distinct butterfly strikes")];
        }

        let mut legs = Vec::with_capacity(3);
        for contract in [&lower, &middle, &upper] {
            match self.ctx.adapter.enrich_contract(contract).await {
                Ok(c) if c.usd_price() > 0.0 => legs.push(c),
                Ok(_) => return vec![Action::none("Cannot price butterfly leg")],
                Err(e) => return vec![Action::none(format!("Quote fetch failed: {e:#}"))],
            }
        }
        let (lower, middle, upper) = (legs[0].clone(), legs[1].clone(), legs[2].clone());

        // Net debit: wings bought, middle sold twice.
        let net_debit =
            lower.usd_price() + upper.usd_price() - 2.0 * middle.usd_price();
        let verdict = self
            .ctx
            .risk_check(net_debit.max(0.0), OptionSide::Buy, underlying);
        if !verdict.allowed {
            return vec![Action::none(format!("Risk blocked: {}", verdict.reason))];
        }

        let group = short_tag("butterfly");
        let mk = |kind, contract: crate::model::OptionContract, qty: f64, leg: &str| {
            let mut action = Action::contract_order(
                kind,
                contract,
                qty,
                format!("Butterfly {leg} (IV rank {iv_rank:.0}%, net debit ~${net_debit:.0})"),
            );
            action.leg_group = Some(group.clone());
            action
        };

        vec![
            mk(ActionKind::BuyCall, lower, 1.0, "lower wing"),
            mk(ActionKind::SellCall, middle, 2.0, "middle body x2"),
            mk(ActionKind::BuyCall, upper, 1.0, "upper wing"),
        ]
    }

    async fn manage_positions(&self, underlying: &str) -> Vec<Action> {
        let now = chrono::Utc::now();
        let mut seen = std::collections::HashSet::new();
        let mut actions = Vec::new();

        for pos in self.ctx.adapter.positions_for(underlying) {
            let Some(group) = pos.leg_group.clone() else {
                continue;
            };
            if !group.starts_with("butterfly") || !seen.insert(group.clone()) {
                continue;
            }
            if pos.dte(now) < 7.0 {
                actions.push(Action::close_group(
                    &group,
                    format!("Butterfly expiry approaching: {:.0} DTE", pos.dte(now)),
                ));
            }
        }
        actions
    }
}
