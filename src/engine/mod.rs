//! Long-running schedulers.
//!
//! `LiveTrader` drives spot strategies, `OptionsTrader` drives options
//! strategies; both share the pattern: one async worker per engine, a
//! cooperative shutdown channel, per-subject bulkheads (one bad symbol
//! never kills the loop), and a background task flushing accumulators to
//! the store every five minutes.

pub mod score;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use chrono::Utc;
use tokio::sync::watch;

use crate::alerts::AlertSink;
use crate::data::{BarSource, Store};
use crate::model::{
    Action, ActionKind, OptionSide, OrderSide, OrderStatus, OrderType, SpotPosition,
};
use crate::risk::{OptionsRiskManager, RiskManager};
use crate::strategies::{OptionsStrategy, SpotStrategy};
use crate::venues::options::OptionsAdapter;
use crate::venues::{SpotAdapter, base_asset};

use score::{BookEntry, MAX_POSITIONS_PER_STRATEGY, MIN_SCORE_THRESHOLD, score_new_trade};

const FLUSH_INTERVAL_SECS: u64 = 300;
/// Fraction of portfolio proposed to the risk check per spot entry.
const SPOT_ENTRY_FRACTION: f64 = 0.15;

/// Spawn the periodic accumulator flush: every five minutes write the most
/// recent snapshot published on `snapshot_rx` under `name`.
pub fn spawn_flush_task(
    store: Arc<Store>,
    name: String,
    mut snapshot_rx: watch::Receiver<serde_json::Value>,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(FLUSH_INTERVAL_SECS));
        interval.tick().await; // immediate first tick
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = interval.tick() => {
                    let snapshot = snapshot_rx.borrow_and_update().clone();
                    if !snapshot.is_null() {
                        if let Err(e) = store.save_accumulator(&name, &snapshot) {
                            eprintln!("accumulator flush failed: {e:#}");
                        }
                    }
                }
            }
        }
        // Final flush on the way out.
        let snapshot = snapshot_rx.borrow().clone();
        if !snapshot.is_null() {
            let _ = store.save_accumulator(&name, &snapshot);
        }
    })
}

// ── Spot scheduler ──────────────────────────────────────────────────

pub struct LiveTrader {
    pub adapter: Arc<dyn SpotAdapter>,
    pub bars: Arc<dyn BarSource>,
    pub risk: RiskManager,
    pub alerts: Arc<AlertSink>,
    pub strategy: SpotStrategy,
    pub symbols: Vec<String>,
    pub timeframe: String,
    pub initial_capital: f64,

    last_signals: HashMap<String, i8>,
    /// USD cost basis per held base asset, commissions included.
    entry_costs: HashMap<String, f64>,
    iteration: u64,
    warned_degraded: bool,
    snapshot_tx: Option<watch::Sender<serde_json::Value>>,
}

impl LiveTrader {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        adapter: Arc<dyn SpotAdapter>,
        bars: Arc<dyn BarSource>,
        mut risk: RiskManager,
        alerts: Arc<AlertSink>,
        strategy: SpotStrategy,
        symbols: Vec<String>,
        timeframe: String,
        initial_capital: f64,
    ) -> Self {
        risk.state.peak_portfolio_value = initial_capital;
        risk.state.daily_start_value = initial_capital;
        Self {
            adapter,
            bars,
            risk,
            alerts,
            strategy,
            symbols,
            timeframe,
            initial_capital,
            last_signals: HashMap::new(),
            entry_costs: HashMap::new(),
            iteration: 0,
            warned_degraded: false,
            snapshot_tx: None,
        }
    }

    /// Publish accumulator snapshots for the background flush task.
    pub fn with_snapshots(mut self, tx: watch::Sender<serde_json::Value>) -> Self {
        self.snapshot_tx = Some(tx);
        self
    }

    pub async fn start(
        &mut self,
        max_iterations: u64,
        sleep_seconds: f64,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let mode = self.adapter.mode().as_str();
        self.alerts.info(
            &format!("🤖 Trading Bot Started [{mode}]"),
            &format!(
                "Strategy: {} | Symbols: {} | Timeframe: {} | Capital: ${:.2}",
                self.strategy.name(),
                self.symbols.join(", "),
                self.timeframe,
                self.initial_capital
            ),
        );

        println!("\n{}", "=".repeat(60));
        println!("  TRADING BOT — {mode} MODE");
        println!("  Strategy: {}", self.strategy.name());
        println!("  Symbols: {}", self.symbols.join(", "));
        println!("  Timeframe: {}", self.timeframe);
        println!("  Check interval: {sleep_seconds}s");
        println!("{}\n", "=".repeat(60));

        loop {
            self.iteration += 1;
            self.trading_tick().await;
            self.publish_snapshot().await;

            if max_iterations > 0 && self.iteration >= max_iterations {
                println!("\nMax iterations ({max_iterations}) reached. Stopping.");
                break;
            }
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(std::time::Duration::from_secs_f64(sleep_seconds)) => {}
            }
        }

        self.shutdown_report().await;
        Ok(())
    }

    async fn trading_tick(&mut self) {
        let portfolio_value = self
            .adapter
            .get_portfolio_value("USDT")
            .await
            .unwrap_or(self.initial_capital);
        self.risk.update_peak(portfolio_value);
        self.risk.reset_daily(portfolio_value);

        if self.iteration % 10 == 1 {
            let positions = self.adapter.get_positions().await.unwrap_or_default();
            println!(
                "\n[{}] Iteration {} | Portfolio: ${portfolio_value:.2} | Positions: {positions:?}",
                Utc::now().format("%Y-%m-%d %H:%M UTC"),
                self.iteration
            );
        }

        let symbols = self.symbols.clone();
        for symbol in &symbols {
            if let Err(e) = self.check_symbol(symbol, portfolio_value).await {
                self.alerts
                    .error(&format!("Error checking {symbol}"), &format!("{e:#}"));
            }
        }
    }

    async fn check_symbol(&mut self, symbol: &str, portfolio_value: f64) -> Result<()> {
        let series = self.bars.bars(symbol, &self.timeframe, 100).await?;
        if series.len() < 30 {
            return Ok(());
        }

        // Pairs strategies need a second series the scheduler does not
        // feed; the evaluator degrades and we warn once.
        let output = self.strategy.evaluate(&series, None);
        if output.degraded && !self.warned_degraded {
            self.warned_degraded = true;
            self.alerts.warning(
                "pairs_spread degraded",
                "no secondary symbol wired in; running self-mean-reversion",
            );
        }

        let signal = output.last_signal();
        self.last_signals.insert(symbol.to_string(), signal);

        let current_price = series.last().map(|b| b.close).unwrap_or(0.0);
        if current_price <= 0.0 {
            return Ok(());
        }

        // Resting stop/limit orders first, against the fresh price.
        let fills = self
            .adapter
            .check_pending_orders(symbol, current_price)
            .await?;
        for order in &fills {
            self.alerts.trade(
                &format!("Triggered: {symbol}"),
                &format!(
                    "{:?} {:?} {} @ ${:.2}",
                    order.order_type,
                    order.side,
                    order.filled_quantity,
                    order.filled_price.unwrap_or(0.0)
                ),
            );
        }

        if signal == 0 {
            return Ok(());
        }

        let base = base_asset(symbol).to_string();
        let positions = self.adapter.get_positions().await?;

        if signal == 1 && !positions.contains_key(&base) {
            let verdict = self.risk.check_can_trade(
                portfolio_value,
                portfolio_value * SPOT_ENTRY_FRACTION,
                symbol,
                &self.position_values().await,
            );
            if !verdict.allowed {
                println!("  ⚠️  {symbol} BUY blocked: {}", verdict.reason);
                return Ok(());
            }

            let stop = self.risk.get_stop_loss_price(current_price, true);
            let position_usd =
                self.risk
                    .calculate_position_size(portfolio_value, current_price, Some(stop));
            let quantity = position_usd / current_price;

            let order = self
                .adapter
                .place_order(symbol, OrderSide::Buy, OrderType::Market, quantity, None, None)
                .await;

            if order.status == OrderStatus::Filled {
                let fill = order.filled_price.unwrap_or(current_price);
                self.entry_costs
                    .insert(base.clone(), fill * order.filled_quantity + order.commission);
                let msg = format!(
                    "🟢 BUY {symbol}: {quantity:.6} @ ${fill:.2} (${position_usd:.2})"
                );
                println!("  {msg}");
                self.alerts.trade(&format!("Trade: {symbol}"), &msg);
            } else {
                println!("  ❌ {symbol} BUY order failed: {:?}", order.status);
                self.alerts.warning(
                    &format!("Order failed: {symbol}"),
                    &format!("BUY {:?}", order.status),
                );
            }
        } else if signal == -1 && positions.contains_key(&base) {
            let qty = positions.get(&base).copied().unwrap_or(0.0);
            if qty <= 0.0 {
                return Ok(());
            }

            let order = self
                .adapter
                .place_order(symbol, OrderSide::Sell, OrderType::Market, qty, None, None)
                .await;

            if order.status == OrderStatus::Filled {
                let fill = order.filled_price.unwrap_or(current_price);
                let proceeds = fill * order.filled_quantity - order.commission;
                let entry = self.entry_costs.remove(&base).unwrap_or(qty * fill);
                let pnl = proceeds - entry;
                self.risk.record_trade_result(pnl);

                let msg = format!("🔴 SELL {symbol}: {qty:.6} @ ${fill:.2} PnL: ${pnl:+.2}");
                println!("  {msg}");
                self.alerts.trade(&format!("Trade: {symbol}"), &msg);
            } else {
                println!("  ❌ {symbol} SELL order failed: {:?}", order.status);
                self.alerts.warning(
                    &format!("Order failed: {symbol}"),
                    &format!("SELL {:?}", order.status),
                );
            }
        }

        Ok(())
    }

    /// Current positions valued in USDT, for the exposure rule.
    async fn position_values(&self) -> HashMap<String, f64> {
        let mut values = HashMap::new();
        let positions = self.adapter.get_positions().await.unwrap_or_default();
        for (asset, qty) in positions {
            let value = match self.adapter.get_price(&format!("{asset}/USDT")).await {
                Ok(price) => qty * price,
                Err(_) => 0.0,
            };
            values.insert(asset, value);
        }
        values
    }

    async fn publish_snapshot(&self) {
        let Some(tx) = &self.snapshot_tx else { return };
        let trades = self.adapter.get_trade_history().await.unwrap_or_default();
        let snapshot = serde_json::json!({
            "iteration": self.iteration,
            "strategy": self.strategy.name(),
            "risk": self.risk.state,
            "trades": trades,
            "last_signals": self.last_signals,
        });
        let _ = tx.send(snapshot);
    }

    async fn shutdown_report(&mut self) {
        let portfolio_value = self
            .adapter
            .get_portfolio_value("USDT")
            .await
            .unwrap_or(self.initial_capital);
        let daily_pnl = portfolio_value - self.risk.state.daily_start_value;
        let total_pnl = portfolio_value - self.initial_capital;
        let trades = self.adapter.get_trade_history().await.unwrap_or_default();

        let report = [
            format!("\n{}", "=".repeat(50)),
            format!("  DAILY REPORT — {}", Utc::now().format("%Y-%m-%d")),
            "=".repeat(50),
            format!("  Mode:           {}", self.adapter.mode().as_str()),
            format!("  Strategy:       {}", self.strategy.name()),
            format!("  Portfolio:      ${portfolio_value:.2}"),
            format!("  Daily PnL:      ${daily_pnl:+.2}"),
            format!(
                "  Total PnL:      ${total_pnl:+.2} ({:+.2}%)",
                total_pnl / self.initial_capital * 100.0
            ),
            format!("  Trades:         {}", trades.len()),
            "=".repeat(50),
        ]
        .join("\n");

        println!("{report}");
        self.alerts.info("🛑 Bot Stopped", &report);
        println!("{}", self.risk.format_status());
        self.publish_snapshot().await;
    }
}

// ── Options scheduler ───────────────────────────────────────────────

pub struct OptionsTrader {
    pub adapter: Arc<OptionsAdapter>,
    pub risk: Arc<Mutex<OptionsRiskManager>>,
    pub strategy: Box<dyn OptionsStrategy>,
    pub underlyings: Vec<String>,
    pub alerts: Arc<AlertSink>,
    pub initial_capital: f64,

    /// Spot venue polled each tick for holdings. Strategies whose phase
    /// depends on assignment (the wheel) read them through
    /// `set_spot_positions`; without a source they stay in phase 1.
    spot_source: Option<Arc<dyn SpotAdapter>>,
    iteration: u64,
    snapshot_tx: Option<watch::Sender<serde_json::Value>>,
}

impl OptionsTrader {
    pub fn new(
        adapter: Arc<OptionsAdapter>,
        risk: Arc<Mutex<OptionsRiskManager>>,
        strategy: Box<dyn OptionsStrategy>,
        underlyings: Vec<String>,
        alerts: Arc<AlertSink>,
        initial_capital: f64,
    ) -> Self {
        {
            let mut risk = risk.lock().expect("risk manager poisoned");
            risk.state.peak_portfolio_value = initial_capital;
            risk.state.daily_start_value = initial_capital;
        }
        Self {
            adapter,
            risk,
            strategy,
            underlyings,
            alerts,
            initial_capital,
            spot_source: None,
            iteration: 0,
            snapshot_tx: None,
        }
    }

    pub fn with_snapshots(mut self, tx: watch::Sender<serde_json::Value>) -> Self {
        self.snapshot_tx = Some(tx);
        self
    }

    /// Attach the spot venue whose holdings drive assignment-aware
    /// strategies.
    pub fn with_spot_source(mut self, adapter: Arc<dyn SpotAdapter>) -> Self {
        self.spot_source = Some(adapter);
        self
    }

    pub async fn start(
        &mut self,
        max_iterations: u64,
        sleep_seconds: f64,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        println!("\n{}", "=".repeat(60));
        println!("  OPTIONS TRADING BOT — PAPER MODE");
        println!("  Strategy:    {}", self.strategy.name());
        println!("  Underlyings: {}", self.underlyings.join(", "));
        println!("  Capital:     ${:.2}", self.initial_capital);
        println!("  Interval:    {sleep_seconds}s");
        println!("{}\n", "=".repeat(60));

        loop {
            self.iteration += 1;
            self.trading_tick().await;
            self.publish_snapshot();

            if max_iterations > 0 && self.iteration >= max_iterations {
                println!("\nMax iterations ({max_iterations}) reached. Stopping.");
                break;
            }
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = shutdown.changed() => break,
                _ = tokio::time::sleep(std::time::Duration::from_secs_f64(sleep_seconds)) => {}
            }
        }

        self.shutdown_report();
        Ok(())
    }

    /// One scheduler tick: expiries, marks, risk bookkeeping, then per
    /// underlying manage → evaluate → execute.
    pub async fn trading_tick(&mut self) {
        match self.adapter.handle_expiries().await {
            Ok(settled) => {
                for record in settled {
                    self.alerts.trade(
                        &format!("{}: {}", record.action, record.symbol),
                        &format!("settlement ${:.2}", record.settlement_usd.unwrap_or(0.0)),
                    );
                }
            }
            Err(e) => self.alerts.error("Expiry handling failed", &format!("{e:#}")),
        }

        if let Err(e) = self.adapter.update_positions().await {
            self.alerts.error("Mark update failed", &format!("{e:#}"));
        }

        let portfolio_value = self.adapter.get_portfolio_value();
        {
            let mut risk = self.risk.lock().expect("risk manager poisoned");
            risk.update_peak(portfolio_value);
            risk.reset_daily(portfolio_value);
        }

        self.refresh_spot_holdings().await;

        let underlyings = self.underlyings.clone();
        for underlying in &underlyings {
            if let Err(e) = self.process_underlying(underlying).await {
                self.alerts
                    .error(&format!("Error processing {underlying}"), &format!("{e:#}"));
            }
        }

        self.print_status(portfolio_value);
    }

    /// Mirror the spot venue's holdings into the strategy so assignment
    /// detection (wheel phase 2) works in the long-running mode, not just
    /// in the check runner. A failed poll keeps the previous snapshot.
    async fn refresh_spot_holdings(&mut self) {
        let Some(spot) = &self.spot_source else { return };
        match spot.get_positions().await {
            Ok(holdings) => {
                let holdings: Vec<SpotPosition> = holdings
                    .into_iter()
                    .filter(|(_, qty)| *qty > 0.0)
                    .map(|(symbol, quantity)| SpotPosition {
                        symbol,
                        side: "long".into(),
                        quantity,
                        avg_entry_price: 0.0,
                    })
                    .collect();
                self.strategy.set_spot_positions(holdings);
            }
            Err(e) => {
                self.alerts
                    .error("Spot holdings refresh failed", &format!("{e:#}"));
            }
        }
    }

    async fn process_underlying(&mut self, underlying: &str) -> Result<()> {
        for action in self.strategy.manage_positions(underlying).await {
            self.execute_action(&action, underlying).await?;
        }
        for action in self.strategy.evaluate(underlying).await {
            self.execute_action(&action, underlying).await?;
        }
        Ok(())
    }

    /// Map an action to its adapter call, threading risk consequences
    /// (hedge spend, realized PnL) back into the risk manager.
    pub async fn execute_action(&mut self, action: &Action, underlying: &str) -> Result<()> {
        if action.kind == ActionKind::None {
            println!("  [{underlying}] {}", action.reason);
            return Ok(());
        }

        println!("  [{underlying}] → {}", action.reason);

        if action.kind.is_entry() {
            let existing = self.adapter.positions_for(underlying);

            if existing.len() >= MAX_POSITIONS_PER_STRATEGY {
                self.alerts.warning(
                    &format!("Entry skipped: {underlying}"),
                    &format!(
                        "Max positions reached ({}/{MAX_POSITIONS_PER_STRATEGY})",
                        existing.len()
                    ),
                );
                return Ok(());
            }

            let book: Vec<BookEntry> = existing.iter().map(BookEntry::from_position).collect();
            let spot = self.adapter.get_spot_price(underlying).await.unwrap_or(0.0);
            let (score, reason) = score_new_trade(action, &book, spot);
            if score < MIN_SCORE_THRESHOLD {
                self.alerts.warning(
                    &format!("Entry skipped: {underlying}"),
                    &format!("score {score:.2} < {MIN_SCORE_THRESHOLD} ({reason})"),
                );
                return Ok(());
            }
        }

        match action.kind {
            ActionKind::BuyCall | ActionKind::BuyPut => {
                let Some(contract) = &action.contract else {
                    return Ok(());
                };
                match self
                    .adapter
                    .buy_option(contract, action.quantity, action.leg_group.as_deref())
                    .await?
                {
                    Some(pos) => {
                        println!(
                            "    ✅ Bought {}: {} @ ${:.2}",
                            contract.option_type.as_str(),
                            pos.symbol,
                            pos.entry_price_usd
                        );
                        if action.is_hedge {
                            self.risk
                                .lock()
                                .expect("risk manager poisoned")
                                .record_hedge_spend(pos.entry_price_usd * pos.quantity);
                        }
                    }
                    None => {
                        println!("    ❌ Failed to buy {}", contract.option_type.as_str());
                        self.alerts.warning(
                            &format!("Order failed: {underlying}"),
                            &format!("buy {}", contract.symbol),
                        );
                    }
                }
            }
            ActionKind::SellCall | ActionKind::SellPut => {
                let Some(contract) = &action.contract else {
                    return Ok(());
                };
                match self
                    .adapter
                    .sell_option(contract, action.quantity, action.leg_group.as_deref())
                    .await?
                {
                    Some(pos) => {
                        println!(
                            "    ✅ Sold {}: {} @ ${:.2}",
                            contract.option_type.as_str(),
                            pos.symbol,
                            pos.entry_price_usd
                        );
                    }
                    None => {
                        println!("    ❌ Failed to sell {}", contract.option_type.as_str());
                        self.alerts.warning(
                            &format!("Order failed: {underlying}"),
                            &format!("sell {}", contract.symbol),
                        );
                    }
                }
            }
            ActionKind::BuyStraddle => {
                let target_dte = action.target_dte.unwrap_or(30.0);
                match self
                    .adapter
                    .open_straddle(underlying, target_dte, OptionSide::Buy, action.quantity)
                    .await?
                {
                    Some(group) => println!("    ✅ Opened long straddle: {group}"),
                    None => {
                        println!("    ❌ Failed to open straddle");
                        self.alerts
                            .warning(&format!("Order failed: {underlying}"), "straddle");
                    }
                }
            }
            ActionKind::SellStrangle => {
                let target_dte = action.target_dte.unwrap_or(30.0);
                let otm_pct = action.otm_pct.unwrap_or(0.05);
                match self
                    .adapter
                    .open_strangle(
                        underlying,
                        target_dte,
                        otm_pct,
                        OptionSide::Sell,
                        action.quantity,
                    )
                    .await?
                {
                    Some(group) => println!("    ✅ Opened short strangle: {group}"),
                    None => {
                        println!("    ❌ Failed to open strangle");
                        self.alerts
                            .warning(&format!("Order failed: {underlying}"), "strangle");
                    }
                }
            }
            ActionKind::Close => {
                let Some(position_id) = &action.position_id else {
                    return Ok(());
                };
                match self.adapter.close_position(position_id).await? {
                    Some(record) => {
                        let pnl = record.pnl_usd.unwrap_or(0.0);
                        self.risk
                            .lock()
                            .expect("risk manager poisoned")
                            .record_trade_result(pnl);
                        println!("    ✅ Closed position: PnL ${pnl:+.2}");
                        self.alerts
                            .trade(&format!("Closed: {underlying}"), &format!("PnL ${pnl:+.2}"));
                    }
                    None => println!("    ❌ Failed to close position"),
                }
            }
            ActionKind::CloseGroup => {
                let Some(leg_group) = &action.leg_group else {
                    return Ok(());
                };
                let records = self.adapter.close_leg_group(leg_group).await?;
                let total_pnl: f64 = records.iter().filter_map(|r| r.pnl_usd).sum();
                self.risk
                    .lock()
                    .expect("risk manager poisoned")
                    .record_trade_result(total_pnl);
                println!("    ✅ Closed leg group: PnL ${total_pnl:+.2}");
                self.alerts.trade(
                    &format!("Closed group: {leg_group}"),
                    &format!("PnL ${total_pnl:+.2}"),
                );
            }
            ActionKind::Roll => {
                // Close now; the replacement leg opens on the next tick
                // once the strategy no longer sees the old position.
                let Some(position_id) = &action.position_id else {
                    return Ok(());
                };
                match self.adapter.close_position(position_id).await? {
                    Some(record) => {
                        let pnl = record.pnl_usd.unwrap_or(0.0);
                        self.risk
                            .lock()
                            .expect("risk manager poisoned")
                            .record_trade_result(pnl);
                        println!("    ✅ Rolled out: PnL ${pnl:+.2}");
                    }
                    None => println!("    ❌ Failed to roll position"),
                }
            }
            ActionKind::None => {}
        }

        Ok(())
    }

    fn print_status(&self, portfolio_value: f64) {
        let pnl_pct = (portfolio_value - self.initial_capital) / self.initial_capital * 100.0;
        let greeks = self.adapter.get_portfolio_greeks();
        println!(
            "[{}] portfolio ${portfolio_value:.2} ({pnl_pct:+.2}%) | cash ${:.2} | positions {} | Δ {:+.2} | Θ/day ${:+.2}",
            self.iteration,
            self.adapter.get_cash(),
            self.adapter.position_count(),
            greeks.delta,
            greeks.theta,
        );
    }

    fn publish_snapshot(&self) {
        let Some(tx) = &self.snapshot_tx else { return };
        let risk_state = {
            let risk = self.risk.lock().expect("risk manager poisoned");
            serde_json::to_value(&risk.state).unwrap_or(serde_json::Value::Null)
        };
        let snapshot = serde_json::json!({
            "iteration": self.iteration,
            "strategy": self.strategy.name(),
            "portfolio_value": self.adapter.get_portfolio_value(),
            "cash": self.adapter.get_cash(),
            "risk": risk_state,
            "trades": self.adapter.get_trade_history(),
        });
        let _ = tx.send(snapshot);
    }

    fn shutdown_report(&self) {
        let portfolio_value = self.adapter.get_portfolio_value();
        let total_pnl = portfolio_value - self.initial_capital;
        println!("\n{}", "=".repeat(50));
        println!("  FINAL REPORT");
        println!("{}", "=".repeat(50));
        println!("  Iterations:     {}", self.iteration);
        println!("  Portfolio:      ${portfolio_value:.2}");
        println!(
            "  Total PnL:      ${total_pnl:+.2} ({:+.2}%)",
            total_pnl / self.initial_capital * 100.0
        );
        println!("  Cash:           ${:.2}", self.adapter.get_cash());
        println!("  Open positions: {}", self.adapter.position_count());
        println!("  Total trades:   {}", self.adapter.get_trade_history().len());
        println!("{}", "=".repeat(50));

        let risk = self.risk.lock().expect("risk manager poisoned");
        println!("{}", risk.format_status(&self.adapter));
        self.publish_snapshot();
    }
}
