//! Options venue: paper execution over live market data.
//!
//! The whole paper book (cash, positions, leg-group index, trade log, IV
//! history, spot cache) lives behind one mutex. Mutating calls hold the
//! lock only for the state update, never across a network await; getters
//! hand out copies. Multi-leg builders look atomic from outside: a failed
//! second leg rolls the first leg and its cash back out.

pub mod chain;

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Instant;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Greeks, Moneyness, OptionContract, OptionPosition, OptionSide, OptionType};
use crate::pricing::{self, RISK_FREE_RATE};

pub use chain::{DeribitClient, OptionQuote, OptionsMarketData, StaticMarket};

/// Taker commission on USD notional.
const COMMISSION_RATE: f64 = 0.0003;
/// Spot cache TTL.
const SPOT_TTL_SECS: u64 = 30;
/// IV history retention.
const IV_HISTORY_DAYS: i64 = 90;

/// One row of the adapter's trade log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    pub action: String,
    pub position_id: String,
    pub symbol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_usd: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commission: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pnl_usd: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settlement_usd: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Default)]
struct OptionsBook {
    cash: f64,
    positions: HashMap<String, OptionPosition>,
    /// leg_group -> position ids, maintained in lockstep with `positions`.
    group_index: HashMap<String, HashSet<String>>,
    trades: Vec<TradeRecord>,
    /// `{underlying}_{strike}_{type}` -> recorded (time, iv) samples.
    iv_history: HashMap<String, Vec<(DateTime<Utc>, f64)>>,
    spot_cache: HashMap<String, (f64, Instant)>,
    instruments: Vec<OptionContract>,
    loaded_underlyings: HashSet<String>,
    order_counter: u64,
}

impl OptionsBook {
    fn insert_position(&mut self, pos: OptionPosition) {
        if let Some(group) = &pos.leg_group {
            self.group_index
                .entry(group.clone())
                .or_default()
                .insert(pos.id.clone());
        }
        self.positions.insert(pos.id.clone(), pos);
    }

    fn remove_position(&mut self, id: &str) -> Option<OptionPosition> {
        let pos = self.positions.remove(id)?;
        if let Some(group) = &pos.leg_group {
            if let Some(ids) = self.group_index.get_mut(group) {
                ids.remove(id);
                if ids.is_empty() {
                    self.group_index.remove(group);
                }
            }
        }
        Some(pos)
    }
}

pub struct OptionsAdapter {
    market: Box<dyn OptionsMarketData>,
    pub initial_balance: f64,
    book: Mutex<OptionsBook>,
}

impl OptionsAdapter {
    pub fn new(market: Box<dyn OptionsMarketData>, initial_balance: f64) -> Self {
        Self {
            market,
            initial_balance,
            book: Mutex::new(OptionsBook {
                cash: initial_balance,
                ..OptionsBook::default()
            }),
        }
    }

    pub fn venue_name(&self) -> &str {
        self.market.name()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, OptionsBook> {
        self.book.lock().expect("options book poisoned")
    }

    // ── Market data ─────────────────────────────────────────────────

    /// Cache the active option universe for the given underlyings. Each
    /// underlying is fetched once per run unless forced.
    pub async fn load_markets(&self, underlyings: &[&str], force: bool) -> Result<()> {
        for u in underlyings {
            if !force && self.lock().loaded_underlyings.contains(*u) {
                continue;
            }
            let instruments = self.market.instruments(u).await?;
            let mut book = self.lock();
            book.instruments.retain(|c| c.underlying != *u);
            book.instruments.extend(instruments);
            book.loaded_underlyings.insert(u.to_string());
        }
        Ok(())
    }

    /// Spot price with a 30-second TTL cache.
    pub async fn get_spot_price(&self, underlying: &str) -> Result<f64> {
        {
            let book = self.lock();
            if let Some((price, at)) = book.spot_cache.get(underlying) {
                if at.elapsed().as_secs() < SPOT_TTL_SECS {
                    return Ok(*price);
                }
            }
        }
        let price = self.market.index_price(underlying).await?;
        self.lock()
            .spot_cache
            .insert(underlying.to_string(), (price, Instant::now()));
        Ok(price)
    }

    /// Contracts for an underlying inside a DTE window, spot stamped in.
    pub async fn get_option_chain(
        &self,
        underlying: &str,
        min_dte: f64,
        max_dte: f64,
        limit: usize,
    ) -> Result<Vec<OptionContract>> {
        self.load_markets(&[underlying], false).await?;
        let spot = self.get_spot_price(underlying).await?;
        let now = Utc::now();

        let book = self.lock();
        let chain = book
            .instruments
            .iter()
            .filter(|c| c.underlying == underlying)
            .filter(|c| {
                let dte = c.dte(now);
                dte >= min_dte && dte <= max_dte
            })
            .take(limit)
            .map(|c| {
                let mut c = c.clone();
                c.spot_price = spot;
                c
            })
            .collect();
        Ok(chain)
    }

    /// Fill in the live quote, solve implied vol, compute greeks, and
    /// record the IV sample into the rolling history.
    pub async fn enrich_contract(&self, contract: &OptionContract) -> Result<OptionContract> {
        let mut c = contract.clone();
        let quote = self.market.ticker(&c.symbol).await?;
        c.bid = quote.bid;
        c.ask = quote.ask;
        c.last = quote.last;
        c.open_interest = quote.open_interest;
        c.spot_price = self.get_spot_price(&c.underlying).await?;

        let now = Utc::now();
        let t = c.time_to_expiry(now);
        let mid = c.mid();
        if mid > 0.0 && c.spot_price > 0.0 && t > 0.0 {
            let market_usd = mid * c.spot_price;
            let iv = pricing::implied_vol(
                market_usd,
                c.spot_price,
                c.strike,
                t,
                RISK_FREE_RATE,
                c.option_type,
            );
            c.greeks = pricing::bs_greeks(c.spot_price, c.strike, t, RISK_FREE_RATE, iv, c.option_type);

            let key = format!("{}_{}_{}", c.underlying, c.strike, c.option_type.as_str());
            let cutoff = now - Duration::days(IV_HISTORY_DAYS);
            let mut book = self.lock();
            let history = book.iv_history.entry(key).or_default();
            history.push((now, iv));
            history.retain(|(ts, _)| *ts > cutoff);
        }

        Ok(c)
    }

    /// Contracts sorted by relevance for the requested moneyness.
    pub async fn find_options(
        &self,
        underlying: &str,
        option_type: OptionType,
        min_dte: f64,
        max_dte: f64,
        moneyness: Moneyness,
        max_results: usize,
    ) -> Result<Vec<OptionContract>> {
        let chain = self
            .get_option_chain(underlying, min_dte, max_dte, usize::MAX)
            .await?;
        let spot = self.get_spot_price(underlying).await?;

        let mut filtered: Vec<OptionContract> = chain
            .into_iter()
            .filter(|c| c.option_type == option_type)
            .collect();

        match moneyness {
            Moneyness::Atm => {
                filtered.sort_by(|a, b| {
                    (a.strike - spot)
                        .abs()
                        .total_cmp(&(b.strike - spot).abs())
                });
            }
            Moneyness::Otm => match option_type {
                OptionType::Call => {
                    filtered.retain(|c| c.strike > spot);
                    filtered.sort_by(|a, b| a.strike.total_cmp(&b.strike));
                }
                OptionType::Put => {
                    filtered.retain(|c| c.strike < spot);
                    filtered.sort_by(|a, b| b.strike.total_cmp(&a.strike));
                }
            },
            Moneyness::Itm => match option_type {
                OptionType::Call => {
                    filtered.retain(|c| c.strike < spot);
                    filtered.sort_by(|a, b| b.strike.total_cmp(&a.strike));
                }
                OptionType::Put => {
                    filtered.retain(|c| c.strike > spot);
                    filtered.sort_by(|a, b| a.strike.total_cmp(&b.strike));
                }
            },
        }

        filtered.truncate(max_results);
        Ok(filtered)
    }

    /// First non-zero implied vol among up to three ATM calls around the
    /// target DTE.
    pub async fn get_atm_iv(&self, underlying: &str, dte_target: f64) -> Result<f64> {
        let calls = self
            .find_options(
                underlying,
                OptionType::Call,
                (dte_target - 10.0).max(0.0),
                dte_target + 10.0,
                Moneyness::Atm,
                3,
            )
            .await?;

        for c in &calls {
            if let Ok(enriched) = self.enrich_contract(c).await {
                if enriched.greeks.iv > 0.0 {
                    return Ok(enriched.greeks.iv);
                }
            }
        }
        Ok(0.0)
    }

    /// Percentile of the current ATM IV within the recorded history for
    /// this underlying. Neutral 50 when the sample is too thin.
    pub async fn get_iv_rank(&self, underlying: &str, lookback_days: i64) -> Result<f64> {
        let current = self.get_atm_iv(underlying, 30.0).await?;
        if current <= 0.0 {
            return Ok(50.0);
        }

        let cutoff = Utc::now() - Duration::days(lookback_days);
        let samples: Vec<f64> = {
            let book = self.lock();
            book.iv_history
                .iter()
                .filter(|(key, _)| key.starts_with(underlying))
                .flat_map(|(_, hist)| {
                    hist.iter()
                        .filter(|(ts, _)| *ts > cutoff)
                        .map(|(_, iv)| *iv)
                })
                .collect()
        };

        if samples.len() < 5 {
            return Ok(50.0);
        }
        Ok(crate::indicators::percentile_rank(current, &samples))
    }

    // ── Paper execution ─────────────────────────────────────────────

    fn next_id(book: &mut OptionsBook) -> String {
        book.order_counter += 1;
        format!("opt_{}", book.order_counter)
    }

    fn make_position(
        id: String,
        contract: &OptionContract,
        side: OptionSide,
        quantity: f64,
        price: f64,
        leg_group: Option<&str>,
    ) -> OptionPosition {
        OptionPosition {
            id,
            symbol: contract.symbol.clone(),
            underlying: contract.underlying.clone(),
            strike: contract.strike,
            expiry: contract.expiry,
            option_type: contract.option_type,
            side,
            quantity,
            entry_price: price,
            entry_price_usd: price * contract.spot_price,
            entry_spot: contract.spot_price,
            entry_time: Utc::now(),
            current_price: price,
            current_spot: contract.spot_price,
            greeks: contract.greeks,
            leg_group: leg_group.map(str::to_string),
        }
    }

    /// Buy to open. Fills at the ask (mid fallback), debits premium plus
    /// commission. `Ok(None)` when the quote is untradable or cash is
    /// short; `Err` only on market-data transport failures.
    pub async fn buy_option(
        &self,
        contract: &OptionContract,
        quantity: f64,
        leg_group: Option<&str>,
    ) -> Result<Option<OptionPosition>> {
        let c = self.enrich_contract(contract).await?;
        let price = if c.ask > 0.0 { c.ask } else { c.mid() };
        if price <= 0.0 || quantity <= 0.0 {
            return Ok(None);
        }

        let cost_usd = price * c.spot_price * quantity;
        let commission = cost_usd * COMMISSION_RATE;

        let mut book = self.lock();
        if cost_usd + commission > book.cash {
            return Ok(None);
        }
        book.cash -= cost_usd + commission;

        let id = Self::next_id(&mut book);
        let pos = Self::make_position(id.clone(), &c, OptionSide::Buy, quantity, price, leg_group);
        book.trades.push(TradeRecord {
            action: "BUY".into(),
            position_id: id,
            symbol: c.symbol.clone(),
            price: Some(price),
            price_usd: Some(cost_usd),
            quantity: Some(quantity),
            commission: Some(commission),
            pnl_usd: None,
            settlement_usd: None,
            timestamp: Utc::now(),
        });
        book.insert_position(pos.clone());
        Ok(Some(pos))
    }

    /// Sell (write) to open. Fills at the bid (mid fallback) and credits
    /// the premium net of commission.
    pub async fn sell_option(
        &self,
        contract: &OptionContract,
        quantity: f64,
        leg_group: Option<&str>,
    ) -> Result<Option<OptionPosition>> {
        let c = self.enrich_contract(contract).await?;
        let price = if c.bid > 0.0 { c.bid } else { c.mid() };
        if price <= 0.0 || quantity <= 0.0 {
            return Ok(None);
        }

        let premium_usd = price * c.spot_price * quantity;
        let commission = premium_usd * COMMISSION_RATE;

        let mut book = self.lock();
        book.cash += premium_usd - commission;

        let id = Self::next_id(&mut book);
        let pos = Self::make_position(id.clone(), &c, OptionSide::Sell, quantity, price, leg_group);
        book.trades.push(TradeRecord {
            action: "SELL".into(),
            position_id: id,
            symbol: c.symbol.clone(),
            price: Some(price),
            price_usd: Some(premium_usd),
            quantity: Some(quantity),
            commission: Some(commission),
            pnl_usd: None,
            settlement_usd: None,
            timestamp: Utc::now(),
        });
        book.insert_position(pos.clone());
        Ok(Some(pos))
    }

    /// Reverse a just-opened leg: remove the position, undo its cash flow,
    /// drop its trade record. Used when a later leg of a structure fails.
    fn rollback_leg(&self, position_id: &str) {
        let mut book = self.lock();
        let Some(pos) = book.remove_position(position_id) else {
            return;
        };
        let notional = pos.entry_price_usd * pos.quantity;
        let commission = notional * COMMISSION_RATE;
        match pos.side {
            OptionSide::Buy => book.cash += notional + commission,
            OptionSide::Sell => book.cash -= notional - commission,
        }
        book.trades.retain(|t| t.position_id != position_id);
    }

    fn next_group_tag(&self, name: &str) -> String {
        let mut book = self.lock();
        book.order_counter += 1;
        format!("{name}_{}", book.order_counter)
    }

    /// Two-leg spread: buy one contract, sell another, one shared group.
    pub async fn open_spread(
        &self,
        buy_contract: &OptionContract,
        sell_contract: &OptionContract,
        quantity: f64,
        name: &str,
    ) -> Result<Option<String>> {
        let group = self.next_group_tag(name);
        let long = self.buy_option(buy_contract, quantity, Some(&group)).await?;
        let Some(long) = long else { return Ok(None) };

        match self.sell_option(sell_contract, quantity, Some(&group)).await {
            Ok(Some(_)) => Ok(Some(group)),
            other => {
                self.rollback_leg(&long.id);
                other.map(|_| None)
            }
        }
    }

    /// ATM call + put at the nearest shared expiry around `dte_target`.
    pub async fn open_straddle(
        &self,
        underlying: &str,
        dte_target: f64,
        side: OptionSide,
        quantity: f64,
    ) -> Result<Option<String>> {
        let calls = self
            .find_options(
                underlying,
                OptionType::Call,
                (dte_target - 7.0).max(0.0),
                dte_target + 7.0,
                Moneyness::Atm,
                1,
            )
            .await?;
        let puts = self
            .find_options(
                underlying,
                OptionType::Put,
                (dte_target - 7.0).max(0.0),
                dte_target + 7.0,
                Moneyness::Atm,
                1,
            )
            .await?;
        let (Some(call), Some(put)) = (calls.first(), puts.first()) else {
            return Ok(None);
        };

        self.open_two_legs("straddle", call, put, side, quantity).await
    }

    /// OTM call + put with wings nearest `spot * (1 ± otm_pct)`.
    pub async fn open_strangle(
        &self,
        underlying: &str,
        dte_target: f64,
        otm_pct: f64,
        side: OptionSide,
        quantity: f64,
    ) -> Result<Option<String>> {
        let calls = self
            .find_options(
                underlying,
                OptionType::Call,
                (dte_target - 7.0).max(0.0),
                dte_target + 7.0,
                Moneyness::Otm,
                5,
            )
            .await?;
        let puts = self
            .find_options(
                underlying,
                OptionType::Put,
                (dte_target - 7.0).max(0.0),
                dte_target + 7.0,
                Moneyness::Otm,
                5,
            )
            .await?;
        if calls.is_empty() || puts.is_empty() {
            return Ok(None);
        }

        let spot = self.get_spot_price(underlying).await?;
        let call_target = spot * (1.0 + otm_pct);
        let put_target = spot * (1.0 - otm_pct);

        let call = calls
            .iter()
            .min_by(|a, b| {
                (a.strike - call_target)
                    .abs()
                    .total_cmp(&(b.strike - call_target).abs())
            })
            .cloned();
        let put = puts
            .iter()
            .min_by(|a, b| {
                (a.strike - put_target)
                    .abs()
                    .total_cmp(&(b.strike - put_target).abs())
            })
            .cloned();
        let (Some(call), Some(put)) = (call, put) else {
            return Ok(None);
        };

        self.open_two_legs("strangle", &call, &put, side, quantity).await
    }

    async fn open_two_legs(
        &self,
        name: &str,
        first: &OptionContract,
        second: &OptionContract,
        side: OptionSide,
        quantity: f64,
    ) -> Result<Option<String>> {
        let group = self.next_group_tag(name);

        let leg1 = match side {
            OptionSide::Buy => self.buy_option(first, quantity, Some(&group)).await?,
            OptionSide::Sell => self.sell_option(first, quantity, Some(&group)).await?,
        };
        let Some(leg1) = leg1 else { return Ok(None) };

        let leg2 = match side {
            OptionSide::Buy => self.buy_option(second, quantity, Some(&group)).await,
            OptionSide::Sell => self.sell_option(second, quantity, Some(&group)).await,
        };
        match leg2 {
            Ok(Some(_)) => Ok(Some(group)),
            other => {
                self.rollback_leg(&leg1.id);
                other.map(|_| None)
            }
        }
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Close at the side-appropriate quote (long closes at bid, short at
    /// ask), settle cash net of commission, log the realized PnL.
    pub async fn close_position(&self, position_id: &str) -> Result<Option<TradeRecord>> {
        let pos = match self.lock().positions.get(position_id) {
            Some(p) => p.clone(),
            None => return Ok(None),
        };

        let quote = self.market.ticker(&pos.symbol).await?;
        let spot = self.get_spot_price(&pos.underlying).await?;

        let close_price = match pos.side {
            OptionSide::Buy => {
                if quote.bid > 0.0 { quote.bid } else { quote.last }
            }
            OptionSide::Sell => {
                if quote.ask > 0.0 { quote.ask } else { quote.last }
            }
        };
        if close_price <= 0.0 {
            return Ok(None);
        }
        let notional = close_price * spot * pos.quantity;
        let commission = notional * COMMISSION_RATE;
        let cash_delta = match pos.side {
            OptionSide::Buy => notional - commission,
            OptionSide::Sell => -(notional + commission),
        };

        let mut book = self.lock();
        let Some(mut pos) = book.remove_position(position_id) else {
            return Ok(None);
        };
        pos.current_price = close_price;
        pos.current_spot = spot;
        let pnl = pos.pnl_usd();
        book.cash += cash_delta;

        let record = TradeRecord {
            action: "CLOSE".into(),
            position_id: position_id.to_string(),
            symbol: pos.symbol.clone(),
            price: Some(close_price),
            price_usd: Some(notional),
            quantity: Some(pos.quantity),
            commission: Some(commission),
            pnl_usd: Some(pnl),
            settlement_usd: None,
            timestamp: Utc::now(),
        };
        book.trades.push(record.clone());
        Ok(Some(record))
    }

    /// Close every leg carrying the tag. No orphan leg survives a group
    /// close; legs that fail to quote stay open and are reported absent.
    pub async fn close_leg_group(&self, leg_group: &str) -> Result<Vec<TradeRecord>> {
        let ids: Vec<String> = {
            let book = self.lock();
            book.group_index
                .get(leg_group)
                .map(|ids| ids.iter().cloned().collect())
                .unwrap_or_default()
        };

        let mut records = Vec::new();
        for id in ids {
            if let Some(record) = self.close_position(&id).await? {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Settle every expired position at intrinsic value against current
    /// spot: longs are credited, shorts debited; OTM expiries just vanish.
    pub async fn handle_expiries(&self) -> Result<Vec<TradeRecord>> {
        let now = Utc::now();
        let expired: Vec<OptionPosition> = {
            let book = self.lock();
            book.positions
                .values()
                .filter(|p| p.is_expired(now))
                .cloned()
                .collect()
        };

        let mut records = Vec::new();
        for pos in expired {
            let spot = self.get_spot_price(&pos.underlying).await?;
            let intrinsic = pos.intrinsic(spot);

            let mut book = self.lock();
            if book.remove_position(&pos.id).is_none() {
                continue;
            }

            let record = if intrinsic > 0.0 {
                let settlement = intrinsic * pos.quantity;
                match pos.side {
                    OptionSide::Buy => book.cash += settlement,
                    OptionSide::Sell => book.cash -= settlement,
                }
                TradeRecord {
                    action: "EXERCISED".into(),
                    position_id: pos.id.clone(),
                    symbol: pos.symbol.clone(),
                    price: None,
                    price_usd: None,
                    quantity: Some(pos.quantity),
                    commission: None,
                    pnl_usd: None,
                    settlement_usd: Some(settlement),
                    timestamp: Utc::now(),
                }
            } else {
                TradeRecord {
                    action: "EXPIRED".into(),
                    position_id: pos.id.clone(),
                    symbol: pos.symbol.clone(),
                    price: None,
                    price_usd: None,
                    quantity: Some(pos.quantity),
                    commission: None,
                    pnl_usd: None,
                    settlement_usd: None,
                    timestamp: Utc::now(),
                }
            };
            book.trades.push(record.clone());
            records.push(record);
        }
        Ok(records)
    }

    /// Re-mark every open position: price, spot, implied vol, greeks.
    /// Illiquid tickers are skipped, not fatal.
    pub async fn update_positions(&self) -> Result<()> {
        let positions: Vec<OptionPosition> = {
            let book = self.lock();
            book.positions.values().cloned().collect()
        };

        let now = Utc::now();
        for pos in positions {
            let Ok(quote) = self.market.ticker(&pos.symbol).await else {
                continue;
            };
            let Ok(spot) = self.get_spot_price(&pos.underlying).await else {
                continue;
            };

            let price = if quote.last > 0.0 { quote.last } else { quote.bid };
            let t = ((pos.expiry - now).num_seconds() as f64
                / (86_400.0 * pricing::DAYS_PER_YEAR))
                .max(0.0);

            let greeks = if price > 0.0 && spot > 0.0 && t > 0.0 {
                let iv = pricing::implied_vol(
                    price * spot,
                    spot,
                    pos.strike,
                    t,
                    RISK_FREE_RATE,
                    pos.option_type,
                );
                Some(pricing::bs_greeks(
                    spot,
                    pos.strike,
                    t,
                    RISK_FREE_RATE,
                    iv,
                    pos.option_type,
                ))
            } else {
                None
            };

            let mut book = self.lock();
            if let Some(p) = book.positions.get_mut(&pos.id) {
                if price > 0.0 {
                    p.current_price = price;
                }
                if spot > 0.0 {
                    p.current_spot = spot;
                }
                if let Some(g) = greeks {
                    p.greeks = g;
                }
            }
        }
        Ok(())
    }

    // ── Portfolio ───────────────────────────────────────────────────

    pub fn get_cash(&self) -> f64 {
        self.lock().cash
    }

    pub fn get_positions(&self) -> HashMap<String, OptionPosition> {
        self.lock().positions.clone()
    }

    pub fn position_count(&self) -> usize {
        self.lock().positions.len()
    }

    /// Positions for one underlying, copied out.
    pub fn positions_for(&self, underlying: &str) -> Vec<OptionPosition> {
        self.lock()
            .positions
            .values()
            .filter(|p| p.underlying == underlying)
            .cloned()
            .collect()
    }

    /// Cash plus long marks minus short marks.
    pub fn get_portfolio_value(&self) -> f64 {
        let book = self.lock();
        let mut total = book.cash;
        for pos in book.positions.values() {
            total += pos.side.sign() * pos.current_price * pos.current_spot * pos.quantity;
        }
        total
    }

    /// Greeks summed with `sign * quantity` weights.
    pub fn get_portfolio_greeks(&self) -> Greeks {
        let book = self.lock();
        let mut net = Greeks::default();
        for pos in book.positions.values() {
            let w = pos.side.sign() * pos.quantity;
            net.delta += pos.greeks.delta * w;
            net.gamma += pos.greeks.gamma * w;
            net.theta += pos.greeks.theta * w;
            net.vega += pos.greeks.vega * w;
        }
        net
    }

    /// Entry premium of long positions: capital that can go to zero.
    pub fn get_premium_at_risk(&self) -> f64 {
        let book = self.lock();
        book.positions
            .values()
            .filter(|p| p.side == OptionSide::Buy)
            .map(|p| p.entry_price_usd * p.quantity)
            .sum()
    }

    pub fn get_trade_history(&self) -> Vec<TradeRecord> {
        self.lock().trades.clone()
    }

    /// Pre-load a position into the book without any cash movement. The
    /// stateless check runner uses this to reconstruct an external book.
    pub fn seed_position(&self, pos: OptionPosition) {
        self.lock().insert_position(pos);
    }
}
