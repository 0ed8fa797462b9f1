//! Stateless check runners.
//!
//! One-shot evaluators for an external driver: evaluate a single
//! (strategy, subject) pair against a transient adapter and emit exactly
//! one JSON record on stdout. Diagnostics go to stderr; the record carries
//! `error`/`skip_reason` instead of panicking.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::data::BarSource;
use crate::engine::score::{
    BookEntry, MAX_POSITIONS_PER_STRATEGY, MIN_SCORE_THRESHOLD, score_new_trade,
};
use crate::indicators;
use crate::model::{
    Action, ActionKind, Greeks, OptionPosition, OptionSide, OptionType, SpotPosition,
};
use crate::strategies::{SpotStrategy, StrategyCtx, build_options_strategy};
use crate::venues::spot::MarketFeed;

// ── Output records ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CheckStrategyRecord {
    pub strategy: String,
    pub symbol: String,
    pub timeframe: String,
    pub signal: i8,
    pub price: f64,
    pub indicators: BTreeMap<String, f64>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CheckOptionsRecord {
    pub strategy: String,
    pub underlying: String,
    pub signal: i8,
    pub spot_price: f64,
    pub actions: Vec<Action>,
    pub iv_rank: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CheckPriceRecord {
    pub prices: BTreeMap<String, f64>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ── Positions context parsing ───────────────────────────────────────

/// One entry of the combined positions payload handed over by the external
/// driver. Spot entries carry `position_type: "spot"`; anything else is
/// treated as an option position.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPosition {
    #[serde(default)]
    pub position_type: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub side: Option<String>,
    /// The driver's historical field name for side.
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub option_type: Option<String>,
    #[serde(default)]
    pub strike: f64,
    #[serde(default)]
    pub expiry: Option<String>,
    #[serde(default)]
    pub dte: Option<f64>,
    #[serde(default)]
    pub quantity: f64,
    #[serde(default)]
    pub entry_premium_usd: f64,
    #[serde(default)]
    pub delta: f64,
    #[serde(default)]
    pub leg_group: Option<String>,
}

impl RawPosition {
    fn side_str(&self) -> &str {
        self.action
            .as_deref()
            .or(self.side.as_deref())
            .unwrap_or("buy")
    }

    fn is_sell(&self) -> bool {
        self.side_str().eq_ignore_ascii_case("sell")
    }

    fn parsed_option_type(&self) -> Option<OptionType> {
        match self.option_type.as_deref() {
            Some(s) if s.eq_ignore_ascii_case("call") => Some(OptionType::Call),
            Some(s) if s.eq_ignore_ascii_case("put") => Some(OptionType::Put),
            _ => None,
        }
    }

    fn parsed_expiry(&self) -> DateTime<Utc> {
        if let Some(raw) = &self.expiry {
            if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
                if let Some(dt) = date.and_hms_opt(8, 0, 0) {
                    return Utc.from_utc_datetime(&dt);
                }
            }
            if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
                return dt.with_timezone(&Utc);
            }
        }
        Utc::now() + chrono::Duration::days(self.dte.unwrap_or(30.0) as i64)
    }

    pub fn to_book_entry(&self) -> BookEntry {
        BookEntry {
            option_type: self.parsed_option_type(),
            strike: self.strike,
            expiry: self.parsed_expiry().format("%Y-%m-%d").to_string(),
            delta: self.delta,
            is_sell: self.is_sell(),
            entry_premium_usd: self.entry_premium_usd,
        }
    }

    /// Reconstruct an adapter position from the driver's book so strategy
    /// already-holding checks see it. Prices are backed out of the USD
    /// premium at the given spot.
    pub fn to_option_position(&self, underlying: &str, spot: f64) -> Option<OptionPosition> {
        let option_type = self.parsed_option_type()?;
        let expiry = self.parsed_expiry();
        let quantity = if self.quantity > 0.0 { self.quantity } else { 1.0 };
        let entry_price = if spot > 0.0 {
            self.entry_premium_usd / spot
        } else {
            0.0
        };

        Some(OptionPosition {
            id: self
                .id
                .clone()
                .unwrap_or_else(|| format!("ext_{}", uuid::Uuid::new_v4().simple())),
            symbol: self.symbol.clone().unwrap_or_else(|| {
                format!(
                    "{underlying}-{}-{}",
                    self.strike,
                    match option_type {
                        OptionType::Call => "C",
                        OptionType::Put => "P",
                    }
                )
            }),
            underlying: underlying.to_string(),
            strike: self.strike,
            expiry,
            option_type,
            side: if self.is_sell() {
                OptionSide::Sell
            } else {
                OptionSide::Buy
            },
            quantity,
            entry_price,
            entry_price_usd: self.entry_premium_usd,
            entry_spot: spot,
            entry_time: Utc::now(),
            current_price: entry_price,
            current_spot: spot,
            greeks: Greeks {
                delta: self.delta,
                ..Greeks::default()
            },
            leg_group: self.leg_group.clone(),
        })
    }
}

/// Split the driver payload into option and spot entries. Spot holdings
/// never count against the option position cap.
pub fn parse_positions_context(raw: &[RawPosition]) -> (Vec<RawPosition>, Vec<SpotPosition>) {
    let mut options = Vec::new();
    let mut spot = Vec::new();
    for p in raw {
        if p.position_type.as_deref() == Some("spot") {
            spot.push(SpotPosition {
                symbol: p.symbol.clone().unwrap_or_default(),
                side: p.side.clone().unwrap_or_else(|| "long".into()),
                quantity: p.quantity,
                avg_entry_price: 0.0,
            });
        } else {
            options.push(p.clone());
        }
    }
    (options, spot)
}

// ── check-strategy ──────────────────────────────────────────────────

/// Single spot-strategy evaluation over freshly fetched candles.
pub async fn run_check_strategy(
    bars: &dyn BarSource,
    strategy_name: &str,
    symbol: &str,
    timeframe: &str,
    symbol_b: Option<&str>,
) -> CheckStrategyRecord {
    let mut record = CheckStrategyRecord {
        strategy: strategy_name.to_string(),
        symbol: symbol.to_string(),
        timeframe: timeframe.to_string(),
        signal: 0,
        price: 0.0,
        indicators: BTreeMap::new(),
        timestamp: Utc::now(),
        error: None,
    };

    let Some(strategy) = SpotStrategy::from_name(strategy_name) else {
        record.error = Some(format!(
            "Unknown strategy: {strategy_name}. Available: {:?}",
            SpotStrategy::NAMES
        ));
        return record;
    };

    if strategy_name == "pairs_spread" && symbol_b.is_none() {
        eprintln!(
            "Warning: pairs_spread requires a secondary symbol; degrading to \
             self-mean-reversion. Pass a 4th argument to enable proper stat-arb."
        );
    }

    eprintln!("Fetching {symbol} {timeframe}...");
    let series = match bars.bars(symbol, timeframe, 200).await {
        Ok(s) => s,
        Err(e) => {
            record.error = Some(format!("Data fetch failed: {e:#}"));
            return record;
        }
    };

    let (series, closes_b) = match symbol_b {
        Some(sb) => {
            eprintln!("Fetching secondary {sb} {timeframe}...");
            match bars.bars(sb, timeframe, 200).await {
                Ok(b) if !b.is_empty() => {
                    let (aligned, closes_b) = series.align_with(&b);
                    eprintln!("Merged pair: {} aligned candles ({symbol} / {sb})", aligned.len());
                    (aligned, Some(closes_b))
                }
                Ok(_) => {
                    record.error = Some(format!("No data returned for secondary symbol {sb}"));
                    return record;
                }
                Err(e) => {
                    record.error = Some(format!("Secondary fetch failed: {e:#}"));
                    return record;
                }
            }
        }
        None => (series, None),
    };

    if series.len() < 30 {
        record.error = Some(format!("Insufficient data: {} candles", series.len()));
        return record;
    }

    let output = strategy.evaluate(&series, closes_b.as_deref());
    record.signal = output.last_signal();
    record.price = series.last().map(|b| b.close).unwrap_or(0.0);
    record.indicators = output.last_indicators();
    record
}

// ── check-options ───────────────────────────────────────────────────

/// Signal orientation of a proposed action set: the first executable
/// action decides.
fn derive_signal(actions: &[Action]) -> i8 {
    for action in actions {
        match action.kind {
            ActionKind::BuyCall | ActionKind::BuyStraddle => return 1,
            ActionKind::BuyPut => return -1,
            ActionKind::SellCall | ActionKind::SellPut | ActionKind::SellStrangle => return -1,
            _ => {}
        }
    }
    0
}

/// Single options-strategy evaluation: seed a transient adapter with the
/// driver's book, evaluate, score, filter, report.
pub async fn run_check_options(
    ctx: StrategyCtx,
    strategy_name: &str,
    underlying: &str,
    raw_positions: Vec<RawPosition>,
) -> CheckOptionsRecord {
    let mut record = CheckOptionsRecord {
        strategy: strategy_name.to_string(),
        underlying: underlying.to_string(),
        signal: 0,
        spot_price: 0.0,
        actions: Vec::new(),
        iv_rank: 0.0,
        timestamp: Utc::now(),
        error: None,
        skip_reason: None,
    };

    let (option_positions, spot_positions) = parse_positions_context(&raw_positions);

    // Hard cap, option positions only.
    if option_positions.len() >= MAX_POSITIONS_PER_STRATEGY {
        record.skip_reason = Some(format!(
            "Max positions reached ({}/{MAX_POSITIONS_PER_STRATEGY})",
            option_positions.len()
        ));
        return record;
    }

    let Some(strategy) = build_options_strategy(strategy_name, ctx.clone()) else {
        record.error = Some(format!(
            "Unknown strategy: {strategy_name}. Available: {:?}",
            crate::strategies::OPTIONS_STRATEGY_NAMES
        ));
        return record;
    };

    let spot = match ctx.adapter.get_spot_price(underlying).await {
        Ok(s) if s > 0.0 => s,
        _ => {
            record.error = Some("Could not fetch spot price".into());
            return record;
        }
    };
    record.spot_price = (spot * 100.0).round() / 100.0;

    // Rebuild the external book inside the transient adapter so the
    // strategy's already-holding checks fire.
    for raw in &option_positions {
        if let Some(pos) = raw.to_option_position(underlying, spot) {
            ctx.adapter.seed_position(pos);
        }
    }
    strategy.set_spot_positions(spot_positions);

    // The one-shot adapter has no IV history; rank comes from the rolling
    // historical-vol percentile of daily closes.
    record.iv_rank = match ctx.bars.bars(&format!("{underlying}/USDT"), "1d", 90).await {
        Ok(series) if series.len() >= 15 => {
            let rank = indicators::hv_rank(&series.returns(), 14);
            (rank * 10.0).round() / 10.0
        }
        _ => 50.0,
    };

    let actions = strategy.evaluate(underlying).await;
    let signal = derive_signal(&actions);

    let book: Vec<BookEntry> = option_positions.iter().map(|p| p.to_book_entry()).collect();
    let mut scored = Vec::new();
    let mut had_executable = false;
    for mut action in actions {
        if action.kind == ActionKind::None {
            continue;
        }
        had_executable = true;
        let (score, reason) = score_new_trade(&action, &book, spot);
        if score >= MIN_SCORE_THRESHOLD {
            action.score = Some(score);
            action.score_reason = Some(reason);
            scored.push(action);
        } else {
            eprintln!(
                "Skipping {:?} strike={:?}: score={score} ({reason})",
                action.kind,
                action.contract.as_ref().map(|c| c.strike)
            );
        }
    }

    // Everything filtered out collapses the signal to hold.
    record.signal = if had_executable && scored.is_empty() {
        0
    } else {
        signal
    };
    record.actions = scored;
    record
}

// ── check-price ─────────────────────────────────────────────────────

pub async fn run_check_price(feed: &dyn MarketFeed, symbols: &[String]) -> CheckPriceRecord {
    let mut record = CheckPriceRecord {
        prices: BTreeMap::new(),
        timestamp: Utc::now(),
        error: None,
    };

    for symbol in symbols {
        match feed.get_ticker(symbol).await {
            Ok(t) => {
                record.prices.insert(symbol.clone(), t.last);
            }
            Err(e) => {
                eprintln!("Price fetch failed for {symbol}: {e:#}");
                record.error = Some(format!("Price fetch failed for {symbol}"));
            }
        }
    }
    record
}
