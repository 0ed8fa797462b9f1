#![allow(dead_code)]

use std::sync::Arc;

use chrono::{Duration, Utc};

use trade_flow::model::{
    Greeks, OhlcvBar, OptionContract, OptionPosition, OptionSide, OptionType, Series,
};
use trade_flow::venues::options::{OptionQuote, OptionsMarketData, StaticMarket};

/// Delegating wrapper so tests can keep a handle to the fixture after the
/// adapter has boxed it.
pub struct SharedMarket(pub Arc<StaticMarket>);

#[async_trait::async_trait]
impl OptionsMarketData for SharedMarket {
    fn name(&self) -> &str {
        "static"
    }

    async fn instruments(&self, underlying: &str) -> anyhow::Result<Vec<OptionContract>> {
        self.0.instruments(underlying).await
    }

    async fn ticker(&self, instrument: &str) -> anyhow::Result<OptionQuote> {
        self.0.ticker(instrument).await
    }

    async fn index_price(&self, underlying: &str) -> anyhow::Result<f64> {
        self.0.index_price(underlying).await
    }
}

/// The instrument symbols `btc_market` creates for a given spot.
pub fn btc_symbols(spot: f64) -> Vec<String> {
    let mut symbols = Vec::new();
    for mult in [0.80, 0.90, 0.98, 1.0, 1.02, 1.10, 1.20] {
        let strike = (spot * mult).round();
        symbols.push(format!("BTC-{strike}-C"));
        symbols.push(format!("BTC-{strike}-P"));
    }
    symbols
}

/// Set one quote on every instrument of a `btc_market`.
pub fn requote_all(market: &StaticMarket, spot: f64, bid: f64, ask: f64) {
    for symbol in btc_symbols(spot) {
        market.set_quote(
            &symbol,
            OptionQuote {
                bid,
                ask,
                last: (bid + ask) / 2.0,
                open_interest: 100.0,
            },
        );
    }
}

pub fn contract(
    underlying: &str,
    strike: f64,
    option_type: OptionType,
    dte_days: i64,
) -> OptionContract {
    let suffix = match option_type {
        OptionType::Call => "C",
        OptionType::Put => "P",
    };
    OptionContract {
        symbol: format!("{underlying}-{strike}-{suffix}"),
        underlying: underlying.to_string(),
        strike,
        expiry: Utc::now() + Duration::days(dte_days),
        option_type,
        bid: 0.0,
        ask: 0.0,
        last: 0.0,
        open_interest: 0.0,
        spot_price: 0.0,
        greeks: Greeks::default(),
    }
}

/// A BTC chain around the given spot: calls and puts at ±2%/±10%/±20%
/// strikes, 30 DTE, all quoted at `bid`/`ask` (underlying terms).
pub fn btc_market(spot: f64, bid: f64, ask: f64) -> StaticMarket {
    let mut instruments = Vec::new();
    for mult in [0.80, 0.90, 0.98, 1.0, 1.02, 1.10, 1.20] {
        let strike = (spot * mult).round();
        instruments.push(contract("BTC", strike, OptionType::Call, 30));
        instruments.push(contract("BTC", strike, OptionType::Put, 30));
    }

    let market = StaticMarket::new(&[("BTC", spot)]).with_instruments(instruments.clone());
    for c in &instruments {
        market.set_quote(
            &c.symbol,
            OptionQuote {
                bid,
                ask,
                last: (bid + ask) / 2.0,
                open_interest: 100.0,
            },
        );
    }
    market
}

pub fn position(
    id: &str,
    underlying: &str,
    strike: f64,
    option_type: OptionType,
    side: OptionSide,
    quantity: f64,
    entry_price: f64,
    spot: f64,
    dte_days: i64,
    leg_group: Option<&str>,
) -> OptionPosition {
    OptionPosition {
        id: id.to_string(),
        symbol: format!("{underlying}-{strike}"),
        underlying: underlying.to_string(),
        strike,
        expiry: Utc::now() + Duration::days(dte_days),
        option_type,
        side,
        quantity,
        entry_price,
        entry_price_usd: entry_price * spot,
        entry_spot: spot,
        entry_time: Utc::now(),
        current_price: entry_price,
        current_spot: spot,
        greeks: Greeks::default(),
        leg_group: leg_group.map(str::to_string),
    }
}

pub fn series_from_closes(closes: &[f64]) -> Series {
    let bars = closes
        .iter()
        .enumerate()
        .map(|(i, &close)| OhlcvBar {
            timestamp_ms: 1_700_000_000_000 + i as i64 * 3_600_000,
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1_000.0,
        })
        .collect();
    Series::new(bars)
}

/// A gently oscillating daily series, long enough for vol estimates.
pub fn oscillating_series(n: usize, base: f64) -> Series {
    let closes: Vec<f64> = (0..n)
        .map(|i| base * (1.0 + 0.02 * ((i as f64) * 0.7).sin()))
        .collect();
    series_from_closes(&closes)
}
