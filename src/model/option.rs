use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Width of the ATM band around spot, as a fraction of spot.
const ATM_BAND: f64 = 0.02;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Call,
    Put,
}

impl OptionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OptionType::Call => "call",
            OptionType::Put => "put",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum OptionSide {
    Buy,
    Sell,
}

impl OptionSide {
    /// +1 for long, -1 for short.
    pub fn sign(&self) -> f64 {
        match self {
            OptionSide::Buy => 1.0,
            OptionSide::Sell => -1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Moneyness {
    Itm,
    Atm,
    Otm,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Greeks {
    pub delta: f64,
    pub gamma: f64,
    /// USD per day.
    pub theta: f64,
    /// USD per 1% vol change.
    pub vega: f64,
    /// Implied volatility backing these greeks.
    pub iv: f64,
}

/// A single option contract: immutable identity plus a mutable quote
/// snapshot filled in by the adapter's enrichment pass.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct OptionContract {
    pub symbol: String,
    pub underlying: String,
    pub strike: f64,
    pub expiry: DateTime<Utc>,
    pub option_type: OptionType,

    // Quote snapshot (underlying terms, e.g. BTC per contract)
    #[serde(default)]
    pub bid: f64,
    #[serde(default)]
    pub ask: f64,
    #[serde(default)]
    pub last: f64,
    #[serde(default)]
    pub open_interest: f64,
    /// Underlying spot at the time of the snapshot.
    #[serde(default)]
    pub spot_price: f64,
    #[serde(default)]
    pub greeks: Greeks,
}

impl OptionContract {
    /// Mid quote, falling back to last when one side is missing.
    pub fn mid(&self) -> f64 {
        if self.bid > 0.0 && self.ask > 0.0 {
            (self.bid + self.ask) / 2.0
        } else {
            self.last
        }
    }

    /// Days to expiry, clamped at zero.
    pub fn dte(&self, now: DateTime<Utc>) -> f64 {
        ((self.expiry - now).num_seconds() as f64 / 86_400.0).max(0.0)
    }

    /// Time to expiry in years.
    pub fn time_to_expiry(&self, now: DateTime<Utc>) -> f64 {
        self.dte(now) / crate::pricing::DAYS_PER_YEAR
    }

    /// ATM within a ±2% band around spot; ITM/OTM by option type.
    pub fn moneyness(&self) -> Moneyness {
        let spot = self.spot_price;
        if spot <= 0.0 {
            return Moneyness::Atm;
        }
        let (lo, hi) = (spot * (1.0 - ATM_BAND), spot * (1.0 + ATM_BAND));
        match self.option_type {
            OptionType::Call => {
                if self.strike < lo {
                    Moneyness::Itm
                } else if self.strike > hi {
                    Moneyness::Otm
                } else {
                    Moneyness::Atm
                }
            }
            OptionType::Put => {
                if self.strike > hi {
                    Moneyness::Itm
                } else if self.strike < lo {
                    Moneyness::Otm
                } else {
                    Moneyness::Atm
                }
            }
        }
    }

    /// Premium in USD (quotes are in underlying terms).
    pub fn usd_price(&self) -> f64 {
        self.mid() * self.spot_price
    }
}

/// An open option position, identified by `id`. Multi-leg structures link
/// their legs through the weak `leg_group` tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionPosition {
    pub id: String,
    pub symbol: String,
    pub underlying: String,
    pub strike: f64,
    pub expiry: DateTime<Utc>,
    pub option_type: OptionType,
    pub side: OptionSide,
    pub quantity: f64,
    /// Entry premium in underlying terms.
    pub entry_price: f64,
    pub entry_price_usd: f64,
    pub entry_spot: f64,
    pub entry_time: DateTime<Utc>,
    pub current_price: f64,
    pub current_spot: f64,
    pub greeks: Greeks,
    pub leg_group: Option<String>,
}

impl OptionPosition {
    pub fn pnl_usd(&self) -> f64 {
        let current = self.current_price * self.current_spot * self.quantity;
        let entry = self.entry_price * self.entry_spot * self.quantity;
        self.side.sign() * (current - entry)
    }

    pub fn pnl_pct(&self) -> f64 {
        let entry = self.entry_price * self.entry_spot * self.quantity;
        if entry == 0.0 {
            return 0.0;
        }
        self.pnl_usd() / entry * 100.0
    }

    pub fn dte(&self, now: DateTime<Utc>) -> f64 {
        ((self.expiry - now).num_seconds() as f64 / 86_400.0).max(0.0)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expiry
    }

    /// Intrinsic value per contract at the given spot.
    pub fn intrinsic(&self, spot: f64) -> f64 {
        match self.option_type {
            OptionType::Call => (spot - self.strike).max(0.0),
            OptionType::Put => (self.strike - spot).max(0.0),
        }
    }
}
