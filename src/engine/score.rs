//! Scoring of proposed trades against the current option book.
//!
//! Entries that would stack onto existing strikes, expiries, or delta skew
//! score poorly and get skipped; diversifying entries score up. Shared by
//! the scheduler and the stateless check runner.

use crate::model::{Action, OptionPosition, OptionType};

/// Hard cap: option positions one strategy may hold per underlying.
pub const MAX_POSITIONS_PER_STRATEGY: usize = 4;
/// Entries scoring below this are rejected.
pub const MIN_SCORE_THRESHOLD: f64 = 0.3;

/// The slice of an existing position the scorer needs. Built from live
/// adapter positions or from the check runner's parsed JSON book.
#[derive(Debug, Clone)]
pub struct BookEntry {
    pub option_type: Option<OptionType>,
    pub strike: f64,
    /// Day-resolution expiry key.
    pub expiry: String,
    pub delta: f64,
    pub is_sell: bool,
    pub entry_premium_usd: f64,
}

impl BookEntry {
    pub fn from_position(pos: &OptionPosition) -> Self {
        Self {
            option_type: Some(pos.option_type),
            strike: pos.strike,
            expiry: pos.expiry.format("%Y-%m-%d").to_string(),
            delta: pos.greeks.delta,
            is_sell: pos.side == crate::model::OptionSide::Sell,
            entry_premium_usd: pos.entry_price_usd,
        }
    }
}

/// Score a proposed entry from 0.0 (skip) to ~1.0+ (take). Starts at 1.0
/// on an empty book, else 0.5, then adjusts for strike distance, expiry
/// spread, delta concentration, and (for sells) premium efficiency.
///
/// Actions without a concrete contract (multi-leg builders resolve their
/// strikes later) pass through at full score.
pub fn score_new_trade(action: &Action, existing: &[BookEntry], spot: f64) -> (f64, String) {
    if existing.is_empty() {
        return (1.0, "first position".into());
    }
    let Some(contract) = &action.contract else {
        return (1.0, "structure order".into());
    };

    let mut score: f64 = 0.5;
    let mut reasons: Vec<String> = Vec::new();

    let p_strike = contract.strike;
    let p_expiry = contract.expiry.format("%Y-%m-%d").to_string();
    let p_type = contract.option_type;
    let p_delta = contract.greeks.delta;

    // Strike distance to the nearest same-type position.
    let same_type: Vec<&BookEntry> = existing
        .iter()
        .filter(|e| e.option_type == Some(p_type))
        .collect();
    if !same_type.is_empty() && spot > 0.0 {
        let min_dist = same_type
            .iter()
            .map(|e| (p_strike - e.strike).abs() / spot)
            .fold(f64::INFINITY, f64::min);
        if min_dist > 0.10 {
            score += 0.4;
            reasons.push(format!("strike distance {:.1}%", min_dist * 100.0));
        } else if min_dist > 0.05 {
            score += 0.2;
            reasons.push(format!("moderate strike distance {:.1}%", min_dist * 100.0));
        } else {
            score -= 0.3;
            reasons.push(format!("overlapping strikes {:.1}%", min_dist * 100.0));
        }
    }

    // Expiry spread.
    if existing.iter().any(|e| e.expiry == p_expiry) {
        score -= 0.1;
        reasons.push("same expiry".into());
    } else {
        score += 0.3;
        reasons.push("different expiry".into());
    }

    // Delta concentration.
    let net_delta: f64 = existing.iter().map(|e| e.delta).sum();
    let new_net = net_delta + p_delta;
    if new_net.abs() > net_delta.abs() && new_net.abs() > 0.5 {
        score -= 0.3;
        reasons.push(format!("delta concentration {new_net:+.2}"));
    } else if new_net.abs() < net_delta.abs() {
        score += 0.2;
        reasons.push(format!("delta balancing {new_net:+.2}"));
    }

    // Premium efficiency for sells.
    if action.kind.is_sell() {
        let sells: Vec<&BookEntry> = existing.iter().filter(|e| e.is_sell).collect();
        if !sells.is_empty() {
            let avg: f64 =
                sells.iter().map(|e| e.entry_premium_usd).sum::<f64>() / sells.len() as f64;
            if action.premium_usd() > avg * 1.1 {
                score += 0.1;
                reasons.push("better premium".into());
            }
        }
    }

    let reason = if reasons.is_empty() {
        "default".to_string()
    } else {
        reasons.join("; ")
    };
    ((score * 100.0).round() / 100.0, reason)
}
