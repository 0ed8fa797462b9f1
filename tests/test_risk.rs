mod common;

use std::collections::HashMap;

use chrono::{Duration, Utc};
use common::{btc_market, position};
use trade_flow::model::{OptionSide, OptionType};
use trade_flow::risk::{
    OptionsRiskConfig, OptionsRiskManager, RiskConfig, RiskManager,
};
use trade_flow::venues::options::OptionsAdapter;

fn spot_manager() -> RiskManager {
    RiskManager::new(RiskConfig::default())
}

fn options_adapter(cash: f64) -> OptionsAdapter {
    OptionsAdapter::new(Box::new(btc_market(50_000.0, 0.010, 0.012)), cash)
}

#[test]
fn oversized_position_is_denied() {
    let mut rm = spot_manager();
    // 20% of $10k caps at $2,000; the $5k hard cap does not bind.
    let verdict = rm.check_can_trade(10_000.0, 6_000.0, "BTC/USDT", &HashMap::new());
    assert!(!verdict.allowed);
    assert!(
        verdict.reason.contains("Position too large")
            && verdict.reason.contains("$6000.00")
            && verdict.reason.contains("$2000.00"),
        "reason: {}",
        verdict.reason
    );

    let verdict = rm.check_can_trade(10_000.0, 1_500.0, "BTC/USDT", &HashMap::new());
    assert!(verdict.allowed);
}

#[test]
fn drawdown_kill_switch_latches() {
    let mut rm = spot_manager();
    rm.state.peak_portfolio_value = 12_000.0;
    rm.state.daily_start_value = 12_000.0;

    // -15.83% from peak trips the kill switch.
    let verdict = rm.check_can_trade(10_100.0, 0.0, "BTC/USDT", &HashMap::new());
    assert!(!verdict.allowed);
    assert!(verdict.reason.contains("KILL SWITCH"), "{}", verdict.reason);
    assert!(rm.state.circuit_break_active);

    // Every later check denies while the breaker cools down, even at a
    // healthy portfolio value.
    let verdict = rm.check_can_trade(12_000.0, 100.0, "BTC/USDT", &HashMap::new());
    assert!(!verdict.allowed);
    assert!(verdict.reason.contains("Circuit breaker"), "{}", verdict.reason);
}

#[test]
fn consecutive_losses_trip_and_cooldown_clears() {
    let mut rm = spot_manager();
    rm.state.peak_portfolio_value = 10_000.0;
    rm.state.daily_start_value = 10_000.0;

    for _ in 0..5 {
        rm.record_trade_result(-10.0);
    }
    let verdict = rm.check_can_trade(9_950.0, 100.0, "BTC/USDT", &HashMap::new());
    assert!(!verdict.allowed);
    assert!(verdict.reason.contains("consecutive losses"), "{}", verdict.reason);
    assert!(rm.state.circuit_break_active);

    // Still inside the cooldown: denied with remaining minutes.
    let verdict = rm.check_can_trade(9_950.0, 100.0, "BTC/USDT", &HashMap::new());
    assert!(!verdict.allowed);

    // Cooldown elapsed: the first check clears the latch and the streak.
    rm.state.circuit_break_until = Some(Utc::now() - Duration::minutes(1));
    let verdict = rm.check_can_trade(9_950.0, 100.0, "BTC/USDT", &HashMap::new());
    assert!(verdict.allowed, "{}", verdict.reason);
    assert!(!rm.state.circuit_break_active);
    assert_eq!(rm.state.consecutive_losses, 0);
}

#[test]
fn a_win_resets_the_loss_streak() {
    let mut rm = spot_manager();
    rm.record_trade_result(-10.0);
    rm.record_trade_result(-10.0);
    assert_eq!(rm.state.consecutive_losses, 2);
    rm.record_trade_result(0.0);
    assert_eq!(rm.state.consecutive_losses, 0);
    assert_eq!(rm.state.trade_log.len(), 3);
}

#[test]
fn position_count_and_exposure_limits() {
    let mut rm = spot_manager();
    rm.state.peak_portfolio_value = 10_000.0;

    let mut positions = HashMap::new();
    for asset in ["BTC", "ETH", "SOL", "AVAX", "LINK"] {
        positions.insert(asset.to_string(), 1_000.0);
    }
    // At the cap, a new asset is refused; topping up a held one is not.
    let verdict = rm.check_can_trade(10_000.0, 500.0, "DOGE/USDT", &positions);
    assert!(!verdict.allowed);
    assert!(verdict.reason.contains("Max positions"), "{}", verdict.reason);

    let verdict = rm.check_can_trade(10_000.0, 500.0, "BTC/USDT", &positions);
    assert!(verdict.allowed, "{}", verdict.reason);

    // Exposure: 7.9k deployed + 1.5k proposed > 80% of 10k.
    let mut heavy = HashMap::new();
    heavy.insert("BTC".to_string(), 7_900.0);
    let verdict = rm.check_can_trade(10_000.0, 1_500.0, "ETH/USDT", &heavy);
    assert!(!verdict.allowed);
    assert!(verdict.reason.contains("exposure"), "{}", verdict.reason);
}

#[test]
fn position_sizing_respects_stop_and_cap() {
    let rm = spot_manager();

    // No stop: the notional cap.
    assert_eq!(rm.calculate_position_size(10_000.0, 50_000.0, None), 2_000.0);

    // 3% risk on a 2% stop would be $15k and gets capped.
    let size = rm.calculate_position_size(10_000.0, 50_000.0, Some(49_000.0));
    assert_eq!(size, 2_000.0);

    // A wide 20% stop sizes below the cap: 300 / 0.2 = 1500.
    let size = rm.calculate_position_size(10_000.0, 50_000.0, Some(40_000.0));
    assert!((size - 1_500.0).abs() < 1e-9);

    assert!((rm.get_stop_loss_price(100.0, true) - 97.0).abs() < 1e-12);
    assert!((rm.get_stop_loss_price(100.0, false) - 103.0).abs() < 1e-12);
}

// ── Options risk ────────────────────────────────────────────────────

#[test]
fn per_underlying_cap_denies() {
    let adapter = options_adapter(100_000.0);
    for i in 0..5 {
        adapter.seed_position(position(
            &format!("p{i}"),
            "BTC",
            50_000.0 + i as f64 * 1_000.0,
            OptionType::Call,
            OptionSide::Buy,
            1.0,
            0.01,
            50_000.0,
            30,
            None,
        ));
    }

    let mut rm = OptionsRiskManager::new(OptionsRiskConfig::default());
    rm.state.peak_portfolio_value = 100_000.0;
    let verdict = rm.check_can_trade(&adapter, 100.0, OptionSide::Buy, "BTC");
    assert!(!verdict.allowed);
    assert!(verdict.reason.contains("Max positions for BTC"), "{}", verdict.reason);

    // A different underlying is still allowed.
    let verdict = rm.check_can_trade(&adapter, 100.0, OptionSide::Buy, "ETH");
    assert!(verdict.allowed, "{}", verdict.reason);
}

#[test]
fn single_trade_and_premium_at_risk_caps() {
    let adapter = options_adapter(10_000.0);
    let mut rm = OptionsRiskManager::new(OptionsRiskConfig::default());
    rm.state.peak_portfolio_value = 10_000.0;

    // 5% single-trade cap on a $10k book.
    let verdict = rm.check_can_trade(&adapter, 600.0, OptionSide::Buy, "BTC");
    assert!(!verdict.allowed);
    assert!(verdict.reason.contains("Trade premium"), "{}", verdict.reason);

    // Long premium already near 29% of the book: another 3% breaches the
    // 30% cap even though the single-trade rule passes.
    adapter.seed_position(position(
        "big", "BTC", 50_000.0, OptionType::Call, OptionSide::Buy, 1.0, 0.08, 50_000.0, 30, None,
    ));
    let portfolio = adapter.get_portfolio_value();
    let verdict = rm.check_can_trade(&adapter, portfolio * 0.03, OptionSide::Buy, "BTC");
    assert!(!verdict.allowed);
    assert!(verdict.reason.contains("Premium at risk"), "{}", verdict.reason);

    // Sells are not premium-at-risk constrained.
    let verdict = rm.check_can_trade(&adapter, portfolio * 0.03, OptionSide::Sell, "BTC");
    assert!(verdict.allowed, "{}", verdict.reason);
}

#[test]
fn greeks_limits_report_violations() {
    let adapter = options_adapter(100_000.0);
    let mut long = position(
        "d", "BTC", 50_000.0, OptionType::Call, OptionSide::Buy, 20.0, 0.012, 50_000.0, 30, None,
    );
    long.greeks.delta = 0.5; // 20 × 0.5 = 10 > max 5
    adapter.seed_position(long);

    let rm = OptionsRiskManager::new(OptionsRiskConfig::default());
    let check = rm.check_greeks_limits(&adapter);
    assert!(!check.within_limits);
    assert!(check.violations.iter().any(|v| v.contains("Delta")));
    assert!((check.greeks.delta - 10.0).abs() < 1e-9);
}

#[test]
fn hedge_budget_is_a_rolling_monthly_cap() {
    let mut rm = OptionsRiskManager::new(OptionsRiskConfig::default());
    let portfolio = 10_000.0;

    // 2% of 10k = $200/month.
    assert!(rm.check_hedge_budget(150.0, portfolio));
    rm.record_hedge_spend(150.0);
    assert!(!rm.check_hedge_budget(100.0, portfolio));
    assert!(rm.check_hedge_budget(50.0, portfolio));
    rm.record_hedge_spend(50.0);
    assert!(rm.monthly_hedge_spend <= portfolio * 0.02);
    assert!(!rm.check_hedge_budget(1.0, portfolio));
}

#[test]
fn margin_estimate_covers_short_legs() {
    let adapter = options_adapter(100_000.0);
    // ATM short call: premium margin 0.02×50k = 1000 < 10% floor of 5000.
    adapter.seed_position(position(
        "s", "BTC", 50_000.0, OptionType::Call, OptionSide::Sell, 1.0, 0.02, 50_000.0, 30, None,
    ));
    // Long positions contribute nothing.
    adapter.seed_position(position(
        "l", "BTC", 45_000.0, OptionType::Put, OptionSide::Buy, 1.0, 0.01, 50_000.0, 30, None,
    ));

    let rm = OptionsRiskManager::new(OptionsRiskConfig::default());
    let margin = rm.estimate_margin(&adapter);
    assert!((margin.estimated_margin - 5_000.0).abs() < 1e-9);
}

#[test]
fn stress_scenario_revalues_to_intrinsic() {
    let adapter = options_adapter(100_000.0);
    // One long ATM call, quantity 1, marked at 0.02×50k = $1000.
    adapter.seed_position(position(
        "c", "BTC", 50_000.0, OptionType::Call, OptionSide::Buy, 1.0, 0.02, 50_000.0, 30, None,
    ));

    let rm = OptionsRiskManager::new(OptionsRiskConfig::default());
    let stress = rm.max_loss_scenario(&adapter, 20.0);
    // Up 20%: intrinsic 10k against a $1k mark → +9k. Down: worthless → -1k.
    assert!((stress.pnl_if_up - 9_000.0).abs() < 1e-9);
    assert!((stress.pnl_if_down + 1_000.0).abs() < 1e-9);
    assert!((stress.worst_case + 1_000.0).abs() < 1e-9);
}
