mod common;

use std::sync::{Arc, Mutex};

use common::{
    btc_market, contract, oscillating_series, position, requote_all, SharedMarket,
};
use trade_flow::alerts::AlertSink;
use trade_flow::data::FixedBars;
use trade_flow::engine::OptionsTrader;
use trade_flow::model::{ActionKind, OptionSide, OptionType, SpotPosition};
use trade_flow::risk::{OptionsRiskConfig, OptionsRiskManager};
use trade_flow::strategies::{StrategyCtx, build_options_strategy};
use trade_flow::venues::options::{OptionQuote, OptionsAdapter, StaticMarket};

const SPOT: f64 = 50_000.0;
const CASH: f64 = 100_000.0;

fn setup(bid: f64, ask: f64) -> (StrategyCtx, Arc<StaticMarket>) {
    let market = Arc::new(btc_market(SPOT, bid, ask));
    let adapter = Arc::new(OptionsAdapter::new(
        Box::new(SharedMarket(market.clone())),
        CASH,
    ));
    let risk = Arc::new(Mutex::new(OptionsRiskManager::new(
        OptionsRiskConfig::default(),
    )));
    risk.lock().unwrap().state.peak_portfolio_value = CASH;

    let ctx = StrategyCtx {
        adapter,
        risk,
        bars: Arc::new(FixedBars {
            series: oscillating_series(100, SPOT),
        }),
    };
    (ctx, market)
}

/// Push `n` IV samples into the adapter's history at the current quotes.
async fn record_iv_samples(ctx: &StrategyCtx, n: usize) {
    let atm = contract("BTC", 50_000.0, OptionType::Call, 30);
    for _ in 0..n {
        ctx.adapter.enrich_contract(&atm).await.unwrap();
    }
}

#[tokio::test]
async fn high_iv_rank_sells_a_strangle() {
    let (ctx, market) = setup(0.004, 0.005);

    // Cheap history, then expensive present: IV rank pins high.
    record_iv_samples(&ctx, 15).await;
    requote_all(&market, SPOT, 0.020, 0.024);

    let strategy = build_options_strategy("vol_mean_reversion", ctx.clone()).unwrap();
    let actions = strategy.evaluate("BTC").await;
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].kind, ActionKind::SellStrangle);
    assert_eq!(actions[0].otm_pct, Some(0.10));
    assert!(actions[0].reason.contains("sell strangle"), "{}", actions[0].reason);

    // Dispatch through the scheduler: two legs, one strangle group,
    // wings at ±10%, DTE inside the window.
    let mut trader = OptionsTrader::new(
        ctx.adapter.clone(),
        ctx.risk.clone(),
        strategy,
        vec!["BTC".into()],
        Arc::new(AlertSink::silent()),
        CASH,
    );
    trader.execute_action(&actions[0], "BTC").await.unwrap();

    let positions = ctx.adapter.get_positions();
    assert_eq!(positions.len(), 2);
    let now = chrono::Utc::now();
    for pos in positions.values() {
        assert!(pos.leg_group.as_deref().unwrap().starts_with("strangle_"));
        assert_eq!(pos.side, OptionSide::Sell);
        assert!((23.0..=37.0).contains(&pos.dte(now)));
        match pos.option_type {
            OptionType::Call => assert_eq!(pos.strike, SPOT * 1.10),
            OptionType::Put => assert_eq!(pos.strike, SPOT * 0.90),
        }
    }
}

#[tokio::test]
async fn low_iv_rank_buys_a_straddle() {
    let (ctx, market) = setup(0.020, 0.024);

    record_iv_samples(&ctx, 15).await;
    requote_all(&market, SPOT, 0.004, 0.005);

    let strategy = build_options_strategy("vol_mean_reversion", ctx.clone()).unwrap();
    let actions = strategy.evaluate("BTC").await;
    assert_eq!(actions[0].kind, ActionKind::BuyStraddle);
}

#[tokio::test]
async fn neutral_iv_rank_holds() {
    let (ctx, market) = setup(0.004, 0.005);

    record_iv_samples(&ctx, 5).await;
    requote_all(&market, SPOT, 0.030, 0.036);
    record_iv_samples(&ctx, 5).await;
    requote_all(&market, SPOT, 0.012, 0.014);

    let strategy = build_options_strategy("vol_mean_reversion", ctx.clone()).unwrap();
    let actions = strategy.evaluate("BTC").await;
    assert_eq!(actions[0].kind, ActionKind::None);
    assert!(actions[0].reason.contains("neutral zone"), "{}", actions[0].reason);
}

#[tokio::test]
async fn entry_cap_rejects_the_fifth_position() {
    let (ctx, _) = setup(0.010, 0.012);
    for i in 0..4 {
        ctx.adapter.seed_position(position(
            &format!("p{i}"),
            "BTC",
            40_000.0 + i as f64 * 1_000.0,
            OptionType::Call,
            OptionSide::Buy,
            1.0,
            0.01,
            SPOT,
            30,
            None,
        ));
    }

    let strategy = build_options_strategy("momentum_options", ctx.clone()).unwrap();
    let alerts = Arc::new(AlertSink::silent());
    let mut trader = OptionsTrader::new(
        ctx.adapter.clone(),
        ctx.risk.clone(),
        strategy,
        vec!["BTC".into()],
        alerts.clone(),
        CASH,
    );

    let entry = trade_flow::model::Action::contract_order(
        ActionKind::BuyCall,
        contract("BTC", 50_000.0, OptionType::Call, 30),
        1.0,
        "test entry",
    );
    trader.execute_action(&entry, "BTC").await.unwrap();

    assert_eq!(ctx.adapter.position_count(), 4);
    assert!(
        alerts
            .history()
            .iter()
            .any(|a| a.message.contains("Max positions reached")),
        "expected a cap alert"
    );
}

#[tokio::test]
async fn closing_a_loss_feeds_the_risk_manager() {
    let (ctx, market) = setup(0.010, 0.012);
    // Long bought at 0.02, now quoted 0.010/0.012: closing at the bid
    // realizes a loss.
    market.set_quote(
        "BTC-50000",
        OptionQuote {
            bid: 0.010,
            ask: 0.012,
            last: 0.011,
            open_interest: 1.0,
        },
    );
    ctx.adapter.seed_position(position(
        "loser", "BTC", 50_000.0, OptionType::Call, OptionSide::Buy, 1.0, 0.02, SPOT, 30, None,
    ));

    let strategy = build_options_strategy("momentum_options", ctx.clone()).unwrap();
    let mut trader = OptionsTrader::new(
        ctx.adapter.clone(),
        ctx.risk.clone(),
        strategy,
        vec!["BTC".into()],
        Arc::new(AlertSink::silent()),
        CASH,
    );

    let close = trade_flow::model::Action::close("loser", "cut it");
    trader.execute_action(&close, "BTC").await.unwrap();

    assert_eq!(ctx.adapter.position_count(), 0);
    let risk = ctx.risk.lock().unwrap();
    assert_eq!(risk.state.consecutive_losses, 1);
    assert!(risk.state.daily_pnl < 0.0);
}

#[tokio::test]
async fn momentum_manage_closes_at_profit_target() {
    let (ctx, market) = setup(0.010, 0.012);
    ctx.adapter.seed_position(position(
        "winner", "BTC", 50_000.0, OptionType::Call, OptionSide::Buy, 1.0, 0.01, SPOT, 30, None,
    ));
    // Re-mark at 0.016: +60% on premium.
    market.set_quote(
        "BTC-50000",
        OptionQuote {
            bid: 0.015,
            ask: 0.017,
            last: 0.016,
            open_interest: 1.0,
        },
    );
    ctx.adapter.update_positions().await.unwrap();

    let strategy = build_options_strategy("momentum_options", ctx.clone()).unwrap();
    let actions = strategy.manage_positions("BTC").await;
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].kind, ActionKind::Close);
    assert!(actions[0].reason.contains("Profit target"), "{}", actions[0].reason);
}

#[tokio::test]
async fn scheduler_feeds_spot_holdings_to_the_wheel() {
    use trade_flow::model::{OrderSide, OrderType};
    use trade_flow::venues::SpotAdapter;
    use trade_flow::venues::spot::{FixedFeed, PaperSpotAdapter};

    let (ctx, _) = setup(0.004, 0.005);
    let strategy = build_options_strategy("wheel", ctx.clone()).unwrap();

    // A spot venue holding BTC, as it would after a put assignment.
    let spot = Arc::new(PaperSpotAdapter::new(
        Box::new(FixedFeed::new(&[("BTC/USDT", SPOT)])),
        50_000.0,
    ));
    let order = spot
        .place_order("BTC/USDT", OrderSide::Buy, OrderType::Market, 0.5, None, None)
        .await;
    assert_eq!(order.status, trade_flow::model::OrderStatus::Filled);

    let mut trader = OptionsTrader::new(
        ctx.adapter.clone(),
        ctx.risk.clone(),
        strategy,
        vec!["BTC".into()],
        Arc::new(AlertSink::silent()),
        CASH,
    )
    .with_spot_source(spot);

    // One full tick: the scheduler mirrors the holdings into the strategy,
    // which answers with a phase-2 covered call that gets executed.
    trader.trading_tick().await;

    let positions = ctx.adapter.get_positions();
    assert_eq!(positions.len(), 1, "{positions:?}");
    let pos = positions.values().next().unwrap();
    assert_eq!(pos.option_type, OptionType::Call);
    assert_eq!(pos.side, OptionSide::Sell);
    assert!(pos.strike > SPOT);
}

#[tokio::test]
async fn wheel_stays_in_phase_one_without_a_spot_source() {
    let (ctx, _) = setup(0.004, 0.005);
    let strategy = build_options_strategy("wheel", ctx.clone()).unwrap();

    let mut trader = OptionsTrader::new(
        ctx.adapter.clone(),
        ctx.risk.clone(),
        strategy,
        vec!["BTC".into()],
        Arc::new(AlertSink::silent()),
        CASH,
    );
    trader.trading_tick().await;

    let positions = ctx.adapter.get_positions();
    assert_eq!(positions.len(), 1, "{positions:?}");
    let pos = positions.values().next().unwrap();
    assert_eq!(pos.option_type, OptionType::Put);
    assert_eq!(pos.side, OptionSide::Sell);
    assert!(pos.strike < SPOT);
}

#[tokio::test]
async fn wheel_switches_phase_on_assignment() {
    let (ctx, _) = setup(0.004, 0.005);
    let strategy = build_options_strategy("wheel", ctx.clone()).unwrap();

    // Phase 1: no spot, sell a cash-secured put below spot.
    let actions = strategy.evaluate("BTC").await;
    assert_eq!(actions[0].kind, ActionKind::SellPut);
    assert_eq!(actions[0].wheel_phase, Some(1));
    let strike = actions[0].contract.as_ref().unwrap().strike;
    assert!(strike < SPOT);

    // Phase 2: assigned spot flips the wheel to covered calls above spot.
    strategy.set_spot_positions(vec![SpotPosition {
        symbol: "BTC".into(),
        side: "long".into(),
        quantity: 0.5,
        avg_entry_price: 47_000.0,
    }]);
    let actions = strategy.evaluate("BTC").await;
    assert_eq!(actions[0].kind, ActionKind::SellCall);
    assert_eq!(actions[0].wheel_phase, Some(2));
    let strike = actions[0].contract.as_ref().unwrap().strike;
    assert!(strike > SPOT);
}

#[tokio::test]
async fn butterfly_builds_three_legs_in_mid_iv() {
    let (ctx, market) = setup(0.004, 0.005);

    // Half cheap, half rich history, present in the middle: mid-band rank.
    record_iv_samples(&ctx, 5).await;
    requote_all(&market, SPOT, 0.030, 0.036);
    record_iv_samples(&ctx, 5).await;
    requote_all(&market, SPOT, 0.012, 0.014);

    let strategy = build_options_strategy("butterfly", ctx.clone()).unwrap();
    let actions = strategy.evaluate("BTC").await;
    assert_eq!(actions.len(), 3, "{actions:?}");

    let group = actions[0].leg_group.clone().unwrap();
    assert!(group.starts_with("butterfly"));
    assert!(actions.iter().all(|a| a.leg_group.as_deref() == Some(&group)));

    assert_eq!(actions[0].kind, ActionKind::BuyCall);
    assert_eq!(actions[1].kind, ActionKind::SellCall);
    assert_eq!(actions[1].quantity, 2.0);
    assert_eq!(actions[2].kind, ActionKind::BuyCall);

    let strikes: Vec<f64> = actions
        .iter()
        .map(|a| a.contract.as_ref().unwrap().strike)
        .collect();
    assert!(strikes[0] < strikes[1] && strikes[1] < strikes[2]);

    // Execute all three legs and close the structure as a group.
    let mut trader = OptionsTrader::new(
        ctx.adapter.clone(),
        ctx.risk.clone(),
        strategy,
        vec!["BTC".into()],
        Arc::new(AlertSink::silent()),
        CASH,
    );
    for action in &actions {
        trader.execute_action(action, "BTC").await.unwrap();
    }
    assert_eq!(ctx.adapter.position_count(), 3);

    let records = ctx.adapter.close_leg_group(&group).await.unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(ctx.adapter.position_count(), 0);
}

#[tokio::test]
async fn protective_puts_respect_the_hedge_budget() {
    let (ctx, _) = setup(0.010, 0.012);
    // Burn the whole monthly budget up front: 2% of ~100k.
    ctx.risk.lock().unwrap().record_hedge_spend(2_000.0);

    let strategy = build_options_strategy("protective_puts", ctx.clone()).unwrap();
    let actions = strategy.evaluate("BTC").await;
    assert_eq!(actions[0].kind, ActionKind::None);
    assert!(
        actions[0].reason.contains("Hedge budget exceeded"),
        "{}",
        actions[0].reason
    );
}

#[tokio::test]
async fn protective_puts_mark_entries_as_hedges() {
    let (ctx, _) = setup(0.0004, 0.0005);

    let strategy = build_options_strategy("protective_puts", ctx.clone()).unwrap();
    let actions = strategy.evaluate("BTC").await;
    assert_eq!(actions[0].kind, ActionKind::BuyPut, "{:?}", actions[0].reason);
    assert!(actions[0].is_hedge);
    let c = actions[0].contract.as_ref().unwrap();
    assert!(c.strike < SPOT);
}
