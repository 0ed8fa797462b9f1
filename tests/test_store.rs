mod common;

use common::series_from_closes;
use trade_flow::data::{BacktestResult, Store};

#[test]
fn ohlcv_cache_upserts_on_the_unique_key() {
    let store = Store::open_in_memory().unwrap();
    let series = series_from_closes(&[100.0, 101.0, 102.0]);

    store
        .store_ohlcv("hyperliquid", "BTC/USDT", "1h", &series.bars)
        .unwrap();
    let loaded = store
        .load_ohlcv("hyperliquid", "BTC/USDT", "1h", None, None)
        .unwrap();
    assert_eq!(loaded.len(), 3);
    assert_eq!(loaded.bars[2].close, 102.0);

    // Re-storing the same timestamps with new values replaces, never
    // duplicates.
    let mut revised = series.clone();
    revised.bars[2].close = 999.0;
    store
        .store_ohlcv("hyperliquid", "BTC/USDT", "1h", &revised.bars)
        .unwrap();
    let loaded = store
        .load_ohlcv("hyperliquid", "BTC/USDT", "1h", None, None)
        .unwrap();
    assert_eq!(loaded.len(), 3);
    assert_eq!(loaded.bars[2].close, 999.0);

    // A different key is a different series.
    let other = store
        .load_ohlcv("hyperliquid", "ETH/USDT", "1h", None, None)
        .unwrap();
    assert!(other.is_empty());
}

#[test]
fn ohlcv_range_bounds_are_inclusive() {
    let store = Store::open_in_memory().unwrap();
    let series = series_from_closes(&[1.0, 2.0, 3.0, 4.0, 5.0]);
    store
        .store_ohlcv("hyperliquid", "BTC/USDT", "1d", &series.bars)
        .unwrap();

    let t0 = series.bars[1].timestamp_ms;
    let t1 = series.bars[3].timestamp_ms;
    let ranged = store
        .load_ohlcv("hyperliquid", "BTC/USDT", "1d", Some(t0), Some(t1))
        .unwrap();
    assert_eq!(ranged.len(), 3);
    assert_eq!(ranged.bars[0].close, 2.0);
    assert_eq!(ranged.bars[2].close, 4.0);

    let tail = store
        .load_ohlcv("hyperliquid", "BTC/USDT", "1d", Some(t1), None)
        .unwrap();
    assert_eq!(tail.len(), 2);
}

#[test]
fn accumulators_upsert_named_json_blobs() {
    let store = Store::open_in_memory().unwrap();
    assert!(store.load_accumulator("options_trader:wheel").unwrap().is_none());

    let state = serde_json::json!({"iteration": 3, "trades": []});
    store.save_accumulator("options_trader:wheel", &state).unwrap();
    assert_eq!(
        store.load_accumulator("options_trader:wheel").unwrap().unwrap()["iteration"],
        3
    );

    let state = serde_json::json!({"iteration": 9, "trades": [1, 2]});
    store.save_accumulator("options_trader:wheel", &state).unwrap();
    let loaded = store.load_accumulator("options_trader:wheel").unwrap().unwrap();
    assert_eq!(loaded["iteration"], 9);
    assert_eq!(loaded["trades"].as_array().unwrap().len(), 2);
}

#[test]
fn backtest_results_round_trip() {
    let store = Store::open_in_memory().unwrap();
    let result = BacktestResult {
        strategy_name: "macd".into(),
        symbol: "BTC/USDT".into(),
        timeframe: "4h".into(),
        start_date: "2024-01-01".into(),
        end_date: "2024-06-30".into(),
        initial_capital: 10_000.0,
        final_capital: 11_500.0,
        total_return_pct: Some(15.0),
        annual_return_pct: Some(31.2),
        sharpe_ratio: Some(1.4),
        sortino_ratio: None,
        max_drawdown_pct: Some(-8.3),
        win_rate: Some(0.56),
        profit_factor: Some(1.7),
        total_trades: 42,
        params: serde_json::json!({"fast_period": 12, "slow_period": 26}),
        trades: serde_json::json!([]),
    };
    store.store_backtest_result(&result).unwrap();
}
