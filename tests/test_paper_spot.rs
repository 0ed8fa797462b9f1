mod common;

use std::sync::Arc;

use trade_flow::model::{OrderSide, OrderStatus, OrderType};
use trade_flow::venues::spot::{FixedFeed, PaperSpotAdapter};
use trade_flow::venues::{Mode, SpotAdapter};

fn adapter_at(price: f64, balance: f64) -> (PaperSpotAdapter, Arc<FixedFeed>) {
    // One feed for the adapter, a handle kept to move the market.
    let feed = Arc::new(FixedFeed::new(&[("BTC/USDT", price)]));
    let shared = feed.clone();

    struct SharedFeed(Arc<FixedFeed>);

    #[async_trait::async_trait]
    impl trade_flow::venues::spot::MarketFeed for SharedFeed {
        fn name(&self) -> &str {
            "fixed"
        }
        async fn get_ticker(&self, symbol: &str) -> anyhow::Result<trade_flow::venues::Ticker> {
            self.0.get_ticker(symbol).await
        }
    }

    (
        PaperSpotAdapter::new(Box::new(SharedFeed(feed)), balance),
        shared,
    )
}

#[tokio::test]
async fn paper_buy_sell_round_trip() {
    let (adapter, feed) = adapter_at(50_000.0, 10_000.0);
    assert_eq!(adapter.mode(), Mode::Paper);

    // Market buy 0.01 BTC at $50k: fill at +5bps, commission 10bps.
    let order = adapter
        .place_order("BTC/USDT", OrderSide::Buy, OrderType::Market, 0.01, None, None)
        .await;
    assert_eq!(order.status, OrderStatus::Filled);

    let fill = order.filled_price.unwrap();
    assert!((fill - 50_025.0).abs() < 1e-9);

    let expected_cash = 10_000.0 - 0.01 * 50_025.0 * 1.001;
    let balance = adapter.get_balance().await.unwrap();
    assert!(
        (balance["USDT"] - expected_cash).abs() < 1e-6,
        "cash {} != {expected_cash}",
        balance["USDT"]
    );
    assert!((expected_cash - 9_499.25).abs() < 0.01);

    let positions = adapter.get_positions().await.unwrap();
    assert!((positions["BTC"] - 0.01).abs() < 1e-12);

    // Market sell the lot at $51k.
    feed.set_price("BTC/USDT", 51_000.0);
    let order = adapter
        .place_order("BTC/USDT", OrderSide::Sell, OrderType::Market, 0.01, None, None)
        .await;
    assert_eq!(order.status, OrderStatus::Filled);
    assert!((order.filled_price.unwrap() - 50_974.5).abs() < 1e-9);

    let expected_cash = expected_cash + 0.01 * 50_974.5 * 0.999;
    let balance = adapter.get_balance().await.unwrap();
    assert!((balance["USDT"] - expected_cash).abs() < 1e-6);

    // Flat book, two fills in the log, positive round-trip PnL.
    assert!(adapter.get_positions().await.unwrap().is_empty());
    assert_eq!(adapter.get_trade_history().await.unwrap().len(), 2);
    assert!(expected_cash > 10_000.0);
}

#[tokio::test]
async fn insufficient_funds_fails_without_side_effects() {
    let (adapter, _) = adapter_at(50_000.0, 100.0);

    let order = adapter
        .place_order("BTC/USDT", OrderSide::Buy, OrderType::Market, 1.0, None, None)
        .await;
    assert_eq!(order.status, OrderStatus::Failed);

    let balance = adapter.get_balance().await.unwrap();
    assert_eq!(balance["USDT"], 100.0);
    assert!(adapter.get_positions().await.unwrap().is_empty());

    // Selling base we never bought fails the same way.
    let order = adapter
        .place_order("BTC/USDT", OrderSide::Sell, OrderType::Market, 0.5, None, None)
        .await;
    assert_eq!(order.status, OrderStatus::Failed);
}

#[tokio::test]
async fn limit_order_rests_until_favorable() {
    let (adapter, feed) = adapter_at(50_000.0, 10_000.0);

    // Buy limit below the market: rests open.
    let order = adapter
        .place_order(
            "BTC/USDT",
            OrderSide::Buy,
            OrderType::Limit,
            0.01,
            Some(49_000.0),
            None,
        )
        .await;
    assert_eq!(order.status, OrderStatus::Open);
    assert_eq!(adapter.get_open_orders(Some("BTC/USDT")).await.unwrap().len(), 1);

    // Price drops through the limit: the poll fills it.
    feed.set_price("BTC/USDT", 48_500.0);
    let fills = adapter
        .check_pending_orders("BTC/USDT", 48_500.0)
        .await
        .unwrap();
    assert_eq!(fills.len(), 1);
    assert_eq!(fills[0].status, OrderStatus::Filled);
    assert!(adapter.get_open_orders(None).await.unwrap().is_empty());

    let positions = adapter.get_positions().await.unwrap();
    assert!((positions["BTC"] - 0.01).abs() < 1e-12);
}

#[tokio::test]
async fn marketable_limit_fills_immediately() {
    let (adapter, _) = adapter_at(50_000.0, 10_000.0);

    let order = adapter
        .place_order(
            "BTC/USDT",
            OrderSide::Buy,
            OrderType::Limit,
            0.01,
            Some(51_000.0),
            None,
        )
        .await;
    assert_eq!(order.status, OrderStatus::Filled);
    // Fills at the better of limit and market.
    assert!((order.filled_price.unwrap() - 50_000.0).abs() < 1e-9);
}

#[tokio::test]
async fn stop_loss_triggers_and_converts_to_market() {
    let (adapter, feed) = adapter_at(50_000.0, 10_000.0);

    // Establish a position, then guard it with a stop.
    adapter
        .place_order("BTC/USDT", OrderSide::Buy, OrderType::Market, 0.01, None, None)
        .await;
    let stop = adapter
        .place_order(
            "BTC/USDT",
            OrderSide::Sell,
            OrderType::StopLoss,
            0.01,
            None,
            Some(48_000.0),
        )
        .await;
    assert_eq!(stop.status, OrderStatus::Open);

    // Above the trigger nothing happens.
    let fills = adapter
        .check_pending_orders("BTC/USDT", 49_000.0)
        .await
        .unwrap();
    assert!(fills.is_empty());

    // Touch the trigger: converts to market and fills with slippage.
    feed.set_price("BTC/USDT", 47_900.0);
    let fills = adapter
        .check_pending_orders("BTC/USDT", 47_900.0)
        .await
        .unwrap();
    assert_eq!(fills.len(), 1);
    assert_eq!(fills[0].order_type, OrderType::Market);
    assert!((fills[0].filled_price.unwrap() - 47_900.0 * 0.9995).abs() < 1e-6);
    assert!(adapter.get_positions().await.unwrap().is_empty());
}

#[tokio::test]
async fn cancel_open_order() {
    let (adapter, _) = adapter_at(50_000.0, 10_000.0);

    let order = adapter
        .place_order(
            "BTC/USDT",
            OrderSide::Buy,
            OrderType::Limit,
            0.01,
            Some(40_000.0),
            None,
        )
        .await;
    assert!(adapter.cancel_order(&order.id).await.unwrap());
    assert!(adapter.get_open_orders(None).await.unwrap().is_empty());
    // A cancelled order does not re-trigger.
    let fills = adapter
        .check_pending_orders("BTC/USDT", 39_000.0)
        .await
        .unwrap();
    assert!(fills.is_empty());
}

#[tokio::test]
async fn portfolio_value_marks_positions() {
    let (adapter, feed) = adapter_at(50_000.0, 10_000.0);
    adapter
        .place_order("BTC/USDT", OrderSide::Buy, OrderType::Market, 0.1, None, None)
        .await;

    feed.set_price("BTC/USDT", 60_000.0);
    let value = adapter.get_portfolio_value("USDT").await.unwrap();
    let cash = adapter.get_balance().await.unwrap()["USDT"];
    assert!((value - (cash + 0.1 * 60_000.0)).abs() < 1e-6);
}
