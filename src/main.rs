use std::io::{IsTerminal, Read};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, bail};
use clap::Parser;
use tokio::sync::watch;

use trade_flow::alerts::AlertSink;
use trade_flow::check;
use trade_flow::data::{DataFetcher, Store, default_db_path};
use trade_flow::engine::{LiveTrader, OptionsTrader, spawn_flush_task};
use trade_flow::risk::{
    OptionsRiskConfig, OptionsRiskManager, RiskConfig, RiskManager,
};
use trade_flow::strategies::{
    OPTIONS_STRATEGY_NAMES, SpotStrategy, StrategyCtx, build_options_strategy,
    options_strategy_description,
};
use trade_flow::venues::options::{DeribitClient, OptionsAdapter};
use trade_flow::venues::spot::{HyperliquidFeed, LiveSpotAdapter, PaperSpotAdapter};

mod cli;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    // One shutdown channel for every long-running loop; Ctrl-C and
    // SIGTERM flip it.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    {
        let tx = shutdown_tx.clone();
        ctrlc::set_handler(move || {
            eprintln!("\n⚠️  Shutdown signal received...");
            let _ = tx.send(true);
        })
        .context("installing signal handler")?;
    }

    let rt = tokio::runtime::Runtime::new().context("creating tokio runtime")?;

    match cli.command {
        cli::Command::Run {
            strategy,
            symbols,
            timeframe,
            capital,
            live,
            api_key,
            api_secret,
            interval,
            max_iterations,
            max_drawdown,
            daily_loss_limit,
            exchange,
            db,
        } => rt.block_on(run_spot(RunSpotArgs {
            strategy,
            symbols,
            timeframe,
            capital,
            live,
            api_key,
            api_secret,
            interval,
            max_iterations,
            max_drawdown,
            daily_loss_limit,
            exchange,
            db,
            shutdown: shutdown_rx,
        })),
        cli::Command::RunOptions {
            strategy,
            underlyings,
            capital,
            interval,
            max_iterations,
            max_positions,
            max_delta,
            max_drawdown,
            daily_loss_limit,
            db,
        } => rt.block_on(run_options(RunOptionsArgs {
            strategy,
            underlyings,
            capital,
            interval,
            max_iterations,
            max_positions,
            max_delta,
            max_drawdown,
            daily_loss_limit,
            db,
            shutdown: shutdown_rx,
        })),
        cli::Command::CheckStrategy {
            strategy,
            symbol,
            timeframe,
            symbol_b,
        } => rt.block_on(async {
            let fetcher = DataFetcher::new("hyperliquid");
            let record = check::run_check_strategy(
                &fetcher,
                &strategy,
                &symbol,
                &timeframe,
                symbol_b.as_deref(),
            )
            .await;
            println!("{}", serde_json::to_string(&record)?);
            if record.error.is_some() {
                std::process::exit(1);
            }
            Ok(())
        }),
        cli::Command::CheckOptions {
            strategy,
            underlying,
            positions_json,
        } => rt.block_on(async {
            let raw_positions = read_positions(positions_json)?;
            let ctx = StrategyCtx {
                adapter: Arc::new(OptionsAdapter::new(
                    Box::new(DeribitClient::new()),
                    10_000.0,
                )),
                risk: Arc::new(Mutex::new(OptionsRiskManager::new(
                    OptionsRiskConfig::default(),
                ))),
                bars: Arc::new(DataFetcher::new("hyperliquid")),
            };
            let record = check::run_check_options(
                ctx,
                &strategy,
                &underlying.to_uppercase(),
                raw_positions,
            )
            .await;
            println!("{}", serde_json::to_string(&record)?);
            if record.error.is_some() {
                std::process::exit(1);
            }
            Ok(())
        }),
        cli::Command::CheckPrice { symbols } => rt.block_on(async {
            let feed = HyperliquidFeed::new();
            let record = check::run_check_price(&feed, &symbols).await;
            println!("{}", serde_json::to_string(&record)?);
            if record.error.is_some() {
                std::process::exit(1);
            }
            Ok(())
        }),
        cli::Command::FetchData {
            symbol,
            timeframe,
            since,
            exchange,
            db,
        } => rt.block_on(async {
            let store = Arc::new(Store::open(&db.unwrap_or_else(default_db_path))?);
            let fetcher = DataFetcher::new(&exchange).with_store(store);
            let since_ms = chrono::NaiveDate::parse_from_str(&since, "%Y-%m-%d")
                .context("parsing --since (expected YYYY-MM-DD)")?
                .and_hms_opt(0, 0, 0)
                .map(|dt| dt.and_utc().timestamp_millis())
                .unwrap_or(0);
            fetcher
                .fetch_full_history(&symbol, &timeframe, since_ms)
                .await?;
            Ok(())
        }),
        cli::Command::ListStrategies => {
            println!("Spot strategies:");
            for name in SpotStrategy::NAMES {
                if let Some(s) = SpotStrategy::from_name(name) {
                    println!("  {name}: {}", s.description());
                }
            }
            println!("\nOptions strategies:");
            for name in OPTIONS_STRATEGY_NAMES {
                if let Some(desc) = options_strategy_description(name) {
                    println!("  {name}: {desc}");
                }
            }
            Ok(())
        }
        cli::Command::Schema => {
            let schemas = serde_json::json!({
                "check_strategy": schemars::schema_for!(check::CheckStrategyRecord),
                "check_options": schemars::schema_for!(check::CheckOptionsRecord),
                "check_price": schemars::schema_for!(check::CheckPriceRecord),
            });
            println!("{}", serde_json::to_string_pretty(&schemas)?);
            Ok(())
        }
    }
}

/// Positions payload: stdin takes precedence over the positional arg.
fn read_positions(arg: Option<String>) -> Result<Vec<check::RawPosition>> {
    let mut raw = String::new();
    if !std::io::stdin().is_terminal() {
        std::io::stdin()
            .read_to_string(&mut raw)
            .context("reading positions from stdin")?;
    }
    let raw = raw.trim();
    let payload = if !raw.is_empty() {
        raw.to_string()
    } else {
        arg.unwrap_or_default()
    };
    if payload.is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&payload).context("parsing positions JSON")
}

struct RunSpotArgs {
    strategy: String,
    symbols: Vec<String>,
    timeframe: String,
    capital: f64,
    live: bool,
    api_key: Option<String>,
    api_secret: Option<String>,
    interval: f64,
    max_iterations: u64,
    max_drawdown: f64,
    daily_loss_limit: f64,
    exchange: String,
    db: Option<std::path::PathBuf>,
    shutdown: watch::Receiver<bool>,
}

async fn run_spot(args: RunSpotArgs) -> Result<()> {
    let Some(strategy) = SpotStrategy::from_name(&args.strategy) else {
        bail!(
            "Unknown strategy: {}. Available: {:?}",
            args.strategy,
            SpotStrategy::NAMES
        );
    };
    if args.exchange != "hyperliquid" {
        bail!("Unsupported exchange '{}' (supported: hyperliquid)", args.exchange);
    }

    let api_key = args
        .api_key
        .or_else(|| std::env::var("EXCHANGE_API_KEY").ok());
    let api_secret = args
        .api_secret
        .or_else(|| std::env::var("EXCHANGE_API_SECRET").ok());

    let adapter: Arc<dyn trade_flow::venues::SpotAdapter> = if args.live {
        let (Some(key), Some(secret)) = (api_key, api_secret) else {
            bail!("❌ Live mode requires --api-key and --api-secret");
        };

        println!("\n⚠️  WARNING: LIVE TRADING MODE");
        println!("Real money will be used. Press Ctrl+C within 5 seconds to cancel.");
        let mut shutdown = args.shutdown.clone();
        tokio::select! {
            _ = shutdown.changed() => bail!("live start cancelled"),
            _ = tokio::time::sleep(std::time::Duration::from_secs(5)) => {}
        }

        Arc::new(LiveSpotAdapter::new(&key, &secret))
    } else {
        Arc::new(PaperSpotAdapter::new(
            Box::new(HyperliquidFeed::new()),
            args.capital,
        ))
    };

    let store = Arc::new(Store::open(&args.db.unwrap_or_else(default_db_path))?);
    let bars = Arc::new(DataFetcher::new(&args.exchange).with_store(store.clone()));

    let risk = RiskManager::new(RiskConfig {
        max_drawdown_pct: args.max_drawdown,
        daily_loss_limit_pct: args.daily_loss_limit,
        ..RiskConfig::default()
    });

    let (snapshot_tx, snapshot_rx) = watch::channel(serde_json::Value::Null);
    let flush = spawn_flush_task(
        store,
        format!("live_trader:{}", strategy.name()),
        snapshot_rx,
        args.shutdown.clone(),
    );

    let mut trader = LiveTrader::new(
        adapter,
        bars,
        risk,
        Arc::new(AlertSink::new()),
        strategy,
        args.symbols,
        args.timeframe,
        args.capital,
    )
    .with_snapshots(snapshot_tx);

    let result = trader
        .start(args.max_iterations, args.interval, args.shutdown)
        .await;
    flush.abort();
    result
}

struct RunOptionsArgs {
    strategy: String,
    underlyings: Vec<String>,
    capital: f64,
    interval: f64,
    max_iterations: u64,
    max_positions: usize,
    max_delta: f64,
    max_drawdown: f64,
    daily_loss_limit: f64,
    db: Option<std::path::PathBuf>,
    shutdown: watch::Receiver<bool>,
}

async fn run_options(args: RunOptionsArgs) -> Result<()> {
    let adapter = Arc::new(OptionsAdapter::new(
        Box::new(DeribitClient::new()),
        args.capital,
    ));
    let risk = Arc::new(Mutex::new(OptionsRiskManager::new(OptionsRiskConfig {
        max_positions: args.max_positions,
        max_portfolio_delta: args.max_delta,
        min_portfolio_delta: -args.max_delta,
        max_drawdown_pct: args.max_drawdown,
        daily_loss_limit_pct: args.daily_loss_limit,
        ..OptionsRiskConfig::default()
    })));

    let store = Arc::new(Store::open(&args.db.unwrap_or_else(default_db_path))?);
    let ctx = StrategyCtx {
        adapter: adapter.clone(),
        risk: risk.clone(),
        bars: Arc::new(DataFetcher::new("hyperliquid").with_store(store.clone())),
    };

    let Some(strategy) = build_options_strategy(&args.strategy, ctx) else {
        bail!(
            "Unknown options strategy: {}. Available: {OPTIONS_STRATEGY_NAMES:?}",
            args.strategy
        );
    };

    let underlyings: Vec<String> =
        args.underlyings.iter().map(|u| u.to_uppercase()).collect();

    // Spot holdings feed assignment detection (wheel phase 2). With
    // exchange credentials the venue's balances are polled each tick;
    // without them there is nothing to detect and the wheel stays in
    // phase 1, which we say out loud instead of leaving it silent.
    let spot_source: Option<Arc<dyn trade_flow::venues::SpotAdapter>> = match (
        std::env::var("EXCHANGE_API_KEY").ok(),
        std::env::var("EXCHANGE_API_SECRET").ok(),
    ) {
        (Some(key), Some(secret)) => Some(Arc::new(LiveSpotAdapter::new(&key, &secret))),
        _ => None,
    };
    if spot_source.is_none() && args.strategy == "wheel" {
        eprintln!(
            "WARNING: no EXCHANGE_API_KEY/EXCHANGE_API_SECRET set; wheel cannot see spot \
             holdings and will run phase 1 (cash-secured puts) only"
        );
    }

    let (snapshot_tx, snapshot_rx) = watch::channel(serde_json::Value::Null);
    let flush = spawn_flush_task(
        store,
        format!("options_trader:{}", args.strategy),
        snapshot_rx,
        args.shutdown.clone(),
    );

    let mut trader = OptionsTrader::new(
        adapter,
        risk,
        strategy,
        underlyings,
        Arc::new(AlertSink::new()),
        args.capital,
    )
    .with_snapshots(snapshot_tx);
    if let Some(spot) = spot_source {
        trader = trader.with_spot_source(spot);
    }

    let result = trader
        .start(args.max_iterations, args.interval, args.shutdown)
        .await;
    flush.abort();
    result
}
