use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Multi-venue crypto trading engine: spot and options strategies with
/// paper/live execution and centralized risk.
#[derive(Parser)]
#[command(name = "trade-flow", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the spot trading scheduler (paper by default)
    Run {
        /// Strategy name (see `list-strategies`)
        #[arg(long, short = 's', default_value = "macd")]
        strategy: String,

        /// Trading pairs
        #[arg(long, num_args = 1.., default_values = ["BTC/USDT", "ETH/USDT"])]
        symbols: Vec<String>,

        /// Candle timeframe
        #[arg(long, short = 't', default_value = "4h")]
        timeframe: String,

        /// Initial capital (paper mode)
        #[arg(long, default_value = "10000.0")]
        capital: f64,

        /// Enable LIVE trading (requires credentials)
        #[arg(long)]
        live: bool,

        /// Exchange API key (or EXCHANGE_API_KEY)
        #[arg(long)]
        api_key: Option<String>,

        /// Exchange API secret (or EXCHANGE_API_SECRET)
        #[arg(long)]
        api_secret: Option<String>,

        /// Seconds between checks
        #[arg(long, default_value = "300.0")]
        interval: f64,

        /// Max iterations (0 = run until interrupted)
        #[arg(long, default_value = "0")]
        max_iterations: u64,

        /// Max drawdown % kill switch
        #[arg(long, default_value = "15.0")]
        max_drawdown: f64,

        /// Daily loss limit %
        #[arg(long, default_value = "5.0")]
        daily_loss_limit: f64,

        /// Data source venue for candles and paper quotes
        #[arg(long, default_value = "hyperliquid")]
        exchange: String,

        /// SQLite database path (default: platform data dir)
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Run the options trading scheduler (paper over live market data)
    RunOptions {
        /// Options strategy name (see `list-strategies`). `wheel` reads
        /// spot holdings via EXCHANGE_API_KEY/EXCHANGE_API_SECRET to
        /// detect assignment; without them it stays in phase 1.
        #[arg(long, short = 's', default_value = "vol_mean_reversion")]
        strategy: String,

        /// Underlyings
        #[arg(long, num_args = 1.., default_values = ["BTC"])]
        underlyings: Vec<String>,

        /// Initial capital
        #[arg(long, default_value = "10000.0")]
        capital: f64,

        /// Seconds between checks
        #[arg(long, default_value = "600.0")]
        interval: f64,

        /// Max iterations (0 = run until interrupted)
        #[arg(long, default_value = "0")]
        max_iterations: u64,

        /// Max simultaneous option positions
        #[arg(long, default_value = "10")]
        max_positions: usize,

        /// Portfolio delta bound (symmetric)
        #[arg(long, default_value = "5.0")]
        max_delta: f64,

        /// Max drawdown % kill switch
        #[arg(long, default_value = "20.0")]
        max_drawdown: f64,

        /// Daily loss limit %
        #[arg(long, default_value = "5.0")]
        daily_loss_limit: f64,

        /// SQLite database path (default: platform data dir)
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// One-shot spot strategy check: JSON record on stdout
    CheckStrategy {
        strategy: String,
        symbol: String,
        timeframe: String,

        /// Secondary symbol for pairs_spread
        symbol_b: Option<String>,
    },

    /// One-shot options strategy check: JSON record on stdout
    CheckOptions {
        strategy: String,
        underlying: String,

        /// Existing positions JSON (stdin takes precedence)
        positions_json: Option<String>,
    },

    /// Spot prices for one or more symbols: JSON record on stdout
    CheckPrice {
        #[arg(num_args = 1..)]
        symbols: Vec<String>,
    },

    /// Fetch historical OHLCV into the local cache
    FetchData {
        symbol: String,

        #[arg(long, default_value = "1d")]
        timeframe: String,

        /// Start date (YYYY-MM-DD)
        #[arg(long, default_value = "2020-01-01")]
        since: String,

        #[arg(long, default_value = "hyperliquid")]
        exchange: String,

        /// SQLite database path (default: platform data dir)
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// List available spot and options strategies
    ListStrategies,

    /// Print the JSON schema of the check-runner output records
    Schema,
}
