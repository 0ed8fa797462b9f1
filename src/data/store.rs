//! SQLite persistence: OHLCV cache, backtest results, and the named JSON
//! accumulators the schedulers flush every few minutes.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::model::{OhlcvBar, Series};

/// Default database location under the platform data dir.
pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("trade-flow")
        .join("trade_flow.db")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub strategy_name: String,
    pub symbol: String,
    pub timeframe: String,
    pub start_date: String,
    pub end_date: String,
    pub initial_capital: f64,
    pub final_capital: f64,
    pub total_return_pct: Option<f64>,
    pub annual_return_pct: Option<f64>,
    pub sharpe_ratio: Option<f64>,
    pub sortino_ratio: Option<f64>,
    pub max_drawdown_pct: Option<f64>,
    pub win_rate: Option<f64>,
    pub profit_factor: Option<f64>,
    pub total_trades: i64,
    pub params: serde_json::Value,
    pub trades: serde_json::Value,
}

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("creating db directory")?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("opening sqlite at {}", path.display()))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory().context("opening in-memory sqlite")?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS ohlcv (
                id        INTEGER PRIMARY KEY AUTOINCREMENT,
                exchange  TEXT NOT NULL,
                symbol    TEXT NOT NULL,
                timeframe TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                open      REAL NOT NULL,
                high      REAL NOT NULL,
                low       REAL NOT NULL,
                close     REAL NOT NULL,
                volume    REAL NOT NULL,
                UNIQUE(exchange, symbol, timeframe, timestamp)
            );

            CREATE INDEX IF NOT EXISTS idx_ohlcv_lookup
                ON ohlcv(exchange, symbol, timeframe, timestamp);

            CREATE TABLE IF NOT EXISTS backtest_results (
                id               INTEGER PRIMARY KEY AUTOINCREMENT,
                strategy_name    TEXT NOT NULL,
                symbol           TEXT NOT NULL,
                timeframe        TEXT NOT NULL,
                start_date       TEXT NOT NULL,
                end_date         TEXT NOT NULL,
                initial_capital  REAL NOT NULL,
                final_capital    REAL NOT NULL,
                total_return_pct REAL,
                annual_return_pct REAL,
                sharpe_ratio     REAL,
                sortino_ratio    REAL,
                max_drawdown_pct REAL,
                win_rate         REAL,
                profit_factor    REAL,
                total_trades     INTEGER,
                params           TEXT,
                trades_json      TEXT,
                created_at       TEXT DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS accumulators (
                name       TEXT PRIMARY KEY,
                state_json TEXT NOT NULL,
                updated_at TEXT DEFAULT (datetime('now'))
            );
            ",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Insert-or-replace on the (exchange, symbol, timeframe, timestamp)
    /// key, one transaction per batch.
    pub fn store_ohlcv(
        &self,
        exchange: &str,
        symbol: &str,
        timeframe: &str,
        bars: &[OhlcvBar],
    ) -> Result<()> {
        let mut conn = self.conn.lock().expect("store poisoned");
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR REPLACE INTO ohlcv
                 (exchange, symbol, timeframe, timestamp, open, high, low, close, volume)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for bar in bars {
                stmt.execute(rusqlite::params![
                    exchange,
                    symbol,
                    timeframe,
                    bar.timestamp_ms,
                    bar.open,
                    bar.high,
                    bar.low,
                    bar.close,
                    bar.volume,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn load_ohlcv(
        &self,
        exchange: &str,
        symbol: &str,
        timeframe: &str,
        start_ms: Option<i64>,
        end_ms: Option<i64>,
    ) -> Result<Series> {
        let conn = self.conn.lock().expect("store poisoned");
        let mut sql = String::from(
            "SELECT timestamp, open, high, low, close, volume FROM ohlcv
             WHERE exchange = ?1 AND symbol = ?2 AND timeframe = ?3",
        );
        if start_ms.is_some() {
            sql.push_str(" AND timestamp >= ?4");
        }
        if end_ms.is_some() {
            sql.push_str(if start_ms.is_some() {
                " AND timestamp <= ?5"
            } else {
                " AND timestamp <= ?4"
            });
        }
        sql.push_str(" ORDER BY timestamp ASC");

        let mut stmt = conn.prepare(&sql)?;
        let map_row = |row: &rusqlite::Row<'_>| {
            Ok(OhlcvBar {
                timestamp_ms: row.get(0)?,
                open: row.get(1)?,
                high: row.get(2)?,
                low: row.get(3)?,
                close: row.get(4)?,
                volume: row.get(5)?,
            })
        };

        let rows = match (start_ms, end_ms) {
            (Some(s), Some(e)) => stmt
                .query_map(rusqlite::params![exchange, symbol, timeframe, s, e], map_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?,
            (Some(s), None) => stmt
                .query_map(rusqlite::params![exchange, symbol, timeframe, s], map_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?,
            (None, Some(e)) => stmt
                .query_map(rusqlite::params![exchange, symbol, timeframe, e], map_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?,
            (None, None) => stmt
                .query_map(rusqlite::params![exchange, symbol, timeframe], map_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?,
        };

        Ok(Series::new(rows))
    }

    pub fn store_backtest_result(&self, result: &BacktestResult) -> Result<()> {
        let conn = self.conn.lock().expect("store poisoned");
        conn.execute(
            "INSERT INTO backtest_results
             (strategy_name, symbol, timeframe, start_date, end_date,
              initial_capital, final_capital, total_return_pct, annual_return_pct,
              sharpe_ratio, sortino_ratio, max_drawdown_pct, win_rate, profit_factor,
              total_trades, params, trades_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
            rusqlite::params![
                result.strategy_name,
                result.symbol,
                result.timeframe,
                result.start_date,
                result.end_date,
                result.initial_capital,
                result.final_capital,
                result.total_return_pct,
                result.annual_return_pct,
                result.sharpe_ratio,
                result.sortino_ratio,
                result.max_drawdown_pct,
                result.win_rate,
                result.profit_factor,
                result.total_trades,
                serde_json::to_string(&result.params)?,
                serde_json::to_string(&result.trades)?,
            ],
        )?;
        Ok(())
    }

    /// Upsert one named JSON accumulator.
    pub fn save_accumulator(&self, name: &str, state: &serde_json::Value) -> Result<()> {
        let conn = self.conn.lock().expect("store poisoned");
        conn.execute(
            "INSERT INTO accumulators (name, state_json, updated_at)
             VALUES (?1, ?2, datetime('now'))
             ON CONFLICT(name) DO UPDATE SET
                 state_json = excluded.state_json,
                 updated_at = excluded.updated_at",
            rusqlite::params![name, serde_json::to_string(state)?],
        )?;
        Ok(())
    }

    pub fn load_accumulator(&self, name: &str) -> Result<Option<serde_json::Value>> {
        let conn = self.conn.lock().expect("store poisoned");
        let mut stmt = conn.prepare("SELECT state_json FROM accumulators WHERE name = ?1")?;
        let mut rows = stmt.query(rusqlite::params![name])?;
        match rows.next()? {
            Some(row) => {
                let raw: String = row.get(0)?;
                Ok(Some(serde_json::from_str(&raw)?))
            }
            None => Ok(None),
        }
    }
}
