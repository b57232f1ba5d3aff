//! SQLite storage for accepted tokens and closed trades.
//!
//! Decimals are stored as TEXT to keep them exact. The store is owned by the
//! position-manager task; the `status` command opens the same file read-side.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

use crate::source::Candidate;
use crate::strategy::{ScoreResult, Trade};

/// A trade row read back from storage.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredTrade {
    pub id: String,
    pub token_address: String,
    pub symbol: String,
    pub side: String,
    pub amount: Decimal,
    pub entry_price: Decimal,
    pub price: Decimal,
    pub sol_amount: Decimal,
    pub profit_loss: Decimal,
    pub exit_reason: String,
    pub opened_at: DateTime<Utc>,
    pub closed_at: DateTime<Utc>,
}

/// An accepted-token row read back from storage.
#[derive(Debug, Clone, PartialEq)]
pub struct AcceptedToken {
    pub address: String,
    pub symbol: String,
    pub liquidity: Decimal,
    pub overall_score: Decimal,
    pub risk_score: Decimal,
    pub source: String,
    pub multi_source: bool,
    pub first_accepted_at: DateTime<Utc>,
    pub last_accepted_at: DateTime<Utc>,
}

pub struct TradeStore {
    conn: Connection,
}

impl TradeStore {
    /// Open (or create) the database and ensure the schema exists.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory {:?}", parent))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {:?}", path))?;

        let store = Self { conn };
        store.init_schema()?;

        info!("Trade store initialized at {:?}", path);
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let store = Self {
            conn: Connection::open_in_memory().context("Failed to open in-memory database")?,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS accepted_tokens (
                address TEXT PRIMARY KEY,
                symbol TEXT NOT NULL,
                liquidity TEXT NOT NULL,
                overall_score TEXT NOT NULL,
                risk_score TEXT NOT NULL,
                source TEXT NOT NULL,
                multi_source INTEGER NOT NULL,
                first_accepted_at TEXT NOT NULL,
                last_accepted_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS trades (
                id TEXT PRIMARY KEY,
                position_id TEXT NOT NULL,
                token_address TEXT NOT NULL,
                symbol TEXT NOT NULL,
                side TEXT NOT NULL,
                amount TEXT NOT NULL,
                entry_price TEXT NOT NULL,
                price TEXT NOT NULL,
                capital_committed TEXT NOT NULL,
                exit_value TEXT NOT NULL,
                sol_amount TEXT NOT NULL,
                status TEXT NOT NULL,
                profit_loss TEXT NOT NULL,
                exit_reason TEXT NOT NULL,
                opened_at TEXT NOT NULL,
                closed_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_trades_closed_at ON trades(closed_at);
            CREATE INDEX IF NOT EXISTS idx_trades_token ON trades(token_address);
            "#,
        )?;

        debug!("Database schema initialized");
        Ok(())
    }

    /// Upsert an accepted token, keeping its first acceptance time.
    pub fn record_accepted(
        &self,
        candidate: &Candidate,
        score: &ScoreResult,
        at: DateTime<Utc>,
    ) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO accepted_tokens (address, symbol, liquidity, overall_score, risk_score,
                                         source, multi_source, first_accepted_at, last_accepted_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
            ON CONFLICT(address) DO UPDATE SET
                symbol = ?2,
                liquidity = ?3,
                overall_score = ?4,
                risk_score = ?5,
                source = ?6,
                multi_source = ?7,
                last_accepted_at = ?8
            "#,
            params![
                candidate.address,
                candidate.symbol,
                candidate.liquidity.to_string(),
                score.overall_score.to_string(),
                score.risk_score.to_string(),
                candidate.source.to_string(),
                candidate.multi_source,
                at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Append a closed trade. Re-recording the same trade id is a no-op.
    pub fn record_trade(&self, trade: &Trade) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT OR IGNORE INTO trades (id, position_id, token_address, symbol, side, amount,
                                          entry_price, price, capital_committed, exit_value,
                                          sol_amount, status, profit_loss, exit_reason,
                                          opened_at, closed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            "#,
            params![
                trade.id,
                trade.position_id,
                trade.token_address,
                trade.symbol,
                trade.side.as_str(),
                trade.amount.to_string(),
                trade.entry_price.to_string(),
                trade.price.to_string(),
                trade.capital_committed.to_string(),
                trade.exit_value.to_string(),
                trade.sol_amount.to_string(),
                trade.status.as_str(),
                trade.profit_loss.to_string(),
                trade.exit_reason.as_str(),
                trade.opened_at.to_rfc3339(),
                trade.closed_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Most recently closed trades first.
    pub fn recent_trades(&self, limit: usize) -> Result<Vec<StoredTrade>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, token_address, symbol, side, amount, entry_price, price, sol_amount,
                   profit_loss, exit_reason, opened_at, closed_at
            FROM trades
            ORDER BY closed_at DESC
            LIMIT ?1
            "#,
        )?;

        let trades = stmt
            .query_map([limit], |row| {
                Ok(StoredTrade {
                    id: row.get(0)?,
                    token_address: row.get(1)?,
                    symbol: row.get(2)?,
                    side: row.get(3)?,
                    amount: decimal_column(row, 4)?,
                    entry_price: decimal_column(row, 5)?,
                    price: decimal_column(row, 6)?,
                    sol_amount: decimal_column(row, 7)?,
                    profit_loss: decimal_column(row, 8)?,
                    exit_reason: row.get(9)?,
                    opened_at: timestamp_column(row, 10)?,
                    closed_at: timestamp_column(row, 11)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read trades")?;

        Ok(trades)
    }

    /// Sum of profit/loss over every stored trade, computed exactly.
    pub fn realized_pnl(&self) -> Result<Decimal> {
        let mut stmt = self.conn.prepare("SELECT profit_loss FROM trades")?;
        let total = stmt
            .query_map([], |row| decimal_column(row, 0))?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to read trade results")?
            .into_iter()
            .sum();
        Ok(total)
    }

    pub fn trade_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM trades", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn accepted_token(&self, address: &str) -> Result<Option<AcceptedToken>> {
        self.conn
            .query_row(
                r#"
                SELECT address, symbol, liquidity, overall_score, risk_score, source,
                       multi_source, first_accepted_at, last_accepted_at
                FROM accepted_tokens
                WHERE address = ?1
                "#,
                [address],
                |row| {
                    Ok(AcceptedToken {
                        address: row.get(0)?,
                        symbol: row.get(1)?,
                        liquidity: decimal_column(row, 2)?,
                        overall_score: decimal_column(row, 3)?,
                        risk_score: decimal_column(row, 4)?,
                        source: row.get(5)?,
                        multi_source: row.get(6)?,
                        first_accepted_at: timestamp_column(row, 7)?,
                        last_accepted_at: timestamp_column(row, 8)?,
                    })
                },
            )
            .optional()
            .context("Failed to read accepted token")
    }

    pub fn accepted_count(&self) -> Result<usize> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM accepted_tokens", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

/// Decimal stored as TEXT. A corrupt value fails the read.
fn decimal_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    let text: String = row.get(idx)?;
    Decimal::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// RFC 3339 timestamp stored as TEXT.
fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}
