//! SQLite-backed trade archive and per-pair strategy mining.
//!
//! Every validated settlement lands here. Past trades in a similar
//! volatility band feed back into the risk gate as suggested overrides,
//! marked `validated` once the sample is deep enough to trust.

use anyhow::{Context, Result};
use rusqlite::{params, Connection};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tracing::{info, warn};

use crate::config::LearningConfig;
use crate::engine::{ExitReason, StrategyOverride, TradeRecord};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS trades (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    pair          TEXT NOT NULL,
    direction     TEXT NOT NULL,
    entry_price   TEXT NOT NULL,
    exit_price    TEXT NOT NULL,
    position_usd  TEXT NOT NULL,
    gross_pnl     TEXT NOT NULL,
    fees          TEXT NOT NULL,
    net_pnl       TEXT NOT NULL,
    exit_reason   TEXT NOT NULL,
    hold_seconds  INTEGER NOT NULL,
    volatility_pct TEXT NOT NULL,
    spread_pct    TEXT NOT NULL,
    recorded_at   TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_trades_pair ON trades(pair);
";

pub struct StrategyStore {
    conn: Mutex<Connection>,
    config: LearningConfig,
    /// `None` for in-memory stores; backups are a no-op there.
    db_path: Option<PathBuf>,
    recorded: AtomicU64,
}

impl StrategyStore {
    /// Open (or create) the file-backed store at the configured path.
    pub fn open(config: LearningConfig) -> Result<Self> {
        let path = PathBuf::from(&config.db_path);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
        }
        let conn = Connection::open(&path)
            .with_context(|| format!("opening strategy db at {}", path.display()))?;
        Self::init(conn, config, Some(path))
    }

    /// Ephemeral store for tests and dry runs.
    pub fn in_memory(config: LearningConfig) -> Result<Self> {
        let conn = Connection::open_in_memory().context("opening in-memory strategy db")?;
        Self::init(conn, config, None)
    }

    fn init(conn: Connection, config: LearningConfig, db_path: Option<PathBuf>) -> Result<Self> {
        conn.execute_batch(SCHEMA).context("creating schema")?;
        let existing: u64 = conn
            .query_row("SELECT COUNT(*) FROM trades", [], |row| row.get(0))
            .context("counting existing trades")?;
        if existing > 0 {
            info!(trades = existing, "Strategy store loaded");
        }
        Ok(Self {
            conn: Mutex::new(conn),
            config,
            db_path,
            recorded: AtomicU64::new(existing),
        })
    }

    pub fn recorded_trades(&self) -> u64 {
        self.recorded.load(Ordering::SeqCst)
    }

    /// Sanity-check a settlement before it is allowed into any store.
    /// Rejections indicate an engine bug upstream, so callers log them.
    pub fn validate_trade(&self, trade: &TradeRecord) -> bool {
        if trade.pair.is_empty() {
            return false;
        }
        if trade.entry_price <= Decimal::ZERO
            || trade.exit_price <= Decimal::ZERO
            || trade.position_usd <= Decimal::ZERO
        {
            return false;
        }
        if trade.fees < Decimal::ZERO {
            return false;
        }
        if trade.net_pnl != trade.gross_pnl - trade.fees {
            return false;
        }
        ExitReason::parse(trade.exit_reason.as_str()).is_some()
    }

    /// Persist one settled trade. Every `backup_every` trades the whole
    /// database is snapshotted to a sibling `.bak` file.
    pub fn record_trade(&self, trade: &TradeRecord) -> Result<()> {
        {
            let conn = self.conn.lock().expect("strategy store lock poisoned");
            conn.execute(
                "INSERT INTO trades (
                    pair, direction, entry_price, exit_price, position_usd,
                    gross_pnl, fees, net_pnl, exit_reason, hold_seconds,
                    volatility_pct, spread_pct, recorded_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    trade.pair,
                    trade.direction.as_str(),
                    trade.entry_price.to_string(),
                    trade.exit_price.to_string(),
                    trade.position_usd.to_string(),
                    trade.gross_pnl.to_string(),
                    trade.fees.to_string(),
                    trade.net_pnl.to_string(),
                    trade.exit_reason.as_str(),
                    trade.hold_seconds,
                    trade.volatility_pct.to_string(),
                    trade.spread_pct.to_string(),
                    trade.timestamp.to_rfc3339(),
                ],
            )
            .context("inserting trade")?;
        }

        let total = self.recorded.fetch_add(1, Ordering::SeqCst) + 1;
        if total % self.config.backup_every == 0 {
            if let Err(e) = self.backup() {
                warn!(error = %e, "Periodic strategy store backup failed");
            }
        }
        Ok(())
    }

    /// Snapshot the database next to itself. No-op for in-memory stores.
    pub fn backup(&self) -> Result<()> {
        let Some(path) = &self.db_path else {
            return Ok(());
        };
        let backup_path = backup_path_for(path);
        if backup_path.exists() {
            std::fs::remove_file(&backup_path)
                .with_context(|| format!("removing stale backup {}", backup_path.display()))?;
        }
        let conn = self.conn.lock().expect("strategy store lock poisoned");
        conn.execute(
            "VACUUM INTO ?1",
            params![backup_path.to_string_lossy().to_string()],
        )
        .context("vacuuming into backup")?;
        info!(path = %backup_path.display(), "Strategy store backed up");
        Ok(())
    }

    /// Mine past trades of this pair in a comparable volatility band
    /// (half to one-and-a-half times the current reading) into a
    /// suggested override.
    pub fn get_optimal_strategy(
        &self,
        pair: &str,
        volatility_pct: Decimal,
    ) -> Result<Option<StrategyOverride>> {
        let band_low = volatility_pct * dec!(0.5);
        let band_high = volatility_pct * dec!(1.5);

        let conn = self.conn.lock().expect("strategy store lock poisoned");
        let mut stmt = conn
            .prepare(
                "SELECT gross_pnl, net_pnl, position_usd, hold_seconds
                 FROM trades
                 WHERE pair = ?1
                   AND CAST(volatility_pct AS REAL) BETWEEN ?2 AND ?3",
            )
            .context("preparing strategy query")?;

        let rows = stmt
            .query_map(
                params![
                    pair,
                    band_low.to_f64().unwrap_or(0.0),
                    band_high.to_f64().unwrap_or(f64::MAX),
                ],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, u64>(3)?,
                    ))
                },
            )
            .context("querying past trades")?;

        let mut count = 0u32;
        let mut wins = 0u32;
        let mut winner_pct_sum = Decimal::ZERO;
        let mut loser_pct_sum = Decimal::ZERO;
        let mut winner_hold_sum = 0u64;
        let mut edge_sum = Decimal::ZERO;

        for row in rows {
            let (gross, net, position, hold) = row.context("reading trade row")?;
            let gross = Decimal::from_str(&gross).context("parsing gross_pnl")?;
            let net = Decimal::from_str(&net).context("parsing net_pnl")?;
            let position = Decimal::from_str(&position).context("parsing position_usd")?;
            if position <= Decimal::ZERO {
                continue;
            }

            count += 1;
            let gross_pct = gross / position * dec!(100);
            edge_sum += net / position * dec!(100);

            if net > Decimal::ZERO {
                wins += 1;
                winner_pct_sum += gross_pct;
                winner_hold_sum += hold;
            } else {
                loser_pct_sum += gross_pct.abs();
            }
        }

        if count == 0 {
            return Ok(None);
        }

        let losses = count - wins;
        let win_rate = Decimal::from(wins) / Decimal::from(count);
        let validated = count >= self.config.min_trades_for_override
            && win_rate >= self.config.min_winrate_for_override;

        Ok(Some(StrategyOverride {
            pair: pair.to_string(),
            leverage: None,
            tp_pct: (wins > 0).then(|| winner_pct_sum / Decimal::from(wins)),
            sl_pct: (losses > 0).then(|| loser_pct_sum / Decimal::from(losses)),
            hold_seconds: (wins > 0).then(|| winner_hold_sum / u64::from(wins)),
            position_usd: None,
            validated,
            estimated_edge_pct: edge_sum / Decimal::from(count),
        }))
    }
}

fn backup_path_for(path: &Path) -> PathBuf {
    let mut p = path.as_os_str().to_owned();
    p.push(".bak");
    PathBuf::from(p)
}
