//! SQLite adapter: bar feed, journal events and matched trades.

use crate::domain::bar::{parse_timestamp, Bar};
use crate::domain::error::TrendgateError;
use crate::domain::journal::{Direction, JournalBatch, MatchedTrade, TradeEvent, TradeFilter};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::trade_store::TradeStore;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::ToSql;
use rusqlite::{params, params_from_iter};

fn query_err(e: rusqlite::Error) -> TrendgateError {
    TrendgateError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn parse_direction(idx: usize, raw: String) -> Result<Direction, rusqlite::Error> {
    raw.parse::<Direction>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            e.into(),
        )
    })
}

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, TrendgateError> {
        let db_path =
            config
                .get_string("sqlite", "path")
                .ok_or_else(|| TrendgateError::ConfigMissing {
                    section: "sqlite".into(),
                    key: "path".into(),
                })?;

        let pool_size = config.get_int("sqlite", "pool_size", 4).max(1) as u32;

        let manager = SqliteConnectionManager::file(&db_path);
        let pool =
            Pool::builder()
                .max_size(pool_size)
                .build(manager)
                .map_err(|e: r2d2::Error| TrendgateError::Database {
                    reason: e.to_string(),
                })?;

        Ok(Self { pool })
    }

    pub fn in_memory() -> Result<Self, TrendgateError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e: r2d2::Error| TrendgateError::Database {
                reason: e.to_string(),
            })?;

        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, TrendgateError> {
        self.pool
            .get()
            .map_err(|e: r2d2::Error| TrendgateError::Database {
                reason: e.to_string(),
            })
    }

    pub fn initialize_schema(&self) -> Result<(), TrendgateError> {
        let conn = self.conn()?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS bars (
                stream TEXT NOT NULL,
                bar_index INTEGER NOT NULL,
                timestamp TEXT NOT NULL,
                open REAL NOT NULL,
                high REAL NOT NULL,
                low REAL NOT NULL,
                close REAL NOT NULL,
                PRIMARY KEY (stream, bar_index)
            );
            CREATE TABLE IF NOT EXISTS trade_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                stream TEXT NOT NULL,
                bar_index INTEGER NOT NULL,
                action TEXT NOT NULL,
                position_id INTEGER NOT NULL,
                direction TEXT NOT NULL,
                price REAL NOT NULL,
                order_name TEXT,
                pnl REAL,
                reason TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS trades (
                stream TEXT NOT NULL,
                position_id INTEGER NOT NULL,
                entry_bar INTEGER NOT NULL,
                exit_bar INTEGER NOT NULL,
                direction TEXT NOT NULL,
                exit_direction TEXT NOT NULL,
                entry_price REAL NOT NULL,
                exit_price REAL NOT NULL,
                entry_reason TEXT NOT NULL,
                exit_reason TEXT NOT NULL,
                order_name TEXT NOT NULL,
                pnl REAL NOT NULL,
                direction_mismatch INTEGER NOT NULL,
                PRIMARY KEY (stream, position_id)
            );
            CREATE INDEX IF NOT EXISTS idx_trade_events_stream ON trade_events(stream, bar_index);
            CREATE INDEX IF NOT EXISTS idx_trades_entry_reason ON trades(entry_reason);",
        )
        .map_err(query_err)?;

        Ok(())
    }

    pub fn insert_bars(&self, stream: &str, bars: &[Bar]) -> Result<(), TrendgateError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;

        for bar in bars {
            tx.execute(
                "INSERT OR REPLACE INTO bars (stream, bar_index, timestamp, open, high, low, close)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    stream,
                    bar.bar_index as i64,
                    bar.timestamp_string(),
                    bar.open,
                    bar.high,
                    bar.low,
                    bar.close
                ],
            )
            .map_err(query_err)?;
        }

        tx.commit().map_err(query_err)?;
        Ok(())
    }

    /// Stored journal events of `stream` in append order.
    pub fn fetch_events(&self, stream: &str) -> Result<Vec<TradeEvent>, TrendgateError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT bar_index, action, position_id, direction, price, order_name, pnl, reason
                 FROM trade_events WHERE stream = ?1 ORDER BY id ASC",
            )
            .map_err(query_err)?;

        let rows = stmt
            .query_map(params![stream], |row| {
                let bar_index = row.get::<_, i64>(0)? as u64;
                let action: String = row.get(1)?;
                let position_id = row.get::<_, i64>(2)? as u64;
                let direction = parse_direction(3, row.get(3)?)?;
                let price: f64 = row.get(4)?;
                let reason: String = row.get(7)?;
                if action == "ENTRY" {
                    Ok(TradeEvent::Entry {
                        bar_index,
                        position_id,
                        direction,
                        price,
                        reason,
                    })
                } else {
                    Ok(TradeEvent::Exit {
                        bar_index,
                        position_id,
                        direction,
                        price,
                        order_name: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
                        pnl: row.get::<_, Option<f64>>(6)?.unwrap_or(0.0),
                        reason,
                    })
                }
            })
            .map_err(query_err)?;

        rows.collect::<Result<Vec<_>, _>>().map_err(query_err)
    }
}

impl DataPort for SqliteAdapter {
    fn fetch_bars(&self, stream: &str) -> Result<Vec<Bar>, TrendgateError> {
        let conn = self.conn()?;

        let mut stmt = conn
            .prepare(
                "SELECT bar_index, timestamp, open, high, low, close
                 FROM bars WHERE stream = ?1 ORDER BY bar_index ASC",
            )
            .map_err(query_err)?;

        let rows = stmt
            .query_map(params![stream], |row| {
                let ts: String = row.get(1)?;
                let timestamp = parse_timestamp(&ts).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        1,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })?;
                Ok(Bar {
                    bar_index: row.get::<_, i64>(0)? as u64,
                    timestamp,
                    open: row.get(2)?,
                    high: row.get(3)?,
                    low: row.get(4)?,
                    close: row.get(5)?,
                })
            })
            .map_err(query_err)?;

        let mut bars = Vec::new();
        for row in rows {
            bars.push(row.map_err(query_err)?);
        }
        Ok(bars)
    }

    fn list_streams(&self) -> Result<Vec<String>, TrendgateError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT DISTINCT stream FROM bars ORDER BY stream")
            .map_err(query_err)?;
        let rows = stmt.query_map([], |row| row.get(0)).map_err(query_err)?;

        let mut streams = Vec::new();
        for row in rows {
            streams.push(row.map_err(query_err)?);
        }
        Ok(streams)
    }

    fn get_data_range(&self, stream: &str) -> Result<Option<(u64, u64, usize)>, TrendgateError> {
        let conn = self.conn()?;
        let result: (Option<i64>, Option<i64>, i64) = conn
            .query_row(
                "SELECT MIN(bar_index), MAX(bar_index), COUNT(*) FROM bars WHERE stream = ?1",
                params![stream],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map_err(query_err)?;

        match result {
            (Some(min), Some(max), count) if count > 0 => {
                Ok(Some((min as u64, max as u64, count as usize)))
            }
            _ => Ok(None),
        }
    }
}

impl TradeStore for SqliteAdapter {
    fn save_batch(&self, stream: &str, batch: &JournalBatch) -> Result<(), TrendgateError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;

        for event in &batch.events {
            let (order_name, pnl) = match event {
                TradeEvent::Entry { .. } => (None, None),
                TradeEvent::Exit { order_name, pnl, .. } => (Some(order_name.as_str()), Some(*pnl)),
            };
            let (position_id, price) = match event {
                TradeEvent::Entry {
                    position_id, price, ..
                }
                | TradeEvent::Exit {
                    position_id, price, ..
                } => (*position_id, *price),
            };
            tx.execute(
                "INSERT INTO trade_events
                 (stream, bar_index, action, position_id, direction, price, order_name, pnl, reason)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    stream,
                    event.bar_index() as i64,
                    event.kind().as_str(),
                    position_id as i64,
                    event.direction().as_str(),
                    price,
                    order_name,
                    pnl,
                    event.reason()
                ],
            )
            .map_err(query_err)?;
        }

        for t in &batch.trades {
            tx.execute(
                "INSERT OR REPLACE INTO trades
                 (stream, position_id, entry_bar, exit_bar, direction, exit_direction, entry_price,
                  exit_price, entry_reason, exit_reason, order_name, pnl, direction_mismatch)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
                params![
                    stream,
                    t.position_id as i64,
                    t.entry_bar as i64,
                    t.exit_bar as i64,
                    t.direction.as_str(),
                    t.exit_direction.as_str(),
                    t.entry_price,
                    t.exit_price,
                    t.entry_reason,
                    t.exit_reason,
                    t.order_name,
                    t.pnl,
                    t.direction_mismatch
                ],
            )
            .map_err(query_err)?;
        }

        tx.commit().map_err(query_err)?;
        Ok(())
    }

    fn query_trades(
        &self,
        stream: Option<&str>,
        filter: &TradeFilter,
    ) -> Result<Vec<MatchedTrade>, TrendgateError> {
        let mut clauses: Vec<&str> = Vec::new();
        let mut args: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(stream) = stream {
            clauses.push("stream = ?");
            args.push(Box::new(stream.to_string()));
        }
        if let Some(reason) = &filter.entry_reason {
            clauses.push("entry_reason = ?");
            args.push(Box::new(reason.clone()));
        }
        if let Some(direction) = filter.direction {
            clauses.push("direction = ?");
            args.push(Box::new(direction.as_str()));
        }
        if filter.mismatch_only {
            clauses.push("direction_mismatch = 1");
        }

        let mut sql = String::from(
            "SELECT position_id, entry_bar, exit_bar, direction, exit_direction, entry_price,
                    exit_price, entry_reason, exit_reason, order_name, pnl, direction_mismatch
             FROM trades",
        );
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY exit_bar DESC, position_id DESC");
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql).map_err(query_err)?;
        let rows = stmt
            .query_map(params_from_iter(args.iter()), |row| {
                Ok(MatchedTrade {
                    position_id: row.get::<_, i64>(0)? as u64,
                    entry_bar: row.get::<_, i64>(1)? as u64,
                    exit_bar: row.get::<_, i64>(2)? as u64,
                    direction: parse_direction(3, row.get(3)?)?,
                    exit_direction: parse_direction(4, row.get(4)?)?,
                    entry_price: row.get(5)?,
                    exit_price: row.get(6)?,
                    entry_reason: row.get(7)?,
                    exit_reason: row.get(8)?,
                    order_name: row.get(9)?,
                    pnl: row.get(10)?,
                    direction_mismatch: row.get(11)?,
                })
            })
            .map_err(query_err)?;

        let mut trades = rows.collect::<Result<Vec<_>, _>>().map_err(query_err)?;
        trades.reverse();
        Ok(trades)
    }

    fn entry_reason_counts(&self, stream: Option<&str>) -> Result<Vec<(String, usize)>, TrendgateError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT entry_reason, COUNT(*) FROM trades
                 WHERE ?1 IS NULL OR stream = ?1
                 GROUP BY entry_reason ORDER BY COUNT(*) DESC, entry_reason ASC",
            )
            .map_err(query_err)?;
        let rows = stmt
            .query_map(params![stream], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
            })
            .map_err(query_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(query_err)
    }

    fn clear_stream(&self, stream: &str) -> Result<(), TrendgateError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;
        tx.execute("DELETE FROM trade_events WHERE stream = ?1", params![stream])
            .map_err(query_err)?;
        tx.execute("DELETE FROM trades WHERE stream = ?1", params![stream])
            .map_err(query_err)?;
        tx.commit().map_err(query_err)?;
        Ok(())
    }
}
