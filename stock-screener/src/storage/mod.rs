//! Append-only observation store using SQLite.
//!
//! Persists one row per fetched bar: OHLCV, the exchange time zone and the
//! bucket alignment flags. Rows are never updated or deleted here. With
//! `unique_observations` on, a second bar for the same (symbol, timestamp)
//! is reported as a duplicate instead of being stored twice.

pub mod buckets;

pub use buckets::{Bucket, BucketFlags, BucketUnit, BUCKETS, BUCKET_COUNT};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection};
use screener_common::StorageConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::data::Bar;

// ============================================================================
// Database Schema
// ============================================================================

const TABLE: &str = "stock_observations";

/// Non-flag columns written on insert, in bind order.
const BASE_COLUMNS: [&str; 8] = [
    "symbol",
    "price_open",
    "price_high",
    "price_low",
    "price_close",
    "volume",
    "timestamp",
    "timezone",
];

fn flag_columns() -> Vec<&'static str> {
    BUCKETS.iter().map(|b| b.column).collect()
}

fn schema_sql(unique_observations: bool) -> String {
    let flag_defs: String = flag_columns()
        .iter()
        .map(|c| format!("    {} INTEGER NOT NULL DEFAULT 0,\n", c))
        .collect();
    let unique = if unique_observations { "UNIQUE " } else { "" };

    format!(
        r#"
CREATE TABLE IF NOT EXISTS {table} (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    symbol TEXT NOT NULL,
    price_open REAL NOT NULL,
    price_high REAL NOT NULL,
    price_low REAL NOT NULL,
    price_close REAL NOT NULL,
    volume REAL NOT NULL,
    timestamp TEXT NOT NULL,
    timezone TEXT,
{flag_defs}    created_at TEXT DEFAULT CURRENT_TIMESTAMP
);

CREATE INDEX IF NOT EXISTS idx_{table}_symbol_flags
ON {table}(symbol, {flags});

CREATE {unique}INDEX IF NOT EXISTS idx_{table}_symbol_ts
ON {table}(symbol, timestamp);

CREATE INDEX IF NOT EXISTS idx_{table}_symbol
ON {table}(symbol);
"#,
        table = TABLE,
        flag_defs = flag_defs,
        flags = flag_columns().join(", "),
        unique = unique,
    )
}

fn insert_sql(unique_observations: bool) -> String {
    let columns: Vec<&str> = BASE_COLUMNS.iter().copied().chain(flag_columns()).collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
    let verb = if unique_observations {
        "INSERT OR IGNORE"
    } else {
        "INSERT"
    };
    format!(
        "{} INTO {} ({}) VALUES ({})",
        verb,
        TABLE,
        columns.join(", "),
        placeholders.join(", ")
    )
}

fn select_sql() -> String {
    let columns: Vec<&str> = BASE_COLUMNS.iter().copied().chain(flag_columns()).collect();
    format!(
        "SELECT {} FROM {} WHERE symbol = ?1 ORDER BY timestamp ASC, id ASC",
        columns.join(", "),
        TABLE
    )
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

// ============================================================================
// Types
// ============================================================================

/// A persisted bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredObservation {
    pub symbol: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub timestamp: DateTime<Utc>,
    pub timezone: Option<String>,
    pub flags: BucketFlags,
}

impl StoredObservation {
    /// Build the row for `bar`, deriving bucket flags from its time zone.
    pub fn from_bar(bar: &Bar) -> Self {
        Self {
            symbol: bar.symbol.clone(),
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
            timestamp: bar.timestamp,
            timezone: bar.timezone.clone(),
            flags: BucketFlags::for_timestamp(bar.timestamp, bar.timezone.as_deref()),
        }
    }

    fn bind_values(&self) -> Vec<Value> {
        let mut values = vec![
            Value::Text(self.symbol.clone()),
            Value::Real(self.open),
            Value::Real(self.high),
            Value::Real(self.low),
            Value::Real(self.close),
            Value::Real(self.volume),
            Value::Text(format_timestamp(self.timestamp)),
            self.timezone.clone().map(Value::Text).unwrap_or(Value::Null),
        ];
        values.extend(
            self.flags
                .as_array()
                .iter()
                .map(|&set| Value::Integer(i64::from(set))),
        );
        values
    }
}

/// Result of a single append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Inserted,
    /// Same (symbol, timestamp) already stored
    Duplicate,
}

/// Totals from a batch append.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendSummary {
    pub inserted: usize,
    pub duplicates: usize,
}

/// Observation store configuration.
#[derive(Debug, Clone)]
pub struct ObservationStoreConfig {
    /// Path to SQLite database
    pub db_path: PathBuf,
    /// Reject a second row for the same (symbol, timestamp)
    pub unique_observations: bool,
}

impl From<&StorageConfig> for ObservationStoreConfig {
    fn from(config: &StorageConfig) -> Self {
        Self {
            db_path: config.db_path.clone(),
            unique_observations: config.unique_observations,
        }
    }
}

/// Store statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreStats {
    pub observations: u64,
    pub unique_symbols: u64,
    pub first_timestamp: Option<String>,
    pub last_timestamp: Option<String>,
    pub db_size_bytes: u64,
}

impl std::fmt::Display for StoreStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "ObservationStore: {} observations ({} symbols, {:.2} MB)",
            self.observations,
            self.unique_symbols,
            self.db_size_bytes as f64 / (1024.0 * 1024.0)
        )
    }
}

// ============================================================================
// Observation Store
// ============================================================================

/// SQLite-backed append-only store.
pub struct ObservationStore {
    db: Arc<Mutex<Connection>>,
    insert_sql: String,
    db_path: Option<PathBuf>,
}

impl ObservationStore {
    /// Open (creating if needed) the database at `config.db_path`.
    pub fn new(config: ObservationStoreConfig) -> Result<Self> {
        if let Some(parent) = config.db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&config.db_path)
            .context("Failed to open observation database")?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .context("Failed to set database pragmas")?;

        let store = Self::with_connection(conn, config.unique_observations)?;
        info!(
            db_path = %config.db_path.display(),
            unique = config.unique_observations,
            "Initialized observation store"
        );
        Ok(Self {
            db_path: Some(config.db_path),
            ..store
        })
    }

    /// In-memory store, for tests and dry runs.
    pub fn in_memory(unique_observations: bool) -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::with_connection(conn, unique_observations)
    }

    fn with_connection(conn: Connection, unique_observations: bool) -> Result<Self> {
        conn.execute_batch(&schema_sql(unique_observations))
            .context("Failed to create observation table")?;

        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
            insert_sql: insert_sql(unique_observations),
            db_path: None,
        })
    }

    /// Append one observation.
    pub async fn append(&self, observation: &StoredObservation) -> Result<AppendOutcome> {
        let db = self.db.lock().await;
        let changed = db
            .execute(&self.insert_sql, params_from_iter(observation.bind_values()))
            .with_context(|| format!("Failed to insert observation for {}", observation.symbol))?;

        Ok(if changed == 0 {
            AppendOutcome::Duplicate
        } else {
            AppendOutcome::Inserted
        })
    }

    /// Append observations in one transaction.
    pub async fn append_batch(&self, observations: &[StoredObservation]) -> Result<AppendSummary> {
        let mut summary = AppendSummary::default();
        if observations.is_empty() {
            return Ok(summary);
        }

        let mut db = self.db.lock().await;
        let tx = db.transaction().context("Failed to begin transaction")?;
        {
            let mut stmt = tx.prepare_cached(&self.insert_sql)?;
            for observation in observations {
                let changed = stmt
                    .execute(params_from_iter(observation.bind_values()))
                    .with_context(|| {
                        format!("Failed to insert observation for {}", observation.symbol)
                    })?;
                if changed == 0 {
                    summary.duplicates += 1;
                } else {
                    summary.inserted += 1;
                }
            }
        }
        tx.commit().context("Failed to commit observations")?;

        debug!(
            symbol = %observations[0].symbol,
            inserted = summary.inserted,
            duplicates = summary.duplicates,
            "Appended observations"
        );
        Ok(summary)
    }

    pub async fn count(&self) -> Result<u64> {
        let db = self.db.lock().await;
        let count: i64 = db.query_row(&format!("SELECT COUNT(*) FROM {}", TABLE), [], |row| {
            row.get(0)
        })?;
        Ok(count as u64)
    }

    pub async fn count_for_symbol(&self, symbol: &str) -> Result<u64> {
        let db = self.db.lock().await;
        let count: i64 = db.query_row(
            &format!("SELECT COUNT(*) FROM {} WHERE symbol = ?1", TABLE),
            params![symbol],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// All observations for `symbol`, oldest first.
    pub async fn observations_for_symbol(&self, symbol: &str) -> Result<Vec<StoredObservation>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(&select_sql())?;
        let rows = stmt.query_map(params![symbol], Self::row_to_observation)?;
        let observations = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(observations)
    }

    fn row_to_observation(row: &rusqlite::Row) -> rusqlite::Result<StoredObservation> {
        let timestamp_str: String = row.get(6)?;
        let timestamp = DateTime::parse_from_rfc3339(&timestamp_str)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, Type::Text, Box::new(e)))?;

        let mut flags = [false; BUCKET_COUNT];
        for (i, flag) in flags.iter_mut().enumerate() {
            *flag = row.get(BASE_COLUMNS.len() + i)?;
        }

        Ok(StoredObservation {
            symbol: row.get(0)?,
            open: row.get(1)?,
            high: row.get(2)?,
            low: row.get(3)?,
            close: row.get(4)?,
            volume: row.get(5)?,
            timestamp,
            timezone: row.get(7)?,
            flags: BucketFlags::from_array(flags),
        })
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        let db = self.db.lock().await;

        let (observations, unique_symbols, first_timestamp, last_timestamp): (
            i64,
            i64,
            Option<String>,
            Option<String>,
        ) = db.query_row(
            &format!(
                "SELECT COUNT(*), COUNT(DISTINCT symbol), MIN(timestamp), MAX(timestamp) FROM {}",
                TABLE
            ),
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )?;

        let db_size_bytes = self
            .db_path
            .as_ref()
            .and_then(|p| std::fs::metadata(p).ok())
            .map(|m| m.len())
            .unwrap_or(0);

        Ok(StoreStats {
            observations: observations as u64,
            unique_symbols: unique_symbols as u64,
            first_timestamp,
            last_timestamp,
            db_size_bytes,
        })
    }
}
