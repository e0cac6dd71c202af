//! # Antartida Warehouse
//!
//! DuckDB-backed point store for weather-station readings.
//!
//! One table, `datapoints`, keyed by `(ts, station)`. Rows are written once through
//! [`Warehouse::insert_points`] and read back by station and inclusive time range through
//! [`Warehouse::load_points`]. Missing or non-finite readings are written with the `"NaN"`
//! sentinel and come back as `f64::NAN`.
//!
//! ```rust,no_run
//! use antartida_warehouse::{PointRecord, Warehouse};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let warehouse = Warehouse::open_default()?;
//!     warehouse.insert_points(&[PointRecord {
//!         station: "89064".to_string(),
//!         ts: "2023-01-01 00:00:00".to_string(),
//!         wind_speed: 3.2,
//!         temperature: -1.5,
//!         pressure: f64::NAN,
//!     }])?;
//!
//!     let rows = warehouse.load_points("89064", "2023-01-01 00:00:00", "2023-01-02 00:00:00")?;
//!     println!("{} cached rows", rows.len());
//!     Ok(())
//! }
//! ```

pub mod duckdb;
pub mod migrations;

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use ::duckdb::{Connection, ToSql};
use thiserror::Error;

pub use crate::duckdb::{AccessMode, DuckDbConnectionManager, PooledConnection};

/// Token persisted in place of NaN and infinite readings.
pub const NAN_SENTINEL: &str = "NaN";

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum WarehouseError {
    /// `DuckDB` database error.
    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    /// I/O error while preparing the store directory.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A row could not be written or decoded.
    #[error("invalid point row: {0}")]
    InvalidRow(String),
}

/// Location and pool sizing of the point store.
#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    /// Root directory for antartida data.
    pub antartida_home: PathBuf,
    /// Path to the `DuckDB` database file.
    pub db_path: PathBuf,
    /// Idle connections kept per access mode.
    pub max_pool_size: usize,
}

impl WarehouseConfig {
    /// Store rooted at `home`, with the database at `<home>/cache/datapoints.duckdb`.
    pub fn under_home(home: impl Into<PathBuf>) -> Self {
        let antartida_home = home.into();
        let db_path = antartida_home.join("cache").join("datapoints.duckdb");
        Self {
            antartida_home,
            db_path,
            max_pool_size: 4,
        }
    }
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self::under_home(resolve_antartida_home())
    }
}

/// One persisted reading. `ts` uses the `YYYY-MM-DD HH:MM:SS` UTC form.
#[derive(Debug, Clone, PartialEq)]
pub struct PointRecord {
    pub station: String,
    pub ts: String,
    pub wind_speed: f64,
    pub temperature: f64,
    pub pressure: f64,
}

/// Persistent point store.
#[derive(Clone)]
pub struct Warehouse {
    config: WarehouseConfig,
    manager: DuckDbConnectionManager,
}

impl Warehouse {
    pub fn open_default() -> Result<Self, WarehouseError> {
        Self::open(WarehouseConfig::default())
    }

    /// Open (creating if needed) the store described by `config` and apply migrations.
    pub fn open(config: WarehouseConfig) -> Result<Self, WarehouseError> {
        if let Some(parent) = config.db_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let manager = DuckDbConnectionManager::open(config.db_path.clone(), config.max_pool_size)?;
        let warehouse = Self { config, manager };
        warehouse.initialize()?;
        Ok(warehouse)
    }

    pub fn initialize(&self) -> Result<(), WarehouseError> {
        let connection = self.manager.acquire(AccessMode::ReadWrite)?;
        migrations::apply_migrations(&connection)?;
        Ok(())
    }

    pub fn db_path(&self) -> &Path {
        self.manager.db_path()
    }

    pub fn config(&self) -> &WarehouseConfig {
        &self.config
    }

    /// Rows for `station` with `from <= ts <= to`, ascending by timestamp.
    pub fn load_points(
        &self,
        station: &str,
        from: &str,
        to: &str,
    ) -> Result<Vec<PointRecord>, WarehouseError> {
        let connection = self.manager.acquire(AccessMode::ReadOnly)?;
        let mut statement = connection.prepare(
            "SELECT strftime(ts, '%Y-%m-%d %H:%M:%S'), wind_speed, temperature, pressure \
             FROM datapoints \
             WHERE station = ? \
               AND ts BETWEEN TRY_CAST(? AS TIMESTAMP) AND TRY_CAST(? AS TIMESTAMP) \
             ORDER BY ts",
        )?;

        let params: [&dyn ToSql; 3] = [&station, &from, &to];
        let rows = statement.query_map(params.as_slice(), |row| {
            Ok(PointRecord {
                station: station.to_owned(),
                ts: row.get(0)?,
                wind_speed: decode_reading(row.get(1)?),
                temperature: decode_reading(row.get(2)?),
                pressure: decode_reading(row.get(3)?),
            })
        })?;

        let records = rows.collect::<Result<Vec<_>, _>>()?;
        tracing::debug!(station, from, to, rows = records.len(), "loaded cached points");
        Ok(records)
    }

    /// Insert `rows` in one transaction. Rows whose `(ts, station)` key already exists are
    /// ignored. Returns the number of rows actually written.
    pub fn insert_points(&self, rows: &[PointRecord]) -> Result<usize, WarehouseError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let connection = self.manager.acquire(AccessMode::ReadWrite)?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<usize, WarehouseError> {
            let mut statement = connection.prepare(
                "INSERT OR IGNORE INTO datapoints (ts, station, wind_speed, temperature, pressure) \
                 VALUES (TRY_CAST(? AS TIMESTAMP), ?, TRY_CAST(? AS DOUBLE), \
                         TRY_CAST(? AS DOUBLE), TRY_CAST(? AS DOUBLE))",
            )?;

            let mut written = 0;
            for row in rows {
                if row.ts.trim().is_empty() {
                    return Err(WarehouseError::InvalidRow(format!(
                        "empty timestamp for station '{}'",
                        row.station
                    )));
                }
                let wind_speed = encode_reading(row.wind_speed);
                let temperature = encode_reading(row.temperature);
                let pressure = encode_reading(row.pressure);
                let params: [&dyn ToSql; 5] =
                    [&row.ts, &row.station, &wind_speed, &temperature, &pressure];
                written += statement.execute(params.as_slice())?;
            }
            Ok(written)
        })();

        let written = finalize_transaction(&connection, result)?;
        tracing::debug!(requested = rows.len(), written, "inserted points");
        Ok(written)
    }

    /// Number of rows stored for `station`.
    pub fn point_count(&self, station: &str) -> Result<usize, WarehouseError> {
        let connection = self.manager.acquire(AccessMode::ReadOnly)?;
        let params: [&dyn ToSql; 1] = [&station];
        let count: i64 = connection.query_row(
            "SELECT COUNT(*) FROM datapoints WHERE station = ?",
            params.as_slice(),
            |row| row.get(0),
        )?;
        usize::try_from(count)
            .map_err(|_| WarehouseError::InvalidRow(format!("negative row count {count}")))
    }
}

/// Text form of a reading for the `TRY_CAST(? AS DOUBLE)` insert.
pub fn encode_reading(value: f64) -> String {
    if value.is_finite() {
        value.to_string()
    } else {
        String::from(NAN_SENTINEL)
    }
}

fn decode_reading(value: Option<f64>) -> f64 {
    value.unwrap_or(f64::NAN)
}

fn finalize_transaction<T>(
    connection: &Connection,
    result: Result<T, WarehouseError>,
) -> Result<T, WarehouseError> {
    match result {
        Ok(value) => {
            connection.execute_batch("COMMIT")?;
            Ok(value)
        }
        Err(error) => {
            let _ = connection.execute_batch("ROLLBACK");
            Err(error)
        }
    }
}

fn resolve_antartida_home() -> PathBuf {
    if let Some(path) = env::var_os("ANTARTIDA_HOME") {
        let path = PathBuf::from(path);
        if !path.as_os_str().is_empty() {
            return path;
        }
    }

    if let Some(home) = env::var_os("HOME") {
        return PathBuf::from(home).join(".antartida");
    }

    PathBuf::from(".antartida")
}
