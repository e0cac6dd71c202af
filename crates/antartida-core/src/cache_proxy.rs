//! Persistent cache in front of any [`WeatherDataFetcher`].
//!
//! A `timeseries` call loads what the store already holds for the range, asks the wrapped
//! fetcher only for the leading and trailing gaps, writes the newly fetched points back and
//! returns cached points followed by fetched points. Both halves stop at `date_f - offset`,
//! the last instant the store is read for.

use std::sync::{Arc, Mutex, PoisonError};

use antartida_warehouse::{PointRecord, Warehouse};
use time::Duration;
use tracing::Instrument;

use crate::fetcher::{FetcherFuture, WeatherDataFetcher};
use crate::windows::DEFAULT_BOUNDARY_OFFSET;
use crate::{FetchError, UtcDateTime, WeatherPoint, WeatherSeries};

/// Durable point storage keyed by `(timestamp, station)`.
pub trait PointStore: Send + Sync {
    /// Points of `station` with `from <= timestamp <= to`, ascending.
    fn load<'a>(
        &'a self,
        station: &'a str,
        from: UtcDateTime,
        to: UtcDateTime,
    ) -> FetcherFuture<'a, Vec<WeatherPoint>>;

    /// Bulk insert. Existing keys are left untouched. Returns rows written.
    fn insert<'a>(&'a self, station: &'a str, points: Vec<WeatherPoint>)
        -> FetcherFuture<'a, usize>;
}

/// [`PointStore`] over the DuckDB warehouse. Calls run on the blocking pool.
#[derive(Clone)]
pub struct DuckDbPointStore {
    warehouse: Warehouse,
}

impl DuckDbPointStore {
    pub fn new(warehouse: Warehouse) -> Self {
        Self { warehouse }
    }

    pub fn warehouse(&self) -> &Warehouse {
        &self.warehouse
    }
}

fn to_record(station: &str, point: &WeatherPoint) -> PointRecord {
    PointRecord {
        station: station.to_owned(),
        ts: point.timestamp.format_sql(),
        wind_speed: point.wind_speed,
        temperature: point.temperature,
        pressure: point.pressure,
    }
}

fn from_record(record: PointRecord) -> Result<WeatherPoint, FetchError> {
    let timestamp = UtcDateTime::parse_lenient(&record.ts)
        .map_err(|error| FetchError::Store(error.to_string()))?;
    Ok(WeatherPoint::new(
        timestamp,
        record.temperature,
        record.pressure,
        record.wind_speed,
    ))
}

impl PointStore for DuckDbPointStore {
    fn load<'a>(
        &'a self,
        station: &'a str,
        from: UtcDateTime,
        to: UtcDateTime,
    ) -> FetcherFuture<'a, Vec<WeatherPoint>> {
        Box::pin(async move {
            let warehouse = self.warehouse.clone();
            let station = station.to_owned();
            let records = tokio::task::spawn_blocking(move || {
                warehouse.load_points(&station, &from.format_sql(), &to.format_sql())
            })
            .await
            .map_err(|error| FetchError::Store(format!("store task failed: {error}")))??;

            records.into_iter().map(from_record).collect()
        })
    }

    fn insert<'a>(
        &'a self,
        station: &'a str,
        points: Vec<WeatherPoint>,
    ) -> FetcherFuture<'a, usize> {
        Box::pin(async move {
            let warehouse = self.warehouse.clone();
            let records: Vec<PointRecord> =
                points.iter().map(|point| to_record(station, point)).collect();
            let written = tokio::task::spawn_blocking(move || warehouse.insert_points(&records))
                .await
                .map_err(|error| FetchError::Store(format!("store task failed: {error}")))??;
            Ok(written)
        })
    }
}

/// In-process [`PointStore`]. Writes can be switched to fail.
#[derive(Debug, Clone, Default)]
pub struct MemoryPointStore {
    rows: Arc<Mutex<Vec<(String, WeatherPoint)>>>,
    reject_writes: bool,
}

impl MemoryPointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose inserts always fail.
    pub fn read_only() -> Self {
        Self {
            reject_writes: true,
            ..Self::default()
        }
    }

    /// Seed rows directly, bypassing the write switch.
    pub fn seed(&self, station: &str, points: impl IntoIterator<Item = WeatherPoint>) {
        let mut rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        for point in points {
            let exists = rows
                .iter()
                .any(|(s, p)| s == station && p.timestamp == point.timestamp);
            if !exists {
                rows.push((station.to_owned(), point));
            }
        }
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PointStore for MemoryPointStore {
    fn load<'a>(
        &'a self,
        station: &'a str,
        from: UtcDateTime,
        to: UtcDateTime,
    ) -> FetcherFuture<'a, Vec<WeatherPoint>> {
        Box::pin(async move {
            let rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
            let mut points: Vec<WeatherPoint> = rows
                .iter()
                .filter(|(s, p)| s == station && p.timestamp >= from && p.timestamp <= to)
                .map(|(_, p)| *p)
                .collect();
            points.sort();
            Ok(points)
        })
    }

    fn insert<'a>(
        &'a self,
        station: &'a str,
        points: Vec<WeatherPoint>,
    ) -> FetcherFuture<'a, usize> {
        Box::pin(async move {
            if self.reject_writes {
                return Err(FetchError::Store(String::from("store is read-only")));
            }
            let before = self.len();
            self.seed(station, points);
            Ok(self.len() - before)
        })
    }
}

/// Cache proxy over a wrapped fetcher and a point store.
#[derive(Clone)]
pub struct CacheProxyFetcher<F, S> {
    inner: F,
    store: S,
    offset: Duration,
}

impl<F: WeatherDataFetcher, S: PointStore> CacheProxyFetcher<F, S> {
    pub fn new(inner: F, store: S) -> Self {
        Self {
            inner,
            store,
            offset: DEFAULT_BOUNDARY_OFFSET,
        }
    }

    pub fn with_offset(mut self, offset: Duration) -> Self {
        self.offset = offset;
        self
    }

    pub fn inner(&self) -> &F {
        &self.inner
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    async fn fetch_gap(
        &self,
        from: UtcDateTime,
        to: UtcDateTime,
        station: &str,
    ) -> Result<Vec<WeatherPoint>, FetchError> {
        if to <= from {
            return Ok(Vec::new());
        }
        tracing::debug!(from = %from, to = %to, "fetching gap");
        Ok(self.inner.timeseries(from, to, station).await?.into_points())
    }

    async fn cached_timeseries(
        &self,
        date_0: UtcDateTime,
        date_f: UtcDateTime,
        station: &str,
    ) -> Result<WeatherSeries, FetchError> {
        self.inner.validate_range(date_0, date_f, station).await?;

        // The store is read up to `date_f - offset`. Fetched points after that instant are
        // dropped as well, so a repeated query serves exactly the same points.
        let upper = date_f.checked_sub(self.offset);
        let cached = match upper {
            Some(upper) if upper >= date_0 => self.store.load(station, date_0, upper).await?,
            _ => Vec::new(),
        };
        let served_to = upper.map_or(date_0, |upper| upper.max(date_0));
        tracing::debug!(rows = cached.len(), "loaded points from store");

        let cached_span = cached
            .first()
            .zip(cached.last())
            .map(|(first, last)| (first.timestamp, last.timestamp));

        let mut fetched = match cached_span {
            None => {
                tracing::debug!("store has no points for the range, delegating all of it");
                self.inner.timeseries(date_0, date_f, station).await?.into_points()
            }
            Some((sql_min, sql_max)) => {
                let mut fetched = self.fetch_gap(date_0, sql_min, station).await?;
                if let Some(resume) = sql_max.checked_add(self.offset) {
                    fetched.extend(self.fetch_gap(resume, date_f, station).await?);
                }
                fetched
            }
        };
        fetched.retain(|point| point.timestamp <= served_to);

        if !fetched.is_empty() {
            let to_insert: Vec<WeatherPoint> = match cached_span {
                None => fetched.clone(),
                Some((sql_min, sql_max)) => fetched
                    .iter()
                    .filter(|point| point.timestamp < sql_min || point.timestamp > sql_max)
                    .copied()
                    .collect(),
            };
            let requested = to_insert.len();
            match self.store.insert(station, to_insert).await {
                Ok(written) => tracing::debug!(requested, written, "points inserted"),
                Err(error) => tracing::warn!(
                    error = %error,
                    requested,
                    "store write failed, returning fetched points anyway"
                ),
            }
        }

        tracing::info!(
            cached = cached.len(),
            fetched = fetched.len(),
            "cache proxy served series"
        );

        let mut series = WeatherSeries::new(cached);
        series.extend(fetched);
        Ok(series)
    }
}

impl<F: WeatherDataFetcher, S: PointStore> WeatherDataFetcher for CacheProxyFetcher<F, S> {
    fn stations<'a>(&'a self) -> FetcherFuture<'a, Vec<String>> {
        self.inner.stations()
    }

    fn time_range<'a>(
        &'a self,
        station: &'a str,
    ) -> FetcherFuture<'a, (UtcDateTime, UtcDateTime)> {
        self.inner.time_range(station)
    }

    fn validate_range<'a>(
        &'a self,
        date_0: UtcDateTime,
        date_f: UtcDateTime,
        station: &'a str,
    ) -> FetcherFuture<'a, ()> {
        self.inner.validate_range(date_0, date_f, station)
    }

    fn timeseries<'a>(
        &'a self,
        date_0: UtcDateTime,
        date_f: UtcDateTime,
        station: &'a str,
    ) -> FetcherFuture<'a, WeatherSeries> {
        Box::pin(
            self.cached_timeseries(date_0, date_f, station)
                .instrument(tracing::info_span!("cache_proxy", station)),
        )
    }
}
