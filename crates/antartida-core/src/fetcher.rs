//! Fetch strategies over the two-step protocol.
//!
//! | Strategy | Requests | Notes |
//! |----------|----------|-------|
//! | [`NaiveFetcher`] | one | rejects spans over 31 days |
//! | [`SerialFetcher`] | one per window, in order | output sorted by construction |
//! | [`ConcurrentFetcher`] | one per window, chunked | chunks run one after another |
//!
//! Every strategy validates the request against its [`StationCatalog`] before any I/O and
//! opens exactly one session per `timeseries` call.

use std::future::Future;
use std::num::NonZeroUsize;
use std::pin::Pin;
use std::sync::Arc;

use futures::future::try_join_all;
use time::Duration;
use tracing::Instrument;

use crate::http_client::{HttpAuth, SessionFactory};
use crate::protocol::{FetchContext, TwoStepFetch};
use crate::windows::{windows, WindowPolicy, DEFAULT_BOUNDARY_OFFSET};
use crate::{
    DateWindow, FetchError, StationCatalog, StationMetadata, UtcDateTime, WeatherPoint,
    WeatherSeries,
};

/// Boxed future returned by [`WeatherDataFetcher`] methods.
pub type FetcherFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, FetchError>> + Send + 'a>>;

/// Longest span [`NaiveFetcher`] sends as a single request.
pub const NAIVE_MAX_SPAN: Duration = Duration::days(31);

/// Source of station time series.
///
/// `station` is always the catalog name, never the provider identifier.
pub trait WeatherDataFetcher: Send + Sync {
    /// Names of all known stations.
    fn stations<'a>(&'a self) -> FetcherFuture<'a, Vec<String>>;

    /// Validity range of `station`.
    fn time_range<'a>(
        &'a self,
        station: &'a str,
    ) -> FetcherFuture<'a, (UtcDateTime, UtcDateTime)>;

    /// Checks, in order: the station exists, `date_f >= date_0`, `date_0` is not below the
    /// station minimum and `date_f` is not above its maximum.
    fn validate_range<'a>(
        &'a self,
        date_0: UtcDateTime,
        date_f: UtcDateTime,
        station: &'a str,
    ) -> FetcherFuture<'a, ()>;

    fn timeseries<'a>(
        &'a self,
        date_0: UtcDateTime,
        date_f: UtcDateTime,
        station: &'a str,
    ) -> FetcherFuture<'a, WeatherSeries>;
}

macro_rules! forward_fetcher {
    ($wrapper:ty) => {
        impl<T: WeatherDataFetcher + ?Sized> WeatherDataFetcher for $wrapper {
            fn stations<'a>(&'a self) -> FetcherFuture<'a, Vec<String>> {
                (**self).stations()
            }

            fn time_range<'a>(
                &'a self,
                station: &'a str,
            ) -> FetcherFuture<'a, (UtcDateTime, UtcDateTime)> {
                (**self).time_range(station)
            }

            fn validate_range<'a>(
                &'a self,
                date_0: UtcDateTime,
                date_f: UtcDateTime,
                station: &'a str,
            ) -> FetcherFuture<'a, ()> {
                (**self).validate_range(date_0, date_f, station)
            }

            fn timeseries<'a>(
                &'a self,
                date_0: UtcDateTime,
                date_f: UtcDateTime,
                station: &'a str,
            ) -> FetcherFuture<'a, WeatherSeries> {
                (**self).timeseries(date_0, date_f, station)
            }
        }
    };
}

forward_fetcher!(Box<T>);
forward_fetcher!(Arc<T>);

/// Catalog lookup plus range validation shared by every fetcher.
pub fn validate_against<'c>(
    catalog: &'c StationCatalog,
    date_0: UtcDateTime,
    date_f: UtcDateTime,
    station: &str,
) -> Result<&'c StationMetadata, FetchError> {
    let metadata = catalog
        .get(station)
        .ok_or_else(|| FetchError::StationNotFound {
            station: station.to_owned(),
        })?;

    if date_f < date_0 {
        return Err(FetchError::DateRange { date_0, date_f });
    }
    if date_0 < metadata.valid_from {
        return Err(FetchError::BelowMinimum {
            requested: date_0,
            minimum: metadata.valid_from,
        });
    }
    if date_f > metadata.valid_to {
        return Err(FetchError::AboveMaximum {
            requested: date_f,
            maximum: metadata.valid_to,
        });
    }
    Ok(metadata)
}

/// What every provider-backed strategy needs: stations, protocol, sessions and credential.
#[derive(Clone)]
pub struct ProviderAccess<P> {
    catalog: StationCatalog,
    protocol: P,
    sessions: Arc<dyn SessionFactory>,
    auth: HttpAuth,
}

impl<P: TwoStepFetch> ProviderAccess<P> {
    pub fn new(
        catalog: StationCatalog,
        protocol: P,
        sessions: Arc<dyn SessionFactory>,
        auth: HttpAuth,
    ) -> Self {
        Self {
            catalog,
            protocol,
            sessions,
            auth,
        }
    }

    pub fn catalog(&self) -> &StationCatalog {
        &self.catalog
    }

    pub fn protocol(&self) -> &P {
        &self.protocol
    }

    fn open_context(&self) -> Result<FetchContext, FetchError> {
        let session = self
            .sessions
            .open_session()
            .map_err(|source| FetchError::Transport {
                uri: String::from("<session>"),
                source,
            })?;
        Ok(FetchContext::new(session, self.auth.clone()))
    }

    fn time_range(&self, station: &str) -> Result<(UtcDateTime, UtcDateTime), FetchError> {
        self.catalog
            .get(station)
            .map(|metadata| (metadata.valid_from, metadata.valid_to))
            .ok_or_else(|| FetchError::StationNotFound {
                station: station.to_owned(),
            })
    }
}

async fn within_deadline<T>(
    deadline: Option<std::time::Duration>,
    work: impl Future<Output = Result<T, FetchError>>,
) -> Result<T, FetchError> {
    match deadline {
        None => work.await,
        Some(limit) => tokio::time::timeout(limit, work).await.map_err(|_| {
            FetchError::DeadlineExceeded {
                timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
            }
        })?,
    }
}

fn clamp(points: Vec<WeatherPoint>, date_0: UtcDateTime, date_f: UtcDateTime) -> WeatherSeries {
    points
        .into_iter()
        .filter(|point| point.timestamp >= date_0 && point.timestamp <= date_f)
        .collect()
}

macro_rules! provider_fetcher_metadata {
    () => {
        fn stations<'a>(&'a self) -> FetcherFuture<'a, Vec<String>> {
            Box::pin(async move { Ok(self.access.catalog().names()) })
        }

        fn time_range<'a>(
            &'a self,
            station: &'a str,
        ) -> FetcherFuture<'a, (UtcDateTime, UtcDateTime)> {
            Box::pin(async move { self.access.time_range(station) })
        }

        fn validate_range<'a>(
            &'a self,
            date_0: UtcDateTime,
            date_f: UtcDateTime,
            station: &'a str,
        ) -> FetcherFuture<'a, ()> {
            Box::pin(async move {
                validate_against(self.access.catalog(), date_0, date_f, station).map(|_| ())
            })
        }
    };
}

/// One two-step fetch over the whole range.
#[derive(Clone)]
pub struct NaiveFetcher<P> {
    access: ProviderAccess<P>,
    max_span: Duration,
}

impl<P: TwoStepFetch> NaiveFetcher<P> {
    pub fn new(access: ProviderAccess<P>) -> Self {
        Self {
            access,
            max_span: NAIVE_MAX_SPAN,
        }
    }
}

impl<P: TwoStepFetch> WeatherDataFetcher for NaiveFetcher<P> {
    provider_fetcher_metadata!();

    fn timeseries<'a>(
        &'a self,
        date_0: UtcDateTime,
        date_f: UtcDateTime,
        station: &'a str,
    ) -> FetcherFuture<'a, WeatherSeries> {
        Box::pin(
            async move {
                let metadata = validate_against(self.access.catalog(), date_0, date_f, station)?;
                if date_f - date_0 > self.max_span {
                    return Err(FetchError::UnsupportedRange {
                        days: (date_f - date_0).whole_days(),
                        limit_days: self.max_span.whole_days(),
                    });
                }

                let ctx = self.access.open_context()?;
                let points = self
                    .access
                    .protocol()
                    .fetch(&ctx, DateWindow::new(date_0, date_f), &metadata.station_id)
                    .await?;

                let mut series = WeatherSeries::new(points);
                series.sort();
                tracing::info!(points = series.len(), "series fetched");
                Ok(series)
            }
            .instrument(tracing::info_span!("timeseries", strategy = "naive", station)),
        )
    }
}

/// One fetch per window, strictly in window order.
#[derive(Clone)]
pub struct SerialFetcher<P> {
    access: ProviderAccess<P>,
    policy: WindowPolicy,
    offset: Duration,
    deadline: Option<std::time::Duration>,
}

impl<P: TwoStepFetch> SerialFetcher<P> {
    pub fn new(access: ProviderAccess<P>) -> Self {
        Self {
            access,
            policy: WindowPolicy::default(),
            offset: DEFAULT_BOUNDARY_OFFSET,
            deadline: None,
        }
    }

    pub fn with_policy(mut self, policy: WindowPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_offset(mut self, offset: Duration) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_deadline(mut self, deadline: std::time::Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

impl<P: TwoStepFetch> WeatherDataFetcher for SerialFetcher<P> {
    provider_fetcher_metadata!();

    fn timeseries<'a>(
        &'a self,
        date_0: UtcDateTime,
        date_f: UtcDateTime,
        station: &'a str,
    ) -> FetcherFuture<'a, WeatherSeries> {
        Box::pin(
            async move {
                let metadata = validate_against(self.access.catalog(), date_0, date_f, station)?;
                let boundaries = self.policy.boundaries(date_0, date_f)?;
                let windows = windows(&boundaries, self.offset)?;
                tracing::debug!(windows = windows.len(), "fetching windows serially");

                let ctx = self.access.open_context()?;
                let work = async {
                    let mut points = Vec::new();
                    for window in windows {
                        let batch = self
                            .access
                            .protocol()
                            .fetch(&ctx, window, &metadata.station_id)
                            .await?;
                        points.extend(batch);
                    }
                    Ok::<_, FetchError>(points)
                };
                let points = within_deadline(self.deadline, work).await?;

                let series = clamp(points, date_0, date_f);
                tracing::info!(points = series.len(), "series fetched");
                Ok(series)
            }
            .instrument(tracing::info_span!("timeseries", strategy = "serial", station)),
        )
    }
}

/// Windows fetched in concurrent chunks of at most `max_concurrent` requests.
///
/// A chunk fails as a whole if any of its fetches fails. Output keeps chunk order and
/// submission order within a chunk, and may contain boundary duplicates; callers that need
/// unique timestamps use [`WeatherSeries::dedup_by_timestamp`].
#[derive(Clone)]
pub struct ConcurrentFetcher<P> {
    access: ProviderAccess<P>,
    policy: WindowPolicy,
    offset: Duration,
    max_concurrent: NonZeroUsize,
    deadline: Option<std::time::Duration>,
}

impl<P: TwoStepFetch> ConcurrentFetcher<P> {
    pub fn new(access: ProviderAccess<P>, max_concurrent: NonZeroUsize) -> Self {
        Self {
            access,
            policy: WindowPolicy::default(),
            offset: DEFAULT_BOUNDARY_OFFSET,
            max_concurrent,
            deadline: None,
        }
    }

    pub fn with_policy(mut self, policy: WindowPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_offset(mut self, offset: Duration) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_deadline(mut self, deadline: std::time::Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

impl<P: TwoStepFetch> WeatherDataFetcher for ConcurrentFetcher<P> {
    provider_fetcher_metadata!();

    fn timeseries<'a>(
        &'a self,
        date_0: UtcDateTime,
        date_f: UtcDateTime,
        station: &'a str,
    ) -> FetcherFuture<'a, WeatherSeries> {
        Box::pin(
            async move {
                let metadata = validate_against(self.access.catalog(), date_0, date_f, station)?;
                let boundaries = self.policy.boundaries(date_0, date_f)?;
                let windows = windows(&boundaries, self.offset)?;
                let chunk_size = self.max_concurrent.get().min(windows.len()).max(1);
                tracing::debug!(
                    windows = windows.len(),
                    chunk_size,
                    "fetching windows concurrently"
                );

                let ctx = self.access.open_context()?;
                let station_id = metadata.station_id.as_str();
                let work = async {
                    let mut points = Vec::new();
                    for (index, chunk) in windows.chunks(chunk_size).enumerate() {
                        let batches = try_join_all(chunk.iter().map(|window| {
                            self.access.protocol().fetch(&ctx, *window, station_id)
                        }))
                        .await?;
                        tracing::debug!(chunk = index, requests = chunk.len(), "chunk fetched");
                        points.extend(batches.into_iter().flatten());
                    }
                    Ok::<_, FetchError>(points)
                };
                let points = within_deadline(self.deadline, work).await?;

                let series = clamp(points, date_0, date_f);
                tracing::info!(points = series.len(), "series fetched");
                Ok(series)
            }
            .instrument(tracing::info_span!("timeseries", strategy = "concurrent", station)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Month;

    fn catalog() -> StationCatalog {
        StationCatalog::builtin()
    }

    fn ts(value: &str) -> UtcDateTime {
        UtcDateTime::parse(value).expect("timestamp")
    }

    #[test]
    fn validation_order_is_station_then_range_then_bounds() {
        let catalog = catalog();
        let name = "Meteo Station Juan Carlos I";
        let check = |date_0: &str, date_f: &str, station: &str| {
            validate_against(&catalog, ts(date_0), ts(date_f), station).map(|_| ())
        };

        let error = check("2019-01-01T00:00:00Z", "2018-01-01T00:00:00Z", "nowhere")
            .expect_err("unknown station");
        assert!(matches!(error, FetchError::StationNotFound { .. }));

        let error = check("2019-01-01T00:00:00Z", "2018-01-01T00:00:00Z", name)
            .expect_err("inverted");
        assert!(matches!(error, FetchError::DateRange { .. }));

        let error = check("2019-01-01T00:00:00Z", "2025-01-01T00:00:00Z", name)
            .expect_err("below");
        assert!(matches!(error, FetchError::BelowMinimum { .. }));

        let error = check("2021-01-01T00:00:00Z", "2025-01-01T00:00:00Z", name)
            .expect_err("above");
        assert!(matches!(error, FetchError::AboveMaximum { .. }));
    }

    #[test]
    fn validation_accepts_the_full_station_range() {
        let catalog = catalog();
        let from = UtcDateTime::from_ymd(2020, Month::January, 1).expect("from");
        let to = UtcDateTime::from_ymd(2024, Month::January, 1).expect("to");

        let metadata = validate_against(&catalog, from, to, "Meteo Station Gabriel de Castilla")
            .expect("valid");
        assert_eq!(metadata.station_id, "89070");
    }

    #[test]
    fn clamp_keeps_inclusive_range() {
        let base = ts("2023-01-01T00:00:00Z");
        let points = (0..5)
            .map(|i| WeatherPoint::missing(base + Duration::minutes(i * 10)))
            .collect();

        let series = clamp(points, ts("2023-01-01T00:10:00Z"), ts("2023-01-01T00:30:00Z"));

        assert_eq!(series.len(), 3);
    }
}
