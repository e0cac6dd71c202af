//! In-memory stand-ins for the provider, used by tests and offline runs.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::fetcher::{validate_against, FetcherFuture, WeatherDataFetcher};
use crate::protocol::{FetchContext, FetchFuture, TwoStepFetch};
use crate::{
    DateWindow, FetchError, StationCatalog, StationMetadata, UtcDateTime, WeatherPoint,
    WeatherSeries,
};

/// Fetcher over in-memory station series.
///
/// Returns the points strictly between the requested dates and records every
/// `timeseries` call that passed validation.
#[derive(Debug, Clone, Default)]
pub struct InMemoryFetcher {
    catalog: StationCatalog,
    series: HashMap<String, Vec<WeatherPoint>>,
    calls: Arc<Mutex<Vec<(UtcDateTime, UtcDateTime)>>>,
}

impl InMemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_station(
        mut self,
        name: impl Into<String>,
        metadata: StationMetadata,
        points: Vec<WeatherPoint>,
    ) -> Self {
        let name = name.into();
        self.catalog.insert(name.clone(), metadata);
        self.series.insert(name, points);
        self
    }

    /// Ranges requested so far, in call order.
    pub fn calls(&self) -> Vec<(UtcDateTime, UtcDateTime)> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl WeatherDataFetcher for InMemoryFetcher {
    fn stations<'a>(&'a self) -> FetcherFuture<'a, Vec<String>> {
        Box::pin(async move { Ok(self.catalog.names()) })
    }

    fn time_range<'a>(
        &'a self,
        station: &'a str,
    ) -> FetcherFuture<'a, (UtcDateTime, UtcDateTime)> {
        Box::pin(async move {
            self.catalog
                .get(station)
                .map(|metadata| (metadata.valid_from, metadata.valid_to))
                .ok_or_else(|| FetchError::StationNotFound {
                    station: station.to_owned(),
                })
        })
    }

    fn validate_range<'a>(
        &'a self,
        date_0: UtcDateTime,
        date_f: UtcDateTime,
        station: &'a str,
    ) -> FetcherFuture<'a, ()> {
        Box::pin(async move {
            validate_against(&self.catalog, date_0, date_f, station).map(|_| ())
        })
    }

    fn timeseries<'a>(
        &'a self,
        date_0: UtcDateTime,
        date_f: UtcDateTime,
        station: &'a str,
    ) -> FetcherFuture<'a, WeatherSeries> {
        Box::pin(async move {
            validate_against(&self.catalog, date_0, date_f, station)?;
            self.calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((date_0, date_f));

            let points = self
                .series
                .get(station)
                .map(|points| {
                    points
                        .iter()
                        .filter(|point| point.timestamp > date_0 && point.timestamp < date_f)
                        .copied()
                        .collect()
                })
                .unwrap_or_default();
            Ok(WeatherSeries::new(points))
        })
    }
}

/// Two-step protocol answering from an in-memory series.
///
/// Each window yields the points with `start <= timestamp <= end`. Every call is recorded,
/// and individual windows can be made to fail or to respond slowly. The highest number of
/// fetches running at once is kept for inspection.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTwoStep {
    points: Arc<Vec<WeatherPoint>>,
    failing: Arc<Vec<DateWindow>>,
    latency: Option<Duration>,
    window_latency: Arc<Vec<(DateWindow, Duration)>>,
    windows: Arc<Mutex<Vec<DateWindow>>>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: Arc<AtomicUsize>,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl InMemoryTwoStep {
    pub fn new(points: Vec<WeatherPoint>) -> Self {
        Self {
            points: Arc::new(points),
            ..Self::default()
        }
    }

    /// Answer `window` with a provider-side ticket failure.
    pub fn failing_on(mut self, window: DateWindow) -> Self {
        let mut failing = self.failing.as_ref().clone();
        failing.push(window);
        self.failing = Arc::new(failing);
        self
    }

    /// Sleep this long before answering each window.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Sleep this long before answering `window`, overriding [`Self::with_latency`].
    pub fn with_window_latency(mut self, window: DateWindow, latency: Duration) -> Self {
        let mut window_latency = self.window_latency.as_ref().clone();
        window_latency.push((window, latency));
        self.window_latency = Arc::new(window_latency);
        self
    }

    /// Most fetches that were running at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Windows requested so far, in request order.
    pub fn windows(&self) -> Vec<DateWindow> {
        self.windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.windows.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl TwoStepFetch for InMemoryTwoStep {
    fn ticket_uri(&self, window: &DateWindow, station_id: &str) -> String {
        format!(
            "memory://{station_id}/{}/{}",
            window.start.format_provider(),
            window.end.format_provider()
        )
    }

    fn fetch<'a>(
        &'a self,
        ctx: &'a FetchContext,
        window: DateWindow,
        station_id: &'a str,
    ) -> FetchFuture<'a> {
        Box::pin(async move {
            self.windows
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(window);
            tracing::trace!(request_id = %ctx.request_id(), window = %window, "in-memory fetch");

            let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(running, Ordering::SeqCst);
            let _in_flight = InFlight(&self.in_flight);

            let latency = self
                .window_latency
                .iter()
                .find(|(slow, _)| *slow == window)
                .map(|(_, latency)| *latency)
                .or(self.latency);
            if let Some(latency) = latency {
                tokio::time::sleep(latency).await;
            }

            if self.failing.contains(&window) {
                return Err(FetchError::Ticket {
                    uri: self.ticket_uri(&window, station_id),
                    status: 500,
                    body: String::from("scripted failure"),
                });
            }

            Ok(self
                .points
                .iter()
                .filter(|point| point.timestamp >= window.start && point.timestamp <= window.end)
                .copied()
                .collect())
        })
    }
}

/// Regularly spaced points from `start` (inclusive) to `end` (exclusive).
///
/// Temperature counts up from zero, pressure is constant and wind speed alternates.
pub fn regular_series(
    start: UtcDateTime,
    end: UtcDateTime,
    step: time::Duration,
) -> Vec<WeatherPoint> {
    let mut points = Vec::new();
    let mut current = start;
    let mut index = 0_u32;
    while current < end && step.is_positive() {
        points.push(WeatherPoint::new(
            current,
            f64::from(index),
            990.0,
            f64::from(index % 2),
        ));
        let Some(next) = current.checked_add(step) else {
            break;
        };
        current = next;
        index += 1;
    }
    points
}
