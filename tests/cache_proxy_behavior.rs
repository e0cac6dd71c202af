//! Behavior-driven tests for the persistent cache proxy
//!
//! These tests verify HOW the proxy combines stored points with fetched gaps, what it
//! writes back, and how it behaves when the store misbehaves.

use std::sync::Arc;

use antartida_core::http_client::{HttpAuth, ScriptedHttpClient, SharedSessionFactory};
use antartida_core::mock::{regular_series, InMemoryFetcher, InMemoryTwoStep};
use antartida_core::{
    CacheMode, CacheProxyFetcher, DuckDbPointStore, FetchError, FetcherConfig, FetcherKind,
    MemoMode, MemoryPointStore, PointStore, ProviderAccess, SerialFetcher, StationCatalog,
    StationMetadata, UtcDateTime, Warehouse, WarehouseConfig, WeatherDataFetcher, WeatherPoint,
};
use tempfile::tempdir;
use time::Duration;

const JUAN_CARLOS: &str = "Meteo Station Juan Carlos I";

fn ts(value: &str) -> UtcDateTime {
    UtcDateTime::parse(value).expect("timestamp")
}

fn timestamps(points: &[WeatherPoint]) -> Vec<UtcDateTime> {
    points.iter().map(|point| point.timestamp).collect()
}

fn serial_over(protocol: InMemoryTwoStep) -> SerialFetcher<InMemoryTwoStep> {
    let sessions = Arc::new(SharedSessionFactory::new(Arc::new(ScriptedHttpClient::new())));
    SerialFetcher::new(ProviderAccess::new(
        StationCatalog::builtin(),
        protocol,
        sessions,
        HttpAuth::None,
    ))
}

fn hourly_station() -> InMemoryFetcher {
    InMemoryFetcher::new().with_station(
        "Base",
        StationMetadata::new("1", ts("2023-01-01T00:00:00Z"), ts("2023-12-31T00:00:00Z")),
        regular_series(
            ts("2023-01-01T00:00:00Z"),
            ts("2023-02-01T00:00:00Z"),
            Duration::HOUR,
        ),
    )
}

// =============================================================================
// Cache proxy: Idempotence
// =============================================================================

#[tokio::test]
async fn when_an_identical_query_is_repeated_it_is_served_from_the_store() {
    // Given: A DuckDB-backed proxy in front of a serial fetcher
    let temp = tempdir().expect("tempdir");
    let warehouse =
        Warehouse::open(WarehouseConfig::under_home(temp.path())).expect("warehouse open");
    let protocol = InMemoryTwoStep::new(regular_series(
        ts("2023-01-01T00:00:00Z"),
        ts("2023-02-01T00:10:00Z"),
        Duration::minutes(10),
    ));
    let proxy = CacheProxyFetcher::new(
        serial_over(protocol.clone()),
        DuckDbPointStore::new(warehouse.clone()),
    );
    let (from, to) = (ts("2023-01-01T00:00:00Z"), ts("2023-02-01T00:00:00Z"));

    // When: The same query runs twice
    let first = proxy.timeseries(from, to, JUAN_CARLOS).await.expect("first");
    let calls_after_first = protocol.call_count();
    let second = proxy.timeseries(from, to, JUAN_CARLOS).await.expect("second");

    // Then: The second call performs no provider fetch and returns the same points
    assert_eq!(calls_after_first, 1);
    assert_eq!(protocol.call_count(), calls_after_first);
    assert_eq!(timestamps(first.points()), timestamps(second.points()));
    assert_eq!(
        warehouse.point_count(JUAN_CARLOS).expect("count"),
        first.len()
    );
}

#[tokio::test]
async fn when_a_mid_month_query_is_repeated_the_same_points_come_back() {
    // Given: A DuckDB-backed proxy in front of a serial fetcher with month windows
    let temp = tempdir().expect("tempdir");
    let warehouse =
        Warehouse::open(WarehouseConfig::under_home(temp.path())).expect("warehouse open");
    let protocol = InMemoryTwoStep::new(regular_series(
        ts("2023-01-01T00:00:00Z"),
        ts("2023-02-01T00:00:00Z"),
        Duration::minutes(10),
    ));
    let proxy = CacheProxyFetcher::new(
        serial_over(protocol.clone()),
        DuckDbPointStore::new(warehouse),
    );
    let (from, to) = (ts("2023-01-05T00:00:00Z"), ts("2023-01-20T12:00:00Z"));

    // When: A range ending inside the month is requested twice
    let first = proxy.timeseries(from, to, JUAN_CARLOS).await.expect("first");
    let second = proxy.timeseries(from, to, JUAN_CARLOS).await.expect("second");

    // Then: Both calls stop one offset before the end and agree point for point
    assert_eq!(protocol.call_count(), 1);
    assert_eq!(first.len(), 2232);
    assert_eq!(first.last().map(|p| p.timestamp), Some(ts("2023-01-20T11:50:00Z")));
    assert_eq!(timestamps(first.points()), timestamps(second.points()));
    assert!(first
        .points()
        .iter()
        .zip(second.points())
        .all(|(a, b)| a.same_readings(b)));
}

#[tokio::test]
async fn when_missing_readings_are_cached_they_come_back_as_nan() {
    // Given: Provider data where every temperature is missing
    let temp = tempdir().expect("tempdir");
    let warehouse =
        Warehouse::open(WarehouseConfig::under_home(temp.path())).expect("warehouse open");
    let points: Vec<WeatherPoint> = regular_series(
        ts("2023-03-01T00:00:00Z"),
        ts("2023-03-02T00:00:00Z"),
        Duration::minutes(10),
    )
    .into_iter()
    .map(|point| WeatherPoint { temperature: f64::NAN, ..point })
    .collect();
    let proxy = CacheProxyFetcher::new(
        serial_over(InMemoryTwoStep::new(points)),
        DuckDbPointStore::new(warehouse),
    );
    let (from, to) = (ts("2023-03-01T00:00:00Z"), ts("2023-03-01T12:00:00Z"));

    // When: The range is fetched, then served from the store
    proxy.timeseries(from, to, JUAN_CARLOS).await.expect("first");
    let cached = proxy.timeseries(from, to, JUAN_CARLOS).await.expect("second");

    // Then: Missing temperatures survive the round trip while other readings keep values
    assert!(!cached.is_empty());
    assert!(cached.points().iter().all(|point| point.temperature.is_nan()));
    assert!(cached.points().iter().all(|point| point.pressure == 990.0));
}

// =============================================================================
// Cache proxy: Gap detection
// =============================================================================

#[tokio::test]
async fn when_the_store_holds_the_middle_of_the_range_only_both_edges_are_fetched() {
    // Given: A store already holding 2023-01-10..2023-01-20 for the station
    let inner = hourly_station();
    let store = MemoryPointStore::new();
    let seeded = regular_series(
        ts("2023-01-10T00:00:00Z"),
        ts("2023-01-20T01:00:00Z"),
        Duration::HOUR,
    );
    store.seed("Base", seeded.clone());
    let proxy = CacheProxyFetcher::new(inner.clone(), store.clone());

    // When: January is requested
    let series = proxy
        .timeseries(ts("2023-01-01T00:00:00Z"), ts("2023-01-31T00:00:00Z"), "Base")
        .await
        .expect("proxy fetch");

    // Then: The wrapped fetcher is called for the leading and trailing gaps only
    assert_eq!(
        inner.calls(),
        vec![
            (ts("2023-01-01T00:00:00Z"), ts("2023-01-10T00:00:00Z")),
            (ts("2023-01-20T00:10:00Z"), ts("2023-01-31T00:00:00Z")),
        ]
    );

    // And: Cached points come first, followed by the fetched ones
    assert_eq!(
        timestamps(&series.points()[..seeded.len()]),
        timestamps(&seeded)
    );
    assert_eq!(series.len(), seeded.len() + 9 * 24 - 1 + 10 * 24 + 23);

    // And: Fetched points were written back
    assert_eq!(store.len(), series.len());
}

#[tokio::test]
async fn when_the_store_is_empty_the_full_range_is_delegated_once() {
    // Given: An empty store
    let inner = hourly_station();
    let store = MemoryPointStore::new();
    let proxy = CacheProxyFetcher::new(inner.clone(), store.clone());
    let (from, to) = (ts("2023-01-05T00:00:00Z"), ts("2023-01-06T00:00:00Z"));

    // When: One day is requested
    let series = proxy.timeseries(from, to, "Base").await.expect("proxy fetch");

    // Then: One delegated call covers the whole range and everything is stored
    assert_eq!(inner.calls(), vec![(from, to)]);
    assert_eq!(series.len(), 23);
    assert_eq!(store.len(), 23);
}

#[tokio::test]
async fn when_stored_points_belong_to_another_station_they_are_ignored() {
    // Given: A store holding the same dates for a different station
    let inner = hourly_station();
    let store = MemoryPointStore::new();
    store.seed(
        "Elsewhere",
        regular_series(
            ts("2023-01-05T00:00:00Z"),
            ts("2023-01-06T00:00:00Z"),
            Duration::HOUR,
        ),
    );
    let proxy = CacheProxyFetcher::new(inner.clone(), store);

    // When: The station is queried
    proxy
        .timeseries(ts("2023-01-05T00:00:00Z"), ts("2023-01-06T00:00:00Z"), "Base")
        .await
        .expect("proxy fetch");

    // Then: The full range is fetched for it
    assert_eq!(inner.call_count(), 1);
}

// =============================================================================
// Cache proxy: Failure handling
// =============================================================================

#[tokio::test]
async fn when_the_store_rejects_writes_fetched_points_are_still_returned() {
    // Given: A store whose inserts fail
    let inner = hourly_station();
    let store = MemoryPointStore::read_only();
    let proxy = CacheProxyFetcher::new(inner, store.clone());

    // When: A range is fetched
    let series = proxy
        .timeseries(ts("2023-01-05T00:00:00Z"), ts("2023-01-06T00:00:00Z"), "Base")
        .await
        .expect("write failures are not fatal");

    // Then: The caller gets the points and the store stays empty
    assert_eq!(series.len(), 23);
    assert!(store.is_empty());
}

#[tokio::test]
async fn when_the_request_is_invalid_the_store_is_not_consulted() {
    // Given: A store that would answer anything
    let inner = hourly_station();
    let store = MemoryPointStore::new();
    store.seed(
        "Base",
        regular_series(
            ts("2023-01-01T00:00:00Z"),
            ts("2023-01-02T00:00:00Z"),
            Duration::HOUR,
        ),
    );
    let proxy = CacheProxyFetcher::new(inner.clone(), store);

    // When: The range ends before it starts
    let error = proxy
        .timeseries(ts("2023-01-02T00:00:00Z"), ts("2023-01-01T00:00:00Z"), "Base")
        .await
        .expect_err("inverted range");

    // Then: Validation of the wrapped fetcher rejects it
    assert!(matches!(error, FetchError::DateRange { .. }));
    assert_eq!(inner.call_count(), 0);
}

#[tokio::test]
async fn when_metadata_is_requested_the_proxy_delegates_to_the_wrapped_fetcher() {
    // Given: A proxy over an in-memory station
    let proxy = CacheProxyFetcher::new(hourly_station(), MemoryPointStore::new());

    // When: Stations and ranges are listed
    let stations = proxy.stations().await.expect("stations");
    let range = proxy.time_range("Base").await.expect("range");

    // Then: They match the wrapped fetcher's catalog
    assert_eq!(stations, vec![String::from("Base")]);
    assert_eq!(range.0, ts("2023-01-01T00:00:00Z"));
}

// =============================================================================
// Cache proxy: Assembly from configuration
// =============================================================================

#[tokio::test]
async fn when_configuration_enables_duckdb_the_built_fetcher_caches_between_calls() {
    // Given: A configuration with the DuckDB cache under a temporary home and no memo
    let temp = tempdir().expect("tempdir");
    let config = FetcherConfig {
        fetcher: FetcherKind::Concurrent,
        memo: MemoMode::None,
        cache: CacheMode::DuckDb,
        antartida_home: Some(temp.path().to_path_buf()),
        ..FetcherConfig::default()
    };
    let protocol = InMemoryTwoStep::new(regular_series(
        ts("2023-05-01T00:00:00Z"),
        ts("2023-07-01T00:00:00Z"),
        Duration::minutes(10),
    ));
    let sessions = Arc::new(SharedSessionFactory::new(Arc::new(ScriptedHttpClient::new())));
    let fetcher = config
        .build_with_protocol(protocol.clone(), sessions)
        .expect("build");
    let (from, to) = (ts("2023-05-01T00:00:00Z"), ts("2023-07-01T00:00:00Z"));

    // When: The same two months are requested twice
    let first = fetcher.timeseries(from, to, JUAN_CARLOS).await.expect("first");
    let windows_after_first = protocol.call_count();
    let second = fetcher.timeseries(from, to, JUAN_CARLOS).await.expect("second");

    // Then: The database file exists and the second call did not reach the provider
    assert!(temp.path().join("cache").join("datapoints.duckdb").exists());
    assert_eq!(windows_after_first, 2);
    assert_eq!(protocol.call_count(), windows_after_first);
    assert_eq!(first.len(), second.len());
}

#[tokio::test]
async fn when_points_are_inserted_twice_the_store_keeps_one_row_per_timestamp() {
    // Given: A DuckDB point store
    let temp = tempdir().expect("tempdir");
    let store = DuckDbPointStore::new(
        Warehouse::open(WarehouseConfig::under_home(temp.path())).expect("warehouse open"),
    );
    let points = regular_series(
        ts("2023-01-01T00:00:00Z"),
        ts("2023-01-01T01:00:00Z"),
        Duration::minutes(10),
    );

    // When: The same points are inserted twice
    let first = store.insert(JUAN_CARLOS, points.clone()).await.expect("insert");
    store.insert(JUAN_CARLOS, points).await.expect("insert again");

    // Then: Loading the hour returns each timestamp once, in order
    let loaded = store
        .load(JUAN_CARLOS, ts("2023-01-01T00:00:00Z"), ts("2023-01-01T01:00:00Z"))
        .await
        .expect("load");
    assert_eq!(first, 6);
    assert_eq!(loaded.len(), 6);
    assert!(loaded.windows(2).all(|pair| pair[0].timestamp < pair[1].timestamp));
}
