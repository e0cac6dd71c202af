//! Core of antartida.
//!
//! This crate contains:
//! - Point, series, station and window models
//! - The provider's two-step ticket/data protocol and its memo
//! - Window generation and the naive, serial and concurrent fetch strategies
//! - A persistent cache proxy in front of any fetcher
//! - Period aggregation
//! - Fetcher assembly from environment settings

pub mod aggregation;
pub mod cache_proxy;
pub mod config;
pub mod domain;
pub mod error;
pub mod fetcher;
pub mod http_client;
pub mod mock;
pub mod protocol;
pub mod throttling;
pub mod windows;

pub use aggregation::{calc_mean, calc_median, sampling_interval, Aggregation, AggregationPeriod};
pub use antartida_warehouse::{PointRecord, Warehouse, WarehouseConfig, WarehouseError};
pub use cache_proxy::{CacheProxyFetcher, DuckDbPointStore, MemoryPointStore, PointStore};
pub use config::{CacheMode, FetcherConfig, FetcherKind, MemoMode, WindowMode};
pub use domain::{
    DateWindow, StationCatalog, StationMetadata, UtcDateTime, WeatherPoint, WeatherSeries,
};
pub use error::{AggregationError, ConfigError, FetchError, ValidationError, WindowError};
pub use fetcher::{
    ConcurrentFetcher, FetcherFuture, NaiveFetcher, ProviderAccess, SerialFetcher,
    WeatherDataFetcher,
};
pub use http_client::{
    HttpAuth, HttpClient, HttpError, HttpRequest, HttpResponse, ReqwestHttpClient,
    ReqwestSessionFactory, SessionFactory,
};
pub use mock::{InMemoryFetcher, InMemoryTwoStep};
pub use protocol::{AemetTwoStep, FetchContext, MemoizedTwoStep, TwoStepFetch};
pub use throttling::RequestThrottle;
pub use windows::WindowPolicy;
