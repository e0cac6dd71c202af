//! Fetcher assembly from environment settings.
//!
//! [`FetcherConfig`] is a plain value. [`FetcherConfig::build`] turns it into a boxed
//! [`WeatherDataFetcher`] owned by the caller; nothing is cached globally.

use std::env;
use std::num::{NonZeroU32, NonZeroUsize};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use antartida_warehouse::{Warehouse, WarehouseConfig};
use time::Duration;

use crate::cache_proxy::{CacheProxyFetcher, DuckDbPointStore};
use crate::fetcher::{
    ConcurrentFetcher, NaiveFetcher, ProviderAccess, SerialFetcher, WeatherDataFetcher,
};
use crate::http_client::{HttpAuth, ReqwestSessionFactory, SessionFactory};
use crate::protocol::{AemetTwoStep, MemoizedTwoStep, TwoStepFetch};
use crate::throttling::RequestThrottle;
use crate::windows::WindowPolicy;
use crate::{ConfigError, StationCatalog};

pub const API_KEY_VAR: &str = "AEMET_API_KEY";
pub const FETCHER_VAR: &str = "ANTARTIDA_FETCHER";
pub const MEMO_VAR: &str = "ANTARTIDA_MEMO";
pub const CACHE_VAR: &str = "ANTARTIDA_CACHE";
pub const WINDOWS_VAR: &str = "ANTARTIDA_WINDOWS";
pub const FIXED_WINDOW_DAYS_VAR: &str = "ANTARTIDA_FIXED_WINDOW_DAYS";
pub const MAX_CONCURRENT_VAR: &str = "ANTARTIDA_MAX_CONCURRENT";
pub const OFFSET_MINUTES_VAR: &str = "ANTARTIDA_OFFSET_MINUTES";
pub const HOME_VAR: &str = "ANTARTIDA_HOME";
pub const STATIONS_JSON_VAR: &str = "ANTARTIDA_STATIONS_JSON";
pub const DEADLINE_SECS_VAR: &str = "ANTARTIDA_DEADLINE_SECS";
pub const REQUESTS_PER_MINUTE_VAR: &str = "ANTARTIDA_REQUESTS_PER_MINUTE";

macro_rules! setting_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $var:expr, $expected:literal {
            $($variant:ident => $text:literal $(| $alias:literal)*),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = ConfigError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value.trim().to_ascii_lowercase().as_str() {
                    $($text $(| $alias)* => Ok(Self::$variant),)+
                    _ => Err(ConfigError::Unsupported {
                        name: $var,
                        value: value.to_owned(),
                        expected: $expected,
                    }),
                }
            }
        }
    };
}

setting_enum! {
    /// Retrieval strategy.
    FetcherKind, FETCHER_VAR, "serial, concurrent, naive" {
        Serial => "serial",
        Concurrent => "concurrent" | "parallel",
        Naive => "naive",
    }
}

setting_enum! {
    /// Process-lifetime memo of window fetches.
    MemoMode, MEMO_VAR, "memory, none" {
        Memory => "memory",
        None => "none" | "off",
    }
}

setting_enum! {
    /// Persistent cache in front of the strategy.
    CacheMode, CACHE_VAR, "none, duckdb" {
        None => "none" | "off",
        DuckDb => "duckdb" | "sql",
    }
}

setting_enum! {
    /// Boundary policy of windowed strategies.
    WindowMode, WINDOWS_VAR, "month, fixed" {
        Month => "month",
        Fixed => "fixed",
    }
}

/// Everything needed to assemble a fetcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetcherConfig {
    pub api_key: Option<String>,
    pub fetcher: FetcherKind,
    pub memo: MemoMode,
    pub cache: CacheMode,
    pub windows: WindowMode,
    pub fixed_window_days: NonZeroU32,
    pub max_concurrent: NonZeroUsize,
    pub offset_minutes: NonZeroU32,
    /// Store root. `None` falls back to the warehouse default resolution.
    pub antartida_home: Option<PathBuf>,
    /// Station catalog file. `None` uses [`StationCatalog::builtin`].
    pub stations_json: Option<PathBuf>,
    pub deadline: Option<std::time::Duration>,
    pub requests_per_minute: Option<NonZeroU32>,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            fetcher: FetcherKind::Serial,
            memo: MemoMode::Memory,
            cache: CacheMode::None,
            windows: WindowMode::Month,
            fixed_window_days: NonZeroU32::new(30).unwrap_or(NonZeroU32::MIN),
            max_concurrent: NonZeroUsize::new(4).unwrap_or(NonZeroUsize::MIN),
            offset_minutes: NonZeroU32::new(10).unwrap_or(NonZeroU32::MIN),
            antartida_home: None,
            stations_json: None,
            deadline: None,
            requests_per_minute: None,
        }
    }
}

impl FetcherConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Reads settings through `lookup`. Unset and blank values keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };

        let mut config = Self::default();
        config.api_key = get(API_KEY_VAR);
        if let Some(value) = get(FETCHER_VAR) {
            config.fetcher = value.parse()?;
        }
        if let Some(value) = get(MEMO_VAR) {
            config.memo = value.parse()?;
        }
        if let Some(value) = get(CACHE_VAR) {
            config.cache = value.parse()?;
        }
        if let Some(value) = get(WINDOWS_VAR) {
            config.windows = value.parse()?;
        }
        if let Some(value) = get(FIXED_WINDOW_DAYS_VAR) {
            config.fixed_window_days = parse_positive(FIXED_WINDOW_DAYS_VAR, &value)?;
        }
        if let Some(value) = get(MAX_CONCURRENT_VAR) {
            config.max_concurrent = parse_positive(MAX_CONCURRENT_VAR, &value)?;
        }
        if let Some(value) = get(OFFSET_MINUTES_VAR) {
            config.offset_minutes = parse_positive(OFFSET_MINUTES_VAR, &value)?;
        }
        config.antartida_home = get(HOME_VAR).map(PathBuf::from);
        config.stations_json = get(STATIONS_JSON_VAR).map(PathBuf::from);
        if let Some(value) = get(DEADLINE_SECS_VAR) {
            let secs: NonZeroU32 = parse_positive(DEADLINE_SECS_VAR, &value)?;
            config.deadline = Some(std::time::Duration::from_secs(u64::from(secs.get())));
        }
        if let Some(value) = get(REQUESTS_PER_MINUTE_VAR) {
            config.requests_per_minute = Some(parse_positive(REQUESTS_PER_MINUTE_VAR, &value)?);
        }
        Ok(config)
    }

    pub fn offset(&self) -> Duration {
        Duration::minutes(i64::from(self.offset_minutes.get()))
    }

    pub fn window_policy(&self) -> WindowPolicy {
        match self.windows {
            WindowMode::Month => WindowPolicy::CalendarMonth,
            WindowMode::Fixed => WindowPolicy::FixedSize {
                step: Duration::days(i64::from(self.fixed_window_days.get())),
            },
        }
    }

    pub fn catalog(&self) -> Result<StationCatalog, ConfigError> {
        match &self.stations_json {
            Some(path) => StationCatalog::from_json_file(path),
            None => Ok(StationCatalog::builtin()),
        }
    }

    pub fn warehouse_config(&self) -> WarehouseConfig {
        match &self.antartida_home {
            Some(home) => WarehouseConfig::under_home(home),
            None => WarehouseConfig::default(),
        }
    }

    /// Assemble the configured fetcher against the live provider.
    pub fn build(&self) -> Result<Box<dyn WeatherDataFetcher>, ConfigError> {
        if self.api_key.is_none() {
            return Err(ConfigError::Missing { name: API_KEY_VAR });
        }
        self.build_with_sessions(Arc::new(ReqwestSessionFactory))
    }

    /// Same as [`FetcherConfig::build`] with caller-provided sessions. The credential is
    /// optional here.
    pub fn build_with_sessions(
        &self,
        sessions: Arc<dyn SessionFactory>,
    ) -> Result<Box<dyn WeatherDataFetcher>, ConfigError> {
        let mut provider = AemetTwoStep::new();
        if let Some(limit) = self.requests_per_minute {
            provider = provider.with_throttle(RequestThrottle::per_minute(limit));
        }
        self.build_with_protocol(provider, sessions)
    }

    /// Assemble around an arbitrary protocol, applying memo, strategy and cache settings.
    pub fn build_with_protocol<P: TwoStepFetch + 'static>(
        &self,
        protocol: P,
        sessions: Arc<dyn SessionFactory>,
    ) -> Result<Box<dyn WeatherDataFetcher>, ConfigError> {
        let protocol: Arc<dyn TwoStepFetch> = match self.memo {
            MemoMode::Memory => Arc::new(MemoizedTwoStep::new(protocol)),
            MemoMode::None => Arc::new(protocol),
        };
        let auth = self
            .api_key
            .as_deref()
            .map_or(HttpAuth::None, HttpAuth::api_key);
        let access = ProviderAccess::new(self.catalog()?, protocol, sessions, auth);

        let fetcher: Box<dyn WeatherDataFetcher> = match self.fetcher {
            FetcherKind::Naive => Box::new(NaiveFetcher::new(access)),
            FetcherKind::Serial => {
                let mut fetcher = SerialFetcher::new(access)
                    .with_policy(self.window_policy())
                    .with_offset(self.offset());
                if let Some(deadline) = self.deadline {
                    fetcher = fetcher.with_deadline(deadline);
                }
                Box::new(fetcher)
            }
            FetcherKind::Concurrent => {
                let mut fetcher = ConcurrentFetcher::new(access, self.max_concurrent)
                    .with_policy(self.window_policy())
                    .with_offset(self.offset());
                if let Some(deadline) = self.deadline {
                    fetcher = fetcher.with_deadline(deadline);
                }
                Box::new(fetcher)
            }
        };

        tracing::debug!(
            fetcher = self.fetcher.as_str(),
            memo = self.memo.as_str(),
            cache = self.cache.as_str(),
            windows = self.windows.as_str(),
            "fetcher assembled"
        );

        match self.cache {
            CacheMode::None => Ok(fetcher),
            CacheMode::DuckDb => {
                let warehouse = Warehouse::open(self.warehouse_config()).map_err(|error| {
                    ConfigError::Store {
                        message: error.to_string(),
                    }
                })?;
                tracing::debug!(path = %warehouse.db_path().display(), "point store opened");
                Ok(Box::new(
                    CacheProxyFetcher::new(fetcher, DuckDbPointStore::new(warehouse))
                        .with_offset(self.offset()),
                ))
            }
        }
    }
}

fn parse_positive<T>(name: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
{
    value.parse::<T>().map_err(|_| ConfigError::NotPositive {
        name,
        value: value.to_owned(),
    })
}
