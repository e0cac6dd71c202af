use thiserror::Error;

use crate::http_client::HttpError;
use crate::UtcDateTime;

/// Input validation errors for timestamps and station metadata.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("timestamp must be RFC3339 UTC (suffix Z): '{value}'")]
    TimestampNotUtc { value: String },

    #[error("unrecognized timestamp '{value}'")]
    UnrecognizedTimestamp { value: String },

    #[error("timestamp '{value}' is outside the representable range")]
    TimestampOutOfRange { value: String },

    #[error("station '{name}' has valid_from {valid_from} after valid_to {valid_to}")]
    InvalidStationRange {
        name: String,
        valid_from: UtcDateTime,
        valid_to: UtcDateTime,
    },

    #[error("station catalog is not valid JSON: {message}")]
    InvalidCatalog { message: String },

    #[error("unknown aggregation '{value}', expected identity, first, last, mean or median")]
    UnknownAggregation { value: String },

    #[error("unknown aggregation period '{value}', expected hourly, daily or monthly")]
    UnknownPeriod { value: String },
}

/// Boundary generation failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WindowError {
    #[error("end date must be later than start date: date_0={date_0}, date_f={date_f}")]
    Range {
        date_0: UtcDateTime,
        date_f: UtcDateTime,
    },

    #[error("window step must be positive")]
    Step,

    #[error("window ending at {boundary} leaves the representable date range")]
    OutOfRange { boundary: UtcDateTime },
}

/// Errors surfaced by fetch strategies, the two-step protocol and the cache proxy.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("station '{station}' not found")]
    StationNotFound { station: String },

    #[error("end date {date_f} is before start date {date_0}")]
    DateRange {
        date_0: UtcDateTime,
        date_f: UtcDateTime,
    },

    #[error("requested start {requested} is below the station minimum {minimum}")]
    BelowMinimum {
        requested: UtcDateTime,
        minimum: UtcDateTime,
    },

    #[error("requested end {requested} is above the station maximum {maximum}")]
    AboveMaximum {
        requested: UtcDateTime,
        maximum: UtcDateTime,
    },

    #[error("range of {days} days exceeds the single-request limit of {limit_days} days")]
    UnsupportedRange { days: i64, limit_days: i64 },

    #[error("ticket request to '{uri}' failed with status {status}: {body}")]
    Ticket {
        uri: String,
        status: u16,
        body: String,
    },

    #[error("data request to '{uri}' failed with status {status}: {body}")]
    Data {
        uri: String,
        status: u16,
        body: String,
    },

    #[error("transport error for '{uri}': {source}")]
    Transport {
        uri: String,
        #[source]
        source: HttpError,
    },

    #[error("unreadable payload from '{uri}': {message}")]
    Payload { uri: String, message: String },

    #[error(transparent)]
    Window(#[from] WindowError),

    #[error("point store error: {0}")]
    Store(String),

    #[error("fetch did not complete within {timeout_ms}ms")]
    DeadlineExceeded { timeout_ms: u64 },
}

impl FetchError {
    pub const fn code(&self) -> &'static str {
        match self {
            Self::StationNotFound { .. } => "fetch.station_not_found",
            Self::DateRange { .. } => "fetch.date_range",
            Self::BelowMinimum { .. } => "fetch.below_minimum",
            Self::AboveMaximum { .. } => "fetch.above_maximum",
            Self::UnsupportedRange { .. } => "fetch.unsupported_range",
            Self::Ticket { .. } => "fetch.ticket",
            Self::Data { .. } => "fetch.data",
            Self::Transport { .. } => "fetch.transport",
            Self::Payload { .. } => "fetch.payload",
            Self::Window(_) => "fetch.window",
            Self::Store(_) => "fetch.store",
            Self::DeadlineExceeded { .. } => "fetch.deadline_exceeded",
        }
    }

    /// True for errors raised before any network I/O, caused by the request itself.
    pub const fn is_invalid_request(&self) -> bool {
        matches!(
            self,
            Self::StationNotFound { .. }
                | Self::DateRange { .. }
                | Self::BelowMinimum { .. }
                | Self::AboveMaximum { .. }
                | Self::UnsupportedRange { .. }
                | Self::Window(_)
        )
    }
}

impl From<antartida_warehouse::WarehouseError> for FetchError {
    fn from(error: antartida_warehouse::WarehouseError) -> Self {
        Self::Store(error.to_string())
    }
}

/// Aggregation engine errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AggregationError {
    #[error("aggregation period of {period_secs}s is invalid for a sampling interval of {interval_secs}s")]
    InvalidPeriod { period_secs: i64, interval_secs: i64 },
}

impl AggregationError {
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidPeriod { .. } => "aggregation.invalid_period",
        }
    }
}

/// Environment and option parsing errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting {name}")]
    Missing { name: &'static str },

    #[error("value '{value}' for {name} is not supported, expected one of {expected}")]
    Unsupported {
        name: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("value '{value}' for {name} must be a positive integer")]
    NotPositive { name: &'static str, value: String },

    #[error("cannot read {path}: {message}")]
    Unreadable { path: String, message: String },

    #[error("cannot open point store: {message}")]
    Store { message: String },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl ConfigError {
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Missing { .. } => "config.missing",
            Self::Unsupported { .. } => "config.unsupported",
            Self::NotPositive { .. } => "config.not_positive",
            Self::Unreadable { .. } => "config.unreadable",
            Self::Store { .. } => "config.store",
            Self::Validation(_) => "config.validation",
        }
    }
}
