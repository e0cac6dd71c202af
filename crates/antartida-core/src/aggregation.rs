//! Period aggregation over uniformly sampled series.
//!
//! The sampling interval is read from the first two points after sorting. A period of `n`
//! intervals groups the series into chunks of `n` points; a trailing chunk shorter than `n`
//! is dropped. Uniform sampling is assumed and not checked.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::Duration;

use crate::{AggregationError, UtcDateTime, ValidationError, WeatherPoint};

/// Named aggregation periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationPeriod {
    Hourly,
    Daily,
    /// Thirty days, not a calendar month.
    Monthly,
}

impl AggregationPeriod {
    pub const ALL: [Self; 3] = [Self::Hourly, Self::Daily, Self::Monthly];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hourly => "hourly",
            Self::Daily => "daily",
            Self::Monthly => "monthly",
        }
    }

    pub const fn duration(self) -> Duration {
        match self {
            Self::Hourly => Duration::HOUR,
            Self::Daily => Duration::DAY,
            Self::Monthly => Duration::days(30),
        }
    }
}

impl Display for AggregationPeriod {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AggregationPeriod {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "hourly" => Ok(Self::Hourly),
            "daily" => Ok(Self::Daily),
            "monthly" => Ok(Self::Monthly),
            other => Err(ValidationError::UnknownPeriod {
                value: other.to_owned(),
            }),
        }
    }
}

/// Reducer applied to each chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    /// Input returned as given, whatever the period.
    #[default]
    Identity,
    First,
    Last,
    /// Per-field mean ignoring NaN.
    Mean,
    /// Per-field median ignoring NaN.
    Median,
}

impl Aggregation {
    pub const ALL: [Self; 5] = [
        Self::Identity,
        Self::First,
        Self::Last,
        Self::Mean,
        Self::Median,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::First => "first",
            Self::Last => "last",
            Self::Mean => "mean",
            Self::Median => "median",
        }
    }

    pub fn aggregate(
        self,
        points: &[WeatherPoint],
        period: Duration,
    ) -> Result<Vec<WeatherPoint>, AggregationError> {
        if self == Self::Identity || points.is_empty() {
            return Ok(points.to_vec());
        }

        let mut sorted = points.to_vec();
        sorted.sort();

        let interval = sampling_interval(&sorted).unwrap_or(Duration::ZERO);
        let chunk_len = chunk_len(period, interval)?;
        tracing::debug!(
            aggregation = self.as_str(),
            points = sorted.len(),
            chunk_len,
            "aggregating series"
        );

        Ok(sorted
            .chunks_exact(chunk_len)
            .filter_map(|chunk| self.reduce(chunk))
            .collect())
    }

    fn reduce(self, chunk: &[WeatherPoint]) -> Option<WeatherPoint> {
        let first = chunk.first()?;
        match self {
            Self::Identity | Self::First => Some(*first),
            Self::Last => chunk.last().copied(),
            Self::Mean => Some(reduce_fields(first.timestamp, chunk, calc_mean)),
            Self::Median => Some(reduce_fields(first.timestamp, chunk, calc_median)),
        }
    }
}

impl Display for Aggregation {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Aggregation {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "identity" | "none" => Ok(Self::Identity),
            "first" => Ok(Self::First),
            "last" => Ok(Self::Last),
            "mean" => Ok(Self::Mean),
            "median" => Ok(Self::Median),
            other => Err(ValidationError::UnknownAggregation {
                value: other.to_owned(),
            }),
        }
    }
}

fn chunk_len(period: Duration, interval: Duration) -> Result<usize, AggregationError> {
    let invalid = || AggregationError::InvalidPeriod {
        period_secs: period.whole_seconds(),
        interval_secs: interval.whole_seconds(),
    };

    if !interval.is_positive() || period.is_negative() {
        return Err(invalid());
    }
    let n = period.whole_nanoseconds() / interval.whole_nanoseconds();
    match usize::try_from(n) {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(invalid()),
    }
}

fn reduce_fields(
    timestamp: UtcDateTime,
    chunk: &[WeatherPoint],
    reducer: fn(&[f64]) -> f64,
) -> WeatherPoint {
    let field = |get: fn(&WeatherPoint) -> f64| {
        let values: Vec<f64> = chunk.iter().map(get).collect();
        reducer(&values)
    };
    WeatherPoint::new(
        timestamp,
        field(|p| p.temperature),
        field(|p| p.pressure),
        field(|p| p.wind_speed),
    )
}

/// Time between the first two points, `None` with fewer than two points.
pub fn sampling_interval(points: &[WeatherPoint]) -> Option<Duration> {
    match points {
        [first, second, ..] => Some(second.timestamp - first.timestamp),
        _ => None,
    }
}

/// Mean of the non-NaN values, `0.0` when there are none.
pub fn calc_mean(values: &[f64]) -> f64 {
    let (sum, count) = values
        .iter()
        .filter(|value| !value.is_nan())
        .fold((0.0, 0_u32), |(sum, count), value| (sum + value, count + 1));
    if count == 0 {
        return 0.0;
    }
    sum / f64::from(count)
}

/// Median of the non-NaN values, `0.0` when there are none.
///
/// An even count averages the two central values.
pub fn calc_median(values: &[f64]) -> f64 {
    let mut present: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if present.is_empty() {
        return 0.0;
    }
    present.sort_by(f64::total_cmp);

    let mid = present.len() / 2;
    if present.len() % 2 == 0 {
        (present[mid - 1] + present[mid]) / 2.0
    } else {
        present[mid]
    }
}
