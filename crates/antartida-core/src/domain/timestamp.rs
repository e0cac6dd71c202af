use std::fmt::{Display, Formatter};
use std::ops::{Add, Sub};

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::format_description::well_known::Rfc3339;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Date, Duration, Month, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};

use crate::ValidationError;

const PROVIDER_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]UTC");
const SQL_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
const NAIVE_ISO_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]");
const COMPACT_OFFSET_FORMAT: &[BorrowedFormatItem<'static>] = format_description!(
    "[year]-[month]-[day]T[hour]:[minute]:[second][offset_hour sign:mandatory][offset_minute]"
);
const DATE_FORMAT: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

/// RFC3339 timestamp guaranteed to be UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UtcDateTime(OffsetDateTime);

impl UtcDateTime {
    pub fn now() -> Self {
        Self(OffsetDateTime::now_utc())
    }

    /// Strict RFC3339 parse. The offset must be UTC.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let parsed = OffsetDateTime::parse(input, &Rfc3339).map_err(|_| {
            ValidationError::TimestampNotUtc {
                value: input.to_owned(),
            }
        })?;

        Self::from_offset_datetime(parsed).map_err(|_| ValidationError::TimestampNotUtc {
            value: input.to_owned(),
        })
    }

    /// Accepts RFC3339 with any offset, `YYYY-MM-DDTHH:MM:SS+hhmm`, offset-less ISO and
    /// `YYYY-MM-DD HH:MM:SS` (both read as UTC), and a bare `YYYY-MM-DD` (UTC midnight).
    /// Offsets other than UTC are converted.
    pub fn parse_lenient(input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim();

        let with_offset = OffsetDateTime::parse(trimmed, &Rfc3339)
            .or_else(|_| OffsetDateTime::parse(trimmed, COMPACT_OFFSET_FORMAT));
        if let Ok(value) = with_offset {
            return Ok(Self(value.to_offset(UtcOffset::UTC)));
        }

        let naive = PrimitiveDateTime::parse(trimmed, NAIVE_ISO_FORMAT)
            .or_else(|_| PrimitiveDateTime::parse(trimmed, SQL_FORMAT))
            .or_else(|_| PrimitiveDateTime::parse(trimmed, PROVIDER_FORMAT));
        if let Ok(value) = naive {
            return Ok(Self(value.assume_utc()));
        }

        Date::parse(trimmed, DATE_FORMAT)
            .map(|date| Self(date.midnight().assume_utc()))
            .map_err(|_| ValidationError::UnrecognizedTimestamp {
                value: input.to_owned(),
            })
    }

    pub fn from_offset_datetime(value: OffsetDateTime) -> Result<Self, ValidationError> {
        if value.offset() != UtcOffset::UTC {
            return Err(ValidationError::TimestampNotUtc {
                value: value
                    .format(&Rfc3339)
                    .unwrap_or_else(|_| String::from("<unformattable>")),
            });
        }

        Ok(Self(value))
    }

    /// Midnight UTC of a calendar date.
    pub fn from_ymd(year: i32, month: Month, day: u8) -> Result<Self, ValidationError> {
        Date::from_calendar_date(year, month, day)
            .map(|date| Self(date.midnight().assume_utc()))
            .map_err(|_| ValidationError::TimestampOutOfRange {
                value: format!("{year}-{}-{day}", month as u8),
            })
    }

    pub fn into_inner(self) -> OffsetDateTime {
        self.0
    }

    /// `self + rhs`, or `None` past the representable range.
    pub fn checked_add(self, rhs: Duration) -> Option<Self> {
        self.0.checked_add(rhs).map(Self)
    }

    /// `self - rhs`, or `None` past the representable range.
    pub fn checked_sub(self, rhs: Duration) -> Option<Self> {
        self.0.checked_sub(rhs).map(Self)
    }

    /// First instant of the calendar month containing this timestamp.
    pub fn month_start(self) -> Self {
        let date = self.0.date();
        let first = date.replace_day(1).unwrap_or(date);
        Self(PrimitiveDateTime::new(first, Time::MIDNIGHT).assume_utc())
    }

    /// First instant of the following calendar month.
    pub fn next_month_start(self) -> Self {
        let date = self.0.date();
        let (year, month) = match date.month() {
            Month::December => (date.year() + 1, Month::January),
            month => (date.year(), month.next()),
        };
        match Date::from_calendar_date(year, month, 1) {
            Ok(first) => Self(first.midnight().assume_utc()),
            Err(_) => self.month_start(),
        }
    }

    pub fn format_rfc3339(self) -> String {
        self.0
            .format(&Rfc3339)
            .unwrap_or_else(|_| self.format_with(SQL_FORMAT))
    }

    /// `YYYY-MM-DDTHH:MM:SSUTC`, the form the provider expects in request paths.
    pub fn format_provider(self) -> String {
        self.format_with(PROVIDER_FORMAT)
    }

    /// `YYYY-MM-DD HH:MM:SS`, the form used for store keys.
    pub fn format_sql(self) -> String {
        self.format_with(SQL_FORMAT)
    }

    fn format_with(self, format: &[BorrowedFormatItem<'_>]) -> String {
        // Every component of these descriptions exists on an OffsetDateTime, so formatting
        // can only fail for years outside the four-digit range.
        self.0.format(format).unwrap_or_else(|_| self.0.to_string())
    }
}

impl Add<Duration> for UtcDateTime {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl Sub<Duration> for UtcDateTime {
    type Output = Self;

    fn sub(self, rhs: Duration) -> Self::Output {
        Self(self.0 - rhs)
    }
}

impl Sub for UtcDateTime {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Self::Output {
        self.0 - rhs.0
    }
}

impl Display for UtcDateTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.format_rfc3339())
    }
}

impl Serialize for UtcDateTime {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.format_rfc3339())
    }
}

impl<'de> Deserialize<'de> for UtcDateTime {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Self::parse_lenient(&value).map_err(D::Error::custom)
    }
}
