use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raised when a user supplied bound is not a recognisable point in time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid date format: {0:?}")]
pub struct InvalidDate(pub String);

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Ordering key for log records.
///
/// Serials are compared by their millisecond timestamp first and by the
/// opaque discriminator the producer attaches second. A serial built from an
/// instant carries an empty discriminator, so it sorts before every real
/// serial produced at or after that instant and can be used as a query bound.
///
/// Wire form is `"<millis>"` or `"<millis>-<discriminator>"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LogSerial {
    millis: i64,
    discriminator: String,
}

impl LogSerial {
    pub fn new(millis: i64, discriminator: impl Into<String>) -> Self {
        Self {
            millis,
            discriminator: discriminator.into(),
        }
    }

    /// Bound probe for the given instant.
    pub fn from_instant(instant: DateTime<Utc>) -> Self {
        Self::from_millis(instant.timestamp_millis())
    }

    pub fn from_millis(millis: i64) -> Self {
        Self {
            millis,
            discriminator: String::new(),
        }
    }

    /// Parses a `since`/`until` value typed by a user.
    pub fn parse_bound(input: &str) -> Result<Self, InvalidDate> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(InvalidDate(input.to_string()));
        }

        if trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return trimmed
                .parse::<i64>()
                .map(Self::from_millis)
                .map_err(|_| InvalidDate(input.to_string()));
        }

        if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
            return Ok(Self::from_instant(parsed.with_timezone(&Utc)));
        }

        for format in NAIVE_FORMATS {
            if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
                return Ok(Self::from_instant(Utc.from_utc_datetime(&naive)));
            }
        }

        if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
            if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
                return Ok(Self::from_instant(Utc.from_utc_datetime(&midnight)));
            }
        }

        Err(InvalidDate(input.to_string()))
    }

    pub fn millis(&self) -> i64 {
        self.millis
    }

    pub fn discriminator(&self) -> &str {
        &self.discriminator
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.millis).single()
    }

    /// Whether this serial is a bound probe rather than a producer serial.
    pub fn is_bound(&self) -> bool {
        self.discriminator.is_empty()
    }
}

impl fmt::Display for LogSerial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.discriminator.is_empty() {
            write!(f, "{}", self.millis)
        } else {
            write!(f, "{}-{}", self.millis, self.discriminator)
        }
    }
}

impl FromStr for LogSerial {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        // A leading '-' is the sign of pre-epoch millis, not the separator.
        let start = usize::from(value.starts_with('-'));
        let (head, tail) = match value[start..].find('-') {
            Some(pos) => (&value[..start + pos], &value[start + pos + 1..]),
            None => (value, ""),
        };
        let millis = head
            .parse::<i64>()
            .map_err(|err| format!("serial {value:?} has no millisecond prefix: {err}"))?;
        Ok(Self::new(millis, tail))
    }
}

impl TryFrom<String> for LogSerial {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LogSerial> for String {
    fn from(value: LogSerial) -> Self {
        value.to_string()
    }
}
