// crates/equiflux-core/src/timestamp.rs

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ServiceError};

/// Storage precision: timestamps are kept in 100 ns ticks.
pub const TICK_NANOS: i128 = 100;

const NANOS_PER_SECOND: i128 = 1_000_000_000;

static DATE_TIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<date>\d{4}-\d{2}-\d{2})[T ](?P<time>\d{2}:\d{2}:\d{2})(?:\.(?P<fraction>\d+))?(?P<offset>Z|z|[+-]\d{2}:?\d{2})?$",
    )
    .expect("timestamp pattern is valid")
});

static DATE_ONLY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("date pattern is valid"));

fn invalid(value: &str, reason: impl Into<String>) -> ServiceError {
    ServiceError::InvalidTimestamp {
        value: value.to_string(),
        reason: reason.into(),
    }
}

/// Parses RFC 3339, naive (UTC) and date-only timestamps.
///
/// The fractional second is normalised to exactly nine digits first: shorter
/// fractions are right-padded, longer ones truncated.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    let trimmed = value.trim();

    if DATE_ONLY.is_match(trimmed) {
        let date = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
            .map_err(|err| invalid(value, err.to_string()))?;
        let midnight = date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| invalid(value, "date has no midnight"))?;
        return Ok(Utc.from_utc_datetime(&midnight));
    }

    let captures = DATE_TIME
        .captures(trimmed)
        .ok_or_else(|| invalid(value, "expected an ISO 8601 date or date-time"))?;

    let fraction = normalize_fraction(captures.name("fraction").map_or("", |m| m.as_str()));
    let normalized = format!("{}T{}.{}", &captures["date"], &captures["time"], fraction);

    match captures.name("offset").map(|m| m.as_str()) {
        None => {
            let naive = NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M:%S%.f")
                .map_err(|err| invalid(value, err.to_string()))?;
            Ok(Utc.from_utc_datetime(&naive))
        }
        Some(offset) => {
            let offset = match offset {
                "Z" | "z" => "Z".to_string(),
                other if other.len() == 5 => format!("{}:{}", &other[..3], &other[3..]),
                other => other.to_string(),
            };
            DateTime::parse_from_rfc3339(&format!("{normalized}{offset}"))
                .map(|parsed| parsed.with_timezone(&Utc))
                .map_err(|err| invalid(value, err.to_string()))
        }
    }
}

fn normalize_fraction(fraction: &str) -> String {
    let mut digits: String = fraction.chars().take(9).collect();
    while digits.len() < 9 {
        digits.push('0');
    }
    digits
}

/// Unix nanoseconds at storage tick precision (half-up to the nearest 100 ns).
pub fn unix_nanos(timestamp: &DateTime<Utc>) -> i128 {
    let subsec = i128::from(timestamp.timestamp_subsec_nanos().min(999_999_999));
    let total = i128::from(timestamp.timestamp()) * NANOS_PER_SECOND + subsec;
    (total + TICK_NANOS / 2).div_euclid(TICK_NANOS) * TICK_NANOS
}

pub fn unix_nanos_string(timestamp: &DateTime<Utc>) -> String {
    unix_nanos(timestamp).to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimePeriod {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimePeriod {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if start > end {
            return Err(ServiceError::InvalidPeriod { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn parse(start: &str, end: &str) -> Result<Self> {
        Self::new(parse_timestamp(start)?, parse_timestamp(end)?)
    }

    /// The `hours` long window ending at `end`.
    pub fn trailing(end: DateTime<Utc>, hours: i64) -> Result<Self> {
        let window = TimeDelta::try_hours(hours)
            .filter(|window| *window >= TimeDelta::zero())
            .ok_or_else(|| ServiceError::Config(format!("invalid window of {hours} hours")))?;
        let start = end
            .checked_sub_signed(window)
            .ok_or_else(|| ServiceError::Config(format!("window of {hours} hours underflows")))?;
        Self::new(start, end)
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn start_nanos(&self) -> i128 {
        unix_nanos(&self.start)
    }

    pub fn end_nanos(&self) -> i128 {
        unix_nanos(&self.end)
    }
}
