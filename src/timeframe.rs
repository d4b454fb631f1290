//! Time range parsing for searches.
//!
//! A bound is either `now`, an offset before now such as `15m`, `1h`, `7d`,
//! or an absolute RFC 3339 timestamp.

use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TimeframeError {
    #[error("Invalid time '{0}'. Use 'now', a relative offset like 30m, 1h, 7d, or an RFC 3339 timestamp")]
    Invalid(String),

    #[error("Start of the time range ({from}) must be before its end ({to})")]
    Inverted {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },
}

/// A closed time range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeframe {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl Timeframe {
    pub fn parse(from: &str, to: &str, now: DateTime<Utc>) -> Result<Self, TimeframeError> {
        let from = parse_bound(from, now)?;
        let to = parse_bound(to, now)?;
        if from >= to {
            return Err(TimeframeError::Inverted { from, to });
        }
        Ok(Self { from, to })
    }

    pub fn from_millis(&self) -> i64 {
        self.from.timestamp_millis()
    }

    pub fn to_millis(&self) -> i64 {
        self.to.timestamp_millis()
    }
}

fn relative_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+)\s*([smhdw])$").expect("valid regex"))
}

fn parse_bound(input: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>, TimeframeError> {
    let trimmed = input.trim();
    if trimmed.eq_ignore_ascii_case("now") {
        return Ok(now);
    }

    if let Some(caps) = relative_re().captures(trimmed) {
        let amount: i64 = caps[1]
            .parse()
            .map_err(|_| TimeframeError::Invalid(input.to_string()))?;
        let offset = match &caps[2] {
            "s" => Duration::try_seconds(amount),
            "m" => Duration::try_minutes(amount),
            "h" => Duration::try_hours(amount),
            "d" => Duration::try_days(amount),
            _ => Duration::try_weeks(amount),
        };
        return offset
            .and_then(|offset| now.checked_sub_signed(offset))
            .ok_or_else(|| TimeframeError::Invalid(input.to_string()));
    }

    DateTime::parse_from_rfc3339(trimmed)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| TimeframeError::Invalid(input.to_string()))
}
