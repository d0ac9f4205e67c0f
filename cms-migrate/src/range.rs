//! Range selection over order keys.
//!
//! Two textual forms are accepted: `"<int>:<int>"` for numeric keys and
//! `"T<date>[-<time>]:<date>[-<time>]"` for timestamp keys, where a date is
//! `yyyy[-mm[-dd]]` and a time is up to three of `hh-mm-ss`. Missing date parts
//! default to the first month/day and missing time parts to zero (UTC).

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::errors::RangeError;
use crate::order::OrderKey;

static NUMERIC_RANGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9]+):([0-9]+)$").expect("numeric range pattern is valid"));

static DATE_RANGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^T(?P<from_date>\d{4}(?:-\d{2}){0,2})(?:-(?P<from_time>(?:\d{2}-){0,2}\d{2}))?:(?P<to_date>\d{4}(?:-\d{2}){0,2})(?:-(?P<to_time>(?:\d{2}-){0,2}\d{2}))?$",
    )
    .expect("date range pattern is valid")
});

/// Inclusive bounds `from <= value <= to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range<T> {
    pub from: T,
    pub to: T,
}

impl<T: PartialOrd> Range<T> {
    pub fn contains(&self, value: &T) -> bool {
        &self.from <= value && value <= &self.to
    }
}

/// A parsed `--range` argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationRange {
    Numeric(Range<u64>),
    Date(Range<DateTime<Utc>>),
}

impl MigrationRange {
    /// Parse either range form.
    pub fn parse(spec: &str) -> Result<Self, RangeError> {
        parse_numeric_range(spec)
            .map(MigrationRange::Numeric)
            .or_else(|_| parse_date_range(spec).map(MigrationRange::Date))
    }

    /// A numeric range only selects numeric keys, a date range only timestamp keys.
    pub fn selects(&self, key: &OrderKey) -> bool {
        match (self, key) {
            (MigrationRange::Numeric(range), OrderKey::Number(n)) => range.contains(n),
            (MigrationRange::Date(range), OrderKey::Timestamp(ts)) => range.contains(ts),
            _ => false,
        }
    }
}

impl FromStr for MigrationRange {
    type Err = RangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl std::fmt::Display for MigrationRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MigrationRange::Numeric(range) => write!(f, "{}:{}", range.from, range.to),
            MigrationRange::Date(range) => write!(
                f,
                "T{}:{}",
                range.from.format("%Y-%m-%d-%H-%M-%S"),
                range.to.format("%Y-%m-%d-%H-%M-%S")
            ),
        }
    }
}

/// Parse `"<int>:<int>"` with `from <= to`.
pub fn parse_numeric_range(spec: &str) -> Result<Range<u64>, RangeError> {
    let caps = NUMERIC_RANGE.captures(spec).ok_or_else(|| RangeError::new(spec))?;
    let from: u64 = caps[1].parse().map_err(|_| RangeError::new(spec))?;
    let to: u64 = caps[2].parse().map_err(|_| RangeError::new(spec))?;

    if from <= to {
        Ok(Range { from, to })
    } else {
        Err(RangeError::new(spec))
    }
}

/// Parse `"T<date>[-<time>]:<date>[-<time>]"` with `from <= to`.
pub fn parse_date_range(spec: &str) -> Result<Range<DateTime<Utc>>, RangeError> {
    let caps = DATE_RANGE.captures(spec).ok_or_else(|| RangeError::new(spec))?;

    let from = instant(&caps, "from_date", "from_time").ok_or_else(|| RangeError::new(spec))?;
    let to = instant(&caps, "to_date", "to_time").ok_or_else(|| RangeError::new(spec))?;

    if from <= to {
        Ok(Range { from, to })
    } else {
        Err(RangeError::new(spec))
    }
}

fn instant(caps: &Captures<'_>, date_group: &str, time_group: &str) -> Option<DateTime<Utc>> {
    let date = caps.name(date_group)?.as_str();
    let time = caps.name(time_group).map(|m| m.as_str()).unwrap_or("");

    let date_parts = numeric_parts(date)?;
    let (year, month, day) = match date_parts.as_slice() {
        [y] => (*y as i32, 1, 1),
        [y, m] => (*y as i32, *m, 1),
        [y, m, d] => (*y as i32, *m, *d),
        _ => return None,
    };

    let time_parts = if time.is_empty() { Vec::new() } else { numeric_parts(time)? };
    let (hour, minute, second) = match time_parts.as_slice() {
        [] => (0, 0, 0),
        [h] => (*h, 0, 0),
        [h, m] => (*h, *m, 0),
        [h, m, s] => (*h, *m, *s),
        _ => return None,
    };

    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    let time = NaiveTime::from_hms_opt(hour, minute, second)?;
    Some(date.and_time(time).and_utc())
}

fn numeric_parts(text: &str) -> Option<Vec<u32>> {
    text.split('-').map(|part| part.parse::<u32>().ok()).collect()
}
