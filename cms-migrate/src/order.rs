//! Order keys that sequence migrations.
//!
//! A migration declares its `order` as a raw value. Only non-negative integers
//! and timestamps are valid; anything else is reported before a batch starts.

use std::cmp::Ordering;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A validated order key.
///
/// Numbers compare by value, timestamps by instant, and every number sorts
/// before every timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OrderKey {
    Number(u64),
    Timestamp(DateTime<Utc>),
}

impl OrderKey {
    pub fn is_number(&self) -> bool {
        matches!(self, OrderKey::Number(_))
    }

    pub fn is_timestamp(&self) -> bool {
        matches!(self, OrderKey::Timestamp(_))
    }
}

/// Total order over order keys.
pub fn compare(a: &OrderKey, b: &OrderKey) -> Ordering {
    match (a, b) {
        (OrderKey::Number(a), OrderKey::Number(b)) => a.cmp(b),
        (OrderKey::Timestamp(a), OrderKey::Timestamp(b)) => a.cmp(b),
        (OrderKey::Number(_), OrderKey::Timestamp(_)) => Ordering::Less,
        (OrderKey::Timestamp(_), OrderKey::Number(_)) => Ordering::Greater,
    }
}

impl Ord for OrderKey {
    fn cmp(&self, other: &Self) -> Ordering {
        compare(self, other)
    }
}

impl PartialOrd for OrderKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for OrderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderKey::Number(n) => write!(f, "{n}"),
            OrderKey::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339()),
        }
    }
}

/// The `order` value exactly as a migration declared it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DeclaredOrder {
    Integer(i64),
    Float(f64),
    Timestamp(DateTime<Utc>),
    Text(String),
}

impl DeclaredOrder {
    /// Interpret a TOML value. Datetimes without an offset are read as UTC.
    pub fn from_toml(value: &toml::Value) -> Self {
        match value {
            toml::Value::Integer(n) => DeclaredOrder::Integer(*n),
            toml::Value::Float(f) => DeclaredOrder::Float(*f),
            toml::Value::String(s) => DeclaredOrder::from_text(s),
            toml::Value::Datetime(dt) => {
                let text = dt.to_string();
                parse_instant(&text)
                    .map(DeclaredOrder::Timestamp)
                    .unwrap_or(DeclaredOrder::Text(text))
            }
            other => DeclaredOrder::Text(other.to_string()),
        }
    }

    /// Strings holding an RFC 3339 instant are timestamps.
    pub fn from_text(text: &str) -> Self {
        match DateTime::parse_from_rfc3339(text) {
            Ok(ts) => DeclaredOrder::Timestamp(ts.with_timezone(&Utc)),
            Err(_) => DeclaredOrder::Text(text.to_string()),
        }
    }

    /// The validated key, or `None` when the declared value is not a valid order.
    pub fn order_key(&self) -> Option<OrderKey> {
        match self {
            DeclaredOrder::Integer(n) => u64::try_from(*n).ok().map(OrderKey::Number),
            DeclaredOrder::Float(f) => {
                if f.is_finite() && *f >= 0.0 && f.fract() == 0.0 && *f <= u64::MAX as f64 {
                    Some(OrderKey::Number(*f as u64))
                } else {
                    None
                }
            }
            DeclaredOrder::Timestamp(ts) => Some(OrderKey::Timestamp(*ts)),
            DeclaredOrder::Text(_) => None,
        }
    }
}

/// True iff `order` is a timestamp or an integer greater than or equal to zero.
pub fn is_valid_order_key(order: &DeclaredOrder) -> bool {
    order.order_key().is_some()
}

fn parse_instant(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }
    // local datetime (no offset): treat as UTC
    chrono::NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| chrono::NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
        .or_else(|| {
            chrono::NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc())
        })
}

impl From<OrderKey> for DeclaredOrder {
    fn from(key: OrderKey) -> Self {
        match key {
            OrderKey::Number(n) => match i64::try_from(n) {
                Ok(n) => DeclaredOrder::Integer(n),
                Err(_) => DeclaredOrder::Float(n as f64),
            },
            OrderKey::Timestamp(ts) => DeclaredOrder::Timestamp(ts),
        }
    }
}

impl From<u32> for DeclaredOrder {
    fn from(n: u32) -> Self {
        DeclaredOrder::Integer(i64::from(n))
    }
}

impl From<i64> for DeclaredOrder {
    fn from(n: i64) -> Self {
        DeclaredOrder::Integer(n)
    }
}

impl From<DateTime<Utc>> for DeclaredOrder {
    fn from(ts: DateTime<Utc>) -> Self {
        DeclaredOrder::Timestamp(ts)
    }
}

impl fmt::Display for DeclaredOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeclaredOrder::Integer(n) => write!(f, "{n}"),
            DeclaredOrder::Float(v) => write!(f, "{v}"),
            DeclaredOrder::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339()),
            DeclaredOrder::Text(s) => write!(f, "{s:?}"),
        }
    }
}
