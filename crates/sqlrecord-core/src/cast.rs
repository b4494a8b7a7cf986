//! Attribute casting.
//!
//! Casts are declared per column on a [`ModelSchema`](crate::ModelSchema) and
//! applied when a row is hydrated and again when a record is serialized.
//! Casting never fails: a value that cannot be converted is kept as-is.

use crate::error::{Error, Result};
use crate::value::Value;
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use std::str::FromStr;

/// Declared cast for one attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CastKind {
    Boolean,
    Integer,
    Float,
    String,
    /// Parse text into structured JSON, falling back to the raw value
    Json,
    /// Parse text into a JSON array, falling back to a one-element array
    Array,
    /// ISO date (`YYYY-MM-DD`)
    Date,
    /// ISO timestamp in UTC with millisecond precision
    DateTime,
}

impl FromStr for CastKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bool" | "boolean" => Ok(CastKind::Boolean),
            "int" | "integer" => Ok(CastKind::Integer),
            "float" | "double" | "real" => Ok(CastKind::Float),
            "string" | "text" => Ok(CastKind::String),
            "json" | "object" => Ok(CastKind::Json),
            "array" | "collection" => Ok(CastKind::Array),
            "date" => Ok(CastKind::Date),
            "datetime" | "timestamp" => Ok(CastKind::DateTime),
            other => Err(Error::config(format!("unknown cast '{}'", other))),
        }
    }
}

impl CastKind {
    /// Apply this cast to a value.
    ///
    /// NULL always stays NULL.
    pub fn apply(self, value: &Value) -> Value {
        if value.is_null() {
            return Value::Null;
        }
        match self {
            CastKind::Boolean => Value::Bool(truthy(value)),
            CastKind::Integer => to_integer(value).map_or_else(|| value.clone(), Value::BigInt),
            CastKind::Float => to_float(value).map_or_else(|| value.clone(), Value::Double),
            CastKind::String => match value {
                Value::Text(_) => value.clone(),
                other => Value::Text(other.to_string()),
            },
            CastKind::Json => to_json(value),
            CastKind::Array => to_array(value),
            CastKind::Date => parse_datetime(value).map_or_else(
                || value.clone(),
                |dt| Value::Text(dt.date_naive().format("%Y-%m-%d").to_string()),
            ),
            CastKind::DateTime => parse_datetime(value).map_or_else(
                || value.clone(),
                |dt| Value::Text(format_timestamp(dt)),
            ),
        }
    }
}

/// Format a UTC instant the way datetime casts and timestamps store it.
pub fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Current UTC time in stored timestamp form.
pub fn now_timestamp() -> Value {
    Value::Text(format_timestamp(Utc::now()))
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Text(s) => {
            let s = s.trim().to_ascii_lowercase();
            match s.as_str() {
                "1" | "true" => true,
                "0" | "false" | "" => false,
                _ => true,
            }
        }
        Value::Json(serde_json::Value::Bool(b)) => *b,
        Value::Json(serde_json::Value::Null) => false,
        other => other
            .as_i64()
            .map(|n| n != 0)
            .or_else(|| other.as_f64().map(|f| f != 0.0))
            .unwrap_or(true),
    }
}

fn to_integer(value: &Value) -> Option<i64> {
    value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f.trunc() as i64))
        .or_else(|| {
            let text = value.as_str()?.trim();
            text.parse::<i64>()
                .ok()
                .or_else(|| text.parse::<f64>().ok().map(|f| f.trunc() as i64))
        })
}

fn to_float(value: &Value) -> Option<f64> {
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

fn to_json(value: &Value) -> Value {
    match value {
        Value::Json(_) => value.clone(),
        Value::Text(s) => serde_json::from_str(s).map_or_else(|_| value.clone(), Value::Json),
        other => Value::Json(other.to_json()),
    }
}

fn to_array(value: &Value) -> Value {
    let parsed = match value {
        Value::Json(json) => json.clone(),
        Value::Text(s) => match serde_json::from_str::<serde_json::Value>(s) {
            Ok(json) => json,
            Err(_) => return Value::Json(serde_json::Value::Array(vec![value.to_json()])),
        },
        other => other.to_json(),
    };
    match parsed {
        serde_json::Value::Array(_) => Value::Json(parsed),
        single => Value::Json(serde_json::Value::Array(vec![single])),
    }
}

fn parse_datetime(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Timestamp(micros) | Value::TimestampTz(micros) => {
            DateTime::from_timestamp_micros(*micros)
        }
        Value::Date(days) => DateTime::from_timestamp(i64::from(*days) * 86_400, 0),
        Value::Text(s) => parse_text_datetime(s.trim()),
        _ => None,
    }
}

fn parse_text_datetime(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}
