//! Attribute value types

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::collections::BTreeMap;
use std::fmt;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Attribute values keyed by attribute name.
pub type Values = BTreeMap<String, Value>;

/// Storage type of a model attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttributeKind {
    Integer,
    Float,
    Boolean,
    Text,
    Timestamp,
    Json,
    Binary,
}

impl fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AttributeKind::Integer => "integer",
            AttributeKind::Float => "float",
            AttributeKind::Boolean => "boolean",
            AttributeKind::Text => "text",
            AttributeKind::Timestamp => "timestamp",
            AttributeKind::Json => "json",
            AttributeKind::Binary => "binary",
        };
        f.write_str(name)
    }
}

/// A single attribute value held by a model instance.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Timestamp(Timestamp),
    Json(JsonValue),
    Binary(Vec<u8>),
}

/// Why a stored field could not be turned back into a [`Value`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FieldError {
    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        expected: AttributeKind,
        found: String,
    },

    #[error("invalid timestamp {value}")]
    InvalidTimestamp { value: String },

    #[error("invalid buffer payload")]
    InvalidBuffer,

    #[error("non-finite float {value}")]
    NonFinite { value: f64 },
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<Timestamp> {
        match self {
            Value::Timestamp(v) => Some(*v),
            _ => None,
        }
    }

    /// Check this value against an attribute kind, normalizing it so that
    /// its JSON projection decodes back to the same value.
    ///
    /// Integers widen to floats. A JSON `null` becomes [`Value::Null`].
    pub fn conform(self, kind: AttributeKind) -> Result<Value, FieldError> {
        match (kind, self) {
            (_, Value::Null) | (_, Value::Json(JsonValue::Null)) => Ok(Value::Null),
            (AttributeKind::Float, Value::Integer(v)) => Ok(Value::Float(v as f64)),
            (AttributeKind::Float, Value::Float(v)) if !v.is_finite() => {
                Err(FieldError::NonFinite { value: v })
            }
            (AttributeKind::Integer, v @ Value::Integer(_))
            | (AttributeKind::Float, v @ Value::Float(_))
            | (AttributeKind::Boolean, v @ Value::Bool(_))
            | (AttributeKind::Text, v @ Value::Text(_))
            | (AttributeKind::Timestamp, v @ Value::Timestamp(_))
            | (AttributeKind::Json, v @ Value::Json(_))
            | (AttributeKind::Binary, v @ Value::Binary(_)) => Ok(v),
            (expected, other) => Err(FieldError::TypeMismatch {
                expected,
                found: other.kind_name().to_string(),
            }),
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Timestamp(_) => "timestamp",
            Value::Json(_) => "json",
            Value::Binary(_) => "binary",
        }
    }

    /// Render this value as one segment of a cache key.
    ///
    /// Returns `None` for values that cannot identify a row.
    pub fn key_component(&self) -> Option<String> {
        match self {
            Value::Null | Value::Binary(_) => None,
            Value::Bool(v) => Some(v.to_string()),
            Value::Integer(v) => Some(v.to_string()),
            Value::Float(v) => Some(v.to_string()),
            Value::Text(v) => Some(v.clone()),
            Value::Timestamp(v) => Some(format_timestamp(v)),
            Value::Json(v) => Some(v.to_string()),
        }
    }

    /// Plain JSON projection of this value.
    ///
    /// Timestamps degrade to RFC 3339 text and byte buffers to the
    /// `{"type":"Buffer","data":[...]}` shape.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Null => JsonValue::Null,
            Value::Bool(v) => JsonValue::Bool(*v),
            Value::Integer(v) => JsonValue::from(*v),
            Value::Float(v) => JsonValue::from(*v),
            Value::Text(v) => JsonValue::String(v.clone()),
            Value::Timestamp(v) => JsonValue::String(format_timestamp(v)),
            Value::Json(v) => v.clone(),
            Value::Binary(v) => json!({ "type": "Buffer", "data": v }),
        }
    }

    /// Rebuild a value of the given kind from its plain JSON projection.
    pub fn from_json(kind: AttributeKind, json: &JsonValue) -> Result<Value, FieldError> {
        if json.is_null() {
            return Ok(Value::Null);
        }
        let mismatch = || FieldError::TypeMismatch {
            expected: kind,
            found: json_type_name(json).to_string(),
        };
        match kind {
            AttributeKind::Integer => json.as_i64().map(Value::Integer).ok_or_else(mismatch),
            AttributeKind::Float => json.as_f64().map(Value::Float).ok_or_else(mismatch),
            AttributeKind::Boolean => json.as_bool().map(Value::Bool).ok_or_else(mismatch),
            AttributeKind::Text => json
                .as_str()
                .map(|s| Value::Text(s.to_string()))
                .ok_or_else(mismatch),
            AttributeKind::Timestamp => parse_timestamp(json).map(Value::Timestamp),
            AttributeKind::Json => Ok(Value::Json(json.clone())),
            AttributeKind::Binary => rehydrate_buffer(json).map(Value::Binary),
        }
    }
}

/// Coerce a primitive JSON value into a timestamp.
///
/// Strings are parsed as RFC 3339, numbers are milliseconds since the epoch.
pub fn parse_timestamp(json: &JsonValue) -> Result<Timestamp, FieldError> {
    match json {
        JsonValue::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| FieldError::InvalidTimestamp { value: s.clone() }),
        JsonValue::Number(n) => n
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
            .ok_or_else(|| FieldError::InvalidTimestamp {
                value: n.to_string(),
            }),
        other => Err(FieldError::TypeMismatch {
            expected: AttributeKind::Timestamp,
            found: json_type_name(other).to_string(),
        }),
    }
}

/// Turn a `{"type":"Buffer","data":[...]}` object (or a bare byte array)
/// back into bytes.
pub fn rehydrate_buffer(json: &JsonValue) -> Result<Vec<u8>, FieldError> {
    let data = match json {
        JsonValue::Object(map) if map.get("type").and_then(JsonValue::as_str) == Some("Buffer") => {
            map.get("data").ok_or(FieldError::InvalidBuffer)?
        }
        JsonValue::Array(_) => json,
        _ => return Err(FieldError::InvalidBuffer),
    };
    let items = data.as_array().ok_or(FieldError::InvalidBuffer)?;
    items
        .iter()
        .map(|item| {
            item.as_u64()
                .and_then(|b| u8::try_from(b).ok())
                .ok_or(FieldError::InvalidBuffer)
        })
        .collect()
}

fn format_timestamp(ts: &Timestamp) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn json_type_name(json: &JsonValue) -> &'static str {
    match json {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Timestamp> for Value {
    fn from(v: Timestamp) -> Self {
        Value::Timestamp(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Binary(v)
    }
}

impl From<JsonValue> for Value {
    fn from(v: JsonValue) -> Self {
        Value::Json(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Build a [`Values`] map from `(name, value)` pairs.
pub fn values<K, I>(pairs: I) -> Values
where
    K: Into<String>,
    I: IntoIterator<Item = (K, Value)>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conform_round_trips_through_json() {
        let null_json = Value::Json(JsonValue::Null).conform(AttributeKind::Json).unwrap();
        let back = Value::from_json(AttributeKind::Json, &null_json.to_json()).unwrap();
        assert_eq!(back, null_json);

        let widened = Value::Integer(7).conform(AttributeKind::Float).unwrap();
        assert_eq!(widened, Value::Float(7.0));

        assert_eq!(
            Value::Float(f64::INFINITY).conform(AttributeKind::Float),
            Err(FieldError::NonFinite { value: f64::INFINITY })
        );
        assert!(matches!(
            Value::Text("1".into()).conform(AttributeKind::Integer),
            Err(FieldError::TypeMismatch { expected: AttributeKind::Integer, .. })
        ));
    }

    #[test]
    fn test_timestamp_json_keeps_sub_second_precision() {
        let ts = Utc.timestamp_opt(1_700_000_000, 123_456_789).unwrap();
        let json = Value::Timestamp(ts).to_json();
        let back = Value::from_json(AttributeKind::Timestamp, &json).unwrap();
        assert_eq!(back, Value::Timestamp(ts));
    }

    #[test]
    fn test_timestamp_from_epoch_millis() {
        let json = JsonValue::from(1_700_000_000_000i64);
        let ts = parse_timestamp(&json).unwrap();
        assert_eq!(ts.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_invalid_timestamp_text() {
        let json = JsonValue::from("yesterday");
        assert!(matches!(
            parse_timestamp(&json),
            Err(FieldError::InvalidTimestamp { .. })
        ));
    }

    #[test]
    fn test_buffer_shape_and_rehydration() {
        let value = Value::Binary(vec![0, 7, 255]);
        let json = value.to_json();
        assert_eq!(json["type"], "Buffer");
        assert_eq!(json["data"], json!([0, 7, 255]));
        assert_eq!(Value::from_json(AttributeKind::Binary, &json).unwrap(), value);
    }

    #[test]
    fn test_buffer_rejects_out_of_range_bytes() {
        let json = json!({ "type": "Buffer", "data": [1, 256] });
        assert_eq!(rehydrate_buffer(&json), Err(FieldError::InvalidBuffer));
    }

    #[test]
    fn test_type_mismatch_reported() {
        let err = Value::from_json(AttributeKind::Integer, &json!("one")).unwrap_err();
        assert_eq!(
            err,
            FieldError::TypeMismatch {
                expected: AttributeKind::Integer,
                found: "string".to_string(),
            }
        );
    }

    #[test]
    fn test_key_components() {
        assert_eq!(Value::from(1).key_component().as_deref(), Some("1"));
        assert_eq!(Value::from("abc").key_component().as_deref(), Some("abc"));
        assert_eq!(Value::Null.key_component(), None);
        assert_eq!(Value::Binary(vec![1]).key_component(), None);
    }

    #[test]
    fn test_null_round_trips_for_every_kind() {
        for kind in [
            AttributeKind::Integer,
            AttributeKind::Float,
            AttributeKind::Boolean,
            AttributeKind::Text,
            AttributeKind::Timestamp,
            AttributeKind::Json,
            AttributeKind::Binary,
        ] {
            assert_eq!(Value::from_json(kind, &JsonValue::Null).unwrap(), Value::Null);
        }
    }
}
