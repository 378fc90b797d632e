use std::fmt;

use serde::{Deserialize, Serialize};

use super::Value;

/// Declared type of a model attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    Integer,
    Float,
    Text,
    Boolean,
    Timestamp,
    Json,
}

impl AttributeType {
    pub fn is_compatible(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (Self::Integer, Value::Integer(_)) => true,
            (Self::Float, Value::Float(_)) => true,
            (Self::Float, Value::Integer(_)) => true,
            (Self::Text, Value::Text(_)) => true,
            (Self::Boolean, Value::Boolean(_)) => true,
            (Self::Timestamp, Value::Timestamp(_)) => true,
            (Self::Timestamp, Value::Text(_)) => value.as_timestamp().is_some(),
            (Self::Json, _) => true,
            _ => false,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer | Self::Float)
    }

    /// Normalizes a compatible value into this type's canonical variant.
    ///
    /// Hydrated documents carry timestamps as RFC 3339 text and floats that
    /// happen to be whole numbers as integers; both are mapped back here.
    pub fn coerce(&self, value: Value) -> Value {
        match (self, value) {
            (Self::Float, Value::Integer(i)) => Value::Float(i as f64),
            (Self::Timestamp, Value::Text(s)) => {
                let text = Value::Text(s);
                match text.as_timestamp() {
                    Some(ts) => Value::Timestamp(ts),
                    None => text,
                }
            }
            (Self::Json, Value::Json(json)) => Value::Json(json),
            (Self::Json, Value::Null) => Value::Null,
            (Self::Json, other) => Value::Json(other.to_json()),
            (_, other) => other,
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer => write!(f, "INTEGER"),
            Self::Float => write!(f, "FLOAT"),
            Self::Text => write!(f, "TEXT"),
            Self::Boolean => write!(f, "BOOLEAN"),
            Self::Timestamp => write!(f, "TIMESTAMP"),
            Self::Json => write!(f, "JSON"),
        }
    }
}
