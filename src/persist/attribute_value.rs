use chrono::{DateTime, Utc};

use crate::core::{AttributeType, PersistError, Result, Value};

/// Rust types that can back a typed attribute generated by `document_model!`.
pub trait AttributeValue: Sized {
    fn attribute_type() -> AttributeType;

    fn into_value(self) -> Value;

    fn from_value(value: &Value) -> Option<Self>;

    /// Whether the attribute accepts `Null`.
    fn nullable() -> bool {
        false
    }

    /// Reads `value` as `Self`, reporting a mismatch for `attribute`.
    fn read(attribute: &str, value: Option<&Value>) -> Result<Self> {
        let value = value.unwrap_or(&Value::Null);
        Self::from_value(value).ok_or_else(|| {
            PersistError::TypeMismatch(format!(
                "attribute '{}' holds {} value, expected {}",
                attribute,
                value.type_name(),
                Self::attribute_type()
            ))
        })
    }
}

impl AttributeValue for i64 {
    fn attribute_type() -> AttributeType {
        AttributeType::Integer
    }

    fn into_value(self) -> Value {
        Value::Integer(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_i64()
    }
}

impl AttributeValue for f64 {
    fn attribute_type() -> AttributeType {
        AttributeType::Float
    }

    fn into_value(self) -> Value {
        Value::Float(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_f64()
    }
}

impl AttributeValue for String {
    fn attribute_type() -> AttributeType {
        AttributeType::Text
    }

    fn into_value(self) -> Value {
        Value::Text(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_str().map(str::to_string)
    }
}

impl AttributeValue for bool {
    fn attribute_type() -> AttributeType {
        AttributeType::Boolean
    }

    fn into_value(self) -> Value {
        Value::Boolean(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_bool()
    }
}

impl AttributeValue for DateTime<Utc> {
    fn attribute_type() -> AttributeType {
        AttributeType::Timestamp
    }

    fn into_value(self) -> Value {
        Value::Timestamp(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        value.as_timestamp()
    }
}

impl AttributeValue for serde_json::Value {
    fn attribute_type() -> AttributeType {
        AttributeType::Json
    }

    fn into_value(self) -> Value {
        Value::Json(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        Some(value.to_json())
    }

    fn nullable() -> bool {
        true
    }
}

impl<T: AttributeValue> AttributeValue for Option<T> {
    fn attribute_type() -> AttributeType {
        T::attribute_type()
    }

    fn into_value(self) -> Value {
        self.map_or(Value::Null, T::into_value)
    }

    fn from_value(value: &Value) -> Option<Self> {
        if value.is_null() {
            return Some(None);
        }
        T::from_value(value).map(Some)
    }

    fn nullable() -> bool {
        true
    }
}
