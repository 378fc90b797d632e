use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::{AttributeType, PersistError, Result, Value};

pub const CREATED_AT: &str = "created_at";
pub const UPDATED_AT: &str = "updated_at";

/// Describes a single attribute of a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDef {
    pub name: String,
    pub attribute_type: AttributeType,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default)]
    pub default: Option<Value>,
}

fn default_nullable() -> bool {
    true
}

impl AttributeDef {
    pub fn new(name: impl Into<String>, attribute_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attribute_type,
            nullable: true,
            default: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Checks nullability and type compatibility of `value`.
    pub fn validate(&self, model: &str, value: &Value) -> Result<()> {
        if value.is_null() {
            if !self.nullable {
                return Err(PersistError::TypeMismatch(format!(
                    "Attribute '{}' of '{}' cannot be NULL",
                    self.name, model
                )));
            }
            return Ok(());
        }

        if !self.attribute_type.is_compatible(value) {
            return Err(PersistError::TypeMismatch(format!(
                "Attribute '{}' of '{}' expects type {}, got {}",
                self.name,
                model,
                self.attribute_type,
                value.type_name()
            )));
        }

        Ok(())
    }
}

/// Attribute list of a document model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSchema {
    pub model_name: String,
    pub attributes: Vec<AttributeDef>,
    #[serde(default)]
    pub timestamps: bool,
}

impl ModelSchema {
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            attributes: Vec::new(),
            timestamps: false,
        }
    }

    /// Builder-style attribute registration. Re-registering a name replaces it.
    pub fn attribute(mut self, name: impl Into<String>, attribute_type: AttributeType) -> Self {
        self.push(AttributeDef::new(name, attribute_type));
        self
    }

    pub fn with_attribute(mut self, def: AttributeDef) -> Self {
        self.push(def);
        self
    }

    /// Adds `created_at` / `updated_at` timestamp attributes.
    pub fn with_timestamps(mut self) -> Self {
        self.timestamps = true;
        self.push(AttributeDef::new(CREATED_AT, AttributeType::Timestamp));
        self.push(AttributeDef::new(UPDATED_AT, AttributeType::Timestamp));
        self
    }

    fn push(&mut self, def: AttributeDef) {
        match self.attributes.iter_mut().find(|a| a.name == def.name) {
            Some(existing) => *existing = def,
            None => self.attributes.push(def),
        }
    }

    /// Parses a schema from its JSON description.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let mut schema: Self = serde_json::from_str(json)?;
        if schema.timestamps {
            schema = schema.with_timestamps();
        }
        Ok(schema)
    }

    pub fn attribute_def(&self, name: &str) -> Option<&AttributeDef> {
        self.attributes.iter().find(|attr| attr.name == name)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attribute_def(name).is_some()
    }

    pub fn attribute_names(&self) -> impl Iterator<Item = &str> {
        self.attributes.iter().map(|attr| attr.name.as_str())
    }

    /// Looks up `name` and validates `value` against it.
    pub fn validate(&self, name: &str, value: &Value) -> Result<&AttributeDef> {
        let def = self.attribute_def(name).ok_or_else(|| {
            PersistError::AttributeNotFound(name.to_string(), self.model_name.clone())
        })?;
        def.validate(&self.model_name, value)?;
        Ok(def)
    }

    /// Builds the initial attribute map: declared defaults, `Null` otherwise,
    /// and `now` for timestamp attributes.
    pub fn default_values(&self, now: DateTime<Utc>) -> BTreeMap<String, Value> {
        let mut values = BTreeMap::new();
        for attr in &self.attributes {
            let value = if self.timestamps && (attr.name == CREATED_AT || attr.name == UPDATED_AT)
            {
                Value::Timestamp(now)
            } else {
                attr.default.clone().unwrap_or(Value::Null)
            };
            values.insert(attr.name.clone(), value);
        }
        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_unknown_and_mistyped_attributes() {
        let schema = ModelSchema::new("article")
            .attribute("title", AttributeType::Text)
            .with_attribute(AttributeDef::new("views", AttributeType::Integer).not_null());

        assert!(schema.validate("title", &Value::from("x")).is_ok());
        assert!(matches!(
            schema.validate("body", &Value::from("x")),
            Err(PersistError::AttributeNotFound(_, _))
        ));
        assert!(matches!(
            schema.validate("views", &Value::from("many")),
            Err(PersistError::TypeMismatch(_))
        ));
        assert!(matches!(
            schema.validate("views", &Value::Null),
            Err(PersistError::TypeMismatch(_))
        ));
    }

    #[test]
    fn default_values_fill_timestamps() {
        let now = Utc::now();
        let schema = ModelSchema::new("article")
            .with_attribute(AttributeDef::new("views", AttributeType::Integer).with_default(0i64))
            .with_timestamps();

        let defaults = schema.default_values(now);
        assert_eq!(defaults.get("views"), Some(&Value::Integer(0)));
        assert_eq!(defaults.get(CREATED_AT), Some(&Value::Timestamp(now)));
        assert_eq!(defaults.get(UPDATED_AT), Some(&Value::Timestamp(now)));
    }

    #[test]
    fn schema_parses_from_json() {
        let schema = ModelSchema::from_json_str(
            r#"{
                "model_name": "note",
                "attributes": [
                    { "name": "title", "attribute_type": "text", "nullable": false },
                    { "name": "count", "attribute_type": "integer", "default": 1 }
                ],
                "timestamps": true
            }"#,
        )
        .unwrap();

        assert_eq!(schema.model_name, "note");
        assert!(!schema.attribute_def("title").unwrap().nullable);
        assert_eq!(
            schema.attribute_def("count").unwrap().default,
            Some(Value::Integer(1))
        );
        assert!(schema.has_attribute(UPDATED_AT));
        assert_eq!(schema.attribute_names().count(), 4);
    }
}
