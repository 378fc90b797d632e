use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::core::{PersistError, Result, Value};
use crate::persist::ledger::{AttributeChange, ChangeLedger};
use crate::persist::schema::ModelSchema;
use crate::store::WriteResponse;

/// Store-side identity of a document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub id: Option<String>,
    /// Version token of the last confirmed write or load.
    pub version: Option<i64>,
    pub persisted: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistenceState {
    Unpersisted,
    PersistedClean,
    PersistedDirty,
}

/// Serializable snapshot of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    pub model_name: String,
    pub metadata: DocumentMetadata,
    pub state: PersistenceState,
    pub fields: serde_json::Value,
}

/// A mutable record mapped to a store document.
///
/// All writes go through [`Document::set`], which records the change in the
/// document's [`ChangeLedger`] before applying it.
#[derive(Debug, Clone)]
pub struct Document {
    schema: Arc<ModelSchema>,
    attributes: BTreeMap<String, Value>,
    metadata: DocumentMetadata,
    ledger: ChangeLedger,
}

impl Document {
    /// Creates an unpersisted document from schema defaults plus `attributes`.
    ///
    /// Construction-time assignments are not reported as changes.
    pub fn new<I, K>(schema: Arc<ModelSchema>, attributes: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let defaults = schema.default_values(Utc::now());
        let mut document = Self {
            schema,
            attributes: defaults,
            metadata: DocumentMetadata::default(),
            ledger: ChangeLedger::new(),
        };
        for (name, value) in attributes {
            document.set(name, value)?;
        }
        document.ledger.reset();
        Ok(document)
    }

    /// Rebuilds a persisted document from stored fields.
    ///
    /// Unknown fields are ignored; missing ones take schema defaults.
    pub fn from_stored(
        schema: Arc<ModelSchema>,
        id: impl Into<String>,
        version: i64,
        source: &BTreeMap<String, Value>,
    ) -> Result<Self> {
        let stored = source
            .iter()
            .filter(|(name, _)| schema.has_attribute(name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect::<Vec<_>>();
        let mut document = Self::new(schema, stored)?;
        document.metadata = DocumentMetadata {
            id: Some(id.into()),
            version: Some(version),
            persisted: true,
        };
        Ok(document)
    }

    /// Rebuilds a persisted document from a JSON object.
    pub fn from_json(
        schema: Arc<ModelSchema>,
        id: impl Into<String>,
        version: i64,
        json: &serde_json::Value,
    ) -> Result<Self> {
        let object = json.as_object().ok_or_else(|| {
            PersistError::Serialization("Document source must be a JSON object".to_string())
        })?;
        let source = object
            .iter()
            .map(|(name, value)| (name.clone(), Value::from_json(value)))
            .collect::<BTreeMap<_, _>>();
        Self::from_stored(schema, id, version, &source)
    }

    /// Assigns an explicit id to a document that was never saved.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.metadata.id = Some(id.into());
        self
    }

    pub fn schema(&self) -> &ModelSchema {
        &self.schema
    }

    pub fn model_name(&self) -> &str {
        &self.schema.model_name
    }

    pub fn id(&self) -> Option<&str> {
        self.metadata.id.as_deref()
    }

    /// Current store version token, used for concurrency-safe overwrites.
    pub fn version(&self) -> Option<i64> {
        self.metadata.version
    }

    pub fn metadata(&self) -> &DocumentMetadata {
        &self.metadata
    }

    pub fn is_persisted(&self) -> bool {
        self.metadata.persisted
    }

    pub fn state(&self) -> PersistenceState {
        if !self.metadata.persisted {
            PersistenceState::Unpersisted
        } else if self.ledger.has_changes() {
            PersistenceState::PersistedDirty
        } else {
            PersistenceState::PersistedClean
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn attributes(&self) -> &BTreeMap<String, Value> {
        &self.attributes
    }

    /// Sets one attribute after schema validation.
    ///
    /// Returns `true` when the value changed. Assigning a value equal to the
    /// current one is a no-op and never marks the attribute dirty.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> Result<bool> {
        let name = name.into();
        let value = value.into();
        let def = self.schema.validate(&name, &value)?;
        let value = def.attribute_type.coerce(value);

        let current = self.attributes.get(&name).cloned().unwrap_or(Value::Null);
        if !self.ledger.record_change(&name, &current, &value) {
            return Ok(false);
        }
        self.attributes.insert(name, value);
        Ok(true)
    }

    /// Validates a batch of assignments without applying any of them.
    pub fn validate_attributes<'a, I>(&self, attributes: I) -> Result<()>
    where
        I: IntoIterator<Item = (&'a str, &'a Value)>,
    {
        for (name, value) in attributes {
            self.schema.validate(name, value)?;
        }
        Ok(())
    }

    pub fn is_changed(&self) -> bool {
        self.ledger.has_changes()
    }

    pub fn attribute_changed(&self, name: &str) -> bool {
        self.ledger.is_dirty(name)
    }

    pub fn changed(&self) -> BTreeSet<String> {
        self.ledger.changed_names()
    }

    pub fn changes(&self) -> BTreeMap<String, AttributeChange> {
        self.ledger.changes()
    }

    pub fn attribute_change(&self, name: &str) -> Option<&AttributeChange> {
        self.ledger.diff(name)
    }

    /// Value of `name` at the last commit.
    pub fn attribute_was(&self, name: &str) -> Option<&Value> {
        self.ledger
            .original(name)
            .or_else(|| self.attributes.get(name))
    }

    pub fn previous_changes(&self) -> &BTreeMap<String, AttributeChange> {
        self.ledger.previous_changes()
    }

    /// Puts every dirty attribute back to its last committed value.
    pub fn restore_attributes(&mut self) {
        let changes = self.ledger.changes();
        for (name, change) in &changes {
            self.attributes.insert(name.clone(), change.original.clone());
        }
        self.ledger.discard(changes.keys().map(String::as_str));
        self.ledger.discard_reverted();
    }

    /// Discards change and history state, treating current values as the baseline.
    pub fn clear_changes(&mut self) {
        self.ledger.reset();
    }

    pub fn ledger(&self) -> &ChangeLedger {
        &self.ledger
    }

    pub(crate) fn ledger_mut(&mut self) -> &mut ChangeLedger {
        &mut self.ledger
    }

    /// Records identity and version reported by a confirmed write.
    pub(crate) fn apply_write(&mut self, response: &WriteResponse) {
        self.metadata.id = Some(response.id.clone());
        self.metadata.version = Some(response.version);
        self.metadata.persisted = true;
    }

    /// Returns the attribute map as a JSON object.
    pub fn to_json(&self) -> serde_json::Value {
        let object = self
            .attributes
            .iter()
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect::<serde_json::Map<_, _>>();
        serde_json::Value::Object(object)
    }

    pub fn snapshot(&self) -> DocumentSnapshot {
        DocumentSnapshot {
            model_name: self.schema.model_name.clone(),
            metadata: self.metadata.clone(),
            state: self.state(),
            fields: self.to_json(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::AttributeType;
    use crate::persist::schema::{AttributeDef, UPDATED_AT};

    fn schema() -> Arc<ModelSchema> {
        Arc::new(
            ModelSchema::new("counter")
                .attribute("name", AttributeType::Text)
                .with_attribute(AttributeDef::new("count", AttributeType::Integer).with_default(0i64))
                .attribute("ratio", AttributeType::Float),
        )
    }

    #[test]
    fn construction_assignments_are_not_changes() {
        let doc = Document::new(schema(), [("name", Value::from("A")), ("count", Value::from(1i64))])
            .unwrap();
        assert_eq!(doc.get("name"), Some(&Value::from("A")));
        assert!(!doc.is_changed());
        assert!(doc.previous_changes().is_empty());
        assert_eq!(doc.state(), PersistenceState::Unpersisted);
    }

    #[test]
    fn set_records_and_reports_changes() {
        let mut doc = Document::new(schema(), [("count", Value::from(1i64))]).unwrap();

        assert!(!doc.set("count", 1i64).unwrap());
        assert!(!doc.attribute_changed("count"));

        assert!(doc.set("count", 2i64).unwrap());
        assert!(doc.set("count", 3i64).unwrap());
        assert_eq!(doc.attribute_was("count"), Some(&Value::Integer(1)));
        assert_eq!(
            doc.attribute_change("count"),
            Some(&AttributeChange::new(Value::Integer(1), Value::Integer(3)))
        );
        assert_eq!(doc.changed().into_iter().collect::<Vec<_>>(), vec!["count"]);
    }

    #[test]
    fn set_rejects_unknown_attribute_and_wrong_type() {
        let mut doc = Document::new(schema(), Vec::<(String, Value)>::new()).unwrap();
        assert!(matches!(
            doc.set("missing", 1i64),
            Err(PersistError::AttributeNotFound(_, _))
        ));
        assert!(matches!(
            doc.set("count", "ten"),
            Err(PersistError::TypeMismatch(_))
        ));
        assert!(!doc.is_changed());
    }

    #[test]
    fn tiny_float_assignment_is_stored_and_dirty() {
        let mut doc = Document::new(schema(), [("ratio", Value::Float(0.0))]).unwrap();
        assert!(doc.set("ratio", 1e-20).unwrap());
        assert_eq!(doc.get("ratio"), Some(&Value::Float(1e-20)));
        assert!(doc.attribute_changed("ratio"));
        assert_eq!(doc.attribute_was("ratio"), Some(&Value::Float(0.0)));
    }

    #[test]
    fn set_coerces_to_declared_type() {
        let mut doc = Document::new(schema(), [("ratio", Value::Float(1.0))]).unwrap();
        assert!(!doc.set("ratio", 1i64).unwrap());
        assert!(doc.set("ratio", 2i64).unwrap());
        assert_eq!(doc.get("ratio"), Some(&Value::Float(2.0)));
    }

    #[test]
    fn restore_attributes_returns_to_baseline() {
        let mut doc = Document::new(schema(), [("name", Value::from("A"))]).unwrap();
        doc.set("name", "B").unwrap();
        doc.set("count", 9i64).unwrap();

        doc.restore_attributes();

        assert_eq!(doc.get("name"), Some(&Value::from("A")));
        assert_eq!(doc.get("count"), Some(&Value::Integer(0)));
        assert!(!doc.is_changed());
        assert!(doc.ledger().reverted_names().is_empty());
    }

    #[test]
    fn from_json_hydrates_persisted_clean_document() {
        let doc = Document::from_json(
            schema(),
            "doc-7",
            4,
            &serde_json::json!({ "name": "stored", "count": 12, "extra": true }),
        )
        .unwrap();

        assert_eq!(doc.id(), Some("doc-7"));
        assert_eq!(doc.version(), Some(4));
        assert_eq!(doc.state(), PersistenceState::PersistedClean);
        assert_eq!(doc.get("count"), Some(&Value::Integer(12)));
        assert!(doc.get("extra").is_none());
    }

    #[test]
    fn state_tracks_dirtiness_of_persisted_document() {
        let mut doc = Document::from_json(schema(), "doc-1", 1, &serde_json::json!({"count": 1}))
            .unwrap();
        doc.set("count", 2i64).unwrap();
        assert_eq!(doc.state(), PersistenceState::PersistedDirty);
        doc.set("count", 1i64).unwrap();
        assert_eq!(doc.state(), PersistenceState::PersistedClean);
    }

    #[test]
    fn timestamps_are_filled_at_construction() {
        let schema = Arc::new(ModelSchema::new("stamped").with_timestamps());
        let doc = Document::new(schema, Vec::<(String, Value)>::new()).unwrap();
        assert!(matches!(doc.get(UPDATED_AT), Some(Value::Timestamp(_))));
        assert!(!doc.is_changed());
    }

    #[test]
    fn snapshot_serializes_fields() {
        let doc = Document::new(schema(), [("name", Value::from("A"))]).unwrap();
        let snapshot = doc.snapshot();
        assert_eq!(snapshot.model_name, "counter");
        assert_eq!(snapshot.fields["name"], serde_json::json!("A"));
        assert_eq!(snapshot.state, PersistenceState::Unpersisted);
        assert!(serde_json::to_string(&snapshot).is_ok());
    }
}
