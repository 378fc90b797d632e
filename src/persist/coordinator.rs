use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{Instrument, Level, event, info_span};

use crate::core::{AttributeType, PersistError, Result, Value};
use crate::persist::document::Document;
use crate::persist::options::{CoordinatorPolicy, SaveOptions, UpdateOptions, WriteOptions};
use crate::persist::schema::UPDATED_AT;
use crate::store::{DocumentStore, FullWrite, IncrementWrite, PartialWrite, WriteResponse};

/// Drives the save-family operations of a [`Document`] against a store.
///
/// Every operation follows the same rule: build the request from the
/// document, await the store, and touch the change ledger only when the
/// store confirmed the write. A failed call leaves the document's dirty set
/// as it was, so repeating the call sends the same payload.
#[derive(Clone)]
pub struct SaveCoordinator {
    store: Arc<dyn DocumentStore>,
    policy: CoordinatorPolicy,
}

impl SaveCoordinator {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self::with_policy(store, CoordinatorPolicy::default())
    }

    pub fn with_policy(store: Arc<dyn DocumentStore>, policy: CoordinatorPolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &CoordinatorPolicy {
        &self.policy
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Persists the document.
    ///
    /// Unpersisted documents, or any document with `options.force`, get a
    /// full overwrite and commit every dirty attribute. Persisted documents
    /// get a partial update of their genuinely changed attributes only.
    pub async fn save(&self, doc: &mut Document, options: SaveOptions) -> Result<WriteResponse> {
        let span = info_span!(
            "persist.save",
            model = %doc.model_name(),
            id = doc.id().unwrap_or("<new>"),
            force = options.force
        );
        self.save_inner(doc, options).instrument(span).await
    }

    async fn save_inner(&self, doc: &mut Document, options: SaveOptions) -> Result<WriteResponse> {
        if options.force || !doc.is_persisted() {
            return self.save_full(doc, options.forwarded).await;
        }

        let reverted = doc.ledger_mut().discard_reverted();
        if !reverted.is_empty() {
            event!(
                Level::DEBUG,
                reverted = ?reverted,
                "cleared attributes that reverted to their saved value"
            );
        }

        let names = doc.changed();
        if names.is_empty() && self.policy.skip_empty_partial_updates {
            event!(Level::DEBUG, "nothing to save");
            let id = required_id(doc)?;
            // Same ledger outcome as an empty write: history is cleared.
            doc.ledger_mut().commit(std::iter::empty::<&str>());
            return Ok(WriteResponse::noop(id, doc.version().unwrap_or_default()));
        }

        let retry_budget = options
            .retry_budget
            .unwrap_or(self.policy.default_retry_budget);
        self.write_attributes(doc, names, retry_budget, options.forwarded)
            .await
    }

    /// Assigns `attributes` and writes exactly those names.
    ///
    /// All assignments are validated before any is applied. On success only
    /// these names are committed; other dirty attributes stay dirty. When
    /// `updated_at` is stamped (see [`CoordinatorPolicy::stamp_updated_at`])
    /// it is written and committed alongside them.
    pub async fn update<I, K>(
        &self,
        doc: &mut Document,
        attributes: I,
        options: UpdateOptions,
    ) -> Result<WriteResponse>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let span = info_span!("persist.update", model = %doc.model_name(), id = doc.id());
        let attributes = attributes
            .into_iter()
            .map(|(name, value)| (name.into(), value))
            .collect::<BTreeMap<String, Value>>();
        self.update_inner(doc, attributes, options)
            .instrument(span)
            .await
    }

    async fn update_inner(
        &self,
        doc: &mut Document,
        attributes: BTreeMap<String, Value>,
        options: UpdateOptions,
    ) -> Result<WriteResponse> {
        require_persisted(doc, "update")?;
        doc.validate_attributes(attributes.iter().map(|(name, value)| (name.as_str(), value)))?;

        let mut names = BTreeSet::new();
        for (name, value) in attributes {
            doc.set(name.clone(), value)?;
            names.insert(name);
        }

        self.write_attributes(doc, names, options.retry_budget, options.forwarded)
            .await
    }

    /// Adds `by` to a numeric attribute through the store's increment primitive.
    pub async fn increment(
        &self,
        doc: &mut Document,
        attribute: &str,
        by: impl Into<Value>,
        options: UpdateOptions,
    ) -> Result<WriteResponse> {
        let span = info_span!("persist.increment", model = %doc.model_name(), attribute);
        self.apply_increment(doc, attribute, by.into(), options)
            .instrument(span)
            .await
    }

    /// Subtracts `by` from a numeric attribute.
    pub async fn decrement(
        &self,
        doc: &mut Document,
        attribute: &str,
        by: impl Into<Value>,
        options: UpdateOptions,
    ) -> Result<WriteResponse> {
        let span = info_span!("persist.decrement", model = %doc.model_name(), attribute);
        let by = by.into();
        let delta = by.checked_neg().ok_or_else(|| {
            PersistError::InvalidArgument(format!(
                "Cannot decrement '{}' by {} value",
                attribute,
                by.type_name()
            ))
        })?;
        self.apply_increment(doc, attribute, delta, options)
            .instrument(span)
            .await
    }

    /// Writes the current time to `attribute` (the policy's touch attribute by default).
    pub async fn touch(
        &self,
        doc: &mut Document,
        attribute: Option<&str>,
        options: UpdateOptions,
    ) -> Result<WriteResponse> {
        let attribute = attribute
            .unwrap_or(self.policy.touch_attribute.as_str())
            .to_string();
        let span = info_span!("persist.touch", model = %doc.model_name(), attribute = %attribute);
        self.touch_inner(doc, attribute, options)
            .instrument(span)
            .await
    }

    async fn touch_inner(
        &self,
        doc: &mut Document,
        attribute: String,
        options: UpdateOptions,
    ) -> Result<WriteResponse> {
        require_persisted(doc, "touch")?;
        let now = Value::Timestamp(Utc::now());
        match doc.schema().attribute_def(&attribute) {
            None => {
                return Err(PersistError::InvalidArgument(format!(
                    "Object does not have '{}' attribute",
                    attribute
                )));
            }
            Some(def) if !def.attribute_type.is_compatible(&now) => {
                return Err(PersistError::InvalidArgument(format!(
                    "Cannot touch {} attribute '{}'",
                    def.attribute_type, attribute
                )));
            }
            Some(_) => {}
        }

        let request = PartialWrite {
            id: required_id(doc)?,
            fields: BTreeMap::from([(attribute.clone(), now.clone())]),
            retry_budget: options.retry_budget,
            version: self.partial_version(doc),
            options: options.forwarded,
        };
        let response = self.store.write_partial(request).await.inspect_err(|err| {
            event!(Level::WARN, error = %err, "touch failed; change state kept");
        })?;

        doc.set(attribute.as_str(), now)?;
        doc.apply_write(&response);
        doc.ledger_mut().commit([attribute.as_str()]);
        event!(Level::DEBUG, version = response.version, "touch committed");
        Ok(response)
    }

    async fn save_full(&self, doc: &mut Document, options: WriteOptions) -> Result<WriteResponse> {
        let stamp = self.updated_at_stamp(doc, None);
        let mut source = doc.attributes().clone();
        if let Some(now) = stamp {
            source.insert(UPDATED_AT.to_string(), Value::Timestamp(now));
        }

        // Only a document the store already has carries a version token.
        let version = if doc.is_persisted() { doc.version() } else { None };
        let request = FullWrite {
            id: doc.id().map(str::to_string),
            source,
            version,
            options,
        };

        let response = self.store.write_full(request).await.inspect_err(|err| {
            event!(Level::WARN, error = %err, "full save failed; change state kept");
        })?;

        if let Some(now) = stamp {
            doc.set(UPDATED_AT, now)?;
        }
        doc.apply_write(&response);
        doc.ledger_mut().commit_all();
        event!(
            Level::DEBUG,
            version = response.version,
            committed = doc.previous_changes().len(),
            "full save committed"
        );
        Ok(response)
    }

    /// Partial write of `names` with their current values, then commit of those names.
    async fn write_attributes(
        &self,
        doc: &mut Document,
        mut names: BTreeSet<String>,
        retry_budget: u32,
        options: WriteOptions,
    ) -> Result<WriteResponse> {
        let mut fields = names
            .iter()
            .map(|name| {
                let value = doc.get(name).cloned().unwrap_or(Value::Null);
                (name.clone(), value)
            })
            .collect::<BTreeMap<_, _>>();

        let stamp = self.updated_at_stamp(doc, Some(&names));
        if let Some(now) = stamp {
            fields.insert(UPDATED_AT.to_string(), Value::Timestamp(now));
        }

        let request = PartialWrite {
            id: required_id(doc)?,
            fields,
            retry_budget,
            version: self.partial_version(doc),
            options,
        };
        event!(
            Level::DEBUG,
            fields = ?request.fields.keys().collect::<Vec<_>>(),
            retry_budget,
            "sending partial update"
        );

        let response = self.store.write_partial(request).await.inspect_err(|err| {
            event!(Level::WARN, error = %err, "partial update failed; change state kept");
        })?;

        if let Some(now) = stamp {
            doc.set(UPDATED_AT, now)?;
            names.insert(UPDATED_AT.to_string());
        }
        doc.apply_write(&response);
        doc.ledger_mut().commit(names.iter().map(String::as_str));
        event!(
            Level::DEBUG,
            version = response.version,
            committed = doc.previous_changes().len(),
            "partial update committed"
        );
        Ok(response)
    }

    async fn apply_increment(
        &self,
        doc: &mut Document,
        attribute: &str,
        delta: Value,
        options: UpdateOptions,
    ) -> Result<WriteResponse> {
        require_persisted(doc, "increment")?;
        let def = doc.schema().attribute_def(attribute).ok_or_else(|| {
            PersistError::AttributeNotFound(attribute.to_string(), doc.model_name().to_string())
        })?;
        let attribute_type = def.attribute_type;
        let integral = matches!(attribute_type, AttributeType::Integer);
        if !def.attribute_type.is_numeric()
            || !delta.is_numeric()
            || (integral && !matches!(delta, Value::Integer(_)))
        {
            return Err(PersistError::InvalidArgument(format!(
                "Cannot increment {} attribute '{}' by {} value",
                def.attribute_type,
                attribute,
                delta.type_name()
            )));
        }

        let request = IncrementWrite {
            id: required_id(doc)?,
            attribute: attribute.to_string(),
            delta: delta.clone(),
            retry_budget: options.retry_budget,
            options: options.forwarded,
        };
        let response = self.store.write_increment(request).await.inspect_err(|err| {
            event!(Level::WARN, error = %err, "increment failed; change state kept");
        })?;

        // The store applied the increment; from here on nothing may fail.
        let current = doc.get(attribute).cloned().unwrap_or(Value::Null);
        let updated = match response.fields.get(attribute) {
            Some(stored) if !stored.is_null() && attribute_type.is_compatible(stored) => {
                Some(stored.clone())
            }
            Some(stored) => {
                event!(
                    Level::WARN,
                    stored = %stored,
                    "store reported a value the attribute cannot hold; using local sum"
                );
                current.checked_add(&delta)
            }
            None => current.checked_add(&delta),
        };
        match updated {
            Some(updated) => {
                if let Err(err) = doc.set(attribute, updated) {
                    event!(Level::WARN, error = %err, "could not apply incremented value locally");
                }
            }
            None => event!(Level::WARN, "local increment overflowed; value left as is"),
        }
        doc.apply_write(&response);
        doc.ledger_mut().commit([attribute]);
        event!(Level::DEBUG, version = response.version, "increment committed");
        Ok(response)
    }

    /// Timestamp to write as `updated_at`, unless the caller already writes it.
    fn updated_at_stamp(
        &self,
        doc: &Document,
        names: Option<&BTreeSet<String>>,
    ) -> Option<DateTime<Utc>> {
        if !self.policy.stamp_updated_at
            || !doc.schema().timestamps
            || !doc.schema().has_attribute(UPDATED_AT)
        {
            return None;
        }
        if names.is_some_and(|names| names.contains(UPDATED_AT)) {
            return None;
        }
        Some(Utc::now())
    }

    fn partial_version(&self, doc: &Document) -> Option<i64> {
        if self.policy.versioned_partial_updates {
            doc.version()
        } else {
            None
        }
    }
}

fn require_persisted(doc: &Document, operation: &str) -> Result<()> {
    if doc.is_persisted() {
        return Ok(());
    }
    Err(PersistError::DocumentNotSaved(format!(
        "cannot {} a '{}' document that was never saved",
        operation,
        doc.model_name()
    )))
}

fn required_id(doc: &Document) -> Result<String> {
    doc.id().map(str::to_string).ok_or_else(|| {
        PersistError::DocumentNotSaved(format!("'{}' document has no id", doc.model_name()))
    })
}
