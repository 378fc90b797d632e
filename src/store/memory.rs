use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{DocumentStore, FullWrite, IncrementWrite, PartialWrite, WriteResponse, WriteResult};
use crate::core::{PersistError, Result, Value};

/// A document as held by [`InMemoryDocumentStore`].
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub source: BTreeMap<String, Value>,
    pub version: i64,
}

/// Every request the store received, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreRequest {
    Full(FullWrite),
    Partial(PartialWrite),
    Increment(IncrementWrite),
}

impl StoreRequest {
    /// Field names carried by the request payload.
    pub fn field_names(&self) -> Vec<String> {
        match self {
            Self::Full(request) => request.source.keys().cloned().collect(),
            Self::Partial(request) => request.fields.keys().cloned().collect(),
            Self::Increment(request) => vec![request.attribute.clone()],
        }
    }
}

#[derive(Debug, Default)]
struct StoreState {
    documents: HashMap<String, StoredDocument>,
    /// Debugging log of received requests; unbounded until `clear_requests`.
    requests: Vec<StoreRequest>,
    pending_conflicts: u32,
    pending_failures: u32,
}

impl StoreState {
    fn take_failure(&mut self, id: Option<&str>) -> Result<()> {
        if self.pending_failures == 0 {
            return Ok(());
        }
        self.pending_failures -= 1;
        warn!(
            "in-memory store rejected write: document='{}' remaining_failures={}",
            id.unwrap_or("<new>"),
            self.pending_failures
        );
        Err(PersistError::WriteFailure(
            "store unavailable (injected failure)".to_string(),
        ))
    }

    /// Consumes injected conflicts for up to `1 + retry_budget` attempts.
    ///
    /// Returns `true` when an attempt got through.
    fn run_attempts(&mut self, id: &str, retry_budget: u32) -> bool {
        for attempt in 0..=retry_budget {
            if self.pending_conflicts == 0 {
                return true;
            }
            self.pending_conflicts -= 1;
            debug!(
                "in-memory store version conflict: document='{}' attempt={} budget={}",
                id, attempt, retry_budget
            );
        }
        false
    }

    fn check_version(&self, id: &str, expected: Option<i64>) -> Result<()> {
        let Some(expected) = expected else {
            return Ok(());
        };
        let actual = self.documents.get(id).map(|doc| doc.version);
        if actual == Some(expected) {
            return Ok(());
        }
        Err(PersistError::VersionConflict {
            id: id.to_string(),
            expected: Some(expected),
            actual,
        })
    }

    fn conflict(&self, id: &str, expected: Option<i64>) -> PersistError {
        PersistError::VersionConflict {
            id: id.to_string(),
            expected,
            actual: self.documents.get(id).map(|doc| doc.version),
        }
    }
}

/// Versioned in-process document store.
///
/// Applies every write atomically under one lock, bumps a per-document
/// version on each successful write, honours expected versions and executes
/// conflict retries within the request's retry budget. Conflicts and
/// failures can be injected to exercise the caller's failure paths.
#[derive(Clone, Default)]
pub struct InMemoryDocumentStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` write attempts fail with a version conflict.
    pub async fn inject_conflicts(&self, count: u32) {
        self.state.lock().await.pending_conflicts = count;
    }

    /// Makes the next `count` write calls fail outright.
    pub async fn fail_next_writes(&self, count: u32) {
        self.state.lock().await.pending_failures = count;
    }

    pub async fn get(&self, id: &str) -> Option<StoredDocument> {
        self.state.lock().await.documents.get(id).cloned()
    }

    pub async fn version(&self, id: &str) -> Option<i64> {
        self.state.lock().await.documents.get(id).map(|doc| doc.version)
    }

    pub async fn document_count(&self) -> usize {
        self.state.lock().await.documents.len()
    }

    /// Every request received since creation or the last `clear_requests`,
    /// failed ones included. The log is never trimmed automatically.
    pub async fn requests(&self) -> Vec<StoreRequest> {
        self.state.lock().await.requests.clone()
    }

    pub async fn last_request(&self) -> Option<StoreRequest> {
        self.state.lock().await.requests.last().cloned()
    }

    pub async fn clear_requests(&self) {
        self.state.lock().await.requests.clear();
    }

    /// Applies a write from another client, bumping the stored version.
    pub async fn apply_external_update(
        &self,
        id: &str,
        fields: BTreeMap<String, Value>,
    ) -> Result<i64> {
        let mut state = self.state.lock().await;
        let doc = state
            .documents
            .get_mut(id)
            .ok_or_else(|| PersistError::DocumentNotFound(id.to_string()))?;
        doc.source.extend(fields);
        doc.version += 1;
        Ok(doc.version)
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn write_full(&self, request: FullWrite) -> Result<WriteResponse> {
        let mut state = self.state.lock().await;
        state.requests.push(StoreRequest::Full(request.clone()));
        state.take_failure(request.id.as_deref())?;

        let id = request
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        if !state.run_attempts(&id, 0) {
            return Err(state.conflict(&id, request.version));
        }
        state.check_version(&id, request.version)?;

        let (version, result) = match state.documents.get(&id) {
            Some(existing) => (existing.version + 1, WriteResult::Updated),
            None => (1, WriteResult::Created),
        };
        state.documents.insert(
            id.clone(),
            StoredDocument {
                source: request.source,
                version,
            },
        );
        debug!(
            "in-memory store full write: document='{}' version={} result={:?}",
            id, version, result
        );

        Ok(WriteResponse::new(id, version, result))
    }

    async fn write_partial(&self, request: PartialWrite) -> Result<WriteResponse> {
        let mut state = self.state.lock().await;
        state.requests.push(StoreRequest::Partial(request.clone()));
        state.take_failure(Some(&request.id))?;

        if !state.documents.contains_key(&request.id) {
            return Err(PersistError::DocumentNotFound(request.id));
        }
        state.check_version(&request.id, request.version)?;
        if !state.run_attempts(&request.id, request.retry_budget) {
            return Err(state.conflict(&request.id, request.version));
        }

        let doc = state
            .documents
            .get_mut(&request.id)
            .ok_or_else(|| PersistError::DocumentNotFound(request.id.clone()))?;
        doc.source.extend(request.fields);
        doc.version += 1;
        let version = doc.version;
        debug!(
            "in-memory store partial write: document='{}' version={}",
            request.id, version
        );

        Ok(WriteResponse::new(request.id, version, WriteResult::Updated))
    }

    async fn write_increment(&self, request: IncrementWrite) -> Result<WriteResponse> {
        let mut state = self.state.lock().await;
        state.requests.push(StoreRequest::Increment(request.clone()));
        state.take_failure(Some(&request.id))?;

        if !state.documents.contains_key(&request.id) {
            return Err(PersistError::DocumentNotFound(request.id));
        }
        if !state.run_attempts(&request.id, request.retry_budget) {
            return Err(state.conflict(&request.id, None));
        }

        let doc = state
            .documents
            .get_mut(&request.id)
            .ok_or_else(|| PersistError::DocumentNotFound(request.id.clone()))?;
        let current = doc
            .source
            .get(&request.attribute)
            .cloned()
            .unwrap_or(Value::Null);
        let updated = current.checked_add(&request.delta).ok_or_else(|| {
            PersistError::WriteFailure(format!(
                "cannot increment field '{}' of type {} by {}",
                request.attribute,
                current.type_name(),
                request.delta
            ))
        })?;
        doc.source.insert(request.attribute.clone(), updated.clone());
        doc.version += 1;
        let version = doc.version;

        Ok(WriteResponse::new(request.id, version, WriteResult::Updated)
            .with_field(request.attribute, updated))
    }
}
