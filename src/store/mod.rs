//! Document store client contract.
//!
//! The coordinator only decides *what* to send; implementations own the wire
//! format, version checks and conflict retries.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::{Result, Value};
use crate::persist::WriteOptions;

pub mod memory;

pub use memory::InMemoryDocumentStore;

/// Full-document overwrite (or create when `id` is `None` / unknown).
#[derive(Debug, Clone, PartialEq)]
pub struct FullWrite {
    pub id: Option<String>,
    pub source: BTreeMap<String, Value>,
    /// Version token the stored document must still have.
    pub version: Option<i64>,
    pub options: WriteOptions,
}

/// Partial update carrying only the listed fields.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialWrite {
    pub id: String,
    pub fields: BTreeMap<String, Value>,
    /// Conflict retries the store may perform before giving up.
    pub retry_budget: u32,
    pub version: Option<i64>,
    pub options: WriteOptions,
}

/// Store-side numeric increment of one field.
#[derive(Debug, Clone, PartialEq)]
pub struct IncrementWrite {
    pub id: String,
    pub attribute: String,
    pub delta: Value,
    pub retry_budget: u32,
    pub options: WriteOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteResult {
    Created,
    Updated,
    /// Nothing needed writing; the store was not called.
    Noop,
}

/// Confirmation of a successful write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteResponse {
    pub id: String,
    pub version: i64,
    pub result: WriteResult,
    /// Field values as stored after the write, when the store reports them.
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
}

impl WriteResponse {
    pub fn new(id: impl Into<String>, version: i64, result: WriteResult) -> Self {
        Self {
            id: id.into(),
            version,
            result,
            fields: BTreeMap::new(),
        }
    }

    pub fn noop(id: impl Into<String>, version: i64) -> Self {
        Self::new(id, version, WriteResult::Noop)
    }

    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn is_noop(&self) -> bool {
        self.result == WriteResult::Noop
    }
}

/// Write client for a remote document store.
///
/// A call must resolve to `Ok` only when the given fields were durably
/// applied; any `Err` means nothing was applied.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn write_full(&self, request: FullWrite) -> Result<WriteResponse>;

    async fn write_partial(&self, request: PartialWrite) -> Result<WriteResponse>;

    /// Adds `delta` to a numeric field; the response reports the new value.
    async fn write_increment(&self, request: IncrementWrite) -> Result<WriteResponse>;
}
