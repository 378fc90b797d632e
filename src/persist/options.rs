use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::Result;
use crate::persist::schema::UPDATED_AT;

pub const DEFAULT_RETRY_BUDGET: u32 = 3;

/// Store-specific options passed through to the write call untouched
/// (target index, refresh policy, routing, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WriteOptions(BTreeMap<String, serde_json::Value>);

impl WriteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.0.iter()
    }
}

/// Options for [`SaveCoordinator::save`](crate::persist::SaveCoordinator::save).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SaveOptions {
    /// Always do a full-document overwrite, even for a persisted record.
    pub force: bool,
    /// Retry budget for the partial-update path. `None` uses the policy default.
    pub retry_budget: Option<u32>,
    pub forwarded: WriteOptions,
}

impl SaveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn forced() -> Self {
        Self {
            force: true,
            ..Self::default()
        }
    }

    pub fn retry_budget(mut self, budget: u32) -> Self {
        self.retry_budget = Some(budget);
        self
    }

    pub fn forward(mut self, options: WriteOptions) -> Self {
        self.forwarded = options;
        self
    }
}

/// Options for `update`, `increment`, `decrement` and `touch`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateOptions {
    /// Conflict retries the store may perform. Defaults to none.
    pub retry_budget: u32,
    pub forwarded: WriteOptions,
}

impl UpdateOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn retry_budget(mut self, budget: u32) -> Self {
        self.retry_budget = budget;
        self
    }

    pub fn forward(mut self, options: WriteOptions) -> Self {
        self.forwarded = options;
        self
    }
}

/// Coordinator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorPolicy {
    /// Retry budget attached to partial saves when `SaveOptions` leaves it unset.
    pub default_retry_budget: u32,
    /// Return a no-op response instead of sending an empty partial update.
    pub skip_empty_partial_updates: bool,
    /// Send the document's version token with partial writes as well.
    pub versioned_partial_updates: bool,
    /// Write `updated_at` on save/update for schemas with timestamps.
    pub stamp_updated_at: bool,
    /// Attribute written by `touch` when none is given.
    pub touch_attribute: String,
}

impl Default for CoordinatorPolicy {
    fn default() -> Self {
        Self {
            default_retry_budget: DEFAULT_RETRY_BUDGET,
            skip_empty_partial_updates: true,
            versioned_partial_updates: false,
            stamp_updated_at: true,
            touch_attribute: UPDATED_AT.to_string(),
        }
    }
}

impl CoordinatorPolicy {
    /// Loads a policy from JSON; missing keys keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
