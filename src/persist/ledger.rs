//! Per-document change tracking.
//!
//! The ledger remembers, for every attribute touched by a setter since the
//! last commit, the value it had at that commit (`original`) and the value it
//! holds now (`current`). Dirtiness is always decided by value equality of
//! those two, so an attribute that is edited and then edited back is tracked
//! but not reported as changed.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::core::Value;

/// Before/after pair for one attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeChange {
    pub original: Value,
    pub current: Value,
}

impl AttributeChange {
    pub fn new(original: Value, current: Value) -> Self {
        Self { original, current }
    }

    /// Returns `true` when the value round-tripped back to its baseline.
    pub fn is_reverted(&self) -> bool {
        self.original == self.current
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeLedger {
    changed_attributes: BTreeMap<String, AttributeChange>,
    previously_changed: BTreeMap<String, AttributeChange>,
}

impl ChangeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a setter call moving `name` from `old` to `new`.
    ///
    /// Returns `false` (and records nothing) when `new` equals `old`. The
    /// first recorded change captures `old` as the baseline; later changes
    /// only move the current value.
    pub fn record_change(&mut self, name: &str, old: &Value, new: &Value) -> bool {
        if old == new {
            return false;
        }

        match self.changed_attributes.get_mut(name) {
            Some(entry) => entry.current = new.clone(),
            None => {
                self.changed_attributes.insert(
                    name.to_string(),
                    AttributeChange::new(old.clone(), new.clone()),
                );
            }
        }
        true
    }

    pub fn is_dirty(&self, name: &str) -> bool {
        self.changed_attributes
            .get(name)
            .is_some_and(|entry| !entry.is_reverted())
    }

    /// Returns `true` when any attribute is dirty.
    pub fn has_changes(&self) -> bool {
        self.changed_attributes
            .values()
            .any(|entry| !entry.is_reverted())
    }

    pub fn changed_names(&self) -> BTreeSet<String> {
        self.changed_attributes
            .iter()
            .filter(|(_, entry)| !entry.is_reverted())
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn diff(&self, name: &str) -> Option<&AttributeChange> {
        self.changed_attributes
            .get(name)
            .filter(|entry| !entry.is_reverted())
    }

    /// Returns every dirty attribute with its before/after pair.
    pub fn changes(&self) -> BTreeMap<String, AttributeChange> {
        self.changed_attributes
            .iter()
            .filter(|(_, entry)| !entry.is_reverted())
            .map(|(name, entry)| (name.clone(), entry.clone()))
            .collect()
    }

    /// Returns the baseline value of a dirty attribute.
    pub fn original(&self, name: &str) -> Option<&Value> {
        self.diff(name).map(|entry| &entry.original)
    }

    /// Names that are tracked but whose value is back at its baseline.
    pub fn reverted_names(&self) -> BTreeSet<String> {
        self.changed_attributes
            .iter()
            .filter(|(_, entry)| entry.is_reverted())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Drops tracked entries that reverted to their baseline and returns their names.
    ///
    /// Nothing needs to be written for them, so they are cleared without
    /// touching `previously_changed`.
    pub fn discard_reverted(&mut self) -> BTreeSet<String> {
        let reverted = self.reverted_names();
        for name in &reverted {
            self.changed_attributes.remove(name);
        }
        reverted
    }

    /// Stops tracking `names` without recording them as committed.
    pub fn discard<'a, I>(&mut self, names: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        for name in names {
            self.changed_attributes.remove(name);
        }
    }

    /// Accepts `names` as persisted.
    ///
    /// Each dirty name moves into `previously_changed` as
    /// `(original, current)`; names that are not dirty are ignored. The
    /// previous history is replaced, not merged.
    pub fn commit<'a, I>(&mut self, names: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut committed = BTreeMap::new();
        for name in names {
            match self.changed_attributes.remove(name) {
                Some(entry) if !entry.is_reverted() => {
                    committed.insert(name.to_string(), entry);
                }
                _ => {}
            }
        }
        self.previously_changed = committed;
    }

    pub fn commit_all(&mut self) {
        let names = self.changed_names();
        self.commit(names.iter().map(String::as_str));
    }

    pub fn previous_changes(&self) -> &BTreeMap<String, AttributeChange> {
        &self.previously_changed
    }

    pub fn previous_change(&self, name: &str) -> Option<&AttributeChange> {
        self.previously_changed.get(name)
    }

    /// Clears change and history state.
    pub fn reset(&mut self) {
        self.changed_attributes.clear();
        self.previously_changed.clear();
    }
}
