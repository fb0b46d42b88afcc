//! In-memory host collaborators.
//!
//! Used when nodes run outside a real host (the CLI) and as fixtures in tests.
//! Nothing here is persisted.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;

use crate::traits::{CredentialData, CredentialStore, Parameters, StaticData};
use crate::HostError;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Fixed parameter set with optional per-item overrides.
///
/// Declaration order is preserved and reported by [`Parameters::names`].
/// A name given only through [`with_item`](Self::with_item) is defined for
/// those items alone; every other item sees it as undefined.
#[derive(Debug, Clone, Default)]
pub struct MemoryParameters {
    declared: Vec<(String, Value)>,
    item_only: Vec<String>,
    per_item: HashMap<(usize, String), Value>,
}

impl MemoryParameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `name` with the same value for every item.
    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.declare(name.into(), value);
        self
    }

    /// Override `name` for a single item.
    pub fn with_item(mut self, item: usize, name: impl Into<String>, value: Value) -> Self {
        let name = name.into();
        if !self.item_only.contains(&name) {
            self.item_only.push(name.clone());
        }
        self.per_item.insert((item, name), value);
        self
    }

    fn declare(&mut self, name: String, value: Value) {
        match self.declared.iter_mut().find(|(k, _)| *k == name) {
            Some(slot) => slot.1 = value,
            None => self.declared.push((name, value)),
        }
    }
}

impl Parameters for MemoryParameters {
    fn get(&self, name: &str, item: usize) -> Result<Value, HostError> {
        if let Some(value) = self.per_item.get(&(item, name.to_string())) {
            return Ok(value.clone());
        }
        self.declared
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
            .ok_or_else(|| HostError::UndefinedParameter(name.to_string()))
    }

    fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.declared.iter().map(|(k, _)| k.clone()).collect();
        for name in &self.item_only {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names
    }
}

// ---------------------------------------------------------------------------
// Static data
// ---------------------------------------------------------------------------

/// Per-node key/value store held in memory.
#[derive(Debug, Default)]
pub struct MemoryStaticData {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryStaticData {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StaticData for MemoryStaticData {
    fn get(&self, key: &str) -> Option<Value> {
        lock(&self.entries).get(key).cloned()
    }

    fn set(&self, key: &str, value: Value) {
        lock(&self.entries).insert(key.to_string(), value);
    }

    fn remove(&self, key: &str) -> Option<Value> {
        lock(&self.entries).remove(key)
    }

    fn clear(&self) {
        lock(&self.entries).clear();
    }
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Credential store keyed by credential name.
#[derive(Debug, Default)]
pub struct MemoryCredentials {
    entries: Mutex<HashMap<String, CredentialData>>,
}

impl MemoryCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, name: impl Into<String>, data: CredentialData) -> Self {
        lock(&self.entries).insert(name.into(), data);
        self
    }

    /// Current stored value, including derived fields written back by the host.
    pub fn snapshot(&self, name: &str) -> Option<CredentialData> {
        lock(&self.entries).get(name).cloned()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentials {
    async fn get(&self, name: &str) -> Result<CredentialData, HostError> {
        lock(&self.entries)
            .get(name)
            .cloned()
            .ok_or_else(|| HostError::CredentialNotFound(name.to_string()))
    }

    async fn update(&self, name: &str, data: CredentialData) -> Result<(), HostError> {
        lock(&self.entries).insert(name.to_string(), data);
        Ok(())
    }
}
