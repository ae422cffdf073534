//! Resource mapping store
//!
//! Records which real resource identifier each plan step produced. Keys are
//! a bare step id (the primary id), `step.N` for list items, or
//! `step.field` for named sub-values.

use std::collections::HashMap;
use std::sync::RwLock;

/// Thread-safe step-id → resource-id table for one execution run.
///
/// Entries are never evicted; a new run gets a fresh store or calls
/// [`reset`](Self::reset).
#[derive(Debug, Default)]
pub struct ResourceMappingStore {
    entries: RwLock<HashMap<String, String>>,
}

impl ResourceMappingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(key)
    }

    /// Copy of every entry, for diagnostics and failure context.
    pub fn snapshot(&self) -> HashMap<String, String> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn reset(&self) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
