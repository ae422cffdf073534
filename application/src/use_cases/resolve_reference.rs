//! Dependency reference resolution.
//!
//! Turns `{{step.field[.index]}}` tokens inside step parameters into the
//! concrete identifiers earlier steps produced.
//!
//! Lookup order for one token:
//!
//! 1. indexed key `step.N` in the mapping store
//! 2. named key `step.field` (non-primary fields only)
//! 3. bare key `step`
//! 4. the step's recorded tool result in a fresh state export; a hit is
//!    cached under the key the token was first looked up by

use crate::ports::tool_server::{ToolServerError, ToolServerPort};
use futures::future::BoxFuture;
use infra_agent_domain::{
    DependencyReference, FieldPriorities, ReferenceError, ResourceMappingStore, StateSnapshot,
    ToolOutput, is_reference,
};
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Errors from reference resolution
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResolveError {
    #[error(transparent)]
    Malformed(#[from] ReferenceError),

    #[error("Reference {reference} not found: no resource recorded for step {step_id}")]
    NotFound { reference: String, step_id: String },

    #[error("Index {index} out of range for field {field} of step {step_id} (length {len})")]
    IndexOutOfRange {
        step_id: String,
        field: String,
        index: usize,
        len: usize,
    },

    #[error("Operation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, ResolveError>;

/// Resolves dependency references against the mapping store, falling back
/// to the tool server's exported state.
pub struct DependencyResolver {
    mapping: Arc<ResourceMappingStore>,
    server: Arc<dyn ToolServerPort>,
    priorities: FieldPriorities,
}

impl DependencyResolver {
    pub fn new(mapping: Arc<ResourceMappingStore>, server: Arc<dyn ToolServerPort>) -> Self {
        Self {
            mapping,
            server,
            priorities: FieldPriorities::default(),
        }
    }

    pub fn with_field_priorities(mut self, priorities: FieldPriorities) -> Self {
        self.priorities = priorities;
        self
    }

    pub fn mapping(&self) -> &Arc<ResourceMappingStore> {
        &self.mapping
    }

    /// Resolve one string. Values that are not reference tokens are
    /// returned unchanged.
    pub async fn resolve_str(&self, value: &str, cancel: &CancellationToken) -> Result<String> {
        if !is_reference(value) {
            return Ok(value.to_string());
        }
        let reference = DependencyReference::parse(value)?;
        self.resolve(&reference, cancel).await
    }

    /// Resolve every string inside `value`, recursing through maps and lists.
    pub fn resolve_value<'a>(
        &'a self,
        value: &'a Value,
        cancel: &'a CancellationToken,
    ) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            match value {
                Value::String(s) => Ok(Value::String(self.resolve_str(s, cancel).await?)),
                Value::Array(items) => {
                    let mut resolved = Vec::with_capacity(items.len());
                    for item in items {
                        resolved.push(self.resolve_value(item, cancel).await?);
                    }
                    Ok(Value::Array(resolved))
                }
                Value::Object(map) => Ok(Value::Object(self.resolve_map(map, cancel).await?)),
                other => Ok(other.clone()),
            }
        })
    }

    /// Resolve every value of a parameter map, keeping key order.
    pub async fn resolve_map(
        &self,
        map: &Map<String, Value>,
        cancel: &CancellationToken,
    ) -> Result<Map<String, Value>> {
        let mut resolved = Map::with_capacity(map.len());
        for (key, value) in map {
            resolved.insert(key.clone(), self.resolve_value(value, cancel).await?);
        }
        Ok(resolved)
    }

    /// Resolve a parsed reference.
    pub async fn resolve(
        &self,
        reference: &DependencyReference,
        cancel: &CancellationToken,
    ) -> Result<String> {
        if let Some(key) = reference.indexed_key()
            && let Some(value) = self.mapping.get(&key)
        {
            debug!(reference = %reference, source = "indexed_mapping", "Resolved reference");
            return Ok(value);
        }

        if !reference.is_primary_field()
            && let Some(value) = self
                .mapping
                .get(&format!("{}.{}", reference.step_id, reference.field))
        {
            debug!(reference = %reference, source = "field_mapping", "Resolved reference");
            return Ok(value);
        }

        if let Some(value) = self.mapping.get(&reference.step_id) {
            debug!(reference = %reference, source = "mapping", "Resolved reference");
            return Ok(value);
        }

        let value = self.resolve_from_state(reference, cancel).await?;
        // The bare step id holds only the step's primary id
        let cache_key = match reference.indexed_key() {
            Some(key) => key,
            None if !reference.is_primary_field() => {
                format!("{}.{}", reference.step_id, reference.field)
            }
            None => reference.step_id.clone(),
        };
        self.mapping.set(cache_key, value.clone());
        info!(
            reference = %reference,
            resource_id = %value,
            source = "state_fallback",
            "Resolved reference from exported state"
        );
        Ok(value)
    }

    async fn resolve_from_state(
        &self,
        reference: &DependencyReference,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let not_found = || ResolveError::NotFound {
            reference: reference.to_string(),
            step_id: reference.step_id.clone(),
        };

        let exported = match self.server.export_state(cancel).await {
            Ok(value) => value,
            Err(ToolServerError::Cancelled) => return Err(ResolveError::Cancelled),
            Err(e) => {
                warn!(step_id = %reference.step_id, error = %e, "State export failed during reference resolution");
                return Err(not_found());
            }
        };

        let snapshot = StateSnapshot::from_value(&exported);
        let response = snapshot
            .tool_response(&reference.step_id)
            .ok_or_else(not_found)?;

        self.search_response(reference, &response)?
            .ok_or_else(not_found)
    }

    /// Search one recorded tool result for the requested value.
    fn search_response(
        &self,
        reference: &DependencyReference,
        response: &ToolOutput,
    ) -> Result<Option<String>> {
        if let Some(index) = reference.index {
            let mut arrays = Vec::with_capacity(2);
            if !reference.is_primary_field() {
                arrays.push(reference.field.as_str());
            }
            arrays.push("all_zones");
            if let Some((field, items)) = arrays
                .into_iter()
                .find_map(|f| response.get_array(f).map(|items| (f, items)))
            {
                let item = items.get(index).ok_or_else(|| ResolveError::IndexOutOfRange {
                    step_id: reference.step_id.clone(),
                    field: field.to_string(),
                    index,
                    len: items.len(),
                })?;
                if let Some(id) = item.as_str().filter(|s| !s.is_empty()) {
                    return Ok(Some(id.to_string()));
                }
            }
        } else if !reference.is_primary_field()
            && let Some(id) = response.get_str(&reference.field)
        {
            return Ok(Some(id.to_string()));
        }

        let candidates = self.priorities.candidates(&reference.field);
        Ok(response
            .first_str(&candidates)
            .or_else(|| response.nested_str("resource.id"))
            .map(str::to_string))
    }
}
