//! Reference resolution tables from TOML (`[resolution]` section)
//!
//! Entries here overlay the built-in tables; a field or tool not named
//! keeps its default list.

use infra_agent_domain::{FieldPriorities, IdFieldRules};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Raw resolution configuration from TOML
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileResolutionConfig {
    /// Requested field → candidate fields, most specific first
    pub field_priorities: HashMap<String, Vec<String>>,
    /// Tool name → fields holding the id it creates
    pub id_fields: HashMap<String, Vec<String>>,
    /// Fields tried for every tool after its own
    pub fallback_id_fields: Vec<String>,
}

impl FileResolutionConfig {
    pub fn to_field_priorities(&self) -> FieldPriorities {
        let mut overlay = FieldPriorities::empty();
        for (field, candidates) in &self.field_priorities {
            overlay.set(field.clone(), candidates.clone());
        }
        FieldPriorities::default().merge(overlay)
    }

    pub fn to_id_rules(&self) -> IdFieldRules {
        IdFieldRules::default().merge(IdFieldRules {
            tools: self.id_fields.clone(),
            fallback: self.fallback_id_fields.clone(),
        })
    }
}
