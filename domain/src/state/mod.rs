//! Exported infrastructure state
//!
//! The tool server exports its managed state as
//! `{"managed_state": {"resources": {<key>: {type, status, properties}}}}`.
//! Each resource created by a plan step stores the raw tool result under
//! `properties.mcp_response`.

use crate::tool::ToolOutput;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One resource in the managed state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManagedResource {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "type")]
    pub resource_type: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl ManagedResource {
    /// The tool result recorded for this resource, if any.
    pub fn tool_response(&self) -> Option<ToolOutput> {
        self.properties
            .get("mcp_response")
            .and_then(|v| v.as_object())
            .map(|m| ToolOutput::new(m.clone()))
    }

    pub fn is_step_reference(&self) -> bool {
        self.resource_type == "step_reference"
    }
}

/// Point-in-time view of the managed state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateSnapshot {
    resources: Vec<(String, ManagedResource)>,
}

impl StateSnapshot {
    /// Decode an exported state document.
    ///
    /// Entries that are not objects are skipped. A document without
    /// `managed_state.resources` yields an empty snapshot.
    pub fn from_value(value: &Value) -> Self {
        let resources = value
            .get("managed_state")
            .and_then(|m| m.get("resources"))
            .and_then(|r| r.as_object())
            .map(|map| {
                map.iter()
                    .filter(|(_, v)| v.is_object())
                    .map(|(key, v)| {
                        let mut resource: ManagedResource =
                            serde_json::from_value(v.clone()).unwrap_or_default();
                        if resource.id.is_empty() {
                            resource.id = key.clone();
                        }
                        (key.clone(), resource)
                    })
                    .collect()
            })
            .unwrap_or_default();
        Self { resources }
    }

    pub fn resource(&self, key: &str) -> Option<&ManagedResource> {
        self.resources
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, r)| r)
    }

    /// `properties.mcp_response` of the resource keyed by `key`.
    pub fn tool_response(&self, key: &str) -> Option<ToolOutput> {
        self.resource(key).and_then(|r| r.tool_response())
    }

    pub fn resources(&self) -> impl Iterator<Item = (&str, &ManagedResource)> {
        self.resources.iter().map(|(k, r)| (k.as_str(), r))
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}
