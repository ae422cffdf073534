//! Tool output value object
//!
//! Tool results arrive as arbitrary JSON. [`ToolOutput`] decodes them once
//! at the boundary and centralizes the field lookups the rest of the engine
//! performs (id extraction, retrieval, state inspection).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The structured result of one tool call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolOutput(Map<String, Value>);

impl ToolOutput {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Wrap any JSON value; non-objects become `{"value": ...}`.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                Self(map)
            }
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// A non-empty string field.
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.0
            .get(field)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }

    pub fn get_array(&self, field: &str) -> Option<&Vec<Value>> {
        self.0.get(field).and_then(|v| v.as_array())
    }

    pub fn get_bool(&self, field: &str) -> Option<bool> {
        self.0.get(field).and_then(|v| v.as_bool())
    }

    /// First non-empty string among `fields`, in order.
    pub fn first_str(&self, fields: &[impl AsRef<str>]) -> Option<&str> {
        fields.iter().find_map(|f| self.get_str(f.as_ref()))
    }

    /// Follow a dotted path (`resource.id`, `natGateways.0.state`).
    ///
    /// Numeric segments index into arrays.
    pub fn nested(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.0.get(segments.next()?)?;
        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    pub fn nested_str(&self, path: &str) -> Option<&str> {
        self.nested(path)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
    }

    /// Non-empty string items of an array field.
    pub fn string_items(&self, field: &str) -> Vec<String> {
        self.get_array(field)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str())
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether the payload reports a tool-level failure.
    ///
    /// An `error` field marks failure unless a sibling `success: true`
    /// overrides it.
    pub fn is_error(&self) -> bool {
        match self.0.get("error") {
            None | Some(Value::Null) => false,
            Some(_) => self.get_bool("success") != Some(true),
        }
    }

    pub fn error_message(&self) -> Option<String> {
        match self.0.get("error")? {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(field.into(), value.into());
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for ToolOutput {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<ToolOutput> for Value {
    fn from(output: ToolOutput) -> Self {
        output.into_value()
    }
}
