//! Tool catalog

use super::entities::{ResourceDescriptor, ToolDescriptor};
use std::collections::HashMap;
use std::sync::RwLock;

/// Read-mostly registry of the tools (and resources) a server exposes.
///
/// Discovery replaces the whole map rather than merging into it, so tools
/// from a previous server instance never linger.
#[derive(Debug, Default)]
pub struct ToolCatalog {
    tools: RwLock<HashMap<String, ToolDescriptor>>,
    resources: RwLock<Vec<ResourceDescriptor>>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tools(tools: impl IntoIterator<Item = ToolDescriptor>) -> Self {
        let catalog = Self::new();
        catalog.replace_all(tools);
        catalog
    }

    /// Replace every registered tool.
    pub fn replace_all(&self, tools: impl IntoIterator<Item = ToolDescriptor>) {
        let map = tools.into_iter().map(|t| (t.name.clone(), t)).collect();
        *self.tools.write().unwrap_or_else(|e| e.into_inner()) = map;
    }

    pub fn replace_resources(&self, resources: Vec<ResourceDescriptor>) {
        *self.resources.write().unwrap_or_else(|e| e.into_inner()) = resources;
    }

    pub fn get(&self, name: &str) -> Option<ToolDescriptor> {
        self.tools
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(name)
    }

    /// Required parameters of `name`; empty for unknown tools.
    pub fn required_parameters(&self, name: &str) -> Vec<String> {
        self.get(name)
            .map(|t| t.required_parameters())
            .unwrap_or_default()
    }

    /// Sorted tool names
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .tools
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn snapshot(&self) -> Vec<ToolDescriptor> {
        let mut tools: Vec<ToolDescriptor> = self
            .tools
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .cloned()
            .collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    pub fn resources(&self) -> Vec<ResourceDescriptor> {
        self.resources
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.tools.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tool(name: &str) -> ToolDescriptor {
        ToolDescriptor::new(name, format!("{} tool", name))
    }

    #[test]
    fn test_replace_all_does_not_merge() {
        let catalog = ToolCatalog::from_tools(vec![tool("create-vpc"), tool("create-subnet")]);
        assert_eq!(catalog.len(), 2);

        catalog.replace_all(vec![tool("list-vpcs")]);
        assert_eq!(catalog.names(), vec!["list-vpcs"]);
        assert!(catalog.get("create-vpc").is_none());
    }

    #[test]
    fn test_lookup_is_case_sensitive() {
        let catalog = ToolCatalog::from_tools(vec![tool("create-vpc")]);
        assert!(catalog.contains("create-vpc"));
        assert!(!catalog.contains("Create-VPC"));
    }

    #[test]
    fn test_required_parameters() {
        let catalog = ToolCatalog::from_tools(vec![tool("create-vpc").with_schema(json!({
            "required": ["cidrBlock"]
        }))]);
        assert_eq!(catalog.required_parameters("create-vpc"), vec!["cidrBlock"]);
        assert!(catalog.required_parameters("unknown").is_empty());
    }

    #[test]
    fn test_names_sorted_and_snapshot() {
        let catalog = ToolCatalog::from_tools(vec![tool("b"), tool("a"), tool("c")]);
        assert_eq!(catalog.names(), vec!["a", "b", "c"]);
        assert_eq!(catalog.snapshot()[0].name, "a");
        assert!(!catalog.is_empty());
    }
}
