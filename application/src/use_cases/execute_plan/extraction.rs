//! Mapping-store writes for retrieved values.
//!
//! A string `value` is stored under the step id. An array `value` is stored
//! item by item under `step.i`, with its JSON text under the step id. Some
//! kinds expose secondary values as well.

use infra_agent_domain::{ResourceMappingStore, RetrievalKind, ToolOutput};
use serde_json::Value;

fn store_items(mapping: &ResourceMappingStore, step_id: &str, items: &[String]) {
    for (index, item) in items.iter().enumerate() {
        mapping.set(format!("{}.{}", step_id, index), item.clone());
    }
}

/// Store a retrieval result. Returns the number of keys written.
pub(super) fn store_retrieved(
    mapping: &ResourceMappingStore,
    step_id: &str,
    kind: &RetrievalKind,
    output: &ToolOutput,
) -> usize {
    let before = mapping.len();

    match output.get("value") {
        Some(Value::String(value)) if !value.is_empty() => {
            mapping.set(step_id, value.clone());
        }
        Some(Value::Array(items)) => {
            let items: Vec<String> = items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect();
            store_items(mapping, step_id, &items);
            if let Ok(text) = serde_json::to_string(&items) {
                mapping.set(step_id, text);
            }
        }
        _ => {}
    }

    match kind {
        RetrievalKind::AvailabilityZones => {
            store_items(mapping, step_id, &output.string_items("all_zones"));
        }
        RetrievalKind::DefaultSubnet => {
            if let Some(vpc_id) = output.get_str("vpc_id") {
                mapping.set(format!("{}.vpcId", step_id), vpc_id);
            }
        }
        RetrievalKind::SubnetsInVpc | RetrievalKind::SubnetsForLoadBalancer => {
            store_items(mapping, step_id, &output.string_items("subnet_ids"));
        }
        _ => {}
    }

    mapping.len().saturating_sub(before)
}
