//! Best-effort state persistence after successful steps.

use super::PlanExecutor;
use crate::ports::tool_server::StateRecord;
use infra_agent_domain::{PlanStep, ToolOutput};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const STEP_REFERENCE_TYPE: &str = "step_reference";
const CREATED_VIA_MCP: &str = "created_via_mcp";

/// `create-security-group` → `security_group`
pub(super) fn resource_type_from_tool(tool: &str) -> String {
    let base = ["create-", "update-", "delete-"]
        .iter()
        .find_map(|prefix| tool.strip_prefix(prefix))
        .unwrap_or(tool);
    base.replace('-', "_")
}

fn properties(response: &ToolOutput) -> Map<String, Value> {
    let mut properties = Map::new();
    properties.insert("mcp_response".to_string(), response.clone().into_value());
    properties.insert("status".to_string(), Value::String(CREATED_VIA_MCP.to_string()));
    properties
}

impl PlanExecutor {
    /// Record the step's resource in the server's managed state and save.
    ///
    /// When the step id differs from the resource id, a `step_reference`
    /// entry keyed by the step id is written too, so later reference
    /// resolution can find the step's result. Failures are logged only.
    pub(super) async fn record_state(
        &self,
        step: &PlanStep,
        resource_id: &str,
        resource_type: &str,
        response: &ToolOutput,
        cancel: &CancellationToken,
    ) {
        if !self.params.persist_state {
            return;
        }

        let name = if step.name.is_empty() {
            resource_id.to_string()
        } else {
            step.name.clone()
        };
        let mut records = vec![StateRecord {
            resource_id: resource_id.to_string(),
            resource_name: name.clone(),
            description: step.description.clone(),
            resource_type: resource_type.to_string(),
            status: "created".to_string(),
            properties: properties(response),
            dependencies: step.depends_on.clone(),
        }];
        if step.id != resource_id {
            records.push(StateRecord {
                resource_id: step.id.clone(),
                resource_name: name,
                description: format!("Step reference for {}", resource_id),
                resource_type: STEP_REFERENCE_TYPE.to_string(),
                status: "created".to_string(),
                properties: properties(response),
                dependencies: step.depends_on.clone(),
            });
        }

        for record in &records {
            if let Err(e) = self.server.add_resource_to_state(record, cancel).await {
                warn!(step_id = %step.id, resource_id = %record.resource_id, error = %e, "Failed to record resource in state");
                if e.is_cancelled() {
                    return;
                }
            }
        }

        match self.server.save_state(cancel).await {
            Ok(()) => debug!(step_id = %step.id, "State saved"),
            Err(e) => warn!(step_id = %step.id, error = %e, "Failed to save state"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resource_type_from_tool() {
        assert_eq!(resource_type_from_tool("create-security-group"), "security_group");
        assert_eq!(resource_type_from_tool("update-ec2-instance"), "ec2_instance");
        assert_eq!(resource_type_from_tool("delete-vpc"), "vpc");
        assert_eq!(resource_type_from_tool("attach-volume"), "attach_volume");
    }

    #[test]
    fn test_properties_shape() {
        let response = ToolOutput::from_value(json!({"vpcId": "vpc-1"}));
        let props = properties(&response);
        assert_eq!(props["mcp_response"], json!({"vpcId": "vpc-1"}));
        assert_eq!(props["status"], "created_via_mcp");
    }
}
