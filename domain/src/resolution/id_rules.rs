//! Resource id extraction rules

use crate::tool::ToolOutput;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-tool primary id fields plus a shared fallback list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdFieldRules {
    #[serde(default)]
    pub tools: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub fallback: Vec<String>,
}

const TOOL_FIELDS: &[(&str, &[&str])] = &[
    ("create-vpc", &["vpcId"]),
    ("create-subnet", &["subnetId"]),
    ("create-private-subnet", &["subnetId"]),
    ("create-public-subnet", &["subnetId"]),
    ("create-security-group", &["groupId", "securityGroupId"]),
    ("create-internet-gateway", &["internetGatewayId"]),
    ("create-nat-gateway", &["natGatewayId"]),
    ("create-public-route-table", &["routeTableId"]),
    ("create-private-route-table", &["routeTableId"]),
    ("create-ec2-instance", &["instanceId"]),
    ("create-ami-from-instance", &["amiId", "imageId"]),
    ("create-key-pair", &["keyName", "keyPairId"]),
    ("create-launch-template", &["launchTemplateId"]),
    ("create-auto-scaling-group", &["autoScalingGroupName", "asgName"]),
    ("create-load-balancer", &["loadBalancerArn", "arn"]),
    ("create-target-group", &["targetGroupArn", "arn"]),
    ("create-listener", &["listenerArn", "arn"]),
    ("create-db-subnet-group", &["dbSubnetGroupName"]),
    ("create-db-instance", &["dbInstanceIdentifier", "dbInstanceId"]),
    ("create-rds-db-instance", &["dbInstanceIdentifier", "dbInstanceId"]),
    ("create-database", &["dbInstanceIdentifier", "dbInstanceId"]),
    ("create-db-snapshot", &["dbSnapshotIdentifier"]),
];

const FALLBACK_FIELDS: &[&str] = &["resourceId", "id", "value", "arn"];

impl Default for IdFieldRules {
    fn default() -> Self {
        let tools = TOOL_FIELDS
            .iter()
            .map(|(tool, fields)| {
                (
                    tool.to_string(),
                    fields.iter().map(|f| f.to_string()).collect(),
                )
            })
            .collect();
        Self {
            tools,
            fallback: FALLBACK_FIELDS.iter().map(|f| f.to_string()).collect(),
        }
    }
}

impl IdFieldRules {
    /// Overlay per-tool entries and, when non-empty, the fallback list.
    pub fn merge(mut self, other: IdFieldRules) -> Self {
        self.tools.extend(other.tools);
        if !other.fallback.is_empty() {
            self.fallback = other.fallback;
        }
        self
    }

    /// Extract the canonical resource id a tool reported.
    ///
    /// Tries the tool's own fields, then the fallback list, then a nested
    /// `resource.id`. Returns `None` when nothing non-empty is found.
    pub fn extract(&self, tool: &str, output: &ToolOutput) -> Option<String> {
        self.tools
            .get(tool)
            .and_then(|fields| output.first_str(fields))
            .or_else(|| output.first_str(&self.fallback))
            .or_else(|| output.nested_str("resource.id"))
            .map(str::to_string)
    }
}
