//! Candidate field names for state-snapshot lookups

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Key of the list used for fields without their own entry
pub const DEFAULT_KEY: &str = "default";

/// Ordered candidate field names per requested reference field.
///
/// Lists run from the most specific id to the most generic: a subnet result
/// also carries its `vpcId`, so `subnetId` must come first.
///
/// When a reference such as `{{step-subnet.vpcId}}` cannot be answered from
/// the mapping store, the resolver searches the step's recorded tool result
/// for these candidates in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldPriorities(HashMap<String, Vec<String>>);

fn list(fields: &[&str]) -> Vec<String> {
    fields.iter().map(|f| f.to_string()).collect()
}

impl Default for FieldPriorities {
    fn default() -> Self {
        let mut map = HashMap::new();
        map.insert(
            "resourceId".to_string(),
            list(&[
                "resourceId",
                "instanceId",
                "natGatewayId",
                "internetGatewayId",
                "routeTableId",
                "groupId",
                "securityGroupId",
                "loadBalancerArn",
                "targetGroupArn",
                "listenerArn",
                "launchTemplateId",
                "autoScalingGroupName",
                "dbInstanceIdentifier",
                "dbSubnetGroupName",
                "keyName",
                "subnetId",
                "vpcId",
                "amiId",
                "imageId",
                "id",
                "value",
            ]),
        );
        map.insert("vpcId".to_string(), list(&["vpcId", "vpc_id", "resourceId"]));
        map.insert(
            "subnetId".to_string(),
            list(&["subnetId", "subnet_id", "resourceId"]),
        );
        map.insert(
            "securityGroupId".to_string(),
            list(&["securityGroupId", "groupId", "resourceId"]),
        );
        map.insert(
            "groupId".to_string(),
            list(&["groupId", "securityGroupId", "resourceId"]),
        );
        map.insert(
            "instanceId".to_string(),
            list(&["instanceId", "resourceId"]),
        );
        map.insert(
            "arn".to_string(),
            list(&["arn", "loadBalancerArn", "targetGroupArn", "listenerArn"]),
        );
        // ARN requests try ARN fields before any generic id
        map.insert(
            "targetGroupArn".to_string(),
            list(&["targetGroupArn", "arn", "targetGroupId", "resourceId", "id"]),
        );
        map.insert(
            "loadBalancerArn".to_string(),
            list(&["loadBalancerArn", "arn", "loadBalancerId", "resourceId", "id"]),
        );
        map.insert(
            "listenerArn".to_string(),
            list(&["listenerArn", "arn", "listenerId", "resourceId", "id"]),
        );
        map.insert(
            "launchTemplateId".to_string(),
            list(&["launchTemplateId", "id", "resourceId"]),
        );
        map.insert(
            "amiId".to_string(),
            list(&["amiId", "imageId", "value"]),
        );
        map.insert(
            DEFAULT_KEY.to_string(),
            list(&["resourceId", "id", "value", "arn", "name"]),
        );
        Self(map)
    }
}

impl FieldPriorities {
    /// An empty table; every lookup falls back to the requested field itself.
    pub fn empty() -> Self {
        Self(HashMap::new())
    }

    /// Candidates for `field`, falling back to the `default` list and
    /// finally to the field name alone.
    pub fn candidates(&self, field: &str) -> Vec<String> {
        self.0
            .get(field)
            .or_else(|| self.0.get(DEFAULT_KEY))
            .cloned()
            .unwrap_or_else(|| vec![field.to_string()])
    }

    pub fn set(&mut self, field: impl Into<String>, candidates: Vec<String>) {
        self.0.insert(field.into(), candidates);
    }

    /// Overlay `other`: its entries replace same-named entries here.
    pub fn merge(mut self, other: FieldPriorities) -> Self {
        self.0.extend(other.0);
        self
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
