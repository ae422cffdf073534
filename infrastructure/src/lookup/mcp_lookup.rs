//! Cloud lookups served by tool-server tools

use async_trait::async_trait;
use infra_agent_application::{
    CloudLookupPort, ImageFamily, LookupError, SubnetInfo, ToolServerError, ToolServerPort,
    VpcInfo,
};
use infra_agent_domain::ToolOutput;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const DEFAULT_VPC_TOOL: &str = "get-default-vpc";
const DEFAULT_SUBNET_TOOL: &str = "get-default-subnet";
const ZONES_TOOL: &str = "get-availability-zones";
const LIST_SUBNETS_TOOL: &str = "list-subnets";
const LIST_VPCS_TOOL: &str = "list-vpcs";
const ALB_SUBNETS_TOOL: &str = "select-subnets-for-alb";
const DESCRIBE_DB_TOOL: &str = "describe-db-instances";

const IMAGE_ID_FIELDS: &[&str] = &["amiId", "imageId", "value"];
const VPC_ID_FIELDS: &[&str] = &["vpcId", "VpcId", "id"];
const SUBNET_ID_FIELDS: &[&str] = &["subnetId", "SubnetId", "id"];
const ENDPOINT_PATHS: &[&str] = &[
    "endpoint.address",
    "endpoint",
    "address",
    "dbInstances.0.endpoint.address",
    "dbInstances.0.endpoint",
    "instances.0.endpoint",
];

fn image_tool(family: ImageFamily) -> &'static str {
    match family {
        ImageFamily::AmazonLinux2 => "get-latest-amazon-linux-ami",
        ImageFamily::Ubuntu => "get-latest-ubuntu-ami",
        ImageFamily::Windows => "get-latest-windows-ami",
    }
}

fn lookup_error(tool: &str, err: ToolServerError) -> LookupError {
    match err {
        ToolServerError::Cancelled => LookupError::Cancelled,
        other => LookupError::failed(tool, other.to_string()),
    }
}

/// Id of a list item: a bare string, or the first id field of an object
/// (also checking a nested `details` map).
fn item_id(item: &Value, fields: &[&str]) -> Option<String> {
    match item {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Object(_) => {
            let output = ToolOutput::from_value(item.clone());
            output
                .first_str(fields)
                .or_else(|| {
                    fields
                        .iter()
                        .find_map(|f| output.nested_str(&format!("details.{}", f)))
                })
                .map(str::to_string)
        }
        _ => None,
    }
}

/// Ids from the first present array field.
fn item_ids(output: &ToolOutput, arrays: &[&str], fields: &[&str]) -> Vec<String> {
    arrays
        .iter()
        .find_map(|name| output.get_array(name))
        .map(|items| items.iter().filter_map(|i| item_id(i, fields)).collect())
        .unwrap_or_default()
}

fn is_default_vpc(item: &Value) -> bool {
    ["isDefault", "IsDefault", "details.isDefault", "details.IsDefault"]
        .iter()
        .any(|path| {
            let mut current = Some(item);
            for segment in path.split('.') {
                current = current.and_then(|v| v.get(segment));
            }
            current.and_then(|v| v.as_bool()).unwrap_or(false)
        })
}

/// [`CloudLookupPort`] over a [`ToolServerPort`].
pub struct McpCloudLookup {
    server: Arc<dyn ToolServerPort>,
}

impl McpCloudLookup {
    pub fn new(server: Arc<dyn ToolServerPort>) -> Self {
        Self { server }
    }

    async fn call(
        &self,
        tool: &str,
        arguments: Value,
        cancel: &CancellationToken,
    ) -> Result<ToolOutput, LookupError> {
        debug!(tool, "Cloud lookup");
        self.server
            .call_tool(tool, arguments, cancel)
            .await
            .map_err(|e| lookup_error(tool, e))
    }

    fn non_empty(tool: &str, what: &str, ids: Vec<String>) -> Result<Vec<String>, LookupError> {
        if ids.is_empty() {
            Err(LookupError::failed(tool, format!("no {} returned", what)))
        } else {
            Ok(ids)
        }
    }
}

#[async_trait]
impl CloudLookupPort for McpCloudLookup {
    async fn latest_image(
        &self,
        family: ImageFamily,
        architecture: &str,
        cancel: &CancellationToken,
    ) -> Result<String, LookupError> {
        let tool = image_tool(family);
        let output = self
            .call(tool, json!({"architecture": architecture}), cancel)
            .await?;
        output
            .first_str(IMAGE_ID_FIELDS)
            .map(str::to_string)
            .ok_or_else(|| LookupError::failed(tool, "no image id in result"))
    }

    async fn default_vpc(&self, cancel: &CancellationToken) -> Result<String, LookupError> {
        let output = self.call(DEFAULT_VPC_TOOL, json!({}), cancel).await?;
        output
            .first_str(VPC_ID_FIELDS)
            .or_else(|| output.get_str("value"))
            .map(str::to_string)
            .ok_or_else(|| LookupError::NotFound("default VPC".to_string()))
    }

    async fn default_subnet(&self, cancel: &CancellationToken) -> Result<SubnetInfo, LookupError> {
        let output = self.call(DEFAULT_SUBNET_TOOL, json!({}), cancel).await?;
        let subnet_id = output
            .first_str(&["subnetId", "value"])
            .ok_or_else(|| LookupError::NotFound("default subnet".to_string()))?;
        Ok(SubnetInfo {
            subnet_id: subnet_id.to_string(),
            vpc_id: output.get_str("vpcId").unwrap_or_default().to_string(),
        })
    }

    async fn availability_zones(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, LookupError> {
        let output = self.call(ZONES_TOOL, json!({}), cancel).await?;
        let zones = item_ids(
            &output,
            &["zones", "availabilityZones", "all_zones", "value"],
            &["zoneName", "ZoneName", "name"],
        );
        Self::non_empty(ZONES_TOOL, "availability zones", zones)
    }

    async fn subnets_in_vpc(
        &self,
        vpc_id: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, LookupError> {
        let output = self
            .call(LIST_SUBNETS_TOOL, json!({"vpcId": vpc_id}), cancel)
            .await?;
        let subnets = item_ids(&output, &["subnetIds", "subnets", "value"], SUBNET_ID_FIELDS);
        Self::non_empty(LIST_SUBNETS_TOOL, "subnets", subnets)
    }

    async fn list_vpcs(&self, cancel: &CancellationToken) -> Result<Vec<VpcInfo>, LookupError> {
        let output = self.call(LIST_VPCS_TOOL, json!({}), cancel).await?;
        let vpcs = output
            .get_array("vpcs")
            .or_else(|| output.get_array("value"))
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| {
                        item_id(item, VPC_ID_FIELDS).map(|vpc_id| VpcInfo {
                            vpc_id,
                            is_default: is_default_vpc(item),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(vpcs)
    }

    async fn select_subnets_for_alb(
        &self,
        vpc_id: &str,
        scheme: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, LookupError> {
        let mut arguments = json!({"scheme": scheme});
        if !vpc_id.is_empty() {
            arguments["vpcId"] = json!(vpc_id);
        }
        let output = self.call(ALB_SUBNETS_TOOL, arguments, cancel).await?;
        let subnets = item_ids(&output, &["subnetIds", "subnets", "value"], SUBNET_ID_FIELDS);
        Self::non_empty(ALB_SUBNETS_TOOL, "subnets", subnets)
    }

    async fn db_endpoint(
        &self,
        instance_id: &str,
        cancel: &CancellationToken,
    ) -> Result<String, LookupError> {
        let output = self
            .call(
                DESCRIBE_DB_TOOL,
                json!({"dbInstanceIdentifier": instance_id}),
                cancel,
            )
            .await?;
        ENDPOINT_PATHS
            .iter()
            .find_map(|path| output.nested_str(path))
            .map(str::to_string)
            .ok_or_else(|| LookupError::NotFound(format!("endpoint for {}", instance_id)))
    }
}
