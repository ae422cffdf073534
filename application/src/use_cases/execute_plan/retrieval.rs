//! Built-in value retrieval for `retrieve` steps.

use super::PlanExecutor;
use super::extraction::store_retrieved;
use super::types::{ExecutePlanError, Result};
use crate::ports::cloud_lookup::{ImageFamily, LookupError};
use chrono::Utc;
use infra_agent_domain::{
    ManagedResource, PlanStep, RetrievalKind, StateSnapshot, StepRefKind, ToolOutput,
    infer_value_type, is_reference,
};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const DEFAULT_ARCHITECTURE: &str = "x86_64";
const DEFAULT_SCHEME: &str = "internet-facing";

/// Parameters naming the resource a managed-state lookup is after.
const NAME_PARAMS: &[&str] = &["resource_id", "resource_name", "vpc_name", "name"];

/// Response fields that identify a resource's type, most specific first.
const TYPE_MARKERS: &[(&str, &str)] = &[
    ("instanceId", "ec2_instance"),
    ("groupId", "security_group"),
    ("securityGroupId", "security_group"),
    ("subnetId", "subnet"),
    ("vpcId", "vpc"),
];

/// `value_type` parameter, then the step's tool, then keyword inference.
pub(super) fn value_type_of(step: &PlanStep) -> Option<String> {
    non_empty(step, "value_type")
        .or_else(|| step.tool_name())
        .or_else(|| infer_value_type(&step.name, &step.description))
        .map(str::to_string)
}

fn non_empty<'a>(step: &'a PlanStep, key: &str) -> Option<&'a str> {
    step.param_str(key).filter(|s| !s.trim().is_empty())
}

/// Bare step ids are accepted wherever a reference is expected.
fn as_reference(raw: &str) -> String {
    if is_reference(raw) {
        raw.to_string()
    } else {
        format!("{{{{{}}}}}", raw)
    }
}

fn infer_resource_type(response: &ToolOutput) -> Option<&'static str> {
    TYPE_MARKERS
        .iter()
        .find(|(field, _)| response.get_str(field).is_some())
        .map(|(_, resource_type)| *resource_type)
}

fn id_fields(resource_type: &str) -> &'static [&'static str] {
    match resource_type {
        "vpc" => &["vpcId"],
        "subnet" => &["subnetId"],
        "security_group" => &["groupId", "securityGroupId"],
        "ec2_instance" | "instance" => &["instanceId"],
        _ => &[],
    }
}

fn type_matches(wanted: &str, resource: &ManagedResource) -> bool {
    if wanted.is_empty() || resource.resource_type == wanted {
        return true;
    }
    resource.is_step_reference()
        && resource
            .tool_response()
            .and_then(|r| infer_resource_type(&r))
            == Some(wanted)
}

fn name_matches(needle: &str, key: &str, resource: &ManagedResource) -> bool {
    key == needle
        || resource.id == needle
        || resource.name == needle
        || resource.properties.get("name").and_then(|v| v.as_str()) == Some(needle)
}

fn first_value(items: &[String]) -> Value {
    items
        .first()
        .map(|s| Value::String(s.clone()))
        .unwrap_or(Value::Null)
}

impl PlanExecutor {
    pub(super) async fn retrieve_step(
        &self,
        step: &PlanStep,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        let value_type = value_type_of(step).ok_or_else(|| {
            ExecutePlanError::UnsupportedValueType(format!("none given for step {}", step.id))
        })?;
        let kind = self
            .registry
            .lookup(&value_type)
            .ok_or_else(|| ExecutePlanError::UnsupportedValueType(value_type.clone()))?;

        info!(step_id = %step.id, value_type = %value_type, "Retrieving value");
        let mut output = self.retrieve(&kind, &value_type, step, cancel).await?;

        let description = if step.description.is_empty() {
            format!("Retrieved {}", value_type)
        } else {
            step.description.clone()
        };
        output.insert("retrieved_at", Utc::now().to_rfc3339());
        output.insert("description", description);

        let written = store_retrieved(self.resolver.mapping(), &step.id, &kind, &output);
        debug!(step_id = %step.id, keys = written, "Stored retrieved value");

        self.record_state(step, &step.id, &value_type, &output, cancel)
            .await;
        Ok(output.into_value())
    }

    async fn retrieve(
        &self,
        kind: &RetrievalKind,
        value_type: &str,
        step: &PlanStep,
        cancel: &CancellationToken,
    ) -> Result<ToolOutput> {
        let lookup_err = |e: LookupError| ExecutePlanError::lookup(value_type, e);

        let value = match kind {
            RetrievalKind::LatestImage => {
                let os_type = non_empty(step, "os_type").unwrap_or(ImageFamily::default().as_str());
                let family = ImageFamily::parse(os_type).ok_or_else(|| {
                    ExecutePlanError::retrieval(value_type, format!("unsupported os_type {}", os_type))
                })?;
                let architecture = non_empty(step, "architecture").unwrap_or(DEFAULT_ARCHITECTURE);
                let image = self
                    .lookup
                    .latest_image(family, architecture, cancel)
                    .await
                    .map_err(lookup_err)?;
                json!({
                    "value": image,
                    "type": "ami",
                    "os_type": family.as_str(),
                    "architecture": architecture,
                })
            }
            RetrievalKind::DefaultVpc => {
                let vpc_id = self.lookup.default_vpc(cancel).await.map_err(lookup_err)?;
                json!({"value": vpc_id, "is_default": true})
            }
            RetrievalKind::ExistingVpc => match self.lookup.default_vpc(cancel).await {
                Ok(vpc_id) => json!({"value": vpc_id, "is_default": true}),
                Err(LookupError::Cancelled) => return Err(ExecutePlanError::Cancelled),
                Err(e) => {
                    debug!(step_id = %step.id, error = %e, "No default VPC, listing VPCs");
                    let vpc = self
                        .lookup
                        .list_vpcs(cancel)
                        .await
                        .map_err(lookup_err)?
                        .into_iter()
                        .next()
                        .ok_or_else(|| ExecutePlanError::retrieval(value_type, "no VPCs found"))?;
                    json!({"value": vpc.vpc_id, "is_default": vpc.is_default})
                }
            },
            RetrievalKind::DefaultSubnet => {
                let subnet = self.lookup.default_subnet(cancel).await.map_err(lookup_err)?;
                json!({
                    "value": subnet.subnet_id,
                    "subnet_id": subnet.subnet_id,
                    "vpc_id": subnet.vpc_id,
                })
            }
            RetrievalKind::SubnetsInVpc => {
                let vpc_id = match self.param_value(step, "vpc_id", cancel).await? {
                    Some(vpc_id) => vpc_id,
                    None => match non_empty(step, "vpc_id_step") {
                        Some(vpc_step) => {
                            self.resolver
                                .resolve_str(&as_reference(vpc_step), cancel)
                                .await?
                        }
                        None => {
                            return Err(ExecutePlanError::retrieval(
                                value_type,
                                "vpc_id or vpc_id_step is required",
                            ));
                        }
                    },
                };
                let subnets = self
                    .lookup
                    .subnets_in_vpc(&vpc_id, cancel)
                    .await
                    .map_err(lookup_err)?;
                if subnets.is_empty() {
                    return Err(ExecutePlanError::retrieval(
                        value_type,
                        format!("no subnets found in {}", vpc_id),
                    ));
                }
                json!({
                    "value": first_value(&subnets),
                    "subnet_ids": subnets,
                    "vpc_id": vpc_id,
                    "count": subnets.len(),
                })
            }
            RetrievalKind::AvailabilityZones => {
                let mut zones = self
                    .lookup
                    .availability_zones(cancel)
                    .await
                    .map_err(lookup_err)?;
                if let Some(max) = step.param_u64("max_azs").filter(|m| *m > 0) {
                    zones.truncate(max as usize);
                }
                if zones.is_empty() {
                    return Err(ExecutePlanError::retrieval(
                        value_type,
                        "no availability zones found",
                    ));
                }
                json!({
                    "value": first_value(&zones),
                    "all_zones": zones,
                    "count": zones.len(),
                })
            }
            RetrievalKind::SubnetsForLoadBalancer => {
                let vpc_id = match self.param_value(step, "vpc_id", cancel).await? {
                    Some(vpc_id) => vpc_id,
                    None => self.lookup.default_vpc(cancel).await.map_err(lookup_err)?,
                };
                let scheme = non_empty(step, "scheme").unwrap_or(DEFAULT_SCHEME);
                let subnets = self
                    .lookup
                    .select_subnets_for_alb(&vpc_id, scheme, cancel)
                    .await
                    .map_err(lookup_err)?;
                if subnets.is_empty() {
                    return Err(ExecutePlanError::retrieval(
                        value_type,
                        format!("no {} subnets found in {}", scheme, vpc_id),
                    ));
                }
                json!({
                    "value": first_value(&subnets),
                    "subnet_ids": subnets,
                    "vpc_id": vpc_id,
                    "scheme": scheme,
                })
            }
            RetrievalKind::StepReference(ref_kind) => {
                return self.retrieve_step_reference(*ref_kind, value_type, step, cancel).await;
            }
            RetrievalKind::ManagedState { resource_type } => {
                return self
                    .retrieve_managed(resource_type, value_type, step, cancel)
                    .await;
            }
        };
        Ok(ToolOutput::from_value(value))
    }

    /// Re-expose a value an earlier step produced (`step_ref`).
    async fn retrieve_step_reference(
        &self,
        kind: StepRefKind,
        value_type: &str,
        step: &PlanStep,
        cancel: &CancellationToken,
    ) -> Result<ToolOutput> {
        let step_ref = non_empty(step, "step_ref").ok_or_else(|| {
            ExecutePlanError::retrieval(value_type, "step_ref parameter is required")
        })?;
        let resolved = self
            .resolver
            .resolve_str(&as_reference(step_ref), cancel)
            .await?;

        let mut output = ToolOutput::default();
        let value = if kind == StepRefKind::RdsEndpoint {
            output.insert("db_instance_identifier", resolved.clone());
            self.lookup
                .db_endpoint(&resolved, cancel)
                .await
                .map_err(|e| ExecutePlanError::lookup(value_type, e))?
        } else {
            resolved
        };

        output.insert("value", value.clone());
        output.insert("source", "step_reference");
        output.insert("step_ref", step_ref);
        output.insert("label", kind.label());
        for alias in kind.alias_fields() {
            output.insert(*alias, value.clone());
        }
        Ok(output)
    }

    /// Find a resource in the exported managed state.
    async fn retrieve_managed(
        &self,
        resource_type: &str,
        value_type: &str,
        step: &PlanStep,
        cancel: &CancellationToken,
    ) -> Result<ToolOutput> {
        let needle = NAME_PARAMS.iter().find_map(|key| non_empty(step, key));
        if needle.is_none() && resource_type.is_empty() {
            return Err(ExecutePlanError::retrieval(
                value_type,
                "resource_id or resource_name is required",
            ));
        }

        let exported = self.server.export_state(cancel).await?;
        let snapshot = StateSnapshot::from_value(&exported);
        let (key, resource) = snapshot
            .resources()
            .find(|(key, resource)| {
                type_matches(resource_type, resource)
                    && needle.is_none_or(|n| name_matches(n, key, resource))
            })
            .ok_or_else(|| {
                ExecutePlanError::retrieval(
                    value_type,
                    format!(
                        "no managed resource matching {} (type {})",
                        needle.unwrap_or("*"),
                        if resource_type.is_empty() { "any" } else { resource_type }
                    ),
                )
            })?;

        let response = resource.tool_response().unwrap_or_default();
        let value = response
            .first_str(id_fields(resource_type))
            .or_else(|| response.first_str(&self.params.id_rules.fallback))
            .map(str::to_string)
            .unwrap_or_else(|| resource.id.clone());
        let found_type = if resource.is_step_reference() {
            infer_resource_type(&response)
                .map(str::to_string)
                .unwrap_or_else(|| resource.resource_type.clone())
        } else {
            resource.resource_type.clone()
        };

        debug!(step_id = %step.id, resource_key = %key, value = %value, "Found managed resource");
        Ok(ToolOutput::from_value(json!({
            "value": value,
            "resource_type": found_type,
            "resource_key": key,
            "source": "managed_state",
        })))
    }

    /// A string parameter with any reference token resolved.
    async fn param_value(
        &self,
        step: &PlanStep,
        key: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<String>> {
        match non_empty(step, key) {
            Some(raw) => Ok(Some(self.resolver.resolve_str(raw, cancel).await?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use infra_agent_domain::StepAction;

    #[test]
    fn test_value_type_precedence() {
        let step = PlanStep::new("s1", StepAction::Retrieve)
            .with_tool("default_vpc")
            .with_param("value_type", "latest_ami");
        assert_eq!(value_type_of(&step).as_deref(), Some("latest_ami"));

        let step = PlanStep::new("s1", StepAction::Retrieve).with_tool("default_vpc");
        assert_eq!(value_type_of(&step).as_deref(), Some("default_vpc"));

        let step = PlanStep::new("s1", StepAction::Retrieve)
            .with_name("Get availability zones")
            .with_description("for the subnets");
        assert_eq!(value_type_of(&step).as_deref(), Some("available_azs"));

        let step = PlanStep::new("s1", StepAction::Retrieve).with_name("Look around");
        assert_eq!(value_type_of(&step), None);
    }

    #[test]
    fn test_infer_resource_type_prefers_specific_ids() {
        let instance = ToolOutput::from_value(json!({
            "instanceId": "i-1", "subnetId": "subnet-1", "vpcId": "vpc-1"
        }));
        assert_eq!(infer_resource_type(&instance), Some("ec2_instance"));

        let subnet = ToolOutput::from_value(json!({"subnetId": "subnet-1", "vpcId": "vpc-1"}));
        assert_eq!(infer_resource_type(&subnet), Some("subnet"));

        assert_eq!(infer_resource_type(&ToolOutput::default()), None);
    }

    #[test]
    fn test_as_reference() {
        assert_eq!(as_reference("step-alb"), "{{step-alb}}");
        assert_eq!(as_reference("{{step-alb.arn}}"), "{{step-alb.arn}}");
    }

    #[test]
    fn test_type_matches_step_reference_by_response() {
        let resource: ManagedResource = serde_json::from_value(json!({
            "type": "step_reference",
            "properties": {"mcp_response": {"vpcId": "vpc-1"}}
        }))
        .unwrap();
        assert!(type_matches("vpc", &resource));
        assert!(!type_matches("subnet", &resource));
        assert!(type_matches("", &resource));
    }
}
