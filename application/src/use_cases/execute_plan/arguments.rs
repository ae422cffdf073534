//! Default values and required-parameter validation.
//!
//! Defaults are filled only for required parameters that are still missing
//! after reference resolution, and only when a default is known.

use super::PlanExecutor;
use super::types::{ExecutePlanError, Result};
use crate::ports::cloud_lookup::ImageFamily;
use infra_agent_domain::{PlanStep, is_reference};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Absent, null and blank values all count as missing.
fn is_missing(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(_) => false,
    }
}

/// Fail on the first required parameter that is absent, null or empty.
pub(super) fn validate_required(
    tool: &str,
    required: &[String],
    arguments: &Map<String, Value>,
) -> Result<()> {
    for parameter in required {
        match arguments.get(parameter) {
            None | Some(Value::Null) => {
                return Err(ExecutePlanError::MissingParameter {
                    parameter: parameter.clone(),
                    tool: tool.to_string(),
                });
            }
            Some(Value::String(s)) if s.trim().is_empty() => {
                return Err(ExecutePlanError::EmptyParameter {
                    parameter: parameter.clone(),
                    tool: tool.to_string(),
                });
            }
            Some(_) => {}
        }
    }
    Ok(())
}

fn instance_type_for(workload_type: Option<&str>) -> &'static str {
    match workload_type {
        Some("compute-intensive") => "c5.large",
        Some("memory-intensive") => "r5.large",
        Some("storage-intensive") => "i3.large",
        _ => "t3.micro",
    }
}

fn cidr_for(environment: Option<&str>) -> &'static str {
    match environment {
        Some("staging") => "10.1.0.0/16",
        Some("development") => "10.2.0.0/16",
        _ => "10.0.0.0/16",
    }
}

fn non_empty<'a>(step: &'a PlanStep, key: &str) -> Option<&'a str> {
    step.param_str(key).filter(|s| !s.trim().is_empty())
}

impl PlanExecutor {
    /// Fill known defaults for required parameters still missing.
    pub(super) async fn apply_defaults(
        &self,
        step: &PlanStep,
        tool: &str,
        required: &[String],
        arguments: &mut Map<String, Value>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        for parameter in required {
            if !is_missing(arguments.get(parameter)) {
                continue;
            }
            if let Some(value) = self.default_value(step, tool, parameter, cancel).await? {
                debug!(step_id = %step.id, tool = %tool, parameter = %parameter, value = %value, "Applied default value");
                arguments.insert(parameter.clone(), Value::String(value));
            }
        }
        Ok(())
    }

    async fn default_value(
        &self,
        step: &PlanStep,
        tool: &str,
        parameter: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<String>> {
        let value = match (tool, parameter) {
            ("create-ec2-instance", "instanceType") => {
                Some(instance_type_for(non_empty(step, "workload_type")).to_string())
            }
            ("create-ec2-instance", "imageId") => self.default_image(step, cancel).await?,
            ("create-ec2-instance", "keyName") => non_empty(step, "ssh_key").map(str::to_string),
            ("create-vpc", "cidrBlock") => Some(
                non_empty(step, "cidr")
                    .unwrap_or_else(|| cidr_for(non_empty(step, "environment")))
                    .to_string(),
            ),
            ("create-vpc", "name") => Some(
                non_empty(step, "resource_name")
                    .map(str::to_string)
                    .or_else(|| non_empty(step, "environment").map(|env| format!("vpc-{}", env)))
                    .unwrap_or_else(|| "ai-agent-vpc".to_string()),
            ),
            ("create-security-group", "description") => Some(
                non_empty(step, "description")
                    .map(str::to_string)
                    .or_else(|| {
                        non_empty(step, "purpose").map(|p| format!("Security group for {}", p))
                    })
                    .unwrap_or_else(|| "Security group created by AI Agent".to_string()),
            ),
            _ => None,
        };
        Ok(value)
    }

    /// `ami_step_ref` first, then a direct latest-image lookup.
    async fn default_image(
        &self,
        step: &PlanStep,
        cancel: &CancellationToken,
    ) -> Result<Option<String>> {
        if let Some(step_ref) = non_empty(step, "ami_step_ref") {
            let token = if is_reference(step_ref) {
                step_ref.to_string()
            } else {
                format!("{{{{{}}}}}", step_ref)
            };
            match self.resolver.resolve_str(&token, cancel).await {
                Ok(image) => return Ok(Some(image)),
                Err(e) => {
                    let error = ExecutePlanError::from(e);
                    if error.is_cancelled() {
                        return Err(error);
                    }
                    warn!(step_id = %step.id, ami_step_ref = %step_ref, error = %error, "Could not resolve image reference");
                }
            }
        }

        match self
            .lookup
            .latest_image(ImageFamily::AmazonLinux2, "x86_64", cancel)
            .await
        {
            Ok(image) => Ok(Some(image)),
            Err(e) => {
                let error = ExecutePlanError::lookup("latest_ami", e);
                if error.is_cancelled() {
                    return Err(error);
                }
                warn!(step_id = %step.id, error = %error, "Latest image lookup failed");
                Ok(None)
            }
        }
    }
}
