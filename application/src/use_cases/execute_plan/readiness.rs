//! Readiness polling after create.
//!
//! Some resources are unusable for a while after their create call
//! returns. Dependent steps would fail against them, so the executor polls
//! the tool server until they report `available`.

use super::PlanExecutor;
use super::types::{ExecutePlanError, Result};
use crate::config::ReadinessParams;
use crate::use_cases::shared::sleep_cancellable;
use serde_json::{Value, json};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const AVAILABLE: &str = "available";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ReadinessProbe {
    NatGateway,
    DbInstance,
}

impl ReadinessProbe {
    /// Probe for resources created by `tool`, if they need one.
    pub(super) fn for_tool(tool: &str) -> Option<Self> {
        match tool {
            "create-nat-gateway" => Some(ReadinessProbe::NatGateway),
            "create-rds-db-instance" | "create-db-instance" | "create-database" => {
                Some(ReadinessProbe::DbInstance)
            }
            _ => None,
        }
    }

    fn resource(&self) -> &'static str {
        match self {
            ReadinessProbe::NatGateway => "NAT gateway",
            ReadinessProbe::DbInstance => "DB instance",
        }
    }

    fn describe_tool(&self) -> &'static str {
        match self {
            ReadinessProbe::NatGateway => "describe-nat-gateways",
            ReadinessProbe::DbInstance => "describe-db-instances",
        }
    }

    fn arguments(&self, id: &str) -> Value {
        match self {
            ReadinessProbe::NatGateway => json!({"natGatewayIds": [id]}),
            ReadinessProbe::DbInstance => json!({"dbInstanceIdentifier": id}),
        }
    }

    fn status_path(&self) -> &'static str {
        match self {
            ReadinessProbe::NatGateway => "natGateways.0.state",
            ReadinessProbe::DbInstance => "dbInstances.0.dbInstanceStatus",
        }
    }

    fn max_wait(&self, params: &ReadinessParams) -> Duration {
        match self {
            ReadinessProbe::NatGateway => params.nat_gateway_max_wait,
            ReadinessProbe::DbInstance => params.db_instance_max_wait,
        }
    }
}

impl PlanExecutor {
    /// Block until the resource `tool` created reports `available`.
    ///
    /// Poll errors are logged and retried; only the deadline or
    /// cancellation end the wait early.
    pub(super) async fn wait_until_ready(
        &self,
        tool: &str,
        resource_id: &str,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let params = &self.params.readiness;
        if !params.enabled {
            return Ok(());
        }
        let Some(probe) = ReadinessProbe::for_tool(tool) else {
            return Ok(());
        };
        let max_wait = probe.max_wait(params);
        let started = Instant::now();

        info!(resource = probe.resource(), id = %resource_id, max_wait = ?max_wait, "Waiting for resource to become available");

        loop {
            match self
                .server
                .call_tool(probe.describe_tool(), probe.arguments(resource_id), cancel)
                .await
            {
                Ok(output) => {
                    let state = output.nested_str(probe.status_path());
                    if state == Some(AVAILABLE) {
                        info!(
                            resource = probe.resource(),
                            id = %resource_id,
                            waited = ?started.elapsed(),
                            "Resource is available"
                        );
                        return Ok(());
                    }
                    debug!(resource = probe.resource(), id = %resource_id, state = ?state, "Resource not ready yet");
                }
                Err(e) if e.is_cancelled() => return Err(ExecutePlanError::Cancelled),
                Err(e) => {
                    warn!(resource = probe.resource(), id = %resource_id, error = %e, "Readiness poll failed");
                }
            }

            let waited = started.elapsed();
            if waited >= max_wait {
                return Err(ExecutePlanError::ResourceNotReady {
                    resource: probe.resource().to_string(),
                    id: resource_id.to_string(),
                    waited,
                });
            }
            if !sleep_cancellable(params.poll_interval, cancel).await {
                return Err(ExecutePlanError::Cancelled);
            }
        }
    }
}
