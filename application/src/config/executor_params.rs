//! Executor parameters
//!
//! [`ExecutorParams`] groups the static parameters that control
//! [`PlanExecutor`](crate::use_cases::execute_plan::PlanExecutor): dry-run
//! pacing, progress queue timeouts, persistence and readiness polling.

use infra_agent_domain::IdFieldRules;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Readiness polling after resources that take a while to become usable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadinessParams {
    pub enabled: bool,
    pub poll_interval: Duration,
    /// Upper bound for NAT gateways
    pub nat_gateway_max_wait: Duration,
    /// Upper bound for database instances
    pub db_instance_max_wait: Duration,
}

impl Default for ReadinessParams {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval: Duration::from_secs(15),
            nat_gateway_max_wait: Duration::from_secs(5 * 60),
            db_instance_max_wait: Duration::from_secs(15 * 60),
        }
    }
}

impl ReadinessParams {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }
}

/// Plan executor control parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorParams {
    /// Per-step delay in `simulate`
    pub simulate_delay: Duration,
    /// Send timeout for the `execution_started` event
    pub initial_send_timeout: Duration,
    /// Send timeout for every other event
    pub progress_send_timeout: Duration,
    /// Record resources and save state after successful steps
    pub persist_state: bool,
    pub readiness: ReadinessParams,
    pub id_rules: IdFieldRules,
}

impl Default for ExecutorParams {
    fn default() -> Self {
        Self {
            simulate_delay: Duration::from_millis(500),
            initial_send_timeout: Duration::from_secs(5),
            progress_send_timeout: Duration::from_secs(2),
            persist_state: true,
            readiness: ReadinessParams::default(),
            id_rules: IdFieldRules::default(),
        }
    }
}

impl ExecutorParams {
    // ==================== Builder Methods ====================

    pub fn with_simulate_delay(mut self, delay: Duration) -> Self {
        self.simulate_delay = delay;
        self
    }

    pub fn with_send_timeouts(mut self, initial: Duration, progress: Duration) -> Self {
        self.initial_send_timeout = initial;
        self.progress_send_timeout = progress;
        self
    }

    pub fn with_persist_state(mut self, persist: bool) -> Self {
        self.persist_state = persist;
        self
    }

    pub fn with_readiness(mut self, readiness: ReadinessParams) -> Self {
        self.readiness = readiness;
        self
    }

    pub fn with_id_rules(mut self, id_rules: IdFieldRules) -> Self {
        self.id_rules = id_rules;
        self
    }
}
