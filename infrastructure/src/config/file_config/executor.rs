//! Executor configuration from TOML (`[executor]` section)

use infra_agent_application::{ExecutorParams, ReadinessParams};
use infra_agent_domain::IdFieldRules;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Raw readiness polling configuration (`[executor.readiness]`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileReadinessConfig {
    pub enabled: bool,
    pub poll_interval_secs: u64,
    pub nat_gateway_max_wait_secs: u64,
    pub db_instance_max_wait_secs: u64,
}

impl Default for FileReadinessConfig {
    fn default() -> Self {
        let defaults = ReadinessParams::default();
        Self {
            enabled: defaults.enabled,
            poll_interval_secs: defaults.poll_interval.as_secs(),
            nat_gateway_max_wait_secs: defaults.nat_gateway_max_wait.as_secs(),
            db_instance_max_wait_secs: defaults.db_instance_max_wait.as_secs(),
        }
    }
}

impl FileReadinessConfig {
    pub fn to_readiness_params(&self) -> ReadinessParams {
        ReadinessParams {
            enabled: self.enabled,
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            nat_gateway_max_wait: Duration::from_secs(self.nat_gateway_max_wait_secs),
            db_instance_max_wait: Duration::from_secs(self.db_instance_max_wait_secs),
        }
    }
}

/// Raw executor configuration from TOML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileExecutorConfig {
    /// Per-step delay of a dry run
    pub simulate_delay_ms: u64,
    /// Bound of the progress event queue
    pub progress_queue_capacity: usize,
    pub progress_send_timeout_ms: u64,
    pub initial_send_timeout_ms: u64,
    /// Record created resources in the server's state
    pub persist_state: bool,
    /// JSONL run journal; unset disables it
    pub journal_path: Option<String>,
    pub readiness: FileReadinessConfig,
}

pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

impl Default for FileExecutorConfig {
    fn default() -> Self {
        let defaults = ExecutorParams::default();
        Self {
            simulate_delay_ms: defaults.simulate_delay.as_millis() as u64,
            progress_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            progress_send_timeout_ms: defaults.progress_send_timeout.as_millis() as u64,
            initial_send_timeout_ms: defaults.initial_send_timeout.as_millis() as u64,
            persist_state: defaults.persist_state,
            journal_path: None,
            readiness: FileReadinessConfig::default(),
        }
    }
}

impl FileExecutorConfig {
    pub fn to_executor_params(&self, id_rules: IdFieldRules) -> ExecutorParams {
        ExecutorParams::default()
            .with_simulate_delay(Duration::from_millis(self.simulate_delay_ms))
            .with_send_timeouts(
                Duration::from_millis(self.initial_send_timeout_ms),
                Duration::from_millis(self.progress_send_timeout_ms),
            )
            .with_persist_state(self.persist_state)
            .with_readiness(self.readiness.to_readiness_params())
            .with_id_rules(id_rules)
    }
}
