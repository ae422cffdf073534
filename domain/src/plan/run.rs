//! Execution run records.
//!
//! An [`ExecutionRun`] is created when a plan starts executing and collects
//! one [`StepOutcome`] per attempted step. It is the complete account of what
//! happened: final status, per-step output or error, and a flat error list.

use super::entities::{PlanStep, StepAction, StepStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Status of a whole run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of a single attempted step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutcome {
    pub step_id: String,
    pub name: String,
    pub action: StepAction,
    pub resource_id: String,
    pub status: StepStatus,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepOutcome {
    /// Begin recording a step (status `running`).
    pub fn start(step: &PlanStep) -> Self {
        Self {
            step_id: step.id.clone(),
            name: step.name.clone(),
            action: step.action,
            resource_id: step.resource_id.clone(),
            status: StepStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            duration_ms: 0,
            output: None,
            error: None,
        }
    }

    pub fn complete(&mut self, output: Value) {
        self.finish(StepStatus::Completed);
        self.output = Some(output);
    }

    pub fn fail(&mut self, error: impl Into<String>) {
        self.finish(StepStatus::Failed);
        self.error = Some(error.into());
    }

    fn finish(&mut self, status: StepStatus) {
        let now = Utc::now();
        self.status = status;
        self.duration_ms = (now - self.started_at).num_milliseconds().max(0) as u64;
        self.completed_at = Some(now);
    }
}

/// One execution attempt of a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRun {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_name: Option<String>,
    pub status: RunStatus,
    /// True for dry runs produced by `simulate`
    pub simulated: bool,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub steps: Vec<StepOutcome>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl ExecutionRun {
    /// Start a new run with a fresh random id.
    pub fn start(plan_name: Option<String>, simulated: bool) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            plan_name,
            status: RunStatus::Running,
            simulated,
            started_at: Utc::now(),
            completed_at: None,
            steps: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn record(&mut self, outcome: StepOutcome) {
        self.steps.push(outcome);
    }

    /// Record a run-level error without touching the status.
    pub fn push_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    /// Finalize as completed, unless an error was already recorded.
    pub fn finish(&mut self) {
        self.status = if self.errors.is_empty() {
            RunStatus::Completed
        } else {
            RunStatus::Failed
        };
        self.completed_at = Some(Utc::now());
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Completed
    }

    pub fn completed_steps(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .count()
    }

    pub fn failed_step(&self) -> Option<&StepOutcome> {
        self.steps.iter().find(|s| s.status == StepStatus::Failed)
    }

    pub fn outcome(&self, step_id: &str) -> Option<&StepOutcome> {
        self.steps.iter().find(|s| s.step_id == step_id)
    }
}
