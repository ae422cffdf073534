//! Progress events emitted while a plan executes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionEventKind {
    ExecutionStarted,
    StepStarted,
    StepProgress,
    StepCompleted,
    StepFailed,
    ExecutionCompleted,
}

impl ExecutionEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionEventKind::ExecutionStarted => "execution_started",
            ExecutionEventKind::StepStarted => "step_started",
            ExecutionEventKind::StepProgress => "step_progress",
            ExecutionEventKind::StepCompleted => "step_completed",
            ExecutionEventKind::StepFailed => "step_failed",
            ExecutionEventKind::ExecutionCompleted => "execution_completed",
        }
    }
}

impl std::fmt::Display for ExecutionEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A progress notification for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionEvent {
    pub kind: ExecutionEventKind,
    pub execution_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Fraction of steps completed, in `[0, 1]`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl ExecutionEvent {
    pub fn new(
        kind: ExecutionEventKind,
        execution_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            execution_id: execution_id.into(),
            step_id: None,
            message: message.into(),
            error: None,
            progress: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_step(mut self, step_id: impl Into<String>) -> Self {
        self.step_id = Some(step_id.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Attach `completed / total`; an empty plan counts as done.
    pub fn with_progress(mut self, completed: usize, total: usize) -> Self {
        let fraction = if total == 0 {
            1.0
        } else {
            (completed as f64 / total as f64).clamp(0.0, 1.0)
        };
        self.progress = Some(fraction);
        self
    }

    pub fn is_failure(&self) -> bool {
        self.kind == ExecutionEventKind::StepFailed || self.error.is_some()
    }
}
