//! Plan domain entities

use crate::core::error::DomainError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::str::FromStr;

/// The kind of operation a plan step performs.
///
/// This is a closed set: a plan naming any other action fails to parse,
/// so it is rejected before the tool server is ever contacted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepAction {
    Create,
    Update,
    Delete,
    Validate,
    /// Built-in value lookup (latest image, default network, ...)
    #[serde(alias = "api_value_retrieval")]
    Retrieve,
}

impl StepAction {
    pub fn as_str(&self) -> &str {
        match self {
            StepAction::Create => "create",
            StepAction::Update => "update",
            StepAction::Delete => "delete",
            StepAction::Validate => "validate",
            StepAction::Retrieve => "retrieve",
        }
    }

    /// Whether a step with this action must name a tool.
    pub fn requires_tool(&self) -> bool {
        matches!(
            self,
            StepAction::Create | StepAction::Update | StepAction::Delete
        )
    }

    /// Verb used in progress messages ("Creating", "Deleting", ...).
    pub fn progress_verb(&self) -> &str {
        match self {
            StepAction::Create => "Creating",
            StepAction::Update => "Updating",
            StepAction::Delete => "Deleting",
            StepAction::Validate => "Validating",
            StepAction::Retrieve => "Retrieving",
        }
    }
}

impl FromStr for StepAction {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(StepAction::Create),
            "update" => Ok(StepAction::Update),
            "delete" => Ok(StepAction::Delete),
            "validate" => Ok(StepAction::Validate),
            "retrieve" | "api_value_retrieval" => Ok(StepAction::Retrieve),
            other => Err(DomainError::UnknownAction(other.to_string())),
        }
    }
}

impl std::fmt::Display for StepAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status of a plan step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    /// Step has not been attempted yet
    #[default]
    Pending,
    /// Step is currently executing
    Running,
    /// Step completed successfully
    Completed,
    /// Step failed
    Failed,
}

impl StepStatus {
    pub fn as_str(&self) -> &str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StepStatus::Completed | StepStatus::Failed)
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single logical infrastructure operation within a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanStep {
    /// Unique identifier within the plan
    pub id: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Display description
    #[serde(default)]
    pub description: String,
    /// What this step does
    pub action: StepAction,
    /// Logical name of the resource this step targets
    #[serde(default)]
    pub resource_id: String,
    /// Tool to invoke on the tool server
    #[serde(
        default,
        rename = "mcpTool",
        alias = "tool",
        skip_serializing_if = "Option::is_none"
    )]
    pub tool: Option<String>,
    /// Arguments for the tool (takes precedence over `parameters` when non-empty)
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub tool_parameters: Map<String, Value>,
    /// General parameters; literals, reference tokens, or nested maps/lists
    #[serde(default)]
    pub parameters: Map<String, Value>,
    /// Informational only; execution order is plan order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    /// Current status
    #[serde(default)]
    pub status: StepStatus,
}

impl PlanStep {
    pub fn new(id: impl Into<String>, action: StepAction) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            description: String::new(),
            action,
            resource_id: String::new(),
            tool: None,
            tool_parameters: Map::new(),
            parameters: Map::new(),
            depends_on: Vec::new(),
            status: StepStatus::Pending,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_resource_id(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = resource_id.into();
        self
    }

    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = Some(tool.into());
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn with_tool_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.tool_parameters.insert(key.into(), value.into());
        self
    }

    pub fn with_dependency(mut self, step_id: impl Into<String>) -> Self {
        self.depends_on.push(step_id.into());
        self
    }

    /// The tool name, ignoring an empty string.
    pub fn tool_name(&self) -> Option<&str> {
        self.tool.as_deref().filter(|t| !t.trim().is_empty())
    }

    /// Arguments to send to the tool before resolution.
    pub fn arguments(&self) -> &Map<String, Value> {
        if self.tool_parameters.is_empty() {
            &self.parameters
        } else {
            &self.tool_parameters
        }
    }

    /// Look up a general parameter as a string.
    ///
    /// Checks `parameters` first, then `tool_parameters`.
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.parameters
            .get(key)
            .or_else(|| self.tool_parameters.get(key))
            .and_then(|v| v.as_str())
    }

    /// Look up a general parameter as an unsigned integer.
    pub fn param_u64(&self, key: &str) -> Option<u64> {
        self.parameters
            .get(key)
            .or_else(|| self.tool_parameters.get(key))
            .and_then(|v| v.as_u64().or_else(|| v.as_str()?.parse().ok()))
    }

    /// Label used in logs and progress messages.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }

    pub fn mark_running(&mut self) {
        self.status = StepStatus::Running;
    }

    pub fn mark_completed(&mut self) {
        self.status = StepStatus::Completed;
    }

    pub fn mark_failed(&mut self) {
        self.status = StepStatus::Failed;
    }
}

/// Ordered sequence of plan steps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionPlan {
    /// Optional display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Steps in execution order
    pub steps: Vec<PlanStep>,
}

/// Plan files may be a `{name, steps}` object or a bare step array.
#[derive(Deserialize)]
#[serde(untagged)]
enum PlanDocument {
    Plan(ExecutionPlan),
    Steps(Vec<PlanStep>),
}

impl ExecutionPlan {
    pub fn new(steps: Vec<PlanStep>) -> Self {
        Self { name: None, steps }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_step(mut self, step: PlanStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Parse a plan document.
    ///
    /// Unknown actions surface here as [`DomainError::InvalidPlan`].
    pub fn from_json(json: &str) -> Result<Self, DomainError> {
        let document: PlanDocument =
            serde_json::from_str(json).map_err(|e| DomainError::InvalidPlan(e.to_string()))?;
        Ok(match document {
            PlanDocument::Plan(plan) => plan,
            PlanDocument::Steps(steps) => Self::new(steps),
        })
    }

    /// Check structural invariants before any step runs.
    pub fn validate(&self) -> Result<(), DomainError> {
        let mut seen = HashSet::new();
        for step in &self.steps {
            if step.id.trim().is_empty() {
                return Err(DomainError::InvalidPlan("step with empty id".to_string()));
            }
            if !seen.insert(step.id.as_str()) {
                return Err(DomainError::DuplicateStepId(step.id.clone()));
            }
            if step.action.requires_tool() && step.tool_name().is_none() {
                return Err(DomainError::MissingTool {
                    step_id: step.id.clone(),
                    action: step.action.to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn get_step(&self, id: &str) -> Option<&PlanStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn get_step_mut(&mut self, id: &str) -> Option<&mut PlanStep> {
        self.steps.iter_mut().find(|s| s.id == id)
    }

    /// (completed, total)
    pub fn progress(&self) -> (usize, usize) {
        let completed = self
            .steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .count();
        (completed, self.steps.len())
    }
}
