//! Types for the plan executor

use crate::ports::cloud_lookup::LookupError;
use crate::ports::tool_server::ToolServerError;
use crate::use_cases::resolve_reference::ResolveError;
use infra_agent_domain::DomainError;
use std::time::Duration;
use thiserror::Error;

/// Errors that fail a single step (and therefore the run)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutePlanError {
    #[error(transparent)]
    InvalidPlan(DomainError),

    #[error("Unknown tool {tool}; available tools: {}", available.join(", "))]
    UnknownTool {
        tool: String,
        available: Vec<String>,
    },

    #[error(transparent)]
    Resolve(ResolveError),

    #[error("required parameter `{parameter}` is missing for tool `{tool}`")]
    MissingParameter { parameter: String, tool: String },

    #[error("required parameter `{parameter}` is empty for tool `{tool}`")]
    EmptyParameter { parameter: String, tool: String },

    #[error(transparent)]
    ToolServer(ToolServerError),

    #[error("Unsupported value type: {0}")]
    UnsupportedValueType(String),

    #[error("Retrieval of {value_type} failed: {message}")]
    Retrieval { value_type: String, message: String },

    #[error("{resource} {id} not ready after {waited:?}")]
    ResourceNotReady {
        resource: String,
        id: String,
        waited: Duration,
    },

    #[error("Operation cancelled")]
    Cancelled,
}

impl ExecutePlanError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ExecutePlanError::Cancelled)
    }

    pub(super) fn retrieval(value_type: impl Into<String>, message: impl Into<String>) -> Self {
        ExecutePlanError::Retrieval {
            value_type: value_type.into(),
            message: message.into(),
        }
    }

    pub(super) fn lookup(value_type: impl Into<String>, error: LookupError) -> Self {
        match error {
            LookupError::Cancelled => ExecutePlanError::Cancelled,
            other => Self::retrieval(value_type, other.to_string()),
        }
    }
}

// Cancellation from any layer surfaces as `ExecutePlanError::Cancelled`.

impl From<DomainError> for ExecutePlanError {
    fn from(error: DomainError) -> Self {
        match error {
            DomainError::Cancelled => ExecutePlanError::Cancelled,
            other => ExecutePlanError::InvalidPlan(other),
        }
    }
}

impl From<ResolveError> for ExecutePlanError {
    fn from(error: ResolveError) -> Self {
        match error {
            ResolveError::Cancelled => ExecutePlanError::Cancelled,
            other => ExecutePlanError::Resolve(other),
        }
    }
}

impl From<ToolServerError> for ExecutePlanError {
    fn from(error: ToolServerError) -> Self {
        match error {
            ToolServerError::Cancelled => ExecutePlanError::Cancelled,
            other => ExecutePlanError::ToolServer(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, ExecutePlanError>;
