//! Domain error types

use thiserror::Error;

/// Domain-level errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Unknown action type: {0}")]
    UnknownAction(String),

    #[error("Invalid plan: {0}")]
    InvalidPlan(String),

    #[error("Duplicate step id: {0}")]
    DuplicateStepId(String),

    #[error("Step {step_id} ({action}) does not name a tool")]
    MissingTool { step_id: String, action: String },

    #[error("Operation cancelled")]
    Cancelled,
}

impl DomainError {
    /// Check if this error represents a cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DomainError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_error_display() {
        let error = DomainError::Cancelled;
        assert_eq!(error.to_string(), "Operation cancelled");
    }

    #[test]
    fn test_is_cancelled_check() {
        assert!(DomainError::Cancelled.is_cancelled());
        assert!(!DomainError::UnknownAction("scale".to_string()).is_cancelled());
        assert!(!DomainError::DuplicateStepId("step-1".to_string()).is_cancelled());
    }

    #[test]
    fn test_missing_tool_display() {
        let error = DomainError::MissingTool {
            step_id: "step-vpc".to_string(),
            action: "create".to_string(),
        };
        assert_eq!(error.to_string(), "Step step-vpc (create) does not name a tool");
    }
}
