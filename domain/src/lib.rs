//! Domain layer for infra-agent
//!
//! This crate contains the entities and value objects of the plan-execution
//! engine. It has no dependencies on infrastructure or presentation concerns.
//!
//! # Core Concepts
//!
//! ## Plans
//!
//! An [`ExecutionPlan`] is a linear list of [`PlanStep`]s. Each step
//! performs one [`StepAction`] against a tool server. Steps run strictly in
//! plan order and produce an [`ExecutionRun`].
//!
//! ## References
//!
//! Later steps consume identifiers produced by earlier ones through
//! `{{step.field[.index]}}` tokens ([`DependencyReference`]). Resolved
//! identifiers live in the [`ResourceMappingStore`].

pub mod capability;
pub mod core;
pub mod mapping;
pub mod plan;
pub mod reference;
pub mod resolution;
pub mod retrieval;
pub mod state;
pub mod tool;

// Re-export commonly used types
pub use capability::extract_capabilities;
pub use core::error::DomainError;
pub use mapping::ResourceMappingStore;
pub use plan::{
    ExecutionEvent, ExecutionEventKind, ExecutionPlan, ExecutionRun, PlanStep, RunStatus,
    StepAction, StepOutcome, StepStatus,
};
pub use reference::{DependencyReference, PRIMARY_ID_FIELD, ReferenceError, is_reference};
pub use resolution::{FieldPriorities, IdFieldRules};
pub use retrieval::{RetrievalKind, RetrievalRegistry, StepRefKind, infer_value_type};
pub use state::{ManagedResource, StateSnapshot};
pub use tool::{ResourceDescriptor, ToolCatalog, ToolDescriptor, ToolOutput};
