//! Execution plans, runs and the events they emit.

pub mod entities;
pub mod event;
pub mod run;

pub use entities::{ExecutionPlan, PlanStep, StepAction, StepStatus};
pub use event::{ExecutionEvent, ExecutionEventKind};
pub use run::{ExecutionRun, RunStatus, StepOutcome};
