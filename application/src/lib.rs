//! Application layer for infra-agent
//!
//! This crate contains use cases, port definitions, and application configuration.
//! It depends only on the domain layer.

pub mod config;
pub mod ports;
pub mod use_cases;

// Re-export commonly used types
pub use config::{ExecutorParams, ReadinessParams};
pub use ports::{
    cloud_lookup::{CloudLookupPort, ImageFamily, LookupError, SubnetInfo, VpcInfo},
    execution_logger::{ExecutionLogger, NoExecutionLogger},
    tool_server::{StateRecord, ToolServerError, ToolServerPort},
};
pub use use_cases::execute_plan::{ExecutePlanError, PlanExecutor};
pub use use_cases::resolve_reference::{DependencyResolver, ResolveError};
