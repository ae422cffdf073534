//! Port definitions (interfaces for external adapters)
//!
//! Ports define the contracts that infrastructure adapters must implement.

pub mod cloud_lookup;
pub mod execution_logger;
pub mod tool_server;
