//! Infrastructure layer for infra-agent
//!
//! This crate contains adapters that implement the ports defined in the
//! application layer:
//!
//! - [`mcp`]: the MCP tool-server client ([`ToolServerPort`](infra_agent_application::ToolServerPort))
//! - [`lookup`]: cloud lookups over server tools ([`CloudLookupPort`](infra_agent_application::CloudLookupPort))
//! - [`logging`]: the JSONL run journal ([`ExecutionLogger`](infra_agent_application::ExecutionLogger))
//! - [`config`]: configuration file loading

pub mod config;
pub mod logging;
pub mod lookup;
pub mod mcp;

// Re-export commonly used types
pub use config::{
    ConfigLoader, ConfigValidationError, FileConfig, FileExecutorConfig, FileLoggingConfig,
    FileResolutionConfig, FileServerConfig,
};
pub use logging::JsonlExecutionLogger;
pub use lookup::McpCloudLookup;
pub use mcp::{McpClient, McpError, McpServerConfig};
