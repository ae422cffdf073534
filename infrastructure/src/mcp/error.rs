//! Error types for the MCP tool-server client

use infra_agent_application::ToolServerError;
use std::time::Duration;
use thiserror::Error;

/// Errors produced while talking to an MCP server subprocess.
#[derive(Error, Debug)]
pub enum McpError {
    #[error("Failed to start MCP server: {0}")]
    ProcessStart(String),

    #[error("Failed to serialize message: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("MCP server closed its output stream")]
    TransportClosed,

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Discovery failed: {0}")]
    Discovery(String),

    #[error("Tool {tool} failed: {message}")]
    ToolExecution { tool: String, message: String },

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("MCP server is not running")]
    NotRunning,

    #[error("Operation cancelled")]
    Cancelled,
}

impl McpError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, McpError::Cancelled)
    }

    /// Fold wire-level failures of a `tools/call` into a tool failure.
    pub(crate) fn for_tool(self, tool: &str) -> Self {
        match self {
            McpError::Transport(_)
            | McpError::TransportClosed
            | McpError::Serialization(_)
            | McpError::Rpc { .. } => McpError::ToolExecution {
                tool: tool.to_string(),
                message: self.to_string(),
            },
            other => other,
        }
    }
}

impl From<std::io::Error> for McpError {
    fn from(err: std::io::Error) -> Self {
        McpError::Transport(err.to_string())
    }
}

impl From<McpError> for ToolServerError {
    fn from(err: McpError) -> Self {
        match err {
            McpError::ToolExecution { tool, message } => {
                ToolServerError::ToolExecution { tool, message }
            }
            McpError::Rpc { code, message } => ToolServerError::Rpc { code, message },
            McpError::Timeout(after) => ToolServerError::Timeout(after),
            McpError::NotRunning => ToolServerError::NotRunning,
            McpError::Cancelled => ToolServerError::Cancelled,
            other => ToolServerError::Transport(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, McpError>;
