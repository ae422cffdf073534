//! Tool server port
//!
//! Defines the interface for invoking operations on the external
//! tool-execution server. The state-management operations are expressed as
//! well-known tool calls, so adapters only need to implement [`call_tool`].
//!
//! [`call_tool`]: ToolServerPort::call_tool

use async_trait::async_trait;
use infra_agent_domain::ToolOutput;
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub const EXPORT_STATE_TOOL: &str = "export-infrastructure-state";
pub const SAVE_STATE_TOOL: &str = "save-state";
pub const ADD_RESOURCE_TOOL: &str = "add-resource-to-state";

/// Errors from the tool server
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolServerError {
    #[error("Tool {tool} failed: {message}")]
    ToolExecution { tool: String, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Tool server is not running")]
    NotRunning,

    #[error("Operation cancelled")]
    Cancelled,
}

impl ToolServerError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ToolServerError::Cancelled)
    }
}

/// A resource entry written to the server's managed state.
#[derive(Debug, Clone, Serialize)]
pub struct StateRecord {
    pub resource_id: String,
    pub resource_name: String,
    pub description: String,
    pub resource_type: String,
    pub status: String,
    pub properties: Map<String, Value>,
    pub dependencies: Vec<String>,
}

/// Port for the tool server
///
/// Implementations (adapters) live in the infrastructure layer. Every call
/// observes `cancel` and returns [`ToolServerError::Cancelled`] once it fires.
#[async_trait]
pub trait ToolServerPort: Send + Sync {
    /// Invoke a tool and return its decoded result.
    ///
    /// A result reporting a tool-level error is returned as
    /// [`ToolServerError::ToolExecution`].
    async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
        cancel: &CancellationToken,
    ) -> Result<ToolOutput, ToolServerError>;

    /// Export the managed infrastructure state.
    async fn export_state(&self, cancel: &CancellationToken) -> Result<Value, ToolServerError> {
        let arguments = json!({
            "format": "json",
            "include_managed": true,
            "include_discovered": false,
        });
        Ok(self
            .call_tool(EXPORT_STATE_TOOL, arguments, cancel)
            .await?
            .into_value())
    }

    /// Ask the server to persist its state.
    async fn save_state(&self, cancel: &CancellationToken) -> Result<(), ToolServerError> {
        self.call_tool(SAVE_STATE_TOOL, json!({"force": true}), cancel)
            .await
            .map(|_| ())
    }

    async fn add_resource_to_state(
        &self,
        record: &StateRecord,
        cancel: &CancellationToken,
    ) -> Result<(), ToolServerError> {
        let arguments = serde_json::to_value(record).map_err(|e| ToolServerError::ToolExecution {
            tool: ADD_RESOURCE_TOOL.to_string(),
            message: e.to_string(),
        })?;
        self.call_tool(ADD_RESOURCE_TOOL, arguments, cancel)
            .await
            .map(|_| ())
    }
}
