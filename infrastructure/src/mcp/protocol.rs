//! JSON-RPC protocol types for MCP server communication.
//!
//! Messages are newline-delimited JSON-RPC 2.0 objects on the server's
//! stdin/stdout.
//!
//! # Protocol Overview
//!
//! - **Requests**: client → server (`initialize`, `tools/list`, `resources/list`, `tools/call`)
//! - **Responses**: server → client (result or error), correlated by `id`
//! - **Notifications**: either direction, no `id` (`notifications/initialized`)

use infra_agent_domain::{ResourceDescriptor, ToolDescriptor};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// MCP protocol revision announced during the handshake.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// JSON-RPC request
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC response
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub jsonrpc: String,
    pub id: Option<u64>,
    pub result: Option<Value>,
    pub error: Option<RpcError>,
}

/// JSON-RPC error object
#[derive(Debug, Clone, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    pub data: Option<Value>,
}

/// JSON-RPC notification (no `id`, no response expected)
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: &'static str,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            method: method.into(),
            params,
        }
    }
}

/// Params for `initialize`.
pub fn initialize_params(client_name: &str, client_version: &str) -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": client_name,
            "version": client_version,
        }
    })
}

/// Params for `tools/call`.
#[derive(Debug, Clone, Serialize)]
pub struct CallToolParams<'a> {
    pub name: &'a str,
    pub arguments: &'a Value,
}

/// Result of `tools/list`
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsListResult {
    #[serde(default)]
    pub tools: Vec<ToolDescriptor>,
}

/// Result of `resources/list`
#[derive(Debug, Clone, Deserialize)]
pub struct ResourcesListResult {
    #[serde(default)]
    pub resources: Vec<ResourceDescriptor>,
}

/// JSON-RPC "method not found"
pub const METHOD_NOT_FOUND: i64 = -32601;
