//! MCP tool-server integration
//!
//! Spawns the server as a subprocess and speaks line-delimited JSON-RPC
//! 2.0 over its stdio.
//!
//! - [`client`]: process lifecycle, handshake, discovery and `tools/call`
//! - [`protocol`]: request/response/notification shapes
//! - [`transport`]: framing, message classification and result decoding
//! - [`error`]: [`McpError`](error::McpError)

pub mod client;
pub mod error;
pub mod protocol;
pub mod transport;

pub use client::{McpClient, McpServerConfig};
pub use error::{McpError, Result};
