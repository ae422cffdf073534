//! Line-delimited JSON-RPC transport and result decoding.
//!
//! # Types
//!
//! - [`MessageKind`] classifies each incoming frame so the reader can pick
//!   out the response it is waiting for.
//! - [`LineTransport`] writes one JSON object per line and reads frames
//!   until the matching response arrives.
//! - [`decode_tool_result`] turns a `tools/call` result into a [`ToolOutput`].

use super::error::{McpError, Result};
use super::protocol::JsonRpcResponse;
use infra_agent_domain::ToolOutput;
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Lines};
use tracing::trace;

/// Classification of an incoming JSON-RPC message.
#[derive(Debug, PartialEq, Eq)]
pub enum MessageKind {
    /// A response to one of our requests (has `id`, no `method`)
    Response { id: u64 },
    /// A request from the server (has `id` + `method`)
    IncomingRequest { id: u64 },
    /// A notification (no numeric `id`)
    Notification,
}

/// Classify a JSON-RPC message by inspecting `id` and `method` fields.
pub fn classify_message(json: &Value) -> MessageKind {
    let has_id = json.get("id").and_then(|v| v.as_u64());
    let has_method = json.get("method").and_then(|v| v.as_str());

    match (has_id, has_method) {
        (Some(id), Some(_)) => MessageKind::IncomingRequest { id },
        (Some(id), None) => MessageKind::Response { id },
        _ => MessageKind::Notification,
    }
}

/// One JSON object per line in each direction.
pub struct LineTransport<W, R> {
    writer: W,
    lines: Lines<BufReader<R>>,
    /// Set while a line is being written; stays set if the write is dropped
    interrupted: bool,
}

impl<W, R> LineTransport<W, R>
where
    W: AsyncWrite + Unpin,
    R: AsyncRead + Unpin,
{
    pub fn new(writer: W, reader: R) -> Self {
        Self {
            writer,
            lines: BufReader::new(reader).lines(),
            interrupted: false,
        }
    }

    /// Write `message` as a single line and flush.
    ///
    /// `write_all` is not cancel-safe. A send that is dropped or fails
    /// mid-line leaves a partial frame on the peer's input, so the
    /// transport refuses every later send.
    pub async fn send<T: Serialize>(&mut self, message: &T) -> Result<()> {
        if self.interrupted {
            return Err(McpError::Transport(
                "an earlier write was interrupted mid-frame".to_string(),
            ));
        }
        let mut line = serde_json::to_string(message)?;
        line.push('\n');
        self.interrupted = true;
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;
        self.interrupted = false;
        Ok(())
    }

    /// Whether a partial frame may have been written.
    pub fn is_interrupted(&self) -> bool {
        self.interrupted
    }

    /// Read frames until the response with `id` arrives.
    ///
    /// Notifications, server requests and responses to other ids are
    /// skipped. A line that is not JSON fails the read.
    pub async fn read_response(&mut self, id: u64) -> Result<JsonRpcResponse> {
        loop {
            let line = self
                .lines
                .next_line()
                .await?
                .ok_or(McpError::TransportClosed)?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let value: Value = serde_json::from_str(line)
                .map_err(|e| McpError::Transport(format!("invalid JSON from server: {}", e)))?;

            match classify_message(&value) {
                MessageKind::Response { id: received } if received == id => {
                    return serde_json::from_value(value).map_err(|e| {
                        McpError::Transport(format!("malformed response: {}", e))
                    });
                }
                MessageKind::Response { id: received } => {
                    trace!(expected = id, received, "Skipping response to another request");
                }
                MessageKind::IncomingRequest { .. } | MessageKind::Notification => {
                    trace!(
                        method = value.get("method").and_then(|m| m.as_str()).unwrap_or(""),
                        "Skipping server message"
                    );
                }
            }
        }
    }
}

/// Text carried by a `tools/call` result: a direct `text` field, or the
/// `text` blocks of `content` joined by newlines.
fn result_text(result: &Value) -> Option<String> {
    if let Some(text) = result.get("text").and_then(|t| t.as_str()) {
        return Some(text.to_string());
    }
    let blocks = result.get("content")?.as_array()?;
    let texts: Vec<&str> = blocks
        .iter()
        .filter_map(|block| block.get("text").and_then(|t| t.as_str()))
        .collect();
    if texts.is_empty() {
        None
    } else {
        Some(texts.join("\n"))
    }
}

/// Decode a `tools/call` result.
///
/// Text is parsed as JSON when possible and kept as `{"text": ...}`
/// otherwise. A result without text is returned as-is.
pub fn decode_tool_result(result: Value) -> ToolOutput {
    let Some(text) = result_text(&result) else {
        return ToolOutput::from_value(result);
    };
    match serde_json::from_str::<Value>(&text) {
        Ok(value) => ToolOutput::from_value(value),
        Err(_) => {
            let mut output = ToolOutput::default();
            output.insert("text", text);
            output
        }
    }
}

/// Whether the result envelope carries MCP's `isError: true`.
pub fn is_error_result(result: &Value) -> bool {
    result
        .get("isError")
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
}
