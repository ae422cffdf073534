//! MCP server subprocess client
//!
//! [`McpClient`] owns one server process and talks to it over
//! line-delimited JSON-RPC on stdin/stdout. Requests are serialized: the
//! connection lock is held from writing a request until its response is
//! read, so at most one request is in flight.
//!
//! ```text
//! start() ──▶ spawn ──▶ initialize ──▶ notifications/initialized
//!                            │
//!                            ▼
//!              tools/list ──▶ ToolCatalog::replace_all
//!              resources/list ──▶ ToolCatalog::replace_resources
//! ```

use super::error::{McpError, Result};
use super::protocol::{
    CallToolParams, JsonRpcNotification, JsonRpcRequest, METHOD_NOT_FOUND, ResourcesListResult,
    ToolsListResult, initialize_params,
};
use super::transport::{LineTransport, decode_tool_result, is_error_result};
use async_trait::async_trait;
use infra_agent_application::{ToolServerError, ToolServerPort};
use infra_agent_domain::{ToolCatalog, ToolOutput};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How to launch the MCP server.
#[derive(Debug, Clone)]
pub struct McpServerConfig {
    pub command: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    /// Exported to the server as `AWS_REGION`
    pub region: Option<String>,
    pub env: BTreeMap<String, String>,
    /// Per-request deadline; `None` waits indefinitely
    pub request_timeout: Option<Duration>,
    pub client_name: String,
    pub client_version: String,
}

impl McpServerConfig {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            working_dir: None,
            region: None,
            env: BTreeMap::new(),
            request_timeout: None,
            client_name: "infra-agent".to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    // ==================== Builder Methods ====================

    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// A running server process plus its framed stdio.
struct Connection {
    child: Child,
    transport: LineTransport<ChildStdin, ChildStdout>,
    stderr_task: Option<JoinHandle<()>>,
    next_id: u64,
}

impl Connection {
    fn spawn(config: &McpServerConfig) -> Result<Self> {
        debug!(command = %config.command, args = ?config.args, "Spawning MCP server");

        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(region) = &config.region {
            cmd.env("AWS_REGION", region);
        }
        if let Some(dir) = &config.working_dir {
            cmd.current_dir(dir);
        }

        // Linux: request kernel to send SIGTERM to child when parent dies.
        #[cfg(target_os = "linux")]
        unsafe {
            cmd.pre_exec(|| {
                libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM);
                Ok(())
            });
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| McpError::ProcessStart(format!("{}: {}", config.command, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::ProcessStart("failed to capture stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::ProcessStart("failed to capture stdout".into()))?;
        let stderr_task = child.stderr.take().map(|stderr| tokio::spawn(forward_stderr(stderr)));

        Ok(Self {
            child,
            transport: LineTransport::new(stdin, stdout),
            stderr_task,
            next_id: 0,
        })
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    async fn shutdown(&mut self) {
        if let Err(e) = self.child.start_kill() {
            debug!(error = %e, "MCP server already exited");
        }
        if let Err(e) = self.child.wait().await {
            warn!(error = %e, "Failed to reap MCP server process");
        }
        if let Some(task) = self.stderr_task.take() {
            task.abort();
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let _ = self.child.start_kill();
        if let Some(task) = &self.stderr_task {
            task.abort();
        }
    }
}

/// Forward server stderr lines to the log.
async fn forward_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if !line.trim().is_empty() => {
                info!(source = "mcp_server", "{}", line);
            }
            Ok(Some(_)) => {}
            Ok(None) => break,
            Err(e) => {
                debug!(error = %e, "Stopped reading MCP server stderr");
                break;
            }
        }
    }
}

/// Bound `fut` by an optional deadline and the cancellation token.
async fn bounded<T>(
    fut: impl Future<Output = Result<T>>,
    timeout: Option<Duration>,
    cancel: &CancellationToken,
) -> Result<T> {
    let deadline = async {
        match timeout {
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(result) => result,
                Err(_) => Err(McpError::Timeout(limit)),
            },
            None => fut.await,
        }
    };
    tokio::select! {
        _ = cancel.cancelled() => Err(McpError::Cancelled),
        result = deadline => result,
    }
}

/// Shut down a connection whose stdin holds a partial frame.
///
/// Later requests then fail with `NotRunning` until `start` is called again.
async fn discard_if_interrupted(slot: &mut Option<Connection>) {
    let interrupted = slot
        .as_ref()
        .is_some_and(|connection| connection.transport.is_interrupted());
    if interrupted && let Some(mut connection) = slot.take() {
        warn!("MCP write interrupted mid-frame; stopping server");
        connection.shutdown().await;
    }
}

/// Client for one MCP server process.
pub struct McpClient {
    config: McpServerConfig,
    catalog: Arc<ToolCatalog>,
    connection: Mutex<Option<Connection>>,
}

impl McpClient {
    pub fn new(config: McpServerConfig) -> Self {
        Self::with_catalog(config, Arc::new(ToolCatalog::new()))
    }

    /// Use a shared catalog; discovery replaces its contents.
    pub fn with_catalog(config: McpServerConfig, catalog: Arc<ToolCatalog>) -> Self {
        Self {
            config,
            catalog,
            connection: Mutex::new(None),
        }
    }

    pub fn catalog(&self) -> Arc<ToolCatalog> {
        Arc::clone(&self.catalog)
    }

    pub fn config(&self) -> &McpServerConfig {
        &self.config
    }

    pub async fn is_running(&self) -> bool {
        self.connection.lock().await.is_some()
    }

    /// Spawn the server, run the handshake and discover its tools.
    ///
    /// A second call while running is a no-op. Any failure stops the
    /// process again.
    pub async fn start(&self, cancel: &CancellationToken) -> Result<()> {
        {
            let mut guard = self.connection.lock().await;
            if guard.is_some() {
                debug!("MCP server already running");
                return Ok(());
            }
            *guard = Some(Connection::spawn(&self.config)?);
        }
        info!(command = %self.config.command, "MCP server started");

        let bootstrap = async {
            self.initialize(cancel).await?;
            self.discover_tools(cancel).await?;
            self.discover_resources(cancel).await
        };
        if let Err(e) = bootstrap.await {
            self.stop().await;
            return Err(e);
        }
        Ok(())
    }

    /// Terminate the server. A no-op when not running.
    pub async fn stop(&self) {
        let connection = self.connection.lock().await.take();
        if let Some(mut connection) = connection {
            connection.shutdown().await;
            info!("MCP server stopped");
        }
    }

    async fn initialize(&self, cancel: &CancellationToken) -> Result<()> {
        let params = initialize_params(&self.config.client_name, &self.config.client_version);
        let handshake = async {
            let result = self.request("initialize", params, cancel).await?;
            debug!(
                server = ?result.get("serverInfo"),
                protocol = ?result.get("protocolVersion"),
                "MCP handshake complete"
            );
            self.notify("notifications/initialized", json!({}), cancel)
                .await
        };
        handshake.await.map_err(|e| match e {
            McpError::Cancelled => McpError::Cancelled,
            other => McpError::ProcessStart(format!("initialize handshake failed: {}", other)),
        })
    }

    /// Refresh the catalog from `tools/list`.
    pub async fn discover_tools(&self, cancel: &CancellationToken) -> Result<usize> {
        let result = self.request("tools/list", json!({}), cancel).await?;
        let listed: ToolsListResult = serde_json::from_value(result)
            .map_err(|e| McpError::Discovery(format!("malformed tools/list result: {}", e)))?;
        if listed.tools.is_empty() {
            return Err(McpError::Discovery("server advertised no tools".into()));
        }

        let count = listed.tools.len();
        self.catalog.replace_all(listed.tools);
        info!(count, "Discovered MCP tools");
        Ok(count)
    }

    /// Refresh the resource list. Servers without resource support yield
    /// an empty list.
    pub async fn discover_resources(&self, cancel: &CancellationToken) -> Result<usize> {
        let result = match self.request("resources/list", json!({}), cancel).await {
            Ok(result) => result,
            Err(McpError::Rpc { code, .. }) if code == METHOD_NOT_FOUND => {
                debug!("MCP server does not list resources");
                json!({"resources": []})
            }
            Err(e) => return Err(e),
        };
        let listed: ResourcesListResult = serde_json::from_value(result)
            .map_err(|e| McpError::Discovery(format!("malformed resources/list result: {}", e)))?;

        let count = listed.resources.len();
        self.catalog.replace_resources(listed.resources);
        debug!(count, "Discovered MCP resources");
        Ok(count)
    }

    /// Send a request and wait for its response.
    pub async fn request(
        &self,
        method: &str,
        params: Value,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        let mut guard = tokio::select! {
            _ = cancel.cancelled() => return Err(McpError::Cancelled),
            guard = self.connection.lock() => guard,
        };
        let connection = guard.as_mut().ok_or(McpError::NotRunning)?;
        let id = connection.next_id();
        let request = JsonRpcRequest::new(id, method, Some(params));
        debug!(method, id, "Sending MCP request");

        let transport = &mut connection.transport;
        let exchange = async {
            transport.send(&request).await?;
            transport.read_response(id).await
        };
        let outcome = bounded(exchange, self.config.request_timeout, cancel).await;
        if outcome.is_err() {
            discard_if_interrupted(&mut guard).await;
        }
        let response = outcome?;

        if let Some(error) = response.error {
            return Err(McpError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        Ok(response.result.unwrap_or(Value::Null))
    }

    /// Send a notification; no response is read.
    pub async fn notify(
        &self,
        method: &str,
        params: Value,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut guard = tokio::select! {
            _ = cancel.cancelled() => return Err(McpError::Cancelled),
            guard = self.connection.lock() => guard,
        };
        let connection = guard.as_mut().ok_or(McpError::NotRunning)?;
        let notification = JsonRpcNotification::new(method, Some(params));
        let outcome = bounded(
            connection.transport.send(&notification),
            self.config.request_timeout,
            cancel,
        )
        .await;
        if outcome.is_err() {
            discard_if_interrupted(&mut guard).await;
        }
        outcome
    }

    /// Invoke a tool and decode its result.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: &Value,
        cancel: &CancellationToken,
    ) -> Result<ToolOutput> {
        let params = serde_json::to_value(CallToolParams { name, arguments })?;
        let result = self
            .request("tools/call", params, cancel)
            .await
            .map_err(|e| e.for_tool(name))?;

        let flagged = is_error_result(&result);
        let output = decode_tool_result(result);
        if output.is_error() || flagged {
            let message = output
                .error_message()
                .or_else(|| output.get_str("text").map(str::to_string))
                .unwrap_or_else(|| "tool reported an error".to_string());
            return Err(McpError::ToolExecution {
                tool: name.to_string(),
                message,
            });
        }
        Ok(output)
    }
}

#[async_trait]
impl ToolServerPort for McpClient {
    async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
        cancel: &CancellationToken,
    ) -> std::result::Result<ToolOutput, ToolServerError> {
        McpClient::call_tool(self, name, &arguments, cancel)
            .await
            .map_err(ToolServerError::from)
    }
}
