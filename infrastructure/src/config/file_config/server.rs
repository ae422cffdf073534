//! MCP server configuration from TOML (`[server]` section)

use super::expand_path;
use crate::mcp::McpServerConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

pub const DEFAULT_REGION: &str = "us-west-2";

/// Raw server configuration from TOML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileServerConfig {
    /// Executable to launch
    pub command: String,
    pub args: Vec<String>,
    pub working_dir: Option<String>,
    /// Exported as `AWS_REGION`
    pub region: String,
    /// Extra environment for the server process
    pub env: BTreeMap<String, String>,
    /// Per-request deadline; unset waits indefinitely
    pub request_timeout_secs: Option<u64>,
}

impl Default for FileServerConfig {
    fn default() -> Self {
        Self {
            command: "go".to_string(),
            args: vec!["run".to_string(), "cmd/server/main.go".to_string()],
            working_dir: None,
            region: DEFAULT_REGION.to_string(),
            env: BTreeMap::new(),
            request_timeout_secs: None,
        }
    }
}

impl FileServerConfig {
    /// Replace command and args from a whitespace-separated command line.
    pub fn set_command_line(&mut self, command_line: &str) {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        if let Some(command) = parts.next() {
            self.command = command;
            self.args = parts.collect();
        }
    }

    pub fn to_server_config(&self) -> McpServerConfig {
        let mut config = McpServerConfig::new(&self.command)
            .with_args(self.args.iter().cloned())
            .with_region(&self.region)
            .with_request_timeout(self.request_timeout_secs.map(Duration::from_secs));
        if let Some(dir) = &self.working_dir {
            config = config.with_working_dir(expand_path(dir));
        }
        for (key, value) in &self.env {
            config = config.with_env(key, value);
        }
        config
    }
}
