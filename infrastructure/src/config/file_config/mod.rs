//! Raw TOML configuration data types
//!
//! These structs represent the exact structure of the TOML config file.
//! Each section converts into the type its consumer expects.

mod executor;
mod logging;
mod resolution;
mod server;

pub use executor::{DEFAULT_QUEUE_CAPACITY, FileExecutorConfig, FileReadinessConfig};
pub use logging::FileLoggingConfig;
pub use resolution::FileResolutionConfig;
pub use server::{DEFAULT_REGION, FileServerConfig};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Configuration validation errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigValidationError {
    #[error("server.command cannot be empty")]
    EmptyServerCommand,

    #[error("server.request_timeout_secs cannot be 0")]
    ZeroRequestTimeout,

    #[error("executor.progress_queue_capacity cannot be 0")]
    ZeroQueueCapacity,

    #[error("executor.readiness.poll_interval_secs cannot be 0")]
    ZeroPollInterval,
}

/// Complete file configuration (raw TOML structure)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// MCP server process
    pub server: FileServerConfig,
    /// Plan executor behaviour
    pub executor: FileExecutorConfig,
    /// Reference resolution tables
    pub resolution: FileResolutionConfig,
    /// Log files
    pub logging: FileLoggingConfig,
}

impl FileConfig {
    /// Validate the configuration, returning every problem found.
    pub fn validate(&self) -> Vec<ConfigValidationError> {
        let mut issues = Vec::new();
        if self.server.command.trim().is_empty() {
            issues.push(ConfigValidationError::EmptyServerCommand);
        }
        if self.server.request_timeout_secs == Some(0) {
            issues.push(ConfigValidationError::ZeroRequestTimeout);
        }
        if self.executor.progress_queue_capacity == 0 {
            issues.push(ConfigValidationError::ZeroQueueCapacity);
        }
        if self.executor.readiness.enabled && self.executor.readiness.poll_interval_secs == 0 {
            issues.push(ConfigValidationError::ZeroPollInterval);
        }
        issues
    }
}

/// Expand a leading `~/` to the home directory.
pub fn expand_path(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}
