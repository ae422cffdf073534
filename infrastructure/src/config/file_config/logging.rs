//! Log file configuration from TOML (`[logging]` section)

use super::expand_path;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Raw logging configuration from TOML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileLoggingConfig {
    /// Directory for daily-rolling log files; unset logs to stderr only
    pub directory: Option<String>,
    pub file_prefix: String,
}

impl Default for FileLoggingConfig {
    fn default() -> Self {
        Self {
            directory: None,
            file_prefix: "infra-agent.log".to_string(),
        }
    }
}

impl FileLoggingConfig {
    pub fn directory_path(&self) -> Option<PathBuf> {
        self.directory.as_deref().map(expand_path)
    }
}
