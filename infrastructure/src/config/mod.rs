//! Configuration file loading for infra-agent
//!
//! This module handles file I/O and merging of configuration from multiple sources.
//! The priority order (highest to lowest):
//!
//! 1. `INFRA_AGENT_*` environment variables (`__` separates sections)
//! 2. `--config <path>` specified file
//! 3. Project root: `./infra-agent.toml` or `./.infra-agent.toml`
//! 4. XDG config: `$XDG_CONFIG_HOME/infra-agent/config.toml`
//! 5. Default values

mod loader;
mod file_config;

pub use loader::ConfigLoader;
pub use file_config::{
    ConfigValidationError, DEFAULT_QUEUE_CAPACITY, DEFAULT_REGION, FileConfig, FileExecutorConfig,
    FileLoggingConfig, FileReadinessConfig, FileResolutionConfig, FileServerConfig, expand_path,
};
