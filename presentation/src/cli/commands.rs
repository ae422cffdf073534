//! CLI command definitions

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Output format for the run report
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Every attempted step with its output or error
    Full,
    /// The run record as JSON
    Json,
    /// One status line plus errors
    Summary,
}

/// CLI arguments for infra-agent
#[derive(Parser, Debug)]
#[command(name = "infra-agent")]
#[command(author, version, about = "Execute infrastructure plans against an MCP tool server")]
#[command(long_about = r#"
infra-agent executes a structured infrastructure plan step by step against an
MCP tool server, resolving {{step.field}} references between steps.

Plan file: a JSON object {"name": ..., "steps": [...]} or a bare array of steps.

Configuration files are loaded from (in priority order):
1. INFRA_AGENT_* environment variables
2. --config <path>            Explicit config file
3. ./infra-agent.toml          Project-level config
4. ~/.config/infra-agent/config.toml   Global config

Example:
  infra-agent plan.json
  infra-agent --dry-run -o summary plan.json
  infra-agent --server-command "./aws-mcp-server --stdio" --region eu-west-1 plan.json
"#)]
pub struct Cli {
    /// Plan file to execute (not required with --show-config)
    #[arg(value_name = "PLAN", required_unless_present = "show_config")]
    pub plan: Option<PathBuf>,

    /// Simulate the plan without calling the tool server
    #[arg(long)]
    pub dry_run: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "full")]
    pub output: OutputFormat,

    /// Verbosity level (-v = info, -vv = debug, -vvv = trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress progress indicators
    #[arg(short, long)]
    pub quiet: bool,

    /// Path to configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Disable loading of configuration files
    #[arg(long)]
    pub no_config: bool,

    /// Show configuration file locations and exit
    #[arg(long)]
    pub show_config: bool,

    /// MCP server command line (overrides [server] command and args)
    #[arg(long, value_name = "CMD")]
    pub server_command: Option<String>,

    /// AWS region passed to the server
    #[arg(long, value_name = "REGION")]
    pub region: Option<String>,

    /// Append run events to this JSONL journal
    #[arg(long, value_name = "PATH")]
    pub journal: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_flags() {
        let cli = Cli::parse_from([
            "infra-agent",
            "--dry-run",
            "-o",
            "summary",
            "-vv",
            "--region",
            "eu-west-1",
            "plan.json",
        ]);
        assert!(cli.dry_run);
        assert_eq!(cli.output, OutputFormat::Summary);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.region.as_deref(), Some("eu-west-1"));
        assert_eq!(cli.plan, Some(PathBuf::from("plan.json")));
    }

    #[test]
    fn test_plan_required_unless_show_config() {
        assert!(Cli::try_parse_from(["infra-agent"]).is_err());
        let cli = Cli::try_parse_from(["infra-agent", "--show-config"]).unwrap();
        assert!(cli.plan.is_none());
    }
}
