//! CLI entrypoint for infra-agent
//!
//! This is the main binary that wires together all layers using
//! dependency injection, then executes (or simulates) one plan.

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use infra_agent_application::{
    CloudLookupPort, ExecutionLogger, NoExecutionLogger, PlanExecutor, ToolServerPort,
};
use infra_agent_domain::{ExecutionPlan, ResourceMappingStore};
use infra_agent_infrastructure::config::expand_path;
use infra_agent_infrastructure::{
    ConfigLoader, FileConfig, JsonlExecutionLogger, McpClient, McpCloudLookup,
};
use infra_agent_presentation::{
    Cli, ConsoleFormatter, OutputFormat, ProgressReporter, SimpleProgress, consume_events,
};
use std::io::IsTerminal;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Install the tracing subscriber. The returned guard flushes the log
/// file on drop.
fn init_logging(verbose: u8, config: &FileConfig) -> Option<WorkerGuard> {
    // Initialize logging based on verbosity level; RUST_LOG wins
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace", // -vvv or more
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let console = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let (file_layer, guard) = match config.logging.directory_path() {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, &config.logging.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .init();
    guard
}

fn load_config(cli: &Cli) -> Result<FileConfig> {
    let mut config = if cli.no_config {
        ConfigLoader::load_defaults()
    } else {
        ConfigLoader::load(cli.config.as_ref())
            .map_err(|e| anyhow!("Failed to load configuration: {}", e))?
    };

    if let Some(command_line) = &cli.server_command {
        config.server.set_command_line(command_line);
    }
    if let Some(region) = &cli.region {
        config.server.region = region.clone();
    }

    let issues = config.validate();
    if !issues.is_empty() {
        let messages: Vec<String> = issues.iter().map(|i| i.to_string()).collect();
        bail!("Invalid configuration: {}", messages.join("; "));
    }
    Ok(config)
}

async fn load_plan(path: &Path) -> Result<ExecutionPlan> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read plan file {}", path.display()))?;
    ExecutionPlan::from_json(&text)
        .with_context(|| format!("Failed to parse plan file {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    if cli.show_config {
        ConfigLoader::print_config_sources(cli.config.as_ref());
        return Ok(ExitCode::SUCCESS);
    }

    let config = load_config(&cli)?;
    let _log_guard = init_logging(cli.verbose, &config);

    let plan_path = cli.plan.as_ref().context("A plan file is required")?;
    let mut plan = load_plan(plan_path).await?;
    let total_steps = plan.len();
    info!(steps = total_steps, dry_run = cli.dry_run, "Loaded plan");

    // Ctrl-C cancels the run
    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling run");
            interrupt.cancel();
        }
    });

    // === Dependency Injection ===
    let client = Arc::new(McpClient::new(config.server.to_server_config()));
    if !cli.dry_run {
        client
            .start(&cancel)
            .await
            .context("Failed to start MCP server")?;
    }
    let server: Arc<dyn ToolServerPort> = client.clone();
    let lookup: Arc<dyn CloudLookupPort> = Arc::new(McpCloudLookup::new(server.clone()));
    let mapping = Arc::new(ResourceMappingStore::new());

    let journal_path = cli.journal.clone().or_else(|| {
        config
            .executor
            .journal_path
            .as_deref()
            .map(expand_path)
    });
    let logger: Arc<dyn ExecutionLogger> = match journal_path.and_then(JsonlExecutionLogger::new) {
        Some(journal) => {
            info!(path = %journal.path().display(), "Writing run journal");
            Arc::new(journal)
        }
        None => Arc::new(NoExecutionLogger),
    };

    let mut executor = PlanExecutor::new(server, client.catalog(), mapping, lookup)
        .with_params(
            config
                .executor
                .to_executor_params(config.resolution.to_id_rules()),
        )
        .with_field_priorities(config.resolution.to_field_priorities())
        .with_logger(logger)
        .with_cancellation(cancel.clone());

    // Progress reporting; JSON output keeps stdout clean
    let show_progress = !cli.quiet && cli.output != OutputFormat::Json;
    let progress_task = if show_progress {
        let (sender, receiver) = mpsc::channel(config.executor.progress_queue_capacity);
        executor = executor.with_progress(sender);
        Some(if std::io::stderr().is_terminal() {
            tokio::spawn(consume_events(receiver, ProgressReporter::new(total_steps)))
        } else {
            tokio::spawn(consume_events(receiver, SimpleProgress))
        })
    } else {
        None
    };

    let run = if cli.dry_run {
        executor.simulate(&mut plan).await
    } else {
        executor.execute(&mut plan).await
    };

    // Dropping the executor closes the progress channel
    drop(executor);
    if let Some(task) = progress_task
        && let Err(e) = task.await
    {
        warn!(error = %e, "Progress reporter stopped unexpectedly");
    }
    client.stop().await;

    println!(
        "{}",
        ConsoleFormatter::render(&run, total_steps, cli.output)
    );

    if run.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
