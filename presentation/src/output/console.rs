//! Console output formatter for execution runs

use crate::cli::commands::OutputFormat;
use colored::Colorize;
use infra_agent_domain::{ExecutionRun, StepOutcome, StepStatus};

/// Formats execution runs for console display
pub struct ConsoleFormatter;

impl ConsoleFormatter {
    pub fn render(run: &ExecutionRun, total_steps: usize, format: OutputFormat) -> String {
        match format {
            OutputFormat::Full => Self::format(run, total_steps),
            OutputFormat::Json => Self::format_json(run),
            OutputFormat::Summary => Self::format_summary(run, total_steps),
        }
    }

    /// Format the complete run
    pub fn format(run: &ExecutionRun, total_steps: usize) -> String {
        let mut output = String::new();

        let title = if run.simulated {
            "Dry Run Results"
        } else {
            "Execution Results"
        };
        output.push_str(&Self::header(title));
        output.push('\n');

        if let Some(name) = &run.plan_name {
            output.push_str(&format!("{} {}\n", "Plan:".cyan().bold(), name));
        }
        output.push_str(&format!("{} {}\n", "Run:".cyan().bold(), run.id));

        output.push_str(&Self::section_header("Steps"));
        for step in &run.steps {
            output.push_str(&Self::format_step(step));
        }

        if !run.errors.is_empty() {
            output.push_str(&Self::section_header("Errors"));
            for error in &run.errors {
                output.push_str(&format!("  * {}\n", error.red()));
            }
        }

        output.push('\n');
        output.push_str(&Self::status_line(run, total_steps));
        output.push_str(&Self::footer());
        output
    }

    /// Format as JSON
    pub fn format_json(run: &ExecutionRun) -> String {
        serde_json::to_string_pretty(run).unwrap_or_else(|_| "{}".to_string())
    }

    /// Status line plus errors (concise output)
    pub fn format_summary(run: &ExecutionRun, total_steps: usize) -> String {
        let mut output = Self::status_line(run, total_steps);
        for error in &run.errors {
            output.push_str(&format!("  {}\n", error));
        }
        output
    }

    fn format_step(step: &StepOutcome) -> String {
        let marker = match step.status {
            StepStatus::Completed => "v".green(),
            StepStatus::Failed => "x".red(),
            _ => "-".dimmed(),
        };
        let name = if step.name.is_empty() {
            &step.step_id
        } else {
            &step.name
        };
        let mut line = format!(
            "\n{} {} {} {}\n",
            marker,
            format!("[{}]", step.action.as_str()).yellow(),
            name.bold(),
            format!("({} ms)", step.duration_ms).dimmed()
        );

        if !step.resource_id.is_empty() && step.resource_id != step.step_id {
            line.push_str(&format!("    resource: {}\n", step.resource_id));
        }
        if let Some(error) = &step.error {
            line.push_str(&format!("    {} {}\n", "error:".red(), error));
        }
        if let Some(output) = &step.output {
            let pretty =
                serde_json::to_string_pretty(output).unwrap_or_else(|_| output.to_string());
            line.push_str(&Self::indent(&pretty, "    "));
            line.push('\n');
        }
        line
    }

    fn status_line(run: &ExecutionRun, total_steps: usize) -> String {
        let status = if run.is_success() {
            run.status.as_str().green().bold()
        } else {
            run.status.as_str().red().bold()
        };
        let mode = if run.simulated { " (dry run)" } else { "" };
        format!(
            "{}{}: {} of {} steps completed\n",
            status,
            mode,
            run.completed_steps(),
            total_steps
        )
    }

    fn header(title: &str) -> String {
        let line = "=".repeat(60);
        format!("{}\n{:^60}\n{}", line.cyan(), title.bold(), line.cyan())
    }

    fn section_header(title: &str) -> String {
        format!("\n{}\n{}\n", title.cyan().bold(), "-".repeat(40))
    }

    fn footer() -> String {
        format!("{}\n", "=".repeat(60).cyan())
    }

    /// Indent a multi-line string
    pub fn indent(text: &str, prefix: &str) -> String {
        text.lines()
            .map(|line| format!("{}{}", prefix, line))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
