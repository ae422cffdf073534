//! Progress reporting for plan execution
//!
//! The executor publishes [`ExecutionEvent`]s on a bounded channel;
//! [`consume_events`] drains it into a [`ProgressView`] until the sender
//! side is dropped.

use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use infra_agent_domain::{ExecutionEvent, ExecutionEventKind};
use tokio::sync::mpsc;

/// Renders execution events.
pub trait ProgressView: Send {
    fn on_event(&self, event: &ExecutionEvent);
}

/// Drain `receiver` into `view`. Returns the number of events seen.
pub async fn consume_events(
    mut receiver: mpsc::Receiver<ExecutionEvent>,
    view: impl ProgressView,
) -> usize {
    let mut seen = 0;
    while let Some(event) = receiver.recv().await {
        view.on_event(&event);
        seen += 1;
    }
    seen
}

/// Reports progress with an indicatif bar over the plan's steps
pub struct ProgressReporter {
    bar: ProgressBar,
    total: u64,
}

impl ProgressReporter {
    pub fn new(total_steps: usize) -> Self {
        let bar = ProgressBar::new(total_steps as u64);
        bar.set_style(Self::bar_style());
        bar.set_prefix("Plan");
        Self {
            bar,
            total: total_steps as u64,
        }
    }

    /// A reporter that draws nothing (tests, non-terminals).
    pub fn hidden(total_steps: usize) -> Self {
        let reporter = Self::new(total_steps);
        reporter
            .bar
            .set_draw_target(indicatif::ProgressDrawTarget::hidden());
        reporter
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::with_template(
            "{spinner:.green} {prefix:.bold.cyan} [{bar:40.cyan/blue}] {pos}/{len} {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-")
    }

    pub fn position(&self) -> u64 {
        self.bar.position()
    }
}

impl ProgressView for ProgressReporter {
    fn on_event(&self, event: &ExecutionEvent) {
        match event.kind {
            ExecutionEventKind::ExecutionStarted | ExecutionEventKind::StepStarted => {
                self.bar.set_message(event.message.clone());
            }
            ExecutionEventKind::StepProgress => {
                if let Some(fraction) = event.progress {
                    self.bar
                        .set_position((fraction * self.total as f64).round() as u64);
                }
            }
            ExecutionEventKind::StepCompleted => {
                self.bar
                    .println(format!("  {} {}", "v".green(), event.message));
            }
            ExecutionEventKind::StepFailed => {
                self.bar.println(format!(
                    "  {} {}: {}",
                    "x".red(),
                    event.step_id.as_deref().unwrap_or("step"),
                    event.error.as_deref().unwrap_or(&event.message)
                ));
            }
            ExecutionEventKind::ExecutionCompleted => {
                let message = if event.error.is_some() {
                    event.message.red().to_string()
                } else {
                    event.message.green().to_string()
                };
                self.bar.finish_with_message(message);
            }
        }
    }
}

/// Simple text-based progress (no fancy UI)
pub struct SimpleProgress;

impl ProgressView for SimpleProgress {
    fn on_event(&self, event: &ExecutionEvent) {
        match event.kind {
            ExecutionEventKind::ExecutionStarted => {
                println!("{} {}", "->".cyan(), event.message.bold());
            }
            ExecutionEventKind::StepStarted | ExecutionEventKind::StepProgress => {}
            ExecutionEventKind::StepCompleted => {
                println!("  {} {}", "v".green(), event.message);
            }
            ExecutionEventKind::StepFailed => {
                println!(
                    "  {} {} (failed: {})",
                    "x".red(),
                    event.message,
                    event.error.as_deref().unwrap_or("unknown error")
                );
            }
            ExecutionEventKind::ExecutionCompleted => {
                println!("{}", event.message);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: ExecutionEventKind) -> ExecutionEvent {
        ExecutionEvent::new(kind, "run-1", kind.as_str())
    }

    #[tokio::test]
    async fn test_consume_until_sender_dropped() {
        let (tx, rx) = mpsc::channel(8);
        tx.send(event(ExecutionEventKind::ExecutionStarted))
            .await
            .unwrap();
        tx.send(event(ExecutionEventKind::StepStarted).with_step("a"))
            .await
            .unwrap();
        drop(tx);

        let seen = consume_events(rx, ProgressReporter::hidden(1)).await;
        assert_eq!(seen, 2);
    }

    #[test]
    fn test_progress_sets_position() {
        let reporter = ProgressReporter::hidden(4);
        reporter.on_event(&event(ExecutionEventKind::StepProgress).with_progress(3, 4));
        assert_eq!(reporter.position(), 3);

        reporter.on_event(
            &event(ExecutionEventKind::StepFailed)
                .with_step("b")
                .with_error("boom"),
        );
        reporter.on_event(&event(ExecutionEventKind::ExecutionCompleted).with_error("boom"));
        assert_eq!(reporter.position(), 3);
    }
}
