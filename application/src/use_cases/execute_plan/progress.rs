//! Progress publishing.
//!
//! Events go to the run journal and, when a consumer is attached, onto a
//! bounded channel. A send that cannot complete within its timeout drops
//! the event with a warning instead of stalling the run.

use crate::ports::execution_logger::ExecutionLogger;
use infra_agent_domain::{ExecutionEvent, ExecutionEventKind, ExecutionRun, PlanStep};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::SendTimeoutError};
use tracing::{debug, warn};

pub(super) struct ProgressPublisher<'a> {
    execution_id: String,
    sender: Option<&'a mpsc::Sender<ExecutionEvent>>,
    logger: &'a dyn ExecutionLogger,
    initial_timeout: Duration,
    timeout: Duration,
}

impl<'a> ProgressPublisher<'a> {
    pub(super) fn new(
        execution_id: impl Into<String>,
        sender: Option<&'a mpsc::Sender<ExecutionEvent>>,
        logger: &'a dyn ExecutionLogger,
        initial_timeout: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            execution_id: execution_id.into(),
            sender,
            logger,
            initial_timeout,
            timeout,
        }
    }

    fn event(&self, kind: ExecutionEventKind, message: impl Into<String>) -> ExecutionEvent {
        ExecutionEvent::new(kind, self.execution_id.clone(), message)
    }

    async fn publish(&self, event: ExecutionEvent, timeout: Duration) {
        self.logger.log(&event);
        let Some(sender) = self.sender else {
            return;
        };
        let kind = event.kind;
        match sender.send_timeout(event, timeout).await {
            Ok(()) => {}
            Err(SendTimeoutError::Timeout(_)) => {
                warn!(event = %kind, timeout = ?timeout, "Progress queue full, dropping event");
            }
            Err(SendTimeoutError::Closed(_)) => {
                debug!(event = %kind, "Progress receiver closed, dropping event");
            }
        }
    }

    pub(super) async fn execution_started(&self, total: usize, simulated: bool) {
        let message = if simulated {
            format!("Starting dry run of {} steps", total)
        } else {
            format!("Starting execution of {} steps", total)
        };
        let event = self
            .event(ExecutionEventKind::ExecutionStarted, message)
            .with_progress(0, total);
        self.publish(event, self.initial_timeout).await;
    }

    pub(super) async fn step_started(&self, step: &PlanStep) {
        let event = self
            .event(
                ExecutionEventKind::StepStarted,
                format!("{} {}", step.action.progress_verb(), step.display_name()),
            )
            .with_step(&step.id);
        self.publish(event, self.timeout).await;
    }

    pub(super) async fn step_completed(&self, step: &PlanStep) {
        let event = self
            .event(
                ExecutionEventKind::StepCompleted,
                format!("Completed {}", step.display_name()),
            )
            .with_step(&step.id);
        self.publish(event, self.timeout).await;
    }

    pub(super) async fn step_progress(&self, step: &PlanStep, completed: usize, total: usize) {
        let event = self
            .event(
                ExecutionEventKind::StepProgress,
                format!("{} of {} steps completed", completed, total),
            )
            .with_step(&step.id)
            .with_progress(completed, total);
        self.publish(event, self.timeout).await;
    }

    pub(super) async fn step_failed(&self, step: &PlanStep, error: &str) {
        let event = self
            .event(
                ExecutionEventKind::StepFailed,
                format!("Failed {}", step.display_name()),
            )
            .with_step(&step.id)
            .with_error(error);
        self.publish(event, self.timeout).await;
    }

    pub(super) async fn execution_completed(&self, run: &ExecutionRun) {
        let mut event = self.event(
            ExecutionEventKind::ExecutionCompleted,
            format!(
                "Execution {}: {} of {} steps completed",
                run.status,
                run.completed_steps(),
                run.steps.len()
            ),
        );
        if let Some(error) = run.errors.first() {
            event = event.with_error(error.clone());
        }
        self.publish(event, self.timeout).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::execution_logger::NoExecutionLogger;
    use infra_agent_domain::StepAction;
    use std::sync::Mutex;

    struct RecordingLogger(Mutex<Vec<ExecutionEventKind>>);

    impl ExecutionLogger for RecordingLogger {
        fn log(&self, event: &ExecutionEvent) {
            self.0.lock().unwrap().push(event.kind);
        }
    }

    #[tokio::test]
    async fn test_events_reach_channel_and_journal() {
        let (tx, mut rx) = mpsc::channel(8);
        let logger = RecordingLogger(Mutex::new(Vec::new()));
        let publisher = ProgressPublisher::new(
            "run-1",
            Some(&tx),
            &logger,
            Duration::from_millis(50),
            Duration::from_millis(50),
        );
        let step = PlanStep::new("s1", StepAction::Create).with_name("Create VPC");

        publisher.execution_started(1, false).await;
        publisher.step_started(&step).await;

        let first = rx.recv().await.unwrap();
        assert_eq!(first.kind, ExecutionEventKind::ExecutionStarted);
        assert_eq!(first.execution_id, "run-1");
        let second = rx.recv().await.unwrap();
        assert_eq!(second.message, "Creating Create VPC");
        assert_eq!(second.step_id.as_deref(), Some("s1"));
        assert_eq!(logger.0.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_queue_drops_after_timeout() {
        let (tx, mut rx) = mpsc::channel(1);
        let publisher = ProgressPublisher::new(
            "run-1",
            Some(&tx),
            &NoExecutionLogger,
            Duration::from_secs(5),
            Duration::from_secs(2),
        );
        let step = PlanStep::new("s1", StepAction::Validate);

        publisher.step_started(&step).await;
        // Queue is full; this one times out and is dropped.
        publisher.step_completed(&step).await;

        assert_eq!(rx.recv().await.unwrap().kind, ExecutionEventKind::StepStarted);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_closed_receiver_is_ignored() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let publisher = ProgressPublisher::new(
            "run-1",
            Some(&tx),
            &NoExecutionLogger,
            Duration::from_millis(10),
            Duration::from_millis(10),
        );
        publisher.execution_started(0, true).await;
    }
}
