//! Port for the structured run journal.
//!
//! Records every [`ExecutionEvent`] to a machine-readable log (JSONL). This
//! is separate from `tracing`-based diagnostics.

use infra_agent_domain::ExecutionEvent;

/// Port for journaling execution events.
///
/// `log` is synchronous and non-fallible: a journal failure must never
/// disturb the run.
pub trait ExecutionLogger: Send + Sync {
    fn log(&self, event: &ExecutionEvent);
}

/// No-op implementation for tests and when journaling is disabled.
pub struct NoExecutionLogger;

impl ExecutionLogger for NoExecutionLogger {
    fn log(&self, _event: &ExecutionEvent) {}
}
