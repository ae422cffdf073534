//! Logging infrastructure: the JSONL run journal.
//!
//! Provides [`JsonlExecutionLogger`], which implements the
//! [`ExecutionLogger`](infra_agent_application::ExecutionLogger) port.

mod jsonl_logger;

pub use jsonl_logger::JsonlExecutionLogger;
