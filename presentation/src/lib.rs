//! Presentation layer for infra-agent
//!
//! This crate contains the CLI definition, the run report formatter and
//! the progress reporters.

pub mod cli;
pub mod output;
pub mod progress;

// Re-export commonly used types
pub use cli::commands::{Cli, OutputFormat};
pub use output::console::ConsoleFormatter;
pub use progress::reporter::{ProgressReporter, ProgressView, SimpleProgress, consume_events};
