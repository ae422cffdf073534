//! Application-level configuration.
//!
//! - [`ExecutorParams`]: plan executor control (dry-run delay, progress timeouts, persistence)
//! - [`ReadinessParams`]: readiness polling after slow-to-provision resources

pub mod executor_params;

pub use executor_params::{ExecutorParams, ReadinessParams};
