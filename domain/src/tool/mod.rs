//! Tool domain module
//!
//! Describes what the external tool server can do and what it returns.
//!
//! ```text
//! ┌──────────────┐    ┌────────────────┐    ┌──────────────┐
//! │ tools/list   │───▶│ ToolCatalog    │───▶│ PlanExecutor │
//! │ (discovery)  │    │ (by name)      │    │ (dispatch)   │
//! └──────────────┘    └────────────────┘    └──────┬───────┘
//!                                                  │
//!                                           ToolOutput (decoded result)
//! ```
//!
//! # Key Types
//!
//! - [`ToolDescriptor`]: name, description and JSON input schema of one tool
//! - [`ResourceDescriptor`]: a resource advertised via `resources/list`
//! - [`ToolCatalog`]: thread-safe registry, replaced wholesale on every discovery
//! - [`ToolOutput`]: the structured result of a tool call, with field extraction helpers

pub mod catalog;
pub mod entities;
pub mod value_objects;

pub use catalog::ToolCatalog;
pub use entities::{ResourceDescriptor, ToolDescriptor};
pub use value_objects::ToolOutput;
