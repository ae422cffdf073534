//! Field-name rules used to find identifiers inside tool results.
//!
//! Both tables are plain data with built-in defaults; the configuration
//! layer may replace or extend them.

pub mod field_priority;
pub mod id_rules;

pub use field_priority::FieldPriorities;
pub use id_rules::IdFieldRules;
