//! Cloud lookups
//!
//! [`McpCloudLookup`] answers the executor's read-only queries (latest
//! image, default VPC, zones, subnets, DB endpoints) by calling the tool
//! server's lookup tools.

pub mod mcp_lookup;

pub use mcp_lookup::McpCloudLookup;
