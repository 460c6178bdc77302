//! MCP tool modules.
//!
//! Tools are grouped by domain: query execution, catalog metadata lookup, and
//! performance/quality analysis.

pub mod analysis;
pub mod metadata;
pub mod query;
