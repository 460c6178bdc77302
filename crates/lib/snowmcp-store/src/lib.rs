//! Flat-file error resolution log for Snowflake MCP services.
//!
//! Stores every distinct error message seen by the query tools together with
//! the fixes that worked for it, so later failures can surface a known-good
//! resolution immediately.

pub mod models;
pub mod signature;
pub mod store;

pub use models::{ErrorKind, ErrorRecord, Resolution};
pub use signature::error_signature;
pub use store::{ErrorLogStore, LogEntry, StoreError, StoreResult};
