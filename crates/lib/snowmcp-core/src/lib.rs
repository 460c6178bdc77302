//! Core types and services for snowmcp.
//!
//! This crate owns the Snowflake SQL REST API client, the statement
//! splitting and identifier hygiene helpers, the control-plane operations
//! the MCP tools are built from, and the session registry that shares
//! authenticated warehouses across requests.

pub mod control;
pub mod services;
pub mod statement;
pub mod warehouse;
