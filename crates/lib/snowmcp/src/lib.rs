//! MCP server implementation for snowmcp.
//!
//! This crate wires the warehouse control plane into rmcp tool handlers and
//! exposes the MCP-facing query, metadata, and analysis surface.

mod helpers;
mod tools;
pub mod server;

use std::sync::Arc;

use rmcp::{
    ErrorData,
    ServerHandler,
    handler::server::tool::ToolRouter,
    tool,
    tool_handler,
    tool_router,
};
use rmcp::model::{CallToolResult, Content, ServerCapabilities, ServerInfo};
use snowmcp_core::control::WarehouseControlPlane;
use snowmcp_core::services::{RegistryError, SessionRegistry};

const SERVER_INSTRUCTIONS: &str = r"snowmcp provides MCP tools for working with a Snowflake warehouse.

Workflow:
1. Explore: `list_databases`, `list_schemas`, `list_tables`, `search_tables`, and
   `search_columns` locate data; `inspect_schema`, `describe_table`, `get_table_sample`,
   and `get_column_stats` drill into it.
2. Query: `execute_query` runs one or more SQL statements; each write statement runs in
   its own transaction and is rolled back on failure. `execute_batch` runs named queries
   with `depends_on` ordering and per-query outcomes.
3. Analyze: `analyze_performance` explains a query and pulls its latest run from query
   history; `check_data_quality` runs null/duplicate/range/format checks against a
   table; `get_warehouse_info` reports warehouse state, credit usage, and load.

Notes:
- Commands are split into statements on semicolons outside quotes and comments.
- Failed statements are remembered. When a failure matches a previously resolved error,
  the error response carries the known fix as `suggested_resolution`.
- `health` returns `ok`.";

/// MCP server wrapper around the session registry and tool routers.
#[derive(Clone)]
pub struct SnowMcp {
    tool_router: ToolRouter<Self>,
    registry: Arc<SessionRegistry>,
    profile: String,
}

impl SnowMcp {
    /// Creates a new server using a registry by value.
    #[must_use]
    pub fn new(registry: SessionRegistry, profile: impl Into<String>) -> Self {
        Self::with_registry(Arc::new(registry), profile)
    }

    /// Creates a new server using a shared registry handle.
    #[must_use]
    pub fn with_registry(registry: Arc<SessionRegistry>, profile: impl Into<String>) -> Self {
        let tool_router = Self::tool_router_core()
            + Self::tool_router_query()
            + Self::tool_router_metadata()
            + Self::tool_router_analysis();
        Self { tool_router, registry, profile: profile.into() }
    }

    /// Retrieves the control plane for the configured profile, building the
    /// warehouse session if needed.
    pub(crate) async fn control(&self) -> Result<WarehouseControlPlane, ErrorData> {
        let handle =
            self.registry.get_or_init(&self.profile).await.map_err(map_registry_err)?;
        Ok(handle.control())
    }
}

fn map_registry_err(err: RegistryError) -> ErrorData {
    match err {
        RegistryError::UnknownProfile(profile) => helpers::mcp_err(
            rmcp::model::ErrorCode::RESOURCE_NOT_FOUND,
            format!("unknown connection profile: {profile}"),
        ),
        RegistryError::CapacityReached { max } => helpers::mcp_err(
            rmcp::model::ErrorCode::INTERNAL_ERROR,
            format!("session registry capacity reached (max {max})"),
        ),
        RegistryError::BuildFailed(message) => helpers::mcp_err(
            rmcp::model::ErrorCode::INTERNAL_ERROR,
            format!("failed to build warehouse session: {message}"),
        ),
    }
}

#[tool_router(router = tool_router_core, vis = "pub")]
impl SnowMcp {
    #[tool(description = "Health check. Returns 'ok'.")]
    async fn health(&self) -> Result<CallToolResult, ErrorData> {
        Ok(CallToolResult::success(vec![Content::text("ok")]))
    }
}

#[tool_handler]
impl ServerHandler for SnowMcp {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(SERVER_INSTRUCTIONS.to_string()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
