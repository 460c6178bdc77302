//! MCP server implementation for the error resolution log.
//!
//! Exposes the shared [`ErrorLogStore`] over MCP so agents can record which
//! fixes worked for which Snowflake errors and look them up later.

pub mod server;

use rmcp::{
    ErrorData,
    ServerHandler,
    handler::server::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    schemars,
    tool,
    tool_handler,
    tool_router,
};
use serde::{Deserialize, Serialize};
use snowmcp_store::{ErrorKind, ErrorLogStore, LogEntry, StoreError};

const SERVER_INSTRUCTIONS: &str = r"snowmcp-errlog records how Snowflake errors were resolved.

Workflow:
1. When a query fails, call `get_best_resolution` (or `get_resolutions` for the full
   list) with the error message to see what worked before.
2. After attempting a fix, call `log_error` with the error message, the resolution you
   tried, and whether it worked. Failed attempts should carry a `note` explaining what
   happened.
3. `get_error_type` classifies a known error; `get_all_errors` dumps the whole log.

Error messages are matched by normalized signature, so small differences in
identifiers or line numbers still hit the same record.";

/// MCP server wrapper around the error log store.
#[derive(Clone)]
pub struct ErrorLogMcp {
    tool_router: ToolRouter<Self>,
    store: ErrorLogStore,
}

impl ErrorLogMcp {
    #[must_use]
    pub fn new(store: ErrorLogStore) -> Self {
        Self {
            tool_router: Self::tool_router_errlog(),
            store,
        }
    }
}

fn map_store_err(err: StoreError) -> ErrorData {
    let (code, message) = match err {
        StoreError::InvalidInput(reason) => (
            rmcp::model::ErrorCode::INVALID_PARAMS,
            format!("Invalid input: {reason}"),
        ),
        StoreError::Io(io_err) => (
            rmcp::model::ErrorCode::INTERNAL_ERROR,
            format!("Error log I/O error: {io_err}"),
        ),
        StoreError::Serialize(json_err) => (
            rmcp::model::ErrorCode::INTERNAL_ERROR,
            format!("Error log serialization error: {json_err}"),
        ),
    };
    ErrorData {
        code,
        message: message.into(),
        data: None,
    }
}

/// Parameters for recording a resolution attempt.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct LogErrorParams {
    /// The error message the resolution applies to.
    pub error_message: String,
    /// What was done to resolve the error.
    pub resolution: String,
    /// Whether the resolution worked.
    pub success: bool,
    /// Context for a failed attempt.
    pub note: Option<String>,
    /// Classification label: error, warning, info, logical, or failure.
    /// Defaults to error; unrecognized labels become other.
    pub error_type: Option<String>,
    /// The query that produced the error, if any.
    pub query: Option<String>,
}

/// Parameters for looking up a recorded error message.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct LookupErrorParams {
    pub error_message: String,
}

#[tool_router(router = tool_router_errlog, vis = "pub")]
impl ErrorLogMcp {
    #[tool(
        description = "Record a resolution attempt for an error. Returns the updated record with resolutions ranked by success count."
    )]
    async fn log_error(
        &self,
        Parameters(params): Parameters<LogErrorParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let error_type = params
            .error_type
            .as_deref()
            .map_or(ErrorKind::Error, ErrorKind::from_label);
        let record = self
            .store
            .log_error(LogEntry {
                error_message: params.error_message,
                resolution: params.resolution,
                success: params.success,
                note: params.note,
                error_type,
                query: params.query,
            })
            .await
            .map_err(map_store_err)?;
        Ok(CallToolResult::success(vec![Content::json(record)?]))
    }

    #[tool(description = "List every recorded resolution for an error, best first.")]
    async fn get_resolutions(
        &self,
        Parameters(params): Parameters<LookupErrorParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let resolutions = self.store.resolutions_for(&params.error_message).await;
        Ok(CallToolResult::success(vec![Content::json(resolutions)?]))
    }

    #[tool(
        description = "Fetch the most proven resolution for an error, or null when nothing is recorded."
    )]
    async fn get_best_resolution(
        &self,
        Parameters(params): Parameters<LookupErrorParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let best = self.store.best_resolution_for(&params.error_message).await;
        Ok(CallToolResult::success(vec![Content::json(best)?]))
    }

    #[tool(
        description = "Fetch the recorded classification for an error, or null when unknown."
    )]
    async fn get_error_type(
        &self,
        Parameters(params): Parameters<LookupErrorParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let kind = self.store.error_type_for(&params.error_message).await;
        Ok(CallToolResult::success(vec![Content::json(kind)?]))
    }

    #[tool(description = "Dump the whole error log keyed by error signature.")]
    async fn get_all_errors(&self) -> Result<CallToolResult, ErrorData> {
        let errors = self.store.all_errors().await;
        Ok(CallToolResult::success(vec![Content::json(errors)?]))
    }

    #[tool(description = "Health check. Returns 'ok'.")]
    async fn health(&self) -> Result<CallToolResult, ErrorData> {
        Ok(CallToolResult::success(vec![Content::text("ok")]))
    }
}

#[tool_handler]
impl ServerHandler for ErrorLogMcp {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(SERVER_INSTRUCTIONS.to_string()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
