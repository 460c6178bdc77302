use rmcp::{
    ErrorData,
    handler::server::wrapper::Parameters,
    model::{CallToolResult, Content},
    schemars,
    tool,
    tool_router,
};
use serde::{Deserialize, Serialize};
use snowmcp_core::control::BatchQuery;

use crate::{SnowMcp, helpers};

/// Parameters for executing one or more SQL statements.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ExecuteQueryParams {
    /// SQL text. Multiple statements are split on semicolons outside quotes
    /// and comments; write statements run in their own transactions.
    pub query: String,
}

/// A named query inside a batch request.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct BatchQueryArg {
    /// Unique name for this query within the batch.
    pub name: String,
    /// SQL text to execute.
    pub query: String,
    /// Names of batch queries that must complete successfully first.
    pub depends_on: Option<Vec<String>>,
}

impl From<BatchQueryArg> for BatchQuery {
    fn from(arg: BatchQueryArg) -> Self {
        Self {
            name: arg.name,
            query: arg.query,
            depends_on: arg.depends_on.unwrap_or_default(),
        }
    }
}

/// Parameters for executing a dependency-ordered batch of queries.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ExecuteBatchParams {
    pub queries: Vec<BatchQueryArg>,
    /// Stop at the first failed query instead of continuing with the
    /// remaining independent ones. Defaults to true.
    pub stop_on_error: Option<bool>,
}

#[tool_router(router = tool_router_query, vis = "pub")]
impl SnowMcp {
    #[tool(
        description = "Execute SQL against the warehouse. Splits multi-statement input; writes run transactionally with rollback on failure."
    )]
    async fn execute_query(
        &self,
        Parameters(params): Parameters<ExecuteQueryParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let control = self.control().await?;
        let report = control
            .execute_query(&params.query)
            .await
            .map_err(helpers::map_err)?;
        Ok(CallToolResult::success(vec![Content::json(report)?]))
    }

    #[tool(
        description = "Execute a batch of named queries with optional depends_on ordering. Returns per-query outcomes and a summary."
    )]
    async fn execute_batch(
        &self,
        Parameters(params): Parameters<ExecuteBatchParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let stop_on_error = params.stop_on_error.unwrap_or(true);
        let queries: Vec<BatchQuery> =
            params.queries.into_iter().map(BatchQuery::from).collect();
        let control = self.control().await?;
        let report = control
            .execute_batch(&queries, stop_on_error)
            .await
            .map_err(helpers::map_err)?;
        Ok(CallToolResult::success(vec![Content::json(report)?]))
    }
}
