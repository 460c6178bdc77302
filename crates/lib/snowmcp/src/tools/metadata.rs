use rmcp::{
    ErrorData,
    handler::server::wrapper::Parameters,
    model::{CallToolResult, Content},
    schemars,
    tool,
    tool_router,
};
use serde::{Deserialize, Serialize};

use crate::{SnowMcp, helpers};

/// Parameters for inspecting a schema or a single table within it.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct InspectSchemaParams {
    /// Table to inspect. Omit to list all tables in the schema.
    pub table_name: Option<String>,
    /// Schema to inspect. Defaults to PUBLIC.
    pub schema_name: Option<String>,
}

/// Parameters for listing schemas.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ListSchemasParams {
    pub database_name: Option<String>,
}

/// Parameters for listing tables.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ListTablesParams {
    pub database_name: Option<String>,
    pub schema_name: Option<String>,
}

/// Parameters for describing a table.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct DescribeTableParams {
    pub table_name: String,
    pub database_name: Option<String>,
    pub schema_name: Option<String>,
}

/// Parameters for sampling rows from a table.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct GetTableSampleParams {
    pub table_name: String,
    pub database_name: Option<String>,
    pub schema_name: Option<String>,
    /// Row cap for the sample. Defaults to 10, capped at 100.
    pub limit: Option<u32>,
}

/// Parameters for searching tables by name or comment.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct SearchTablesParams {
    pub search_term: String,
    pub database_name: Option<String>,
}

/// Parameters for searching columns by name or comment.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct SearchColumnsParams {
    pub search_term: String,
    pub database_name: Option<String>,
}

#[tool_router(router = tool_router_metadata, vis = "pub")]
impl SnowMcp {
    #[tool(
        description = "Inspect a schema: list its tables, or the columns of one table."
    )]
    async fn inspect_schema(
        &self,
        Parameters(params): Parameters<InspectSchemaParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let control = self.control().await?;
        let report = control
            .inspect_schema(params.schema_name.as_deref(), params.table_name.as_deref())
            .await
            .map_err(helpers::map_err)?;
        Ok(CallToolResult::success(vec![Content::json(report)?]))
    }

    #[tool(description = "List databases visible to the current role.")]
    async fn list_databases(&self) -> Result<CallToolResult, ErrorData> {
        let control = self.control().await?;
        let databases = control.list_databases().await.map_err(helpers::map_err)?;
        Ok(CallToolResult::success(vec![Content::json(databases)?]))
    }

    #[tool(description = "List schemas, optionally scoped to a database.")]
    async fn list_schemas(
        &self,
        Parameters(params): Parameters<ListSchemasParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let control = self.control().await?;
        let schemas = control
            .list_schemas(params.database_name.as_deref())
            .await
            .map_err(helpers::map_err)?;
        Ok(CallToolResult::success(vec![Content::json(schemas)?]))
    }

    #[tool(description = "List tables, optionally scoped to a database and schema.")]
    async fn list_tables(
        &self,
        Parameters(params): Parameters<ListTablesParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let control = self.control().await?;
        let tables = control
            .list_tables(params.database_name.as_deref(), params.schema_name.as_deref())
            .await
            .map_err(helpers::map_err)?;
        Ok(CallToolResult::success(vec![Content::json(tables)?]))
    }

    #[tool(
        description = "Describe a table: row count, size, clustering, and full column detail."
    )]
    async fn describe_table(
        &self,
        Parameters(params): Parameters<DescribeTableParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let control = self.control().await?;
        let description = control
            .describe_table(
                &params.table_name,
                params.database_name.as_deref(),
                params.schema_name.as_deref(),
            )
            .await
            .map_err(helpers::map_err)?;
        Ok(CallToolResult::success(vec![Content::json(description)?]))
    }

    #[tool(description = "Fetch a small sample of rows from a table.")]
    async fn get_table_sample(
        &self,
        Parameters(params): Parameters<GetTableSampleParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let control = self.control().await?;
        let sample = control
            .get_table_sample(
                &params.table_name,
                params.database_name.as_deref(),
                params.schema_name.as_deref(),
                params.limit,
            )
            .await
            .map_err(helpers::map_err)?;
        Ok(CallToolResult::success(vec![Content::json(sample)?]))
    }

    #[tool(description = "Search tables by name or comment fragment.")]
    async fn search_tables(
        &self,
        Parameters(params): Parameters<SearchTablesParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let control = self.control().await?;
        let matches = control
            .search_tables(&params.search_term, params.database_name.as_deref())
            .await
            .map_err(helpers::map_err)?;
        Ok(CallToolResult::success(vec![Content::json(matches)?]))
    }

    #[tool(description = "Search columns by name or comment fragment.")]
    async fn search_columns(
        &self,
        Parameters(params): Parameters<SearchColumnsParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let control = self.control().await?;
        let matches = control
            .search_columns(&params.search_term, params.database_name.as_deref())
            .await
            .map_err(helpers::map_err)?;
        Ok(CallToolResult::success(vec![Content::json(matches)?]))
    }
}
