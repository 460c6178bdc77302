use rmcp::{
    ErrorData,
    handler::server::wrapper::Parameters,
    model::{CallToolResult, Content},
    schemars,
    tool,
    tool_router,
};
use serde::{Deserialize, Serialize};
use snowmcp_core::control::QualityCheck;

use crate::{SnowMcp, helpers};

/// Parameters for analyzing query performance.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct AnalyzePerformanceParams {
    /// Query to analyze.
    pub query: String,
    /// Include the EXPLAIN plan. Defaults to true.
    pub explain_plan: Option<bool>,
}

/// A data quality check to run against a table.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum QualityCheckArg {
    /// Count NULL values per column.
    NullCheck,
    /// Count fully duplicated rows.
    DuplicateCheck,
    /// Report min/max/avg for numeric columns.
    RangeCheck,
    /// Flag untrimmed or empty text values.
    FormatCheck,
}

impl From<QualityCheckArg> for QualityCheck {
    fn from(arg: QualityCheckArg) -> Self {
        match arg {
            QualityCheckArg::NullCheck => Self::NullCheck,
            QualityCheckArg::DuplicateCheck => Self::DuplicateCheck,
            QualityCheckArg::RangeCheck => Self::RangeCheck,
            QualityCheckArg::FormatCheck => Self::FormatCheck,
        }
    }
}

/// Parameters for running data quality checks.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct CheckDataQualityParams {
    pub table_name: String,
    /// Schema holding the table. Defaults to PUBLIC.
    pub schema_name: Option<String>,
    /// Checks to run. Defaults to `null_check` and `duplicate_check`.
    pub checks: Option<Vec<QualityCheckArg>>,
}

/// Parameters for computing column statistics.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct GetColumnStatsParams {
    pub table_name: String,
    pub column_name: String,
    pub database_name: Option<String>,
    pub schema_name: Option<String>,
}

#[tool_router(router = tool_router_analysis, vis = "pub")]
impl SnowMcp {
    #[tool(
        description = "Analyze a query: EXPLAIN plan plus its most recent run from query history."
    )]
    async fn analyze_performance(
        &self,
        Parameters(params): Parameters<AnalyzePerformanceParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let explain_plan = params.explain_plan.unwrap_or(true);
        let control = self.control().await?;
        let report = control
            .analyze_performance(&params.query, explain_plan)
            .await
            .map_err(helpers::map_err)?;
        Ok(CallToolResult::success(vec![Content::json(report)?]))
    }

    #[tool(
        description = "Run data quality checks (nulls, duplicates, ranges, formats) against a table."
    )]
    async fn check_data_quality(
        &self,
        Parameters(params): Parameters<CheckDataQualityParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let checks: Vec<QualityCheck> = params
            .checks
            .unwrap_or_default()
            .into_iter()
            .map(QualityCheck::from)
            .collect();
        let control = self.control().await?;
        let report = control
            .check_data_quality(&params.table_name, params.schema_name.as_deref(), &checks)
            .await
            .map_err(helpers::map_err)?;
        Ok(CallToolResult::success(vec![Content::json(report)?]))
    }

    #[tool(
        description = "Compute column statistics: counts, min/max, and numeric aggregates where applicable."
    )]
    async fn get_column_stats(
        &self,
        Parameters(params): Parameters<GetColumnStatsParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let control = self.control().await?;
        let stats = control
            .get_column_stats(
                &params.table_name,
                &params.column_name,
                params.database_name.as_deref(),
                params.schema_name.as_deref(),
            )
            .await
            .map_err(helpers::map_err)?;
        Ok(CallToolResult::success(vec![Content::json(stats)?]))
    }

    #[tool(
        description = "Summarize warehouses: state, size, credit usage, and load history."
    )]
    async fn get_warehouse_info(&self) -> Result<CallToolResult, ErrorData> {
        let control = self.control().await?;
        let info = control.get_warehouse_info().await.map_err(helpers::map_err)?;
        Ok(CallToolResult::success(vec![Content::json(info)?]))
    }
}
