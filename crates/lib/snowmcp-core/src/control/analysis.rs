//! Query performance, data quality, column statistics, and warehouse usage.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::debug;

use super::{ControlError, ControlResult, DEFAULT_SCHEMA, WarehouseControlPlane};
use crate::statement::{ensure_ident, qualified_name, quote_column, quote_literal};

/// One of the checks [`WarehouseControlPlane::check_data_quality`] can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityCheck {
    NullCheck,
    DuplicateCheck,
    RangeCheck,
    FormatCheck,
}

impl QualityCheck {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NullCheck => "null_check",
            Self::DuplicateCheck => "duplicate_check",
            Self::RangeCheck => "range_check",
            Self::FormatCheck => "format_check",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QualityFinding {
    pub check: QualityCheck,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DataQualityReport {
    pub table_name: String,
    pub schema_name: String,
    pub findings: Vec<QualityFinding>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceReport {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explain_plan: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recent_metrics: Option<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ColumnStatsReport {
    pub table_name: String,
    pub column_name: String,
    pub basic_stats: Value,
    pub numeric_stats: Value,
}

/// Metering totals for one warehouse over the last 30 days.
///
/// The uppercase aliases match the column names the result set comes back
/// with.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WarehouseUsageStats {
    #[serde(default, alias = "TOTAL_CREDITS_USED")]
    pub total_credits_used: f64,
    #[serde(default, alias = "COMPUTE_CREDITS_USED")]
    pub compute_credits_used: f64,
    #[serde(default, alias = "CLOUD_SERVICES_CREDITS_USED")]
    pub cloud_services_credits_used: f64,
    #[serde(default, alias = "ACTIVE_DAYS")]
    pub active_days: u64,
    #[serde(default, alias = "LAST_USED")]
    pub last_used: Option<String>,
    #[serde(default, alias = "AVG_CREDITS_PER_HOUR")]
    pub avg_credits_per_hour: f64,
}

/// Load averages for one warehouse over the last 7 days.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WarehouseLoadStats {
    #[serde(default, alias = "AVG_RUNNING_QUERIES")]
    pub avg_running_queries: f64,
    #[serde(default, alias = "AVG_QUEUED_LOAD")]
    pub avg_queued_load: f64,
    #[serde(default, alias = "AVG_QUEUED_PROVISIONING")]
    pub avg_queued_provisioning: f64,
    #[serde(default, alias = "AVG_BLOCKED_QUERIES")]
    pub avg_blocked_queries: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisPeriod {
    pub usage_stats: String,
    pub load_stats: String,
}

impl Default for AnalysisPeriod {
    fn default() -> Self {
        Self { usage_stats: "Last 30 days".to_string(), load_stats: "Last 7 days".to_string() }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WarehouseSummary {
    pub total_warehouses: usize,
    pub active_warehouses: usize,
    pub suspended_warehouses: usize,
    pub total_credits_last_30_days: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_warehouse: Option<String>,
    pub analysis_period: AnalysisPeriod,
}

#[derive(Debug, Clone, Serialize)]
pub struct WarehouseInfoReport {
    pub warehouses: Vec<Value>,
    pub summary: WarehouseSummary,
}

impl WarehouseControlPlane {
    /// Explains a query and looks up its most recent run in query history.
    ///
    /// The history lookup matches on the first 100 characters of the query
    /// and degrades to a warning when history is not accessible.
    ///
    /// # Errors
    /// Returns an error for a blank query or a failed `EXPLAIN`. Failed
    /// explains are recorded in the error log.
    pub async fn analyze_performance(
        &self,
        query: &str,
        explain_plan: bool,
    ) -> ControlResult<PerformanceReport> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ControlError::InvalidInput("query must not be empty".to_string()));
        }
        let mut warnings = Vec::new();

        let explain: Option<Vec<Value>> = if explain_plan {
            let statement = format!("EXPLAIN {query}");
            match self.client.query_rows(&statement).await {
                Ok(rows) => Some(rows.into_iter().map(Value::Object).collect()),
                Err(err) => return Err(self.note_failure(&statement, err).await),
            }
        } else {
            None
        };

        let needle: String = query.chars().take(100).collect::<String>().replace('\'', "''");
        let history_sql = format!(
            "SELECT QUERY_TEXT, EXECUTION_TIME, COMPILATION_TIME, BYTES_SCANNED \
             FROM TABLE(INFORMATION_SCHEMA.QUERY_HISTORY()) \
             WHERE QUERY_TEXT LIKE '%{needle}%' \
             ORDER BY START_TIME DESC LIMIT 1"
        );
        let recent_metrics = match self.client.query_rows(&history_sql).await {
            Ok(mut rows) if !rows.is_empty() => Some(Value::Object(rows.swap_remove(0))),
            Ok(_) => None,
            Err(err) => {
                warnings.push(format!("query history unavailable: {err}"));
                None
            }
        };

        Ok(PerformanceReport {
            query: query.to_string(),
            explain_plan: explain,
            recent_metrics,
            warnings,
        })
    }

    /// Runs the requested quality checks against one table.
    ///
    /// Defaults to the null and duplicate checks when `checks` is empty.
    /// Each check reports its own result or error, so one broken check does
    /// not hide the rest.
    ///
    /// # Errors
    /// Returns an error for invalid names or when the table has no columns
    /// in the catalog.
    pub async fn check_data_quality(
        &self,
        table: &str,
        schema: Option<&str>,
        checks: &[QualityCheck],
    ) -> ControlResult<DataQualityReport> {
        let table = ensure_ident(table)?.to_uppercase();
        let schema = ensure_ident(schema.unwrap_or(DEFAULT_SCHEMA))?.to_uppercase();
        let target = format!("{schema}.{table}");
        let columns = self.column_catalog(&schema, &table).await?;

        let selected: &[QualityCheck] = if checks.is_empty() {
            &[QualityCheck::NullCheck, QualityCheck::DuplicateCheck]
        } else {
            checks
        };
        let mut findings = Vec::with_capacity(selected.len());
        for &check in selected {
            let result = match check {
                QualityCheck::NullCheck => self.null_check(&target, &columns).await,
                QualityCheck::DuplicateCheck => self.duplicate_check(&target).await,
                QualityCheck::RangeCheck => self.range_check(&target, &columns).await,
                QualityCheck::FormatCheck => self.format_check(&target, &columns).await,
            };
            let finding = match result {
                Ok(details) => QualityFinding { check, details: Some(details), error: None },
                Err(err) => QualityFinding { check, details: None, error: Some(err.to_string()) },
            };
            findings.push(finding);
        }
        Ok(DataQualityReport { table_name: table, schema_name: schema, findings })
    }

    /// Count, distinct, and extremum statistics for one column, with
    /// averages and spread where the column is numeric.
    ///
    /// # Errors
    /// Returns an error for invalid names or a failed statement. The
    /// numeric aggregates come back empty for non-numeric columns instead
    /// of failing.
    pub async fn get_column_stats(
        &self,
        table: &str,
        column: &str,
        database: Option<&str>,
        schema: Option<&str>,
    ) -> ControlResult<ColumnStatsReport> {
        let qualified = qualified_name(database, schema, table)?;
        let column = ensure_ident(column)?;

        let basic_sql = format!(
            "SELECT COUNT(*) AS TOTAL_COUNT, COUNT({column}) AS NON_NULL_COUNT, \
             COUNT(*) - COUNT({column}) AS NULL_COUNT, \
             COUNT(DISTINCT {column}) AS DISTINCT_COUNT, \
             MIN({column}) AS MIN_VALUE, MAX({column}) AS MAX_VALUE \
             FROM {qualified}"
        );
        let mut basic_rows = self.client.query_rows(&basic_sql).await?;
        let basic_stats = if basic_rows.is_empty() {
            empty_object()
        } else {
            Value::Object(basic_rows.swap_remove(0))
        };

        let numeric_sql = format!(
            "SELECT AVG({column}) AS AVG_VALUE, STDDEV({column}) AS STDDEV_VALUE, \
             MEDIAN({column}) AS MEDIAN_VALUE FROM {qualified} WHERE {column} IS NOT NULL"
        );
        let numeric_stats = match self.client.query_rows(&numeric_sql).await {
            Ok(mut rows) if !rows.is_empty() => Value::Object(rows.swap_remove(0)),
            _ => empty_object(),
        };

        Ok(ColumnStatsReport {
            table_name: qualified,
            column_name: column.to_string(),
            basic_stats,
            numeric_stats,
        })
    }

    /// Lists warehouses with credit usage and load history attached.
    ///
    /// The account usage views lag and need elevated privileges, so a
    /// warehouse whose history cannot be read keeps zeroed stats rather
    /// than failing the whole report.
    ///
    /// # Errors
    /// Returns an error when `SHOW WAREHOUSES` itself fails.
    pub async fn get_warehouse_info(&self) -> ControlResult<WarehouseInfoReport> {
        let rows = self.client.query_rows("SHOW WAREHOUSES").await?;
        let total_warehouses = rows.len();
        let mut warehouses = Vec::with_capacity(total_warehouses);
        let mut active_warehouses = 0;
        let mut total_credits = 0.0;
        let mut default_warehouse = None;

        for mut row in rows {
            let name = row.get("name").and_then(Value::as_str).unwrap_or_default().to_string();
            let state = row.get("state").and_then(Value::as_str).unwrap_or_default();
            if state != "SUSPENDED" {
                active_warehouses += 1;
            }
            if default_warehouse.is_none()
                && row.get("is_default").and_then(Value::as_str) == Some("Y")
            {
                default_warehouse = Some(name.clone());
            }
            if !name.is_empty() {
                let usage = match self.warehouse_usage(&name).await {
                    Ok(usage) => usage,
                    Err(err) => {
                        debug!("Usage history unavailable for {name}: {err}");
                        WarehouseUsageStats::default()
                    }
                };
                let load = match self.warehouse_load(&name).await {
                    Ok(load) => load,
                    Err(err) => {
                        debug!("Load history unavailable for {name}: {err}");
                        WarehouseLoadStats::default()
                    }
                };
                total_credits += usage.total_credits_used;
                row.insert(
                    "usage_stats".to_string(),
                    serde_json::to_value(usage).unwrap_or_default(),
                );
                row.insert(
                    "load_stats".to_string(),
                    serde_json::to_value(load).unwrap_or_default(),
                );
            }
            warehouses.push(Value::Object(row));
        }

        let summary = WarehouseSummary {
            total_warehouses,
            active_warehouses,
            suspended_warehouses: total_warehouses - active_warehouses,
            total_credits_last_30_days: total_credits,
            default_warehouse,
            analysis_period: AnalysisPeriod::default(),
        };
        Ok(WarehouseInfoReport { warehouses, summary })
    }

    async fn warehouse_usage(&self, warehouse: &str) -> ControlResult<WarehouseUsageStats> {
        let sql = format!(
            "SELECT COALESCE(SUM(credits_used), 0) AS total_credits_used, \
             COALESCE(SUM(credits_used_compute), 0) AS compute_credits_used, \
             COALESCE(SUM(credits_used_cloud_services), 0) AS cloud_services_credits_used, \
             COUNT(DISTINCT DATE(start_time)) AS active_days, \
             MAX(end_time) AS last_used, \
             COALESCE(AVG(credits_used), 0) AS avg_credits_per_hour \
             FROM snowflake.account_usage.warehouse_metering_history \
             WHERE warehouse_name = {} \
             AND start_time >= DATEADD(day, -30, CURRENT_TIMESTAMP())",
            quote_literal(warehouse)
        );
        let mut rows = self.client.query_rows(&sql).await?;
        if rows.is_empty() {
            return Ok(WarehouseUsageStats::default());
        }
        Ok(serde_json::from_value(Value::Object(rows.swap_remove(0))).unwrap_or_default())
    }

    async fn warehouse_load(&self, warehouse: &str) -> ControlResult<WarehouseLoadStats> {
        let sql = format!(
            "SELECT COALESCE(AVG(avg_running), 0) AS avg_running_queries, \
             COALESCE(AVG(avg_queued_load), 0) AS avg_queued_load, \
             COALESCE(AVG(avg_queued_provisioning), 0) AS avg_queued_provisioning, \
             COALESCE(AVG(avg_blocked), 0) AS avg_blocked_queries \
             FROM snowflake.account_usage.warehouse_load_history \
             WHERE warehouse_name = {} \
             AND start_time >= DATEADD(day, -7, CURRENT_TIMESTAMP())",
            quote_literal(warehouse)
        );
        let mut rows = self.client.query_rows(&sql).await?;
        if rows.is_empty() {
            return Ok(WarehouseLoadStats::default());
        }
        Ok(serde_json::from_value(Value::Object(rows.swap_remove(0))).unwrap_or_default())
    }

    async fn column_catalog(
        &self,
        schema: &str,
        table: &str,
    ) -> ControlResult<Vec<(String, String)>> {
        let sql = format!(
            "SELECT COLUMN_NAME, DATA_TYPE FROM INFORMATION_SCHEMA.COLUMNS \
             WHERE TABLE_SCHEMA = {} AND TABLE_NAME = {} \
             ORDER BY ORDINAL_POSITION",
            quote_literal(schema),
            quote_literal(table)
        );
        let rows = self.client.query_rows(&sql).await?;
        if rows.is_empty() {
            return Err(ControlError::NotFound(format!("table {schema}.{table}")));
        }
        let columns = rows
            .into_iter()
            .filter_map(|row| {
                let name = row.get("COLUMN_NAME")?.as_str()?.to_string();
                let data_type = row.get("DATA_TYPE")?.as_str()?.to_string();
                Some((name, data_type))
            })
            .collect();
        Ok(columns)
    }

    async fn null_check(&self, target: &str, columns: &[(String, String)]) -> ControlResult<Value> {
        let mut selects = vec!["COUNT(*) AS TOTAL_ROWS".to_string()];
        for (index, (name, _)) in columns.iter().enumerate() {
            selects.push(format!(
                "SUM(CASE WHEN {} IS NULL THEN 1 ELSE 0 END) AS NULL_COUNT_{index}",
                quote_column(name)
            ));
        }
        let sql = format!("SELECT {} FROM {target}", selects.join(", "));
        let mut rows = self.client.query_rows(&sql).await?;
        if rows.is_empty() {
            return Ok(json!({ "total_rows": 0, "null_counts": {} }));
        }
        let row = rows.swap_remove(0);
        let total_rows = row.get("TOTAL_ROWS").cloned().unwrap_or(Value::Null);
        let mut null_counts = Map::new();
        for (index, (name, _)) in columns.iter().enumerate() {
            let count = row.get(&format!("NULL_COUNT_{index}")).cloned().unwrap_or(Value::Null);
            null_counts.insert(name.clone(), count);
        }
        Ok(json!({ "total_rows": total_rows, "null_counts": null_counts }))
    }

    async fn duplicate_check(&self, target: &str) -> ControlResult<Value> {
        let sql = format!(
            "SELECT COUNT(*) AS TOTAL_ROWS, \
             (SELECT COUNT(*) FROM (SELECT DISTINCT * FROM {target})) AS UNIQUE_ROWS \
             FROM {target}"
        );
        let mut rows = self.client.query_rows(&sql).await?;
        if rows.is_empty() {
            return Ok(json!({ "total_rows": 0, "unique_rows": 0, "duplicate_rows": 0 }));
        }
        let row = rows.swap_remove(0);
        let total = row.get("TOTAL_ROWS").and_then(Value::as_u64).unwrap_or(0);
        let unique = row.get("UNIQUE_ROWS").and_then(Value::as_u64).unwrap_or(0);
        Ok(json!({
            "total_rows": total,
            "unique_rows": unique,
            "duplicate_rows": total.saturating_sub(unique),
        }))
    }

    async fn range_check(
        &self,
        target: &str,
        columns: &[(String, String)],
    ) -> ControlResult<Value> {
        let numeric: Vec<(usize, &str)> = columns
            .iter()
            .enumerate()
            .filter(|(_, (_, data_type))| is_numeric_type(data_type))
            .map(|(index, (name, _))| (index, name.as_str()))
            .collect();
        if numeric.is_empty() {
            return Ok(json!({ "numeric_columns": 0, "ranges": {} }));
        }
        let mut selects = Vec::with_capacity(numeric.len() * 3);
        for (index, name) in &numeric {
            let quoted = quote_column(name);
            selects.push(format!("MIN({quoted}) AS MIN_{index}"));
            selects.push(format!("MAX({quoted}) AS MAX_{index}"));
            selects.push(format!("AVG({quoted}) AS AVG_{index}"));
        }
        let sql = format!("SELECT {} FROM {target}", selects.join(", "));
        let mut rows = self.client.query_rows(&sql).await?;
        let row = if rows.is_empty() { Map::new() } else { rows.swap_remove(0) };
        let mut ranges = Map::new();
        for (index, name) in &numeric {
            ranges.insert(
                (*name).to_string(),
                json!({
                    "min": row.get(&format!("MIN_{index}")).cloned().unwrap_or(Value::Null),
                    "max": row.get(&format!("MAX_{index}")).cloned().unwrap_or(Value::Null),
                    "avg": row.get(&format!("AVG_{index}")).cloned().unwrap_or(Value::Null),
                }),
            );
        }
        Ok(json!({ "numeric_columns": numeric.len(), "ranges": ranges }))
    }

    async fn format_check(
        &self,
        target: &str,
        columns: &[(String, String)],
    ) -> ControlResult<Value> {
        let text: Vec<(usize, &str)> = columns
            .iter()
            .enumerate()
            .filter(|(_, (_, data_type))| is_text_type(data_type))
            .map(|(index, (name, _))| (index, name.as_str()))
            .collect();
        if text.is_empty() {
            return Ok(json!({ "text_columns": 0, "formats": {} }));
        }
        let mut selects = Vec::with_capacity(text.len() * 2);
        for (index, name) in &text {
            let quoted = quote_column(name);
            selects.push(format!(
                "SUM(CASE WHEN {quoted} <> TRIM({quoted}) THEN 1 ELSE 0 END) AS UNTRIMMED_{index}"
            ));
            selects.push(format!(
                "SUM(CASE WHEN TRIM({quoted}) = '' THEN 1 ELSE 0 END) AS EMPTY_{index}"
            ));
        }
        let sql = format!("SELECT {} FROM {target}", selects.join(", "));
        let mut rows = self.client.query_rows(&sql).await?;
        let row = if rows.is_empty() { Map::new() } else { rows.swap_remove(0) };
        let mut formats = Map::new();
        for (index, name) in &text {
            formats.insert(
                (*name).to_string(),
                json!({
                    "untrimmed": row
                        .get(&format!("UNTRIMMED_{index}"))
                        .cloned()
                        .unwrap_or(Value::Null),
                    "empty_strings": row
                        .get(&format!("EMPTY_{index}"))
                        .cloned()
                        .unwrap_or(Value::Null),
                }),
            );
        }
        Ok(json!({ "text_columns": text.len(), "formats": formats }))
    }
}

fn is_numeric_type(data_type: &str) -> bool {
    matches!(data_type.to_ascii_uppercase().as_str(), "NUMBER" | "FLOAT" | "INTEGER")
}

fn is_text_type(data_type: &str) -> bool {
    data_type.eq_ignore_ascii_case("TEXT")
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use super::*;
    use crate::warehouse::{
        ClientOptions, ConnectionProfile, Credentials, TokenType, WarehouseClient,
    };

    fn offline_control() -> WarehouseControlPlane {
        let profile = ConnectionProfile {
            account: "testorg-test1".to_string(),
            user: "TESTER".to_string(),
            credentials: Credentials::Token {
                token: "test-token".to_string(),
                token_type: TokenType::OAuth,
            },
            database: None,
            schema: None,
            warehouse: None,
            role: None,
        };
        let options = ClientOptions::default()
            .with_login_timeout(Duration::from_millis(50))
            .with_request_timeout(Duration::from_millis(50));
        let client = WarehouseClient::new(profile, options).unwrap();
        WarehouseControlPlane::from_client(Arc::new(client))
    }

    #[test]
    fn check_labels_round_trip() {
        let parsed: QualityCheck = serde_json::from_str("\"null_check\"").unwrap();
        assert_eq!(parsed, QualityCheck::NullCheck);
        assert_eq!(serde_json::to_string(&QualityCheck::RangeCheck).unwrap(), "\"range_check\"");
        assert_eq!(QualityCheck::DuplicateCheck.as_str(), "duplicate_check");
    }

    #[test]
    fn type_predicates_follow_catalog_names() {
        assert!(is_numeric_type("NUMBER"));
        assert!(is_numeric_type("float"));
        assert!(!is_numeric_type("TEXT"));
        assert!(is_text_type("TEXT"));
        assert!(!is_text_type("VARIANT"));
    }

    #[test]
    fn usage_stats_accept_uppercase_result_keys() {
        let stats: WarehouseUsageStats = serde_json::from_value(json!({
            "TOTAL_CREDITS_USED": 12.5,
            "ACTIVE_DAYS": 4,
            "LAST_USED": "2025-06-01 10:00:00.000",
        }))
        .unwrap();
        assert!((stats.total_credits_used - 12.5).abs() < f64::EPSILON);
        assert_eq!(stats.active_days, 4);
        assert_eq!(stats.last_used.as_deref(), Some("2025-06-01 10:00:00.000"));
        assert!(stats.avg_credits_per_hour.abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn blank_queries_are_rejected() {
        let control = offline_control();
        let report = control.analyze_performance("   ", true).await;
        assert!(matches!(report, Err(ControlError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn quality_checks_validate_identifiers() {
        let control = offline_control();
        let report = control.check_data_quality("bad-table", None, &[]).await;
        assert!(matches!(report, Err(ControlError::InvalidInput(_))));

        let report = control.get_column_stats("orders", "amount; --", None, None).await;
        assert!(matches!(report, Err(ControlError::InvalidInput(_))));
    }
}
