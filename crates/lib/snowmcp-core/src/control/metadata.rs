//! Catalog metadata: schemas, tables, columns, samples, and search.
//!
//! Caller-supplied names are validated as identifiers before they reach a
//! statement. Names compared against `INFORMATION_SCHEMA` columns are
//! uppercased first, matching how Snowflake stores unquoted identifiers.

use serde::Serialize;
use serde_json::Value;

use super::{ControlError, ControlResult, DEFAULT_SCHEMA, WarehouseControlPlane};
use crate::{
    statement::{ensure_ident, qualified_name, quote_literal},
    warehouse::wire::decode_rows,
};

const DEFAULT_SAMPLE_ROWS: u32 = 10;
const MAX_SAMPLE_ROWS: u32 = 100;

/// Tables of a schema, or columns of one table within it.
#[derive(Debug, Clone, Serialize)]
pub struct SchemaReport {
    pub schema_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_name: Option<String>,
    pub rows: Vec<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableDescription {
    pub table_info: Value,
    pub columns: Vec<Value>,
    pub column_count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct TableSampleReport {
    pub table_name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Value>,
    pub sample_size: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchReport {
    pub search_term: String,
    pub matches: Vec<Value>,
    pub match_count: usize,
}

impl WarehouseControlPlane {
    /// Lists the tables of `schema`, or the columns of `table` within it.
    ///
    /// Defaults to the `PUBLIC` schema when none is given.
    ///
    /// # Errors
    /// Returns an error for invalid identifiers or a failed catalog query.
    pub async fn inspect_schema(
        &self,
        schema: Option<&str>,
        table: Option<&str>,
    ) -> ControlResult<SchemaReport> {
        let schema = ensure_ident(schema.unwrap_or(DEFAULT_SCHEMA))?.to_uppercase();
        let schema_literal = quote_literal(&schema);
        if let Some(table) = table {
            let table = ensure_ident(table)?.to_uppercase();
            let sql = format!(
                "SELECT COLUMN_NAME, DATA_TYPE, IS_NULLABLE, COLUMN_DEFAULT \
                 FROM INFORMATION_SCHEMA.COLUMNS \
                 WHERE TABLE_SCHEMA = {schema_literal} AND TABLE_NAME = {} \
                 ORDER BY ORDINAL_POSITION",
                quote_literal(&table)
            );
            let rows = self.rows(&sql).await?;
            return Ok(SchemaReport { schema_name: schema, table_name: Some(table), rows });
        }
        let sql = format!(
            "SELECT TABLE_NAME, TABLE_TYPE, ROW_COUNT, BYTES \
             FROM INFORMATION_SCHEMA.TABLES \
             WHERE TABLE_SCHEMA = {schema_literal} \
             ORDER BY TABLE_NAME"
        );
        let rows = self.rows(&sql).await?;
        Ok(SchemaReport { schema_name: schema, table_name: None, rows })
    }

    /// # Errors
    /// Returns an error when the statement fails.
    pub async fn list_databases(&self) -> ControlResult<Vec<Value>> {
        self.rows("SHOW DATABASES").await
    }

    /// # Errors
    /// Returns an error for an invalid database name or a failed statement.
    pub async fn list_schemas(&self, database: Option<&str>) -> ControlResult<Vec<Value>> {
        let sql = match database {
            Some(database) => format!("SHOW SCHEMAS IN DATABASE {}", ensure_ident(database)?),
            None => "SHOW SCHEMAS".to_string(),
        };
        self.rows(&sql).await
    }

    /// Lists tables in the named database and schema, falling back to the
    /// session context when both are absent.
    ///
    /// # Errors
    /// Returns an error for invalid names or a failed statement.
    pub async fn list_tables(
        &self,
        database: Option<&str>,
        schema: Option<&str>,
    ) -> ControlResult<Vec<Value>> {
        let sql = match (database, schema) {
            (Some(database), Some(schema)) => format!(
                "SHOW TABLES IN SCHEMA {}.{}",
                ensure_ident(database)?,
                ensure_ident(schema)?
            ),
            (Some(database), None) => {
                format!("SHOW TABLES IN DATABASE {}", ensure_ident(database)?)
            }
            (None, Some(schema)) => format!("SHOW TABLES IN SCHEMA {}", ensure_ident(schema)?),
            (None, None) => "SHOW TABLES".to_string(),
        };
        self.rows(&sql).await
    }

    /// Full catalog detail for one table: table facts plus every column.
    ///
    /// # Errors
    /// Returns [`ControlError::NotFound`] when no table matches, and the
    /// usual errors for invalid names or failed statements.
    pub async fn describe_table(
        &self,
        table: &str,
        database: Option<&str>,
        schema: Option<&str>,
    ) -> ControlResult<TableDescription> {
        let table = ensure_ident(table)?.to_uppercase();
        let table_literal = quote_literal(&table);
        let mut filters = catalog_filter(database)?;
        if let Some(schema) = schema {
            let schema = ensure_ident(schema)?.to_uppercase();
            filters.push_str(&format!(" AND TABLE_SCHEMA = {}", quote_literal(&schema)));
        }

        let info_sql = format!(
            "SELECT TABLE_CATALOG AS DATABASE_NAME, TABLE_SCHEMA AS SCHEMA_NAME, TABLE_NAME, \
             TABLE_TYPE, CREATED, LAST_ALTERED, COMMENT, ROW_COUNT, BYTES, CLUSTERING_KEY, \
             AUTO_CLUSTERING_ON \
             FROM INFORMATION_SCHEMA.TABLES \
             WHERE TABLE_NAME = {table_literal}{filters}"
        );
        let mut info_rows = self.rows(&info_sql).await?;
        if info_rows.is_empty() {
            return Err(ControlError::NotFound(format!("table {table}")));
        }
        let table_info = info_rows.swap_remove(0);

        let columns_sql = format!(
            "SELECT ORDINAL_POSITION, COLUMN_NAME, DATA_TYPE, IS_NULLABLE, COLUMN_DEFAULT, \
             IS_IDENTITY, COMMENT, CHARACTER_MAXIMUM_LENGTH, NUMERIC_PRECISION, NUMERIC_SCALE \
             FROM INFORMATION_SCHEMA.COLUMNS \
             WHERE TABLE_NAME = {table_literal}{filters} \
             ORDER BY ORDINAL_POSITION"
        );
        let columns = self.rows(&columns_sql).await?;
        let column_count = columns.len();
        Ok(TableDescription { table_info, columns, column_count })
    }

    /// Reads up to `limit` rows from a table, capped at 100.
    ///
    /// # Errors
    /// Returns an error for invalid names or a failed statement.
    pub async fn get_table_sample(
        &self,
        table: &str,
        database: Option<&str>,
        schema: Option<&str>,
        limit: Option<u32>,
    ) -> ControlResult<TableSampleReport> {
        let qualified = qualified_name(database, schema, table)?;
        let sql = format!("SELECT * FROM {qualified} LIMIT {}", clamp_sample(limit));
        let response = self.client.execute(&sql).await?;
        let meta_columns = response
            .result_set_meta_data
            .as_ref()
            .map(|meta| meta.row_type.as_slice())
            .unwrap_or_default();
        let columns: Vec<String> =
            meta_columns.iter().map(|column| column.name.clone()).collect();
        let rows: Vec<Value> =
            decode_rows(meta_columns, response.data.as_deref().unwrap_or_default())
                .into_iter()
                .map(Value::Object)
                .collect();
        let sample_size = rows.len();
        Ok(TableSampleReport { table_name: qualified, columns, rows, sample_size })
    }

    /// Finds tables whose name or comment matches `term`, case insensitively.
    ///
    /// # Errors
    /// Returns an error for a blank term, an invalid database name, or a
    /// failed statement.
    pub async fn search_tables(
        &self,
        term: &str,
        database: Option<&str>,
    ) -> ControlResult<SearchReport> {
        let pattern = like_pattern(term)?;
        let db_filter = catalog_filter(database)?;
        let sql = format!(
            "SELECT TABLE_CATALOG, TABLE_SCHEMA, TABLE_NAME, TABLE_TYPE, COMMENT \
             FROM INFORMATION_SCHEMA.TABLES \
             WHERE (UPPER(TABLE_NAME) LIKE UPPER({pattern}) \
             OR UPPER(COMMENT) LIKE UPPER({pattern})){db_filter} \
             ORDER BY TABLE_CATALOG, TABLE_SCHEMA, TABLE_NAME"
        );
        let matches = self.rows(&sql).await?;
        let match_count = matches.len();
        Ok(SearchReport { search_term: term.trim().to_string(), matches, match_count })
    }

    /// Finds columns whose name or comment matches `term`, case
    /// insensitively.
    ///
    /// # Errors
    /// Same failure modes as [`WarehouseControlPlane::search_tables`].
    pub async fn search_columns(
        &self,
        term: &str,
        database: Option<&str>,
    ) -> ControlResult<SearchReport> {
        let pattern = like_pattern(term)?;
        let db_filter = catalog_filter(database)?;
        let sql = format!(
            "SELECT TABLE_CATALOG, TABLE_SCHEMA, TABLE_NAME, COLUMN_NAME, DATA_TYPE, COMMENT \
             FROM INFORMATION_SCHEMA.COLUMNS \
             WHERE (UPPER(COLUMN_NAME) LIKE UPPER({pattern}) \
             OR UPPER(COMMENT) LIKE UPPER({pattern})){db_filter} \
             ORDER BY TABLE_CATALOG, TABLE_SCHEMA, TABLE_NAME, ORDINAL_POSITION"
        );
        let matches = self.rows(&sql).await?;
        let match_count = matches.len();
        Ok(SearchReport { search_term: term.trim().to_string(), matches, match_count })
    }
}

fn clamp_sample(limit: Option<u32>) -> u32 {
    limit.filter(|rows| *rows > 0).unwrap_or(DEFAULT_SAMPLE_ROWS).min(MAX_SAMPLE_ROWS)
}

fn like_pattern(term: &str) -> ControlResult<String> {
    let term = term.trim();
    if term.is_empty() {
        return Err(ControlError::InvalidInput("search term must not be empty".to_string()));
    }
    Ok(quote_literal(&format!("%{term}%")))
}

fn catalog_filter(database: Option<&str>) -> ControlResult<String> {
    match database {
        Some(database) => {
            let database = ensure_ident(database)?.to_uppercase();
            Ok(format!(" AND TABLE_CATALOG = {}", quote_literal(&database)))
        }
        None => Ok(String::new()),
    }
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

    #[tokio::test]
    async fn invalid_identifiers_are_rejected_before_execution() {
        let control = offline_control();
        let report = control.inspect_schema(Some("bad-schema"), None).await;
        assert!(matches!(report, Err(ControlError::InvalidInput(_))));

        let report = control.list_tables(Some("orders; DROP TABLE x"), None).await;
        assert!(matches!(report, Err(ControlError::InvalidInput(_))));

        let report = control.describe_table("1table", None, None).await;
        assert!(matches!(report, Err(ControlError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn blank_search_terms_are_rejected() {
        let control = offline_control();
        let report = control.search_tables("   ", None).await;
        assert!(matches!(report, Err(ControlError::InvalidInput(_))));

        let report = control.search_columns("", Some("ANALYTICS")).await;
        assert!(matches!(report, Err(ControlError::InvalidInput(_))));
    }

    #[test]
    fn sample_limits_clamp_to_bounds() {
        assert_eq!(clamp_sample(None), 10);
        assert_eq!(clamp_sample(Some(0)), 10);
        assert_eq!(clamp_sample(Some(25)), 25);
        assert_eq!(clamp_sample(Some(5000)), 100);
    }

    #[test]
    fn like_patterns_wrap_and_escape() {
        assert_eq!(like_pattern("orders").unwrap(), "'%orders%'");
        assert_eq!(like_pattern(" O'Brien ").unwrap(), "'%O''Brien%'");
    }
}
