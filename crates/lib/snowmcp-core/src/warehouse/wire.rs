//! Request and response shapes for the Snowflake SQL REST API v2.
//!
//! Result cells arrive as strings; [`decode_cell`] and [`decode_rows`] turn
//! them back into JSON values using the column metadata that accompanies
//! every result set.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body submitted to `POST /api/v2/statements`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementRequest {
    pub statement: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warehouse: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<StatementParameters>,
}

/// Session parameters attached to each statement.
#[derive(Debug, Clone, Serialize)]
pub struct StatementParameters {
    pub timezone: String,
}

impl StatementParameters {
    /// Parameters pinning the session to UTC.
    #[must_use]
    pub fn utc() -> Self {
        Self {
            timezone: "UTC".to_string(),
        }
    }
}

/// Response body for statement submission, polling, and partition fetches.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementResponse {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub statement_handle: Option<String>,
    #[serde(default)]
    pub result_set_meta_data: Option<ResultSetMetaData>,
    #[serde(default)]
    pub data: Option<Vec<Vec<Option<String>>>>,
    #[serde(default)]
    pub stats: Option<StatementStats>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultSetMetaData {
    #[serde(default)]
    pub num_rows: Option<u64>,
    #[serde(default)]
    pub row_type: Vec<ColumnType>,
    #[serde(default)]
    pub partition_info: Vec<PartitionInfo>,
}

/// One column of a result set.
#[derive(Debug, Clone, Deserialize)]
pub struct ColumnType {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub scale: Option<i64>,
    #[serde(default)]
    pub precision: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionInfo {
    pub row_count: u64,
    #[serde(default)]
    pub uncompressed_size: Option<u64>,
}

/// Row counts reported for data modifying statements.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementStats {
    #[serde(default)]
    pub num_rows_inserted: Option<u64>,
    #[serde(default)]
    pub num_rows_updated: Option<u64>,
    #[serde(default)]
    pub num_rows_deleted: Option<u64>,
    #[serde(default)]
    pub num_duplicate_rows_updated: Option<u64>,
}

impl StatementStats {
    /// Total rows inserted, updated, or deleted.
    #[must_use]
    pub fn affected_rows(&self) -> u64 {
        self.num_rows_inserted.unwrap_or_default()
            + self.num_rows_updated.unwrap_or_default()
            + self.num_rows_deleted.unwrap_or_default()
    }
}

/// Body submitted to the session login gateway.
#[derive(Debug, Serialize)]
pub struct LoginRequest {
    pub data: LoginRequestData,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct LoginRequestData {
    pub login_name: String,
    pub password: String,
    pub account_name: String,
    pub client_app_id: String,
    pub client_app_version: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginResponse {
    #[serde(default)]
    pub data: Option<LoginResponseData>,
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponseData {
    pub token: String,
    #[serde(default)]
    pub master_token: Option<String>,
    #[serde(default)]
    pub validity_in_seconds: Option<u64>,
}

/// Decodes one raw result cell according to its column metadata.
///
/// Exact integers become numbers, scaled and floating types become floats,
/// booleans become booleans, and anything else stays textual. Values that do
/// not parse cleanly keep their raw string form.
#[must_use]
pub fn decode_cell(raw: Option<&str>, column: &ColumnType) -> Value {
    let Some(raw) = raw else {
        return Value::Null;
    };
    match column.data_type.to_ascii_lowercase().as_str() {
        "fixed" => {
            if column.scale.unwrap_or(0) == 0 {
                int_or_text(raw)
            } else {
                number_or_text(raw)
            }
        }
        "real" | "float" | "double" => number_or_text(raw),
        "boolean" => match raw {
            "true" | "TRUE" | "1" => Value::Bool(true),
            "false" | "FALSE" | "0" => Value::Bool(false),
            other => Value::from(other),
        },
        _ => Value::from(raw),
    }
}

/// Decodes a raw row set into objects keyed by column name.
#[must_use]
pub fn decode_rows(
    columns: &[ColumnType],
    data: &[Vec<Option<String>>],
) -> Vec<serde_json::Map<String, Value>> {
    data.iter()
        .map(|row| {
            columns
                .iter()
                .zip(row)
                .map(|(column, cell)| (column.name.clone(), decode_cell(cell.as_deref(), column)))
                .collect()
        })
        .collect()
}

fn int_or_text(raw: &str) -> Value {
    raw.parse::<i64>().map_or_else(|_| Value::from(raw), Value::from)
}

fn number_or_text(raw: &str) -> Value {
    raw.parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map_or_else(|| Value::from(raw), Value::Number)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(name: &str, data_type: &str, scale: Option<i64>) -> ColumnType {
        ColumnType {
            name: name.to_string(),
            data_type: data_type.to_string(),
            nullable: true,
            scale,
            precision: None,
        }
    }

    #[test]
    fn decodes_typed_cells() {
        assert_eq!(
            decode_cell(Some("42"), &column("N", "fixed", Some(0))),
            Value::from(42)
        );
        assert_eq!(
            decode_cell(Some("12.34"), &column("D", "fixed", Some(2))),
            Value::from(12.34)
        );
        assert_eq!(
            decode_cell(Some("1.5"), &column("R", "real", None)),
            Value::from(1.5)
        );
        assert_eq!(
            decode_cell(Some("true"), &column("B", "boolean", None)),
            Value::Bool(true)
        );
        assert_eq!(decode_cell(None, &column("T", "text", None)), Value::Null);
        assert_eq!(
            decode_cell(Some("hello"), &column("T", "text", None)),
            Value::from("hello")
        );
    }

    #[test]
    fn oversized_numbers_stay_textual() {
        let huge = "99999999999999999999999999999999999999";
        assert_eq!(
            decode_cell(Some(huge), &column("N", "fixed", Some(0))),
            Value::from(huge)
        );
        assert_eq!(
            decode_cell(Some("NaN"), &column("R", "real", None)),
            Value::from("NaN")
        );
    }

    #[test]
    fn rows_become_keyed_objects() {
        let columns = vec![column("ID", "fixed", Some(0)), column("NAME", "text", None)];
        let data = vec![
            vec![Some("1".to_string()), Some("ada".to_string())],
            vec![Some("2".to_string()), None],
        ];
        let rows = decode_rows(&columns, &data);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["ID"], Value::from(1));
        assert_eq!(rows[0]["NAME"], Value::from("ada"));
        assert_eq!(rows[1]["NAME"], Value::Null);
    }

    #[test]
    fn parses_statement_response() {
        let raw = r#"{
            "code": "090001",
            "statementHandle": "01b0-0102",
            "message": "Statement executed successfully.",
            "resultSetMetaData": {
                "numRows": 1,
                "format": "jsonv2",
                "rowType": [
                    {"name": "ID", "type": "fixed", "nullable": false, "scale": 0, "precision": 38}
                ],
                "partitionInfo": [
                    {"rowCount": 1, "uncompressedSize": 16}
                ]
            },
            "data": [["7"]],
            "stats": {"numRowsInserted": 0}
        }"#;
        let response: StatementResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response.statement_handle.as_deref(), Some("01b0-0102"));
        let meta = response.result_set_meta_data.unwrap();
        assert_eq!(meta.num_rows, Some(1));
        assert_eq!(meta.row_type[0].name, "ID");
        assert_eq!(meta.partition_info.len(), 1);
        assert_eq!(response.data.unwrap()[0][0].as_deref(), Some("7"));
    }

    #[test]
    fn request_serialization_skips_missing_context() {
        let request = StatementRequest {
            statement: "SELECT 1".to_string(),
            timeout: None,
            database: Some("ANALYTICS".to_string()),
            schema: None,
            warehouse: None,
            role: None,
            parameters: Some(StatementParameters::utc()),
        };
        let raw = serde_json::to_string(&request).unwrap();
        assert!(raw.contains("\"database\""));
        assert!(!raw.contains("\"warehouse\""));
        assert!(raw.contains("\"UTC\""));
    }

    #[test]
    fn login_request_uses_gateway_field_names() {
        let request = LoginRequest {
            data: LoginRequestData {
                login_name: "ANALYST".to_string(),
                password: "secret".to_string(),
                account_name: "myorg-acct".to_string(),
                client_app_id: "snowmcp".to_string(),
                client_app_version: "0.1.0".to_string(),
            },
        };
        let raw = serde_json::to_string(&request).unwrap();
        assert!(raw.contains("\"LOGIN_NAME\""));
        assert!(raw.contains("\"CLIENT_APP_ID\""));
        assert!(raw.contains("\"ACCOUNT_NAME\""));
    }

    #[test]
    fn write_stats_sum_affected_rows() {
        let stats = StatementStats {
            num_rows_inserted: Some(2),
            num_rows_updated: Some(3),
            num_rows_deleted: None,
            num_duplicate_rows_updated: Some(4),
        };
        assert_eq!(stats.affected_rows(), 5);
    }
}
