//! Warehouse control plane.
//!
//! [`WarehouseControlPlane`] wraps a client with the operations the MCP tools
//! expose: statement and batch execution, catalog metadata, and analysis.
//! Failed statements are recorded in the error resolution log when one is
//! attached, and the best known fix rides along on the returned error.

use std::{error::Error, fmt, sync::Arc};

use serde_json::Value;
use snowmcp_store::{ErrorLogStore, Resolution, StoreError};
use tracing::warn;

use crate::{
    statement::StatementError,
    warehouse::{ClientError, WarehouseClient},
};

pub mod analysis;
pub mod metadata;
pub mod query;

pub use analysis::{
    AnalysisPeriod, ColumnStatsReport, DataQualityReport, PerformanceReport, QualityCheck,
    QualityFinding, WarehouseInfoReport, WarehouseLoadStats, WarehouseSummary,
    WarehouseUsageStats,
};
pub use metadata::{SchemaReport, SearchReport, TableDescription, TableSampleReport};
pub use query::{BatchOutcome, BatchQuery, BatchReport, QueryReport, StatementOutcome};

/// Schema assumed when the caller names none.
const DEFAULT_SCHEMA: &str = "PUBLIC";

#[derive(Debug)]
pub enum ControlError {
    /// The warehouse rejected a statement, with the best known fix attached
    /// when the error log recognizes the failure.
    Client {
        error: ClientError,
        suggestion: Option<Resolution>,
    },
    InvalidInput(String),
    NotFound(String),
    Store(StoreError),
}

impl fmt::Display for ControlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Client { error, .. } => write!(f, "{error}"),
            Self::InvalidInput(message) => write!(f, "Invalid input: {message}"),
            Self::NotFound(what) => write!(f, "Not found: {what}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ControlError {}

impl From<ClientError> for ControlError {
    fn from(error: ClientError) -> Self {
        Self::Client { error, suggestion: None }
    }
}

impl From<StatementError> for ControlError {
    fn from(err: StatementError) -> Self {
        Self::InvalidInput(err.to_string())
    }
}

impl From<StoreError> for ControlError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

impl ControlError {
    /// The highest-ranked known resolution for this failure, if any.
    #[must_use]
    pub const fn suggestion(&self) -> Option<&Resolution> {
        match self {
            Self::Client { suggestion, .. } => suggestion.as_ref(),
            _ => None,
        }
    }
}

pub type ControlResult<T> = Result<T, ControlError>;

#[derive(Clone)]
pub struct WarehouseControlPlane {
    client: Arc<WarehouseClient>,
    error_log: Option<ErrorLogStore>,
}

impl WarehouseControlPlane {
    #[must_use]
    pub fn new(client: Arc<WarehouseClient>, error_log: Option<ErrorLogStore>) -> Self {
        Self { client, error_log }
    }

    #[must_use]
    pub fn from_client(client: Arc<WarehouseClient>) -> Self {
        Self::new(client, None)
    }

    #[must_use]
    pub fn client(&self) -> &WarehouseClient {
        &self.client
    }

    /// Records a failed statement in the error log and wraps the error with
    /// the best known resolution for it.
    async fn note_failure(&self, query: &str, error: ClientError) -> ControlError {
        let mut suggestion = None;
        if let Some(log) = &self.error_log {
            match log.note_failure(Some(query), &error.to_string()).await {
                Ok(best) => suggestion = best,
                Err(store_err) => warn!("Failed to record query error: {store_err}"),
            }
        }
        ControlError::Client { error, suggestion }
    }

    /// Runs a statement and returns its rows as JSON objects.
    async fn rows(&self, statement: &str) -> ControlResult<Vec<Value>> {
        let rows = self.client.query_rows(statement).await?;
        Ok(rows.into_iter().map(Value::Object).collect())
    }
}
