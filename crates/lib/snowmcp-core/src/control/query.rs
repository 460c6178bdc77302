//! Statement and batch execution.
//!
//! Multi-statement commands run sequentially. Reads return decoded rows;
//! writes run inside an explicit `BEGIN`/`COMMIT` pair and roll back when
//! the statement fails. Batches resolve declared dependencies in rounds and
//! report per-query outcomes.

use std::{collections::HashSet, time::Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::{ControlError, ControlResult, WarehouseControlPlane};
use crate::{
    statement::{is_write_statement, split_statements},
    warehouse::wire::{StatementResponse, decode_rows},
};

/// Result of one statement within a command.
#[derive(Debug, Clone, Serialize)]
pub struct StatementOutcome {
    pub statement: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affected_rows: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryReport {
    pub results: Vec<StatementOutcome>,
    pub statement_count: usize,
    pub execution_time_ms: u64,
}

/// A named batch member with optional dependencies on other members.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchQuery {
    pub name: String,
    pub query: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome {
    pub name: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<QueryReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_resolution: Option<String>,
    pub execution_time_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub outcomes: Vec<BatchOutcome>,
    pub executed: usize,
    pub total: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub halted: Option<String>,
    pub summary: String,
}

impl WarehouseControlPlane {
    /// Runs `command`, splitting it into statements first.
    ///
    /// Write statements run inside their own transaction and report affected
    /// rows; everything else returns decoded result rows.
    ///
    /// # Errors
    /// Returns an error when the command holds no statements or any
    /// statement fails. Failures are recorded in the error log.
    pub async fn execute_query(&self, command: &str) -> ControlResult<QueryReport> {
        let started = Instant::now();
        let statements = split_statements(command);
        if statements.is_empty() {
            return Err(ControlError::InvalidInput(
                "query must contain at least one statement".to_string(),
            ));
        }
        let mut results = Vec::with_capacity(statements.len());
        for statement in &statements {
            let outcome = if is_write_statement(statement) {
                self.execute_write(statement).await?
            } else {
                self.execute_read(statement).await?
            };
            results.push(outcome);
        }
        let statement_count = results.len();
        Ok(QueryReport { results, statement_count, execution_time_ms: elapsed_ms(started) })
    }

    /// Runs every batch member whose dependencies have completed, in rounds.
    ///
    /// With `stop_on_error` the batch halts at the first failure; otherwise
    /// a failed member still counts as executed and its dependents run. A
    /// round in which nothing could run means the remaining members form a
    /// cycle or depend on something absent, and the batch halts with those
    /// named.
    ///
    /// # Errors
    /// Returns an error for an empty batch, a blank name, or duplicate
    /// names. Member failures are reported per outcome, not as an error.
    pub async fn execute_batch(
        &self,
        queries: &[BatchQuery],
        stop_on_error: bool,
    ) -> ControlResult<BatchReport> {
        if queries.is_empty() {
            return Err(ControlError::InvalidInput(
                "batch must contain at least one query".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for query in queries {
            if query.name.trim().is_empty() {
                return Err(ControlError::InvalidInput(
                    "batch query name must not be empty".to_string(),
                ));
            }
            if !seen.insert(query.name.as_str()) {
                return Err(ControlError::InvalidInput(format!(
                    "duplicate batch query name: {}",
                    query.name
                )));
            }
        }

        let total = queries.len();
        let mut outcomes = Vec::with_capacity(total);
        let mut executed: HashSet<&str> = HashSet::new();
        let mut halted = None;
        let mut remaining: Vec<&BatchQuery> = queries.iter().collect();

        'rounds: while !remaining.is_empty() {
            let mut next_remaining = Vec::new();
            let mut ran_any = false;
            for query in remaining {
                let ready = query.depends_on.iter().all(|dep| executed.contains(dep.as_str()));
                if !ready {
                    next_remaining.push(query);
                    continue;
                }
                ran_any = true;
                let outcome = self.run_batch_query(query).await;
                let failed = !outcome.success;
                outcomes.push(outcome);
                if failed && stop_on_error {
                    halted = Some(format!("stopped after '{}' failed", query.name));
                    break 'rounds;
                }
                // A failed member still counts as executed so dependents run.
                executed.insert(query.name.as_str());
            }
            if !ran_any {
                let stuck: Vec<&str> =
                    next_remaining.iter().map(|query| query.name.as_str()).collect();
                halted = Some(format!(
                    "circular or missing dependency detected among: {}",
                    stuck.join(", ")
                ));
                break;
            }
            remaining = next_remaining;
        }

        let summary = format!("{}/{total} queries executed", executed.len());
        Ok(BatchReport { outcomes, executed: executed.len(), total, halted, summary })
    }

    async fn run_batch_query(&self, query: &BatchQuery) -> BatchOutcome {
        let started = Instant::now();
        match self.execute_query(&query.query).await {
            Ok(report) => {
                debug!(
                    "Batch query {} completed in {:.2}s",
                    query.name,
                    started.elapsed().as_secs_f64()
                );
                BatchOutcome {
                    name: query.name.clone(),
                    success: true,
                    result: Some(report),
                    error: None,
                    suggested_resolution: None,
                    execution_time_ms: elapsed_ms(started),
                }
            }
            Err(err) => {
                warn!("Batch query {} failed: {err}", query.name);
                BatchOutcome {
                    name: query.name.clone(),
                    success: false,
                    result: None,
                    error: Some(err.to_string()),
                    suggested_resolution: err.suggestion().map(|fix| fix.text.clone()),
                    execution_time_ms: elapsed_ms(started),
                }
            }
        }
    }

    async fn execute_read(&self, statement: &str) -> ControlResult<StatementOutcome> {
        let response = match self.client.execute(statement).await {
            Ok(response) => response,
            Err(err) => return Err(self.note_failure(statement, err).await),
        };
        let columns = response
            .result_set_meta_data
            .as_ref()
            .map(|meta| meta.row_type.as_slice())
            .unwrap_or_default();
        let rows: Vec<Value> = decode_rows(columns, response.data.as_deref().unwrap_or_default())
            .into_iter()
            .map(Value::Object)
            .collect();
        let row_count = rows.len();
        Ok(StatementOutcome {
            statement: statement.to_string(),
            rows: Some(rows),
            row_count: Some(row_count),
            affected_rows: None,
        })
    }

    async fn execute_write(&self, statement: &str) -> ControlResult<StatementOutcome> {
        self.run_transaction_step("BEGIN").await?;
        let response = match self.client.execute(statement).await {
            Ok(response) => response,
            Err(err) => {
                self.rollback_quietly().await;
                return Err(self.note_failure(statement, err).await);
            }
        };
        self.run_transaction_step("COMMIT").await?;
        Ok(StatementOutcome {
            statement: statement.to_string(),
            rows: None,
            row_count: None,
            affected_rows: Some(affected_rows(&response)),
        })
    }

    async fn run_transaction_step(&self, step: &str) -> ControlResult<()> {
        match self.client.execute(step).await {
            Ok(_) => Ok(()),
            Err(err) => Err(self.note_failure(step, err).await),
        }
    }

    async fn rollback_quietly(&self) {
        if let Err(err) = self.client.execute("ROLLBACK").await {
            warn!("Rollback failed: {err}");
        }
    }
}

/// Affected row count for a write, falling back to the single-cell result
/// some DDL statements return.
fn affected_rows(response: &StatementResponse) -> u64 {
    let from_stats = response.stats.map_or(0, |stats| stats.affected_rows());
    if from_stats > 0 {
        return from_stats;
    }
    response
        .data
        .as_ref()
        .and_then(|rows| rows.first())
        .and_then(|row| row.first())
        .and_then(Option::as_deref)
        .and_then(|raw| raw.parse::<u64>().ok())
        .unwrap_or(0)
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
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
    async fn blank_commands_are_rejected() {
        let control = offline_control();
        let report = control.execute_query("  ;  ; ").await;
        assert!(matches!(report, Err(ControlError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn batches_reject_duplicate_names() {
        let control = offline_control();
        let queries = vec![
            BatchQuery {
                name: "stage".to_string(),
                query: "SELECT 1".to_string(),
                depends_on: vec![],
            },
            BatchQuery {
                name: "stage".to_string(),
                query: "SELECT 2".to_string(),
                depends_on: vec![],
            },
        ];
        let report = control.execute_batch(&queries, true).await;
        assert!(matches!(report, Err(ControlError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn batches_reject_empty_input() {
        let control = offline_control();
        let report = control.execute_batch(&[], false).await;
        assert!(matches!(report, Err(ControlError::InvalidInput(_))));
    }

    fn staged_pair() -> Vec<BatchQuery> {
        vec![
            BatchQuery {
                name: "stage".to_string(),
                query: "SELECT 1".to_string(),
                depends_on: vec![],
            },
            BatchQuery {
                name: "load".to_string(),
                query: "SELECT 2".to_string(),
                depends_on: vec!["stage".to_string()],
            },
        ]
    }

    #[tokio::test]
    async fn failed_batch_members_still_unblock_dependents() {
        let control = offline_control();
        let report = control.execute_batch(&staged_pair(), false).await.unwrap();

        let names: Vec<&str> =
            report.outcomes.iter().map(|outcome| outcome.name.as_str()).collect();
        assert_eq!(names, ["stage", "load"]);
        assert!(report.outcomes.iter().all(|outcome| !outcome.success));
        assert_eq!(report.executed, 2);
        assert!(report.halted.is_none());
        assert_eq!(report.summary, "2/2 queries executed");
    }

    #[tokio::test]
    async fn stop_on_error_halts_before_dependents() {
        let control = offline_control();
        let report = control.execute_batch(&staged_pair(), true).await.unwrap();

        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(report.outcomes[0].name, "stage");
        assert_eq!(report.executed, 0);
        assert_eq!(report.halted.as_deref(), Some("stopped after 'stage' failed"));
        assert_eq!(report.summary, "0/2 queries executed");
    }

    #[test]
    fn affected_rows_prefers_stats_then_first_cell() {
        use crate::warehouse::wire::StatementStats;

        let with_stats = StatementResponse {
            data: Some(vec![vec![Some("3".to_string())]]),
            stats: Some(StatementStats { num_rows_inserted: Some(7), ..Default::default() }),
            ..Default::default()
        };
        assert_eq!(affected_rows(&with_stats), 7);

        let cell_only = StatementResponse {
            data: Some(vec![vec![Some("3".to_string())]]),
            ..Default::default()
        };
        assert_eq!(affected_rows(&cell_only), 3);

        assert_eq!(affected_rows(&StatementResponse::default()), 0);
    }
}
