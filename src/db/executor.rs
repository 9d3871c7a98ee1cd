use crate::config::ExecutorConfig;
use crate::db::DbPool;
use crate::db::db_utils::{Row, SqlParam, batches_to_rows};
use crate::sql::lexer::{collapse_whitespace, mask_quoted, strip_trailing_semicolons};
use crate::sql::safety::check_safety;
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, warn};

static LIMIT_CLAUSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bLIMIT\b").expect("static limit pattern"));

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Unsafe query rejected: {0}")]
    Unsafe(String),
    #[error("Query timed out after {0}ms")]
    Timeout(u64),
    #[error("Query failed: {0}")]
    Query(String),
    #[error("Connection pool error: {0}")]
    Pool(String),
    #[error("Database task failed: {0}")]
    Task(String),
}

/// Column names in result order plus the rows.
#[derive(Debug, Clone, Default)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

/// Runs one already-vetted statement against the store.
#[async_trait]
pub trait QueryRunner: Send + Sync {
    async fn run(&self, sql: String, params: Vec<SqlParam>) -> Result<RowSet, ExecutionError>;
}

pub struct DuckDbRunner {
    pool: DbPool,
}

impl DuckDbRunner {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn run_blocking(pool: &DbPool, sql: &str, mut params: Vec<SqlParam>) -> Result<RowSet, ExecutionError> {
    let conn = pool.get().map_err(|e| ExecutionError::Pool(e.to_string()))?;
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| ExecutionError::Query(e.to_string()))?;

    let expected = stmt.parameter_count();
    if params.len() < expected {
        return Err(ExecutionError::Query(format!(
            "Statement expects {} parameters but {} were supplied",
            expected,
            params.len()
        )));
    }
    params.truncate(expected);

    let arrow = stmt
        .query_arrow(duckdb::params_from_iter(params))
        .map_err(|e| ExecutionError::Query(e.to_string()))?;

    let schema = arrow.get_schema();
    let columns = schema
        .fields()
        .iter()
        .map(|field| field.name().clone())
        .collect::<Vec<String>>();

    let batches: Vec<RecordBatch> = arrow.collect();
    let rows = batches_to_rows(&batches).map_err(ExecutionError::Query)?;

    Ok(RowSet { columns, rows })
}

#[async_trait]
impl QueryRunner for DuckDbRunner {
    async fn run(&self, sql: String, params: Vec<SqlParam>) -> Result<RowSet, ExecutionError> {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || run_blocking(&pool, &sql, params))
            .await
            .map_err(|join_err| {
                error!("Task join error: {}", join_err);
                ExecutionError::Task(join_err.to_string())
            })?
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ExecutionOptions {
    pub timeout_ms: u64,
    pub max_rows: usize,
}

impl From<&ExecutorConfig> for ExecutionOptions {
    fn from(config: &ExecutorConfig) -> Self {
        Self {
            timeout_ms: config.timeout_ms,
            max_rows: config.max_rows,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub rows: Vec<Row>,
    pub columns: Vec<String>,
    pub row_count: usize,
    pub elapsed_ms: u64,
    pub sql: String,
}

/// The SQL may arrive wrapped as `{"sql": "..."}`.
fn unwrap_envelope(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.starts_with('{') {
        if let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(trimmed) {
            if let Some(sql) = map.get("sql").and_then(|v| v.as_str()) {
                return sql.to_string();
            }
        }
    }
    trimmed.to_string()
}

/// Normalizes, gates and bounds a statement. Comments are dropped before the
/// gate runs, so the gated text is the text that executes.
fn prepare_statement(input: &str, max_rows: usize) -> Result<String, ExecutionError> {
    let normalized = collapse_whitespace(&unwrap_envelope(input));

    let verdict = check_safety(&normalized);
    if !verdict.safe {
        let reason = verdict.reason.unwrap_or_else(|| "unsafe query".to_string());
        warn!(%reason, "executor rejected query");
        return Err(ExecutionError::Unsafe(reason));
    }

    let statement = strip_trailing_semicolons(&normalized).trim_end().to_string();
    if LIMIT_CLAUSE.is_match(&mask_quoted(&statement)) {
        Ok(statement)
    } else {
        Ok(format!("{} LIMIT {}", statement, max_rows))
    }
}

#[derive(Clone)]
pub struct SqlExecutor {
    runner: Arc<dyn QueryRunner>,
}

impl SqlExecutor {
    pub fn new(runner: Arc<dyn QueryRunner>) -> Self {
        Self { runner }
    }

    pub fn with_pool(pool: DbPool) -> Self {
        Self::new(Arc::new(DuckDbRunner::new(pool)))
    }

    /// The timed-out query is abandoned, not cancelled: it may still finish
    /// on its blocking thread.
    pub async fn execute(
        &self,
        sql: &str,
        params: Vec<SqlParam>,
        options: ExecutionOptions,
    ) -> Result<ExecutionResult, ExecutionError> {
        let statement = prepare_statement(sql, options.max_rows)?;
        debug!(sql = %statement, params = params.len(), "executing query");

        let start_time = Instant::now();
        let outcome = tokio::time::timeout(
            Duration::from_millis(options.timeout_ms),
            self.runner.run(statement.clone(), params),
        )
        .await;

        let row_set = match outcome {
            Ok(result) => result?,
            Err(_) => {
                warn!(timeout_ms = options.timeout_ms, "query timed out");
                return Err(ExecutionError::Timeout(options.timeout_ms));
            }
        };

        let mut rows = row_set.rows;
        rows.truncate(options.max_rows);
        let elapsed_ms = start_time.elapsed().as_millis() as u64;
        info!(rows = rows.len(), elapsed_ms, "query executed");

        Ok(ExecutionResult {
            row_count: rows.len(),
            rows,
            columns: row_set.columns,
            elapsed_ms,
            sql: statement,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::params::pipeline_params;
    use crate::sql::templates::TemplateMatcher;
    use crate::testing::{CountingRunner, P1, SlowRunner, recent_range, seeded_pool};

    fn options() -> ExecutionOptions {
        ExecutionOptions { timeout_ms: 5000, max_rows: 1000 }
    }

    #[tokio::test]
    async fn drop_is_rejected_before_reaching_the_store() {
        let runner = Arc::new(CountingRunner::default());
        let executor = SqlExecutor::new(runner.clone());

        let err = executor
            .execute("DROP TABLE data_pharmacy;", Vec::new(), options())
            .await
            .expect_err("must be rejected");

        assert!(matches!(&err, ExecutionError::Unsafe(reason) if reason.contains("DROP")));
        assert_eq!(runner.calls(), 0);
    }

    #[tokio::test]
    async fn slow_query_times_out_with_configured_value() {
        let executor = SqlExecutor::new(Arc::new(SlowRunner::new(Duration::from_millis(500))));
        let err = executor
            .execute(
                "SELECT 1 FROM data_pharmacy",
                Vec::new(),
                ExecutionOptions { timeout_ms: 1, max_rows: 10 },
            )
            .await
            .expect_err("must time out");

        assert!(matches!(err, ExecutionError::Timeout(1)));
        assert!(err.to_string().contains("1ms"));
    }

    #[tokio::test]
    async fn envelope_is_unwrapped_and_limit_appended() {
        let runner = Arc::new(CountingRunner::default());
        let executor = SqlExecutor::new(runner.clone());

        let result = executor
            .execute(
                r#"{"sql": "SELECT name\n  FROM data_pharmacy;"}"#,
                Vec::new(),
                ExecutionOptions { timeout_ms: 1000, max_rows: 25 },
            )
            .await
            .expect("executes");

        assert_eq!(result.sql, "SELECT name FROM data_pharmacy LIMIT 25");
        assert_eq!(runner.last_sql().as_deref(), Some("SELECT name FROM data_pharmacy LIMIT 25"));
    }

    #[test]
    fn quoted_limit_does_not_count_as_a_clause() {
        let sql = prepare_statement("SELECT 'LIMIT' AS word FROM data_pharmacy", 5).expect("safe");
        assert!(sql.ends_with("LIMIT 5"));
        let sql = prepare_statement("SELECT id FROM data_pharmacy LIMIT 3", 5).expect("safe");
        assert!(sql.ends_with("LIMIT 3"));
    }

    #[tokio::test]
    async fn line_comment_keeps_the_tenant_filter_and_limit_live() {
        let executor = SqlExecutor::with_pool(seeded_pool());
        let result = executor
            .execute(
                "SELECT ip.name, ip.pharmacy_id FROM data_internalproduct ip -- produits\nWHERE ip.pharmacy_id = $1",
                vec![SqlParam::from(P1)],
                ExecutionOptions { timeout_ms: 5000, max_rows: 100 },
            )
            .await
            .expect("executes");

        assert_eq!(
            result.sql,
            "SELECT ip.name, ip.pharmacy_id FROM data_internalproduct ip WHERE ip.pharmacy_id = $1 LIMIT 100"
        );
        // P1 has 3 of the 4 seeded products
        assert_eq!(result.row_count, 3);
    }

    #[tokio::test]
    async fn apostrophe_in_comment_does_not_hide_a_second_statement() {
        let runner = Arc::new(CountingRunner::default());
        let executor = SqlExecutor::new(runner.clone());

        let err = executor
            .execute(
                "SELECT name FROM data_pharmacy -- l'officine\n; DROP TABLE data_sales",
                Vec::new(),
                options(),
            )
            .await
            .expect_err("must be rejected");

        assert!(matches!(err, ExecutionError::Unsafe(_)));
        assert_eq!(runner.calls(), 0);
    }

    #[tokio::test]
    async fn quoted_product_table_without_tenant_is_rejected() {
        let runner = Arc::new(CountingRunner::default());
        let executor = SqlExecutor::new(runner.clone());

        let err = executor
            .execute("SELECT name, pharmacy_id FROM \"data_internalproduct\"", Vec::new(), options())
            .await
            .expect_err("must be rejected");

        assert!(matches!(&err, ExecutionError::Unsafe(reason) if reason.contains("pharmacy_id")));
        assert_eq!(runner.calls(), 0);
    }

    #[tokio::test]
    async fn template_runs_against_seeded_store() {
        let executor = SqlExecutor::with_pool(seeded_pool());
        let template = TemplateMatcher::default()
            .by_name("topSellingProducts")
            .expect("template")
            .sql;

        let result = executor
            .execute(template, pipeline_params(P1, &recent_range()), options())
            .await
            .expect("executes");

        assert_eq!(result.row_count, 2);
        assert_eq!(result.columns[0], "Nom du produit");
        assert_eq!(result.rows[0]["Nom du produit"], "Doliprane 1000mg");
        for row in &result.rows {
            assert_eq!(row.len(), result.columns.len());
        }
    }

    #[tokio::test]
    async fn rows_are_capped_at_max_rows() {
        let executor = SqlExecutor::with_pool(seeded_pool());
        let result = executor
            .execute(
                "SELECT name FROM data_globalproduct ORDER BY name",
                Vec::new(),
                ExecutionOptions { timeout_ms: 5000, max_rows: 2 },
            )
            .await
            .expect("executes");
        assert_eq!(result.row_count, 2);
    }

    #[tokio::test]
    async fn missing_parameters_are_a_query_error() {
        let executor = SqlExecutor::with_pool(seeded_pool());
        let err = executor
            .execute(
                "SELECT name FROM data_internalproduct WHERE pharmacy_id = $1 LIMIT 5",
                Vec::new(),
                options(),
            )
            .await
            .expect_err("parameter missing");
        assert!(matches!(err, ExecutionError::Query(_)));
    }
}
