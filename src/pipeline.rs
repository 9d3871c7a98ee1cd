use crate::analysis::visualization::{VisualizationKind, VisualizationPayload};
use crate::analysis::{AnalysisContext, ResultAnalyzer};
use crate::db::db_utils::Row;
use crate::db::executor::{ExecutionError, ExecutionOptions, ExecutionResult, SqlExecutor};
use crate::db::queries::CURRENT_INVENTORY_SQL;
use crate::domain::AnalysisRequest;
use crate::llm::LlmManager;
use crate::sql::generator::{FALLBACK_CONFIDENCE, SqlGenerator};
use crate::sql::params::{effective_range, pipeline_params, reparameterize};
use crate::sql::safety::check_safety;
use crate::sql::templates::TemplateMatcher;
use crate::sql::validator::SqlValidator;
use crate::sql::{SourceKind, SqlCandidate, ValidationFinding};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("SQL generation failed: {0}")]
    Generation(String),
    #[error("Unsafe query: {0}")]
    Unsafe(String),
    #[error("Query execution failed: {primary}. Fallback query also failed: {fallback}")]
    Execution { primary: String, fallback: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Generating,
    Validating,
    SafetyCheck,
    Executing,
    FallbackExecuting,
    Analyzing,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Generating => "generating",
            Stage::Validating => "validating",
            Stage::SafetyCheck => "safety_check",
            Stage::Executing => "executing",
            Stage::FallbackExecuting => "fallback_executing",
            Stage::Analyzing => "analyzing",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Success,
    PartialSuccess,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResponse {
    pub status: ResponseStatus,
    pub processing_time_ms: u64,
    pub sql: String,
    pub explanation: String,
    pub confidence: f64,
    pub source_kind: SourceKind,
    pub findings: Vec<ValidationFinding>,
    pub rows: Vec<Row>,
    pub columns: Vec<String>,
    pub row_count: usize,
    pub execution_time_ms: u64,
    pub narrative: String,
    pub visualization_kind: Option<VisualizationKind>,
    pub visualization_payload: Option<VisualizationPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
}

/// Question in, analysed rows out:
/// template or generation, validation, safety gate, execution (with one
/// inventory fallback), analysis. Stages run strictly in sequence.
pub struct AnalysisPipeline {
    matcher: TemplateMatcher,
    generator: SqlGenerator,
    validator: SqlValidator,
    executor: SqlExecutor,
    analyzer: ResultAnalyzer,
    options: ExecutionOptions,
}

impl AnalysisPipeline {
    pub fn new(llm: Arc<LlmManager>, executor: SqlExecutor, options: ExecutionOptions) -> Self {
        Self {
            matcher: TemplateMatcher::default(),
            generator: SqlGenerator::new(llm.clone()),
            validator: SqlValidator::new(llm.clone()),
            executor,
            analyzer: ResultAnalyzer::new(llm),
            options,
        }
    }

    async fn candidate_for(&self, request: &AnalysisRequest) -> SqlCandidate {
        match self.matcher.match_question(&request.question) {
            Some(candidate) => {
                info!(stage = %Stage::Generating, source = "template", "template matched");
                candidate
            }
            None => self.generator.generate(request).await,
        }
    }

    pub async fn run(&self, request: &AnalysisRequest) -> Result<AnalysisResponse, PipelineError> {
        let start_time = Instant::now();
        let tenant_id = request.tenant_id.as_str();
        let range = request.date_range.as_ref();

        let candidate = self.candidate_for(request).await;
        if candidate.sql.trim().is_empty() {
            let reason = candidate
                .error
                .clone()
                .unwrap_or_else(|| "No SQL could be generated".to_string());
            warn!(stage = %Stage::Generating, %reason, "no SQL to run");
            return Err(PipelineError::Generation(reason));
        }

        let sql = reparameterize(&candidate.sql, tenant_id, range);
        let outcome = self.validator.validate_and_correct(&sql, tenant_id).await;
        info!(
            stage = %Stage::Validating,
            findings = outcome.findings.len(),
            corrected = outcome.corrected,
            "validation finished"
        );
        let source_kind = if outcome.corrected { SourceKind::Corrected } else { candidate.source };
        let sql = reparameterize(&outcome.sql, tenant_id, range);

        let verdict = check_safety(&sql);
        if !verdict.safe {
            let reason = verdict.reason.unwrap_or_else(|| "unsafe query".to_string());
            warn!(stage = %Stage::SafetyCheck, %reason, "query vetoed");
            return Err(PipelineError::Unsafe(reason));
        }

        let window = effective_range(range, chrono::Local::now().date_naive());
        let params = pipeline_params(tenant_id, &window);

        let (result, fallback_reason) = match self.executor.execute(&sql, params.clone(), self.options).await {
            Ok(result) => {
                info!(stage = %Stage::Executing, rows = result.row_count, elapsed_ms = result.elapsed_ms, "query executed");
                (result, None)
            }
            Err(ExecutionError::Unsafe(reason)) => return Err(PipelineError::Unsafe(reason)),
            Err(primary) => {
                warn!(stage = %Stage::Executing, error = %primary, "query failed, running inventory fallback");
                let fallback = self.run_fallback(params).await.map_err(|fallback| {
                    error!(stage = %Stage::FallbackExecuting, error = %fallback, "fallback query failed");
                    PipelineError::Execution {
                        primary: primary.to_string(),
                        fallback: fallback.to_string(),
                    }
                })?;
                (fallback, Some(primary.to_string()))
            }
        };

        let (sql, explanation, confidence, source_kind) = match fallback_reason {
            Some(_) => (
                result.sql.clone(),
                "Requête de repli : inventaire actuel de la pharmacie.".to_string(),
                FALLBACK_CONFIDENCE,
                SourceKind::Fallback,
            ),
            None => (result.sql.clone(), candidate.explanation.clone(), candidate.confidence, source_kind),
        };

        let analysis = self
            .analyzer
            .analyze(
                &result,
                &AnalysisContext {
                    question: &request.question,
                    sql_explanation: Some(&explanation),
                    suggest_visualization: true,
                },
            )
            .await;
        info!(stage = %Stage::Analyzing, kind = ?analysis.visualization_kind, "analysis finished");

        let narrative = match &fallback_reason {
            Some(reason) => format!(
                "La requête initiale n'a pas pu être exécutée ({}). Voici l'inventaire actuel de votre pharmacie à la place.\n\n{}",
                reason, analysis.narrative
            ),
            None => analysis.narrative,
        };

        let ExecutionResult { rows, columns, row_count, elapsed_ms, .. } = result;
        Ok(AnalysisResponse {
            status: if fallback_reason.is_some() { ResponseStatus::PartialSuccess } else { ResponseStatus::Success },
            processing_time_ms: start_time.elapsed().as_millis() as u64,
            sql,
            explanation,
            confidence,
            source_kind,
            findings: outcome.findings,
            rows,
            columns,
            row_count,
            execution_time_ms: elapsed_ms,
            narrative,
            visualization_kind: analysis.visualization_kind,
            visualization_payload: analysis.visualization_payload,
            generation_error: candidate.error,
            analysis_error: analysis.error,
            fallback_reason,
        })
    }

    async fn run_fallback(&self, params: Vec<crate::db::db_utils::SqlParam>) -> Result<ExecutionResult, ExecutionError> {
        let result = self.executor.execute(CURRENT_INVENTORY_SQL, params, self.options).await?;
        info!(stage = %Stage::FallbackExecuting, rows = result.row_count, "fallback query executed");
        Ok(result)
    }
}
