use crate::config::AppConfig;
use crate::db::DbPool;
use crate::db::executor::{ExecutionOptions, SqlExecutor};
use crate::feedback::FeedbackSink;
use crate::llm::LlmManager;
use crate::llm::assistant::ChatAssistant;
use crate::pipeline::AnalysisPipeline;
use std::sync::Arc;

/// Shared application state for the web server
pub struct AppState {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub executor: SqlExecutor,
    /// `None` when no language backend could be configured.
    pub pipeline: Option<AnalysisPipeline>,
    pub assistant: Option<ChatAssistant>,
    pub feedback: FeedbackSink,
    pub startup_time: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    pub fn new(config: AppConfig, db_pool: DbPool, llm_manager: Option<Arc<LlmManager>>) -> Self {
        let executor = SqlExecutor::with_pool(db_pool.clone());
        Self::with_executor(config, db_pool, executor, llm_manager)
    }

    pub fn with_executor(
        config: AppConfig,
        db_pool: DbPool,
        executor: SqlExecutor,
        llm_manager: Option<Arc<LlmManager>>,
    ) -> Self {
        let analysis_options = ExecutionOptions {
            timeout_ms: config.executor.timeout_ms,
            max_rows: config.executor.analysis_max_rows,
        };

        let pipeline = llm_manager
            .clone()
            .map(|llm| AnalysisPipeline::new(llm, executor.clone(), analysis_options));
        let assistant = llm_manager.map(ChatAssistant::new);

        Self {
            feedback: FeedbackSink::new(&config.feedback.log_dir),
            config,
            db_pool,
            executor,
            pipeline,
            assistant,
            startup_time: chrono::Utc::now(),
        }
    }

    pub fn llm_available(&self) -> bool {
        self.pipeline.is_some()
    }

    /// Limits applied to the listing endpoints.
    pub fn listing_options(&self) -> ExecutionOptions {
        ExecutionOptions::from(&self.config.executor)
    }
}
