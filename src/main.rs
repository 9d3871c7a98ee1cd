use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};

mod analysis;
mod config;
mod db;
mod domain;
mod feedback;
mod llm;
mod pipeline;
mod sql;
#[cfg(test)]
mod testing;
mod util;
mod web;

use crate::config::{AppConfig, CliArgs};
use crate::llm::LlmManager;
use crate::util::logging::init_tracing;
use crate::web::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    init_tracing();

    // Parse command line arguments
    let args = CliArgs::parse();

    // Load configuration
    let config = match AppConfig::new(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    info!(
        "Initializing DuckDB connection pool for {}",
        config.database.connection_string
    );
    let pool = db::build_pool(&config.database)?;

    if config.database.bootstrap_schema {
        info!("Creating pharmacy tables");
        db::bootstrap(&pool)?;
    }

    // The listings keep working without a language backend
    info!("Initializing LLM manager with backend: {}", config.llm.backend);
    let llm_manager = match LlmManager::new(&config.llm) {
        Ok(manager) => Some(Arc::new(manager)),
        Err(e) => {
            warn!("LLM backend unavailable, assistant endpoints will return 503: {}", e);
            None
        }
    };

    let web_config = config.web.clone();
    let app_state = Arc::new(AppState::new(config, pool, llm_manager));

    // Start the web server
    info!("Starting pharma-insight server on {}:{}", web_config.host, web_config.port);
    match web::run_server(web_config, app_state).await {
        Ok(_) => info!("Server stopped gracefully"),
        Err(e) => {
            error!("Server error: {}", e);
            return Err(e.into());
        }
    }

    Ok(())
}
