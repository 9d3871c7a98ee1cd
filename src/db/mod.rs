pub mod db_pool;
pub mod db_utils;
pub mod executor;
pub mod queries;
pub mod schema;

use crate::config::DatabaseConfig;
use crate::db::db_pool::DuckDBConnectionManager;
use thiserror::Error;
use tracing::info;

pub type DbPool = r2d2::Pool<DuckDBConnectionManager>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Database error: {0}")]
    DuckDb(#[from] duckdb::Error),
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
}

pub fn build_pool(config: &DatabaseConfig) -> Result<DbPool, DbError> {
    let manager = DuckDBConnectionManager::new(config.connection_string.clone())?;
    let database = manager.connection_string().to_string();
    let pool = r2d2::Pool::builder()
        .max_size(config.pool_size.max(1) as u32)
        .build(manager)?;

    info!(
        database = %database,
        pool_size = pool.max_size(),
        "database pool ready"
    );
    Ok(pool)
}

/// Creates any missing catalog table.
pub fn bootstrap(pool: &DbPool) -> Result<(), DbError> {
    let conn = pool.get()?;
    conn.execute_batch(&schema::bootstrap_ddl())?;
    info!(tables = schema::TABLES.len(), "schema bootstrapped");
    Ok(())
}
